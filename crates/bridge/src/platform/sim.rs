//! In-memory platform implementation
//!
//! Backs the demo mode of the binary and the integration tests: fixture
//! devices, injectable attach/detach/permission notifications, and a
//! configurable auto-answer for permission prompts.

use crate::platform::{
    DeviceConnection, DeviceSpeed, InputDeviceRecord, InputSubsystem, NativeDevice, Platform,
    PlatformCapabilities, PlatformError, PlatformEvent, RawConfiguration, RawEndpoint,
    RawInterface, UsbSubsystem, source,
};
use async_channel::Sender;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::warn;

#[derive(Default)]
struct Inner {
    caps: Option<PlatformCapabilities>,
    native: Vec<NativeDevice>,
    input: Vec<InputDeviceRecord>,
    granted: HashSet<String>,
    serials: HashMap<String, String>,
    raw_descriptors: HashMap<String, Vec<u8>>,
    security_faults: HashSet<String>,
    /// Answer permission prompts immediately with this verdict
    auto_grant: Option<bool>,
    /// Names with an outstanding permission prompt
    prompts: Vec<String>,
    /// Successful opens per device name
    open_counts: HashMap<String, usize>,
    events: Option<Sender<PlatformEvent>>,
}

/// Simulated platform
///
/// Cloning returns a second handle to the same state, so tests keep one
/// handle for injection while the worker owns the other.
#[derive(Clone, Default)]
pub struct SimPlatform {
    inner: Arc<Mutex<Inner>>,
}

impl SimPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Demo fixture set: one native keyboard and one input-only mouse
    pub fn with_demo_fixtures(auto_grant: bool) -> Self {
        let mut keyboard = NativeDevice::new("/dev/bus/usb/001/002", 1002, 0x046d, 0xc31c);
        keyboard.speed = Some(DeviceSpeed::Full);
        keyboard.port_number = Some(1);
        keyboard.manufacturer = Some("Logitech".to_string());
        keyboard.product = Some("USB Keyboard".to_string());
        keyboard.interfaces = vec![RawInterface {
            id: 0,
            alternate_setting: 0,
            name: None,
            class: 3,
            subclass: 1,
            protocol: 1,
            endpoints: vec![RawEndpoint {
                address: 0x81,
                attributes: 0x03,
                max_packet_size: 8,
                interval: 10,
            }],
        }];
        keyboard.configurations = vec![RawConfiguration {
            id: 1,
            name: None,
            attributes: 0xa0,
            max_power_ma: 100,
            interfaces: keyboard.interfaces.clone(),
        }];

        let mut mouse = InputDeviceRecord::new(5, 0x1532, 0x0084);
        mouse.name = Some("Gaming Mouse".to_string());
        mouse.descriptor = Some("b2c9f6a1".to_string());
        mouse.is_external = true;
        mouse.sources = source::MOUSE;

        let sim = Self::new()
            .with_native_device(keyboard)
            .with_serial("/dev/bus/usb/001/002", "KB12345")
            .with_raw_descriptors(
                "/dev/bus/usb/001/002",
                vec![
                    0x12, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x08, 0x6d, 0x04, 0x1c, 0xc3, 0x10,
                    0x01, 0x01, 0x02, 0x03, 0x01,
                ],
            )
            .with_input_device(mouse);

        if auto_grant {
            sim.auto_grant(true)
        } else {
            sim
        }
    }

    pub fn with_capabilities(self, caps: PlatformCapabilities) -> Self {
        self.inner.lock().unwrap().caps = Some(caps);
        self
    }

    pub fn with_native_device(self, dev: NativeDevice) -> Self {
        self.inner.lock().unwrap().native.push(dev);
        self
    }

    pub fn with_input_device(self, rec: InputDeviceRecord) -> Self {
        self.inner.lock().unwrap().input.push(rec);
        self
    }

    /// Pre-grant permission for a native device
    pub fn with_permission(self, name: &str) -> Self {
        self.inner.lock().unwrap().granted.insert(name.to_string());
        self
    }

    pub fn with_serial(self, name: &str, serial: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .serials
            .insert(name.to_string(), serial.to_string());
        self
    }

    pub fn with_raw_descriptors(self, name: &str, raw: Vec<u8>) -> Self {
        self.inner
            .lock()
            .unwrap()
            .raw_descriptors
            .insert(name.to_string(), raw);
        self
    }

    /// Make every connection attempt for a device raise a security fault
    pub fn with_security_fault(self, name: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .security_faults
            .insert(name.to_string());
        self
    }

    /// Answer future permission prompts immediately with `granted`
    pub fn auto_grant(self, granted: bool) -> Self {
        self.inner.lock().unwrap().auto_grant = Some(granted);
        self
    }

    /// Names that currently have an outstanding permission prompt
    pub fn prompts(&self) -> Vec<String> {
        self.inner.lock().unwrap().prompts.clone()
    }

    /// How many connections have been opened to a device
    pub fn open_count(&self, name: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .open_counts
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// Inject a device attach
    pub fn attach(&self, dev: NativeDevice) {
        let name = dev.name.clone();
        self.inner.lock().unwrap().native.push(dev);
        self.emit(PlatformEvent::UsbAttached { name: Some(name) });
    }

    /// Inject a device detach
    pub fn detach(&self, name: &str) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.native.retain(|d| d.name != name);
            inner.granted.remove(name);
        }
        self.emit(PlatformEvent::UsbDetached {
            name: Some(name.to_string()),
        });
    }

    pub fn add_input(&self, rec: InputDeviceRecord) {
        let id = rec.id;
        self.inner.lock().unwrap().input.push(rec);
        self.emit(PlatformEvent::InputAdded { id });
    }

    pub fn remove_input(&self, id: i32) {
        self.inner.lock().unwrap().input.retain(|r| r.id != id);
        self.emit(PlatformEvent::InputRemoved { id });
    }

    /// Deliver the OS verdict for an outstanding permission prompt
    pub fn deliver_permission(&self, name: &str, granted: bool) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.prompts.retain(|n| n != name);
            if granted {
                inner.granted.insert(name.to_string());
            }
        }
        self.emit(PlatformEvent::PermissionResult {
            name: name.to_string(),
            granted,
        });
    }

    fn emit(&self, event: PlatformEvent) {
        let sender = self.inner.lock().unwrap().events.clone();
        if let Some(tx) = sender
            && tx.send_blocking(event).is_err()
        {
            warn!("platform event dropped: subscriber gone");
        }
    }
}

struct SimConnection {
    serial: Option<String>,
    raw: Option<Vec<u8>>,
}

impl DeviceConnection for SimConnection {
    fn serial_number(&self) -> Option<String> {
        self.serial.clone()
    }

    fn raw_descriptors(&self) -> Option<Vec<u8>> {
        self.raw.clone()
    }
}

impl UsbSubsystem for SimPlatform {
    fn devices(&self) -> Vec<NativeDevice> {
        self.inner.lock().unwrap().native.clone()
    }

    fn has_permission(&self, name: &str) -> bool {
        self.inner.lock().unwrap().granted.contains(name)
    }

    fn request_permission(&self, name: &str) -> Result<(), PlatformError> {
        let auto = {
            let mut inner = self.inner.lock().unwrap();
            if inner.security_faults.contains(name) {
                return Err(PlatformError::Security(format!(
                    "prompt rejected for {name}"
                )));
            }
            inner.prompts.push(name.to_string());
            inner.auto_grant
        };

        if let Some(granted) = auto {
            self.deliver_permission(name, granted);
        }
        Ok(())
    }

    fn open(&self, name: &str) -> Result<Box<dyn DeviceConnection>, PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.security_faults.contains(name) {
            return Err(PlatformError::Security(format!("open rejected for {name}")));
        }
        if !inner.native.iter().any(|d| d.name == name) {
            return Err(PlatformError::Other(format!("no such device: {name}")));
        }
        if !inner.granted.contains(name) {
            return Err(PlatformError::PermissionDenied);
        }
        *inner.open_counts.entry(name.to_string()).or_insert(0) += 1;
        Ok(Box::new(SimConnection {
            serial: inner.serials.get(name).cloned(),
            raw: inner.raw_descriptors.get(name).cloned(),
        }))
    }
}

impl InputSubsystem for SimPlatform {
    fn device_ids(&self) -> Vec<i32> {
        self.inner.lock().unwrap().input.iter().map(|r| r.id).collect()
    }

    fn device(&self, id: i32) -> Option<InputDeviceRecord> {
        self.inner
            .lock()
            .unwrap()
            .input
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }
}

impl Platform for SimPlatform {
    fn capabilities(&self) -> PlatformCapabilities {
        self.inner
            .lock()
            .unwrap()
            .caps
            .unwrap_or(PlatformCapabilities::all())
    }

    fn usb(&self) -> &dyn UsbSubsystem {
        self
    }

    fn input(&self) -> &dyn InputSubsystem {
        self
    }

    fn subscribe(&self, events: Sender<PlatformEvent>) -> Result<(), PlatformError> {
        self.inner.lock().unwrap().events = Some(events);
        Ok(())
    }

    fn unsubscribe(&self) {
        self.inner.lock().unwrap().events = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_requires_permission() {
        let sim = SimPlatform::new()
            .with_native_device(NativeDevice::new("usb1", 1, 0x1234, 0x5678))
            .with_serial("usb1", "S1");

        assert!(matches!(
            sim.open("usb1"),
            Err(PlatformError::PermissionDenied)
        ));

        let sim = sim.with_permission("usb1");
        let conn = sim.open("usb1").unwrap();
        assert_eq!(conn.serial_number().as_deref(), Some("S1"));
        assert!(conn.raw_descriptors().is_none());
    }

    #[test]
    fn test_auto_grant_delivers_verdict() {
        let sim = SimPlatform::new()
            .with_native_device(NativeDevice::new("usb1", 1, 0x1234, 0x5678))
            .auto_grant(true);

        let (tx, rx) = async_channel::bounded(8);
        sim.subscribe(tx).unwrap();

        sim.request_permission("usb1").unwrap();
        assert!(sim.has_permission("usb1"));

        let ev = rx.try_recv().unwrap();
        assert!(matches!(
            ev,
            PlatformEvent::PermissionResult { granted: true, .. }
        ));
    }

    #[test]
    fn test_detach_revokes_grant() {
        let sim = SimPlatform::new()
            .with_native_device(NativeDevice::new("usb1", 1, 1, 1))
            .with_permission("usb1");

        sim.detach("usb1");
        assert!(sim.devices().is_empty());
        assert!(!sim.has_permission("usb1"));
    }

    #[test]
    fn test_security_fault_on_prompt() {
        let sim = SimPlatform::new()
            .with_native_device(NativeDevice::new("usb1", 1, 1, 1))
            .with_security_fault("usb1");

        assert!(matches!(
            sim.request_permission("usb1"),
            Err(PlatformError::Security(_))
        ));
    }
}
