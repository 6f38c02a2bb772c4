//! Device catalog
//!
//! Merges the USB subsystem and input subsystem device lists into one
//! deduplicated catalog, resolves device identity, and builds summary and
//! detail records on demand. Records are recomputed fresh on every call;
//! nothing is cached across queries.

use crate::platform::{
    InputDeviceRecord, NativeDevice, Platform, PlatformCapabilities, PlatformError, has_source,
    source,
};
use crate::usb::descriptor;
use common::{Error, Result};
use protocol::descriptor::USB_CLASS_HID;
use protocol::{
    DeviceDescriptorRaw, DeviceDetails, DeviceKey, DeviceSummary, InputDeviceDetails, MotionRange,
};
use std::collections::HashSet;
use tracing::debug;

/// (vendor, product) pairs already represented by native-subsystem devices
pub fn usb_vid_pids(devices: &[NativeDevice]) -> HashSet<(u16, u16)> {
    devices
        .iter()
        .map(|d| (d.vendor_id, d.product_id))
        .collect()
}

/// Whether an input-subsystem device earns its own catalog entry
///
/// The same physical HID peripheral is often visible through both
/// subsystems; the native entry wins because it carries descriptor access.
pub fn should_surface_input_device(
    rec: &InputDeviceRecord,
    known: &HashSet<(u16, u16)>,
) -> bool {
    rec.is_external
        && (has_source(rec.sources, source::KEYBOARD) || has_source(rec.sources, source::MOUSE))
        && rec.vendor_id > 0
        && rec.product_id > 0
        && !known.contains(&(rec.vendor_id as u16, rec.product_id as u16))
}

/// Human-readable labels for an input source bitmask
pub fn source_labels(sources: u32) -> Vec<String> {
    let mut out = Vec::with_capacity(4);
    if has_source(sources, source::KEYBOARD) {
        out.push("keyboard".to_string());
    }
    if has_source(sources, source::MOUSE) {
        out.push("mouse".to_string());
    }
    if has_source(sources, source::TOUCHPAD) {
        out.push("touchpad".to_string());
    }
    if has_source(sources, source::JOYSTICK) {
        out.push("joystick".to_string());
    }
    if out.is_empty() {
        out.push("unknown".to_string());
    }
    out
}

/// Input detail record with motion ranges widened to f64
pub fn input_details(rec: &InputDeviceRecord) -> InputDeviceDetails {
    InputDeviceDetails {
        id: rec.id,
        name: rec.name.clone(),
        descriptor: rec.descriptor.clone(),
        is_external: rec.is_external,
        vendor_id: rec.vendor_id.max(0) as u16,
        product_id: rec.product_id.max(0) as u16,
        sources: source_labels(rec.sources),
        keyboard_type: rec.keyboard_type,
        motion_ranges: rec
            .motion_ranges
            .iter()
            .map(|r| MotionRange {
                axis: r.axis,
                min: r.min as f64,
                max: r.max as f64,
                flat: r.flat as f64,
                fuzz: r.fuzz as f64,
                resolution: r.resolution as f64,
            })
            .collect(),
    }
}

/// The enumeration engine
pub struct DeviceCatalog {
    platform: Box<dyn Platform>,
    /// Capability set resolved once at construction
    caps: PlatformCapabilities,
}

impl DeviceCatalog {
    pub fn new(platform: Box<dyn Platform>) -> Self {
        let caps = platform.capabilities();
        Self { platform, caps }
    }

    pub fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    pub fn capabilities(&self) -> &PlatformCapabilities {
        &self.caps
    }

    /// Merged, deduplicated device list
    ///
    /// Native devices first in OS order, then surfaced input devices in OS
    /// order. Idempotent while nothing is attached or detached.
    pub fn enumerate(&self) -> Result<Vec<DeviceSummary>> {
        let native = self.platform.usb().devices();
        let known = usb_vid_pids(&native);

        let mut out = Vec::with_capacity(native.len() + 8);
        for dev in &native {
            out.push(self.native_summary(dev)?);
        }
        for rec in self.external_input_devices(&known) {
            out.push(self.input_summary(&rec));
        }
        Ok(out)
    }

    /// Find the native device currently answering to a node name
    ///
    /// `None` means the device detached since the caller last saw the key.
    pub fn lookup_native(&self, name: &str) -> Option<NativeDevice> {
        self.platform.usb().devices().into_iter().find(|d| d.name == name)
    }

    /// Full detail record for a key
    ///
    /// An absent device yields a placeholder record rather than an error.
    pub fn details(&self, key: &DeviceKey) -> Result<DeviceDetails> {
        match key {
            DeviceKey::Input(id) => {
                let Some(rec) = self.platform.input().device(*id) else {
                    return Ok(DeviceDetails::unavailable(key.clone()));
                };
                Ok(DeviceDetails {
                    summary: self.input_summary(&rec),
                    interfaces: Vec::new(),
                    configurations: Vec::new(),
                    device_descriptor: None,
                    input: Some(input_details(&rec)),
                })
            }
            DeviceKey::Native(name) => {
                let Some(dev) = self.lookup_native(name) else {
                    return Ok(DeviceDetails::unavailable(key.clone()));
                };

                // One scoped read serves both the summary's version field
                // and the detail record.
                let device_descriptor = self.read_descriptor(&dev)?;
                let summary = self.native_summary_with(&dev, device_descriptor.as_ref())?;

                Ok(DeviceDetails {
                    summary,
                    interfaces: descriptor::device_interfaces(&dev),
                    configurations: descriptor::configuration_list(&dev),
                    device_descriptor,
                    input: None,
                })
            }
        }
    }

    fn external_input_devices(&self, known: &HashSet<(u16, u16)>) -> Vec<InputDeviceRecord> {
        if !self.caps.input_is_external {
            // Without the externality flag nothing can be told apart from
            // built-in input hardware; surface nothing.
            return Vec::new();
        }

        let input = self.platform.input();
        input
            .device_ids()
            .into_iter()
            .filter_map(|id| input.device(id))
            .filter(|rec| should_surface_input_device(rec, known))
            .collect()
    }

    fn native_summary(&self, dev: &NativeDevice) -> Result<DeviceSummary> {
        let descriptor = self.read_descriptor(dev)?;
        self.native_summary_with(dev, descriptor.as_ref())
    }

    fn native_summary_with(
        &self,
        dev: &NativeDevice,
        descriptor: Option<&DeviceDescriptorRaw>,
    ) -> Result<DeviceSummary> {
        let usb = self.platform.usb();
        let has_permission = usb.has_permission(&dev.name);

        // Sensitive strings stay absent without permission, even when the
        // OS exposes them opportunistically.
        let (manufacturer_name, product_name, serial_number) = if has_permission {
            (
                dev.manufacturer.clone(),
                dev.product.clone(),
                self.read_serial(dev)?,
            )
        } else {
            (None, None, None)
        };

        // Decoded bcdUSB preferred, OS version string fallback
        let usb_version = descriptor.map(|d| d.usb_version.clone()).or_else(|| {
            if self.caps.device_version {
                dev.version.clone()
            } else {
                None
            }
        });
        let speed = if self.caps.speed {
            dev.speed.map(|s| s.label().to_string())
        } else {
            None
        };
        let port_number = if self.caps.port_number {
            dev.port_number
        } else {
            None
        };
        let max_power_ma = dev.configurations.first().map(|c| c.max_power_ma);

        Ok(DeviceSummary {
            device_key: DeviceKey::native(&dev.name),
            device_id: dev.device_id,
            port_number,
            vendor_id: dev.vendor_id,
            product_id: dev.product_id,
            device_class: dev.class,
            device_subclass: dev.subclass,
            device_protocol: dev.protocol,
            interface_count: dev.interfaces.len() as u32,
            configuration_count: dev.configurations.len() as u32,
            has_permission,
            manufacturer_name,
            product_name,
            serial_number,
            usb_version,
            speed,
            max_power_ma,
            is_input_device: false,
            input_sources: None,
        })
    }

    fn input_summary(&self, rec: &InputDeviceRecord) -> DeviceSummary {
        DeviceSummary {
            device_key: DeviceKey::input(rec.id),
            device_id: rec.id.max(0) as u32,
            port_number: None,
            vendor_id: rec.vendor_id.max(0) as u16,
            product_id: rec.product_id.max(0) as u16,
            device_class: USB_CLASS_HID,
            device_subclass: 0,
            device_protocol: 0,
            interface_count: 0,
            configuration_count: 0,
            // The input subsystem has no permission gate.
            has_permission: true,
            manufacturer_name: None,
            product_name: rec
                .name
                .clone()
                .or_else(|| Some("Input device".to_string())),
            serial_number: None,
            usb_version: None,
            speed: None,
            max_power_ma: None,
            is_input_device: true,
            input_sources: Some(source_labels(rec.sources)),
        }
    }

    /// Serial number through a scoped connection, closed immediately
    fn read_serial(&self, dev: &NativeDevice) -> Result<Option<String>> {
        match self.platform.usb().open(&dev.name) {
            Ok(conn) => Ok(conn.serial_number()),
            Err(PlatformError::Security(msg)) => Err(Error::Security(msg)),
            Err(e) => {
                debug!(device = %dev.name, "serial unavailable: {e}");
                Ok(None)
            }
        }
    }

    /// Raw device descriptor; only a security fault propagates
    fn read_descriptor(&self, dev: &NativeDevice) -> Result<Option<DeviceDescriptorRaw>> {
        match descriptor::read_device_descriptor(self.platform.usb(), &self.caps, dev) {
            Ok(desc) => Ok(desc),
            Err(PlatformError::Security(msg)) => Err(Error::Security(msg)),
            Err(e) => {
                debug!(device = %dev.name, "descriptor unavailable: {e}");
                Ok(None)
            }
        }
    }
}
