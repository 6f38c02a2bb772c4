//! Platform abstraction for the OS device subsystems
//!
//! The USB subsystem and the input subsystem are external collaborators.
//! These traits model exactly what the catalog consumes from them: raw
//! device records, permission state, short-lived connections for privileged
//! reads, and asynchronous change notifications. Optional accessors that
//! vary across platform revisions are negotiated once at startup through
//! [`PlatformCapabilities`] instead of being probed per call.

pub mod sim;

use thiserror::Error;

/// Errors surfaced by platform subsystem calls
///
/// `PermissionDenied` and `Unsupported` degrade the affected field to
/// absent; `Security` is the one condition that propagates to the caller
/// as a call-level error.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("not supported on this platform revision")]
    Unsupported,

    #[error("security fault: {0}")]
    Security(String),

    #[error("{0}")]
    Other(String),
}

/// Optional accessors available on this platform revision, resolved once
#[derive(Debug, Clone, Copy)]
pub struct PlatformCapabilities {
    /// Device speed query
    pub speed: bool,
    /// Physical port number query
    pub port_number: bool,
    /// Raw device-descriptor bytes via an open connection
    pub raw_descriptors: bool,
    /// OS-formatted USB version string (fallback when raw bytes are
    /// unavailable)
    pub device_version: bool,
    /// Externality flag on input devices
    pub input_is_external: bool,
}

impl PlatformCapabilities {
    /// Every optional accessor present
    pub const fn all() -> Self {
        Self {
            speed: true,
            port_number: true,
            raw_descriptors: true,
            device_version: true,
            input_is_external: true,
        }
    }
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        Self::all()
    }
}

/// USB device speed as reported by the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSpeed {
    Low,
    Full,
    High,
    Super,
    SuperPlus,
}

impl DeviceSpeed {
    /// Human-readable label used in device summaries
    pub fn label(self) -> &'static str {
        match self {
            DeviceSpeed::Low => "Low speed (1.5 Mbps)",
            DeviceSpeed::Full => "Full speed (12 Mbps)",
            DeviceSpeed::High => "High speed (480 Mbps)",
            DeviceSpeed::Super => "SuperSpeed (5 Gbps)",
            DeviceSpeed::SuperPlus => "SuperSpeed+ (10+ Gbps)",
        }
    }
}

/// Raw endpoint descriptor fields as the OS hands them out
#[derive(Debug, Clone, PartialEq)]
pub struct RawEndpoint {
    pub address: u8,
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawInterface {
    pub id: u8,
    pub alternate_setting: u8,
    pub name: Option<String>,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub endpoints: Vec<RawEndpoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawConfiguration {
    pub id: u8,
    pub name: Option<String>,
    pub attributes: u8,
    pub max_power_ma: u16,
    pub interfaces: Vec<RawInterface>,
}

/// A device enumerated by the OS USB subsystem
///
/// `interfaces` is the device-level list for the currently active
/// configuration; `configurations` carries the full per-configuration
/// trees.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeDevice {
    /// OS-assigned node name, e.g. `/dev/bus/usb/001/002`
    pub name: String,
    pub device_id: u32,
    pub vendor_id: u16,
    pub product_id: u16,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub speed: Option<DeviceSpeed>,
    pub port_number: Option<u32>,
    /// OS-formatted version string, fallback when raw descriptor bytes are
    /// not readable
    pub version: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub interfaces: Vec<RawInterface>,
    pub configurations: Vec<RawConfiguration>,
}

impl NativeDevice {
    pub fn new(name: impl Into<String>, device_id: u32, vendor_id: u16, product_id: u16) -> Self {
        Self {
            name: name.into(),
            device_id,
            vendor_id,
            product_id,
            class: 0,
            subclass: 0,
            protocol: 0,
            speed: None,
            port_number: None,
            version: None,
            manufacturer: None,
            product: None,
            interfaces: Vec::new(),
            configurations: Vec::new(),
        }
    }
}

/// Input-device source bitmask values
pub mod source {
    pub const KEYBOARD: u32 = 0x0000_0101;
    pub const MOUSE: u32 = 0x0000_2002;
    pub const TOUCHPAD: u32 = 0x0010_0008;
    pub const JOYSTICK: u32 = 0x0100_0010;
}

/// True when every bit of `bits` is set in `mask`
pub fn has_source(mask: u32, bits: u32) -> bool {
    mask & bits == bits
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawMotionRange {
    pub axis: i32,
    pub min: f32,
    pub max: f32,
    pub flat: f32,
    pub fuzz: f32,
    pub resolution: f32,
}

/// A device enumerated by the OS input subsystem
#[derive(Debug, Clone, PartialEq)]
pub struct InputDeviceRecord {
    pub id: i32,
    pub name: Option<String>,
    /// Stable descriptor string assigned by the input subsystem
    pub descriptor: Option<String>,
    pub is_external: bool,
    pub vendor_id: i32,
    pub product_id: i32,
    pub sources: u32,
    pub keyboard_type: i32,
    pub motion_ranges: Vec<RawMotionRange>,
}

impl InputDeviceRecord {
    pub fn new(id: i32, vendor_id: i32, product_id: i32) -> Self {
        Self {
            id,
            name: None,
            descriptor: None,
            is_external: false,
            vendor_id,
            product_id,
            sources: 0,
            keyboard_type: 0,
            motion_ranges: Vec::new(),
        }
    }
}

/// Asynchronous notifications delivered by the platform
///
/// All variants are marshalled onto the device worker thread before any
/// shared state is touched.
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    UsbAttached { name: Option<String> },
    UsbDetached { name: Option<String> },
    /// Verdict for a previously issued permission prompt
    PermissionResult { name: String, granted: bool },
    /// Attach observed directly by the host activity intent
    IntentAttached { name: Option<String> },
    /// Detach observed directly by the host activity intent
    IntentDetached { name: Option<String> },
    InputAdded { id: i32 },
    InputRemoved { id: i32 },
    InputChanged { id: i32 },
}

/// Short-lived connection to a native device for privileged reads
///
/// Closed on drop; callers open, read, and release immediately rather than
/// holding a connection.
pub trait DeviceConnection {
    fn serial_number(&self) -> Option<String>;
    fn raw_descriptors(&self) -> Option<Vec<u8>>;
}

/// The OS USB subsystem
pub trait UsbSubsystem {
    /// Current native devices in OS enumeration order
    fn devices(&self) -> Vec<NativeDevice>;

    fn has_permission(&self, name: &str) -> bool;

    /// Issue the OS permission prompt for a device
    ///
    /// The verdict arrives later as [`PlatformEvent::PermissionResult`].
    fn request_permission(&self, name: &str) -> Result<(), PlatformError>;

    fn open(&self, name: &str) -> Result<Box<dyn DeviceConnection>, PlatformError>;
}

/// The OS input subsystem
pub trait InputSubsystem {
    /// Current input device ids in OS enumeration order
    fn device_ids(&self) -> Vec<i32>;

    fn device(&self, id: i32) -> Option<InputDeviceRecord>;
}

/// Aggregate platform handle owned by the device worker thread
pub trait Platform: Send {
    fn capabilities(&self) -> PlatformCapabilities;

    fn usb(&self) -> &dyn UsbSubsystem;

    fn input(&self) -> &dyn InputSubsystem;

    /// Register the event sink; called once on worker start
    fn subscribe(&self, events: async_channel::Sender<PlatformEvent>) -> Result<(), PlatformError>;

    /// Tear the subscription down; called once on worker stop
    fn unsubscribe(&self);
}
