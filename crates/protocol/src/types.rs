//! Device and descriptor record definitions
//!
//! These records are the JSON payloads delivered to the front-end. Field
//! names serialize in camelCase to match the channel contract.

use crate::error::ProtocolError;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Opaque device identity
///
/// Two disjoint namespaces: `native:<os-name>` for devices enumerated by
/// the USB subsystem and `input:<id>` for peripherals surfaced only through
/// the input subsystem. Keys are stable for the lifetime of a physical
/// attachment and reassigned on re-attach.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceKey {
    /// USB-subsystem device, identified by its OS-assigned node name
    Native(String),
    /// Input-subsystem device, identified by its numeric id
    Input(i32),
}

impl DeviceKey {
    pub fn native(name: impl Into<String>) -> Self {
        DeviceKey::Native(name.into())
    }

    pub fn input(id: i32) -> Self {
        DeviceKey::Input(id)
    }

    pub fn is_input(&self) -> bool {
        matches!(self, DeviceKey::Input(_))
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKey::Native(name) => write!(f, "native:{name}"),
            DeviceKey::Input(id) => write!(f, "input:{id}"),
        }
    }
}

impl FromStr for DeviceKey {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(name) = s.strip_prefix("native:") {
            if name.is_empty() {
                return Err(ProtocolError::InvalidKey(s.to_string()));
            }
            return Ok(DeviceKey::Native(name.to_string()));
        }
        if let Some(id) = s.strip_prefix("input:") {
            return id
                .parse()
                .map(DeviceKey::Input)
                .map_err(|_| ProtocolError::InvalidKey(s.to_string()));
        }
        Err(ProtocolError::InvalidKey(s.to_string()))
    }
}

impl Serialize for DeviceKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Flat per-device record returned by `listDevices`
///
/// The manufacturer/product/serial strings are populated only when
/// `has_permission` is true; they stay absent otherwise even when the OS
/// exposes them opportunistically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    pub device_key: DeviceKey,
    pub device_id: u32,
    pub port_number: Option<u32>,
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_class: u8,
    pub device_subclass: u8,
    pub device_protocol: u8,
    pub interface_count: u32,
    pub configuration_count: u32,
    pub has_permission: bool,
    pub manufacturer_name: Option<String>,
    pub product_name: Option<String>,
    pub serial_number: Option<String>,
    pub usb_version: Option<String>,
    pub speed: Option<String>,
    pub max_power_ma: Option<u16>,
    pub is_input_device: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_sources: Option<Vec<String>>,
}

impl DeviceSummary {
    /// Placeholder summary for a key with no attached device
    ///
    /// Input keys keep `has_permission = true` (the input subsystem has no
    /// permission gate) and report the HID class like live entries do.
    pub fn unavailable(key: DeviceKey) -> Self {
        let is_input = key.is_input();
        Self {
            device_key: key,
            device_id: 0,
            port_number: None,
            vendor_id: 0,
            product_id: 0,
            device_class: if is_input {
                crate::descriptor::USB_CLASS_HID
            } else {
                0
            },
            device_subclass: 0,
            device_protocol: 0,
            interface_count: 0,
            configuration_count: 0,
            has_permission: is_input,
            manufacturer_name: None,
            product_name: None,
            serial_number: None,
            usb_version: None,
            speed: None,
            max_power_ma: None,
            is_input_device: is_input,
            input_sources: None,
        }
    }
}

/// Endpoint direction label decoded from the address byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointDirection {
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "OUT")]
    Out,
    Unknown,
}

/// Endpoint transfer type decoded from the attributes byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointInfo {
    pub address: u8,
    pub direction: EndpointDirection,
    #[serde(rename = "type")]
    pub kind: TransferKind,
    pub max_packet_size: u16,
    pub interval: u8,
    pub attributes: u8,
    pub number: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceInfo {
    pub id: u8,
    pub alternate_setting: u8,
    pub name: Option<String>,
    pub interface_class: u8,
    pub interface_subclass: u8,
    pub interface_protocol: u8,
    pub endpoint_count: u32,
    pub endpoints: Vec<EndpointInfo>,
}

/// Configuration-scoped descriptor record
///
/// Carries its own interface list, distinct from the device-level list
/// which reflects only the active configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationInfo {
    pub id: u8,
    pub name: Option<String>,
    pub attributes: u8,
    pub max_power_ma: u16,
    pub interface_count: u32,
    pub interfaces: Vec<InterfaceInfo>,
}

/// Fields decoded from the first 18 bytes of the standard device descriptor
///
/// The three `i*` fields are string-descriptor indices, not resolved
/// strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptorRaw {
    pub bcd_usb: u16,
    pub usb_version: String,
    pub bcd_device: u16,
    pub device_release: String,
    pub max_packet_size0: u8,
    pub num_configurations: u8,
    pub i_manufacturer: u8,
    pub i_product: u8,
    pub i_serial_number: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionRange {
    pub axis: i32,
    pub min: f64,
    pub max: f64,
    pub flat: f64,
    pub fuzz: f64,
    pub resolution: f64,
}

/// Detail record for an input-subsystem device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDeviceDetails {
    pub id: i32,
    pub name: Option<String>,
    pub descriptor: Option<String>,
    pub is_external: bool,
    pub vendor_id: u16,
    pub product_id: u16,
    pub sources: Vec<String>,
    pub keyboard_type: i32,
    pub motion_ranges: Vec<MotionRange>,
}

/// Full detail record returned by `getDeviceDetails`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDetails {
    pub summary: DeviceSummary,
    pub interfaces: Vec<InterfaceInfo>,
    pub configurations: Vec<ConfigurationInfo>,
    pub device_descriptor: Option<DeviceDescriptorRaw>,
    pub input: Option<InputDeviceDetails>,
}

impl DeviceDetails {
    /// Detail record for a key whose device is not currently attached
    pub fn unavailable(key: DeviceKey) -> Self {
        Self {
            summary: DeviceSummary::unavailable(key),
            interfaces: Vec::new(),
            configurations: Vec::new(),
            device_descriptor: None,
            input: None,
        }
    }
}

/// Result of a permission request
///
/// `TimedOut` is distinct from `Denied`: the OS never delivered a verdict
/// before the caller's deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOutcome {
    Granted,
    Denied,
    TimedOut,
}

impl PermissionOutcome {
    pub fn is_granted(self) -> bool {
        matches!(self, PermissionOutcome::Granted)
    }
}

/// Why a `devices_changed` event was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    Attached,
    Detached,
    PermissionResult,
    InputAdded,
    InputRemoved,
    InputChanged,
    IntentAttached,
    IntentDetached,
}
