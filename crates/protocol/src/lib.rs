//! Payload types for the usbdevinfo bridge
//!
//! This crate defines every record that crosses the message bridge between
//! the device service and the application front-end: device summaries,
//! descriptor trees, method-call envelopes, and push events. It also holds
//! the pure byte-level decoding of USB device descriptors.
//!
//! # Example
//!
//! ```
//! use protocol::descriptor::bcd_version_string;
//!
//! assert_eq!(bcd_version_string(0x0310), "3.10");
//! ```

pub mod descriptor;
pub mod error;
pub mod messages;
pub mod types;

pub use descriptor::{bcd_version_string, parse_device_descriptor, read_le16};
pub use error::{ProtocolError, Result};
pub use messages::{BridgeEvent, CallErrorCode, CallResult, MethodCall, MethodReply};
pub use types::{
    ChangeReason, ConfigurationInfo, DeviceDescriptorRaw, DeviceDetails, DeviceKey, DeviceSummary,
    EndpointDirection, EndpointInfo, InputDeviceDetails, InterfaceInfo, MotionRange,
    PermissionOutcome, TransferKind,
};
