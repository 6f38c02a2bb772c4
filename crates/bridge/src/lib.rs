//! usbdevinfo bridge service
//!
//! Enumerates USB and input-subsystem devices through a platform
//! abstraction, normalizes them into one deduplicated catalog, decodes
//! descriptor trees, and coordinates asynchronous permission grants. The
//! front-end talks to the service over a line-delimited JSON method/event
//! protocol.

pub mod config;
pub mod dispatch;
pub mod platform;
pub mod usb;
