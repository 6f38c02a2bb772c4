//! Common utilities for the usbdevinfo bridge
//!
//! Shared pieces between the service binary and the device worker: the
//! error type, logging setup, and the async channel bridge that carries
//! method commands to the catalog owner thread and push events back.

pub mod channel;
pub mod error;
pub mod logging;

pub use channel::{BridgeCommand, BridgeHandle, WorkerHandle, create_bridge};
pub use error::{Error, Result};
pub use logging::setup_logging;
