//! Device catalog, descriptor decoding, and permission coordination

pub mod catalog;
pub mod descriptor;
pub mod permission;
pub mod worker;

pub use catalog::DeviceCatalog;
pub use permission::PermissionCoordinator;
pub use worker::{BridgeWorkerThread, spawn_bridge_worker};
