//! Async channel bridge between the tokio runtime and the device worker
//! thread
//!
//! All catalog and permission state lives on one owner thread; the runtime
//! side talks to it exclusively through these channels, each command
//! carrying a oneshot for its reply.

use async_channel::{Receiver, Sender, bounded};
use protocol::{BridgeEvent, DeviceDetails, DeviceKey, DeviceSummary, PermissionOutcome};
use std::time::Duration;

/// Commands from the tokio runtime to the device worker thread
#[derive(Debug)]
pub enum BridgeCommand {
    /// Enumerate the merged device catalog
    ListDevices {
        response: tokio::sync::oneshot::Sender<crate::Result<Vec<DeviceSummary>>>,
    },

    /// Request permission for a device
    ///
    /// The reply may resolve synchronously (input keys, detached devices,
    /// already-granted devices) or when the OS delivers its verdict. With a
    /// timeout, an undelivered verdict resolves `TimedOut`.
    RequestPermission {
        key: DeviceKey,
        timeout: Option<Duration>,
        response: tokio::sync::oneshot::Sender<crate::Result<PermissionOutcome>>,
    },

    /// Build the full detail record for a device
    GetDeviceDetails {
        key: DeviceKey,
        response: tokio::sync::oneshot::Sender<crate::Result<DeviceDetails>>,
    },

    /// Shutdown the worker thread gracefully
    Shutdown,
}

/// Handle for the tokio runtime (async)
#[derive(Clone)]
pub struct BridgeHandle {
    cmd_tx: Sender<BridgeCommand>,
    event_rx: Receiver<BridgeEvent>,
}

impl BridgeHandle {
    /// Send a command to the worker thread
    pub async fn send_command(&self, cmd: BridgeCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive a push event from the worker thread
    pub async fn recv_event(&self) -> crate::Result<BridgeEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Handle for the worker thread (blocking)
pub struct WorkerHandle {
    pub(crate) cmd_rx: Receiver<BridgeCommand>,
    /// Event sender (public for the worker thread to clone)
    pub event_tx: Sender<BridgeEvent>,
}

impl WorkerHandle {
    /// Try to receive a command without blocking
    pub fn try_recv_command(&self) -> Option<BridgeCommand> {
        self.cmd_rx.try_recv().ok()
    }

    /// Receive a command, blocking until one arrives
    pub fn recv_command(&self) -> crate::Result<BridgeCommand> {
        self.cmd_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Send a push event to the tokio runtime (blocking)
    pub fn send_event(&self, event: BridgeEvent) -> crate::Result<()> {
        self.event_tx
            .send_blocking(event)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Create the channel bridge between the tokio runtime and the worker
///
/// Returns (BridgeHandle for tokio, WorkerHandle for the device thread).
pub fn create_bridge() -> (BridgeHandle, WorkerHandle) {
    let (cmd_tx, cmd_rx) = bounded(256);
    let (event_tx, event_rx) = bounded(256);

    (
        BridgeHandle { cmd_tx, event_rx },
        WorkerHandle { cmd_rx, event_tx },
    )
}
