//! Device worker thread
//!
//! Single owner thread for all catalog and permission state. Commands from
//! the tokio runtime and platform notifications are both marshalled onto
//! this thread; nothing else touches the catalog, so no locking is needed.

use crate::platform::{Platform, PlatformEvent};
use crate::usb::catalog::DeviceCatalog;
use crate::usb::permission::PermissionCoordinator;
use common::{BridgeCommand, Error, WorkerHandle};
use protocol::{BridgeEvent, ChangeReason, DeviceKey, PermissionOutcome};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Poll interval for the owner loop
const TICK: Duration = Duration::from_millis(20);

/// Device worker thread
///
/// Owns the platform handle, the device catalog, and the permission
/// coordinator. Processes commands and platform events until a Shutdown
/// command arrives.
pub struct BridgeWorkerThread {
    catalog: DeviceCatalog,
    permissions: PermissionCoordinator,
    worker: WorkerHandle,
    platform_rx: async_channel::Receiver<PlatformEvent>,
}

impl BridgeWorkerThread {
    /// Create the worker and subscribe to platform notifications
    pub fn new(worker: WorkerHandle, platform: Box<dyn Platform>) -> common::Result<Self> {
        let (platform_tx, platform_rx) = async_channel::bounded(64);
        platform
            .subscribe(platform_tx)
            .map_err(|e| Error::Platform(e.to_string()))?;

        Ok(Self {
            catalog: DeviceCatalog::new(platform),
            permissions: PermissionCoordinator::new(),
            worker,
            platform_rx,
        })
    }

    /// Run the owner loop
    ///
    /// Each tick: drain commands, drain platform events, sweep waiter
    /// deadlines. The loop exits on Shutdown and tears the platform
    /// subscription down.
    pub fn run(mut self) -> common::Result<()> {
        info!("device worker thread started");

        'outer: loop {
            while let Some(cmd) = self.worker.try_recv_command() {
                if matches!(cmd, BridgeCommand::Shutdown) {
                    info!("device worker shutting down");
                    break 'outer;
                }
                self.handle_command(cmd);
            }

            while let Ok(event) = self.platform_rx.try_recv() {
                self.handle_platform_event(event);
            }

            let expired = self.permissions.expire(Instant::now());
            if expired > 0 {
                debug!(expired, "permission waiters timed out");
            }

            std::thread::sleep(TICK);
        }

        self.catalog.platform().unsubscribe();
        info!("device worker thread stopped");
        Ok(())
    }

    fn handle_command(&mut self, cmd: BridgeCommand) {
        // Keep a panicking handler from taking the whole thread down.
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.handle_command_inner(cmd)
        }));

        if let Err(e) = result {
            error!("panic in command handler: {:?}", e);
        }
    }

    fn handle_command_inner(&mut self, cmd: BridgeCommand) {
        match cmd {
            BridgeCommand::ListDevices { response } => {
                let devices = self.catalog.enumerate();
                if let Ok(list) = &devices {
                    debug!("listing {} devices", list.len());
                }
                let _ = response.send(devices);
            }

            BridgeCommand::GetDeviceDetails { key, response } => {
                debug!(%key, "building device details");
                let _ = response.send(self.catalog.details(&key));
            }

            BridgeCommand::RequestPermission {
                key,
                timeout,
                response,
            } => self.handle_permission_request(key, timeout, response),

            BridgeCommand::Shutdown => {
                // Handled in the main loop
                unreachable!()
            }
        }
    }

    fn handle_permission_request(
        &mut self,
        key: DeviceKey,
        timeout: Option<Duration>,
        response: tokio::sync::oneshot::Sender<common::Result<PermissionOutcome>>,
    ) {
        let name = match key {
            // The input subsystem has no permission gate.
            DeviceKey::Input(_) => {
                let _ = response.send(Ok(PermissionOutcome::Granted));
                return;
            }
            DeviceKey::Native(name) => name,
        };

        if self.catalog.lookup_native(&name).is_none() {
            // Detached since the caller last enumerated.
            let _ = response.send(Ok(PermissionOutcome::Denied));
            return;
        }

        let usb = self.catalog.platform().usb();
        if usb.has_permission(&name) {
            let _ = response.send(Ok(PermissionOutcome::Granted));
            return;
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        let first = self.permissions.register(&name, response, deadline);
        if !first {
            debug!(device = %name, "joining outstanding permission prompt");
            return;
        }

        if let Err(e) = usb.request_permission(&name) {
            warn!(device = %name, "permission prompt failed: {e}");
            let message = e.to_string();
            let failed = match e {
                crate::platform::PlatformError::Security(_) => self
                    .permissions
                    .fail(&name, || Error::Security(message.clone())),
                _ => self
                    .permissions
                    .fail(&name, || Error::Platform(message.clone())),
            };
            debug!(device = %name, failed, "permission waiters failed");
        }
    }

    fn handle_platform_event(&mut self, event: PlatformEvent) {
        match event {
            PlatformEvent::UsbAttached { name } => {
                self.emit_changed(ChangeReason::Attached, name.map(DeviceKey::native));
            }
            PlatformEvent::UsbDetached { name } => {
                self.emit_changed(ChangeReason::Detached, name.map(DeviceKey::native));
            }
            PlatformEvent::IntentAttached { name } => {
                self.emit_changed(ChangeReason::IntentAttached, name.map(DeviceKey::native));
            }
            PlatformEvent::IntentDetached { name } => {
                self.emit_changed(ChangeReason::IntentDetached, name.map(DeviceKey::native));
            }
            PlatformEvent::InputAdded { id } => {
                self.emit_changed(ChangeReason::InputAdded, Some(DeviceKey::input(id)));
            }
            PlatformEvent::InputRemoved { id } => {
                self.emit_changed(ChangeReason::InputRemoved, Some(DeviceKey::input(id)));
            }
            PlatformEvent::InputChanged { id } => {
                self.emit_changed(ChangeReason::InputChanged, Some(DeviceKey::input(id)));
            }
            PlatformEvent::PermissionResult { name, granted } => {
                let resolved = self.permissions.resolve(&name, granted);
                debug!(device = %name, granted, resolved, "permission verdict");

                let key = DeviceKey::native(name);
                self.send_event(BridgeEvent::PermissionResult {
                    device_key: Some(key.clone()),
                    granted,
                });
                // The verdict changes which summary fields are populated,
                // so the front-end has to re-enumerate.
                self.emit_changed(ChangeReason::PermissionResult, Some(key));
            }
        }
    }

    fn emit_changed(&self, reason: ChangeReason, device_key: Option<DeviceKey>) {
        self.send_event(BridgeEvent::DevicesChanged { reason, device_key });
    }

    fn send_event(&self, event: BridgeEvent) {
        if let Err(e) = self.worker.send_event(event) {
            warn!("failed to push event: {e}");
        }
    }
}

/// Spawn the device worker thread
pub fn spawn_bridge_worker(
    worker: WorkerHandle,
    platform: Box<dyn Platform>,
) -> std::thread::JoinHandle<common::Result<()>> {
    std::thread::Builder::new()
        .name("device-worker".to_string())
        .spawn(move || {
            let thread = BridgeWorkerThread::new(worker, platform)?;
            thread.run()
        })
        .expect("Failed to spawn device worker thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::sim::SimPlatform;
    use common::create_bridge;

    #[test]
    fn test_worker_creation_subscribes() {
        let (_bridge, worker) = create_bridge();
        let sim = SimPlatform::new();

        let thread = BridgeWorkerThread::new(worker, Box::new(sim.clone())).unwrap();

        // A subscribed platform delivers events into the worker's queue.
        sim.attach(crate::platform::NativeDevice::new("usb1", 1, 1, 1));
        assert!(thread.platform_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_stops_thread() {
        let (bridge, worker) = create_bridge();
        let handle = spawn_bridge_worker(worker, Box::new(SimPlatform::new()));

        bridge.send_command(BridgeCommand::Shutdown).await.unwrap();
        handle.join().unwrap().unwrap();
    }
}
