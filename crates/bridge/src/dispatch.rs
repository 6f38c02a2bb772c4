//! Method-call dispatch
//!
//! Maps incoming [`MethodCall`]s onto worker commands and shapes the
//! replies. Security faults are the only failures that surface with their
//! own error code; everything else a method can recover from has already
//! been degraded to absent fields by the catalog.

use common::{BridgeCommand, BridgeHandle, Error};
use protocol::{CallErrorCode, DeviceKey, MethodCall, MethodReply};
use serde_json::json;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// Default deadline applied when the caller sends none
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOptions {
    pub permission_timeout: Option<Duration>,
}

/// Handle one method call to completion
pub async fn dispatch(
    bridge: &BridgeHandle,
    options: DispatchOptions,
    call: MethodCall,
) -> MethodReply {
    let id = call.id;
    debug!(id, method = %call.method, "dispatching call");

    match call.method.as_str() {
        "listDevices" => list_devices(bridge, id).await,
        "requestPermission" => request_permission(bridge, options, call).await,
        "getDeviceDetails" => get_device_details(bridge, call).await,
        _ => MethodReply::error(id, CallErrorCode::NotImplemented, None),
    }
}

async fn list_devices(bridge: &BridgeHandle, id: u64) -> MethodReply {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = bridge
        .send_command(BridgeCommand::ListDevices { response: tx })
        .await
    {
        return failure(id, e);
    }

    match rx.await {
        Ok(Ok(devices)) => to_ok(id, &devices),
        Ok(Err(e)) => failure(id, e),
        Err(_) => worker_gone(id),
    }
}

async fn request_permission(
    bridge: &BridgeHandle,
    options: DispatchOptions,
    call: MethodCall,
) -> MethodReply {
    let id = call.id;
    let key = match device_key_arg(&call) {
        Ok(key) => key,
        Err(reply) => return reply,
    };

    let timeout = call
        .u64_arg("timeoutMs")
        .map(Duration::from_millis)
        .or(options.permission_timeout);

    let (tx, rx) = oneshot::channel();
    if let Err(e) = bridge
        .send_command(BridgeCommand::RequestPermission {
            key,
            timeout,
            response: tx,
        })
        .await
    {
        return failure(id, e);
    }

    match rx.await {
        Ok(Ok(outcome)) => MethodReply::ok(
            id,
            json!({ "granted": outcome.is_granted(), "outcome": outcome }),
        ),
        Ok(Err(e)) => failure(id, e),
        Err(_) => worker_gone(id),
    }
}

async fn get_device_details(bridge: &BridgeHandle, call: MethodCall) -> MethodReply {
    let id = call.id;
    let key = match device_key_arg(&call) {
        Ok(key) => key,
        Err(reply) => return reply,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = bridge
        .send_command(BridgeCommand::GetDeviceDetails { key, response: tx })
        .await
    {
        return failure(id, e);
    }

    match rx.await {
        Ok(Ok(details)) => to_ok(id, &details),
        Ok(Err(e)) => failure(id, e),
        Err(_) => worker_gone(id),
    }
}

fn device_key_arg(call: &MethodCall) -> Result<DeviceKey, MethodReply> {
    let raw = call.string_arg("deviceKey").map_err(|e| {
        MethodReply::error(call.id, CallErrorCode::Internal, Some(e.to_string()))
    })?;
    raw.parse().map_err(|e: protocol::ProtocolError| {
        MethodReply::error(call.id, CallErrorCode::Internal, Some(e.to_string()))
    })
}

fn to_ok<T: serde::Serialize>(id: u64, payload: &T) -> MethodReply {
    match serde_json::to_value(payload) {
        Ok(value) => MethodReply::ok(id, value),
        Err(e) => MethodReply::error(id, CallErrorCode::Internal, Some(e.to_string())),
    }
}

fn failure(id: u64, err: Error) -> MethodReply {
    match err {
        Error::Security(msg) => {
            MethodReply::error(id, CallErrorCode::SecurityException, Some(msg))
        }
        other => MethodReply::error(id, CallErrorCode::Internal, Some(other.to_string())),
    }
}

fn worker_gone(id: u64) -> MethodReply {
    MethodReply::error(
        id,
        CallErrorCode::Internal,
        Some("device worker stopped before replying".to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(method: &str, args: serde_json::Value) -> MethodCall {
        serde_json::from_value(json!({"id": 1, "method": method, "args": args})).unwrap()
    }

    #[test]
    fn test_device_key_arg() {
        let ok = call("getDeviceDetails", json!({"deviceKey": "input:4"}));
        assert_eq!(device_key_arg(&ok).unwrap(), DeviceKey::input(4));

        let missing = call("getDeviceDetails", json!({}));
        assert!(device_key_arg(&missing).is_err());

        let malformed = call("getDeviceDetails", json!({"deviceKey": "bogus"}));
        assert!(device_key_arg(&malformed).is_err());
    }

    #[test]
    fn test_failure_maps_security_faults() {
        let reply = failure(9, Error::Security("bad caller".into()));
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({
                "id": 9,
                "error": {"code": "security_exception", "message": "bad caller"}
            })
        );

        let reply = failure(9, Error::Platform("flaky".into()));
        assert_eq!(
            serde_json::to_value(&reply).unwrap()["error"]["code"],
            json!("error")
        );
    }
}
