//! Method-call envelopes and push events
//!
//! The bridge speaks a line-delimited JSON protocol: the front-end sends
//! [`MethodCall`] requests and receives [`MethodReply`] responses plus
//! unsolicited [`BridgeEvent`] pushes on the same stream.

use crate::error::ProtocolError;
use crate::types::{ChangeReason, DeviceKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Incoming method call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    /// Caller-assigned id echoed in the reply
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub args: serde_json::Map<String, Value>,
}

impl MethodCall {
    /// Required string argument
    pub fn string_arg(&self, name: &'static str) -> Result<&str, ProtocolError> {
        self.args
            .get(name)
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingArgument(name))
    }

    /// Optional unsigned integer argument
    pub fn u64_arg(&self, name: &str) -> Option<u64> {
        self.args.get(name).and_then(Value::as_u64)
    }
}

/// Call-level error classification
///
/// Everything that is not a whole-call failure is degraded to absent fields
/// inside the payload instead of surfacing here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallErrorCode {
    /// Unknown method name
    NotImplemented,
    /// Unexpected access-control failure outside the normal permission path
    SecurityException,
    /// Any other unexpected failure
    #[serde(rename = "error")]
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallResult {
    Ok(Value),
    Error {
        code: CallErrorCode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

/// Reply to a [`MethodCall`], matched by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodReply {
    pub id: u64,
    #[serde(flatten)]
    pub result: CallResult,
}

impl MethodReply {
    pub fn ok(id: u64, value: Value) -> Self {
        Self {
            id,
            result: CallResult::Ok(value),
        }
    }

    pub fn error(id: u64, code: CallErrorCode, message: impl Into<Option<String>>) -> Self {
        Self {
            id,
            result: CallResult::Error {
                code,
                message: message.into(),
            },
        }
    }
}

/// Push event delivered to the front-end event stream
///
/// `DevicesChanged` is an advisory re-enumerate signal, not a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// Emitted once when the event stream attaches
    Ready,
    #[serde(rename_all = "camelCase")]
    DevicesChanged {
        reason: ChangeReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device_key: Option<DeviceKey>,
    },
    #[serde(rename_all = "camelCase")]
    PermissionResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device_key: Option<DeviceKey>,
        granted: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_call_args() {
        let call: MethodCall = serde_json::from_value(json!({
            "id": 4,
            "method": "requestPermission",
            "args": {"deviceKey": "native:usb1", "timeoutMs": 5000}
        }))
        .unwrap();

        assert_eq!(call.string_arg("deviceKey").unwrap(), "native:usb1");
        assert_eq!(call.u64_arg("timeoutMs"), Some(5000));
        assert!(call.string_arg("other").is_err());
    }

    #[test]
    fn test_method_call_args_default_empty() {
        let call: MethodCall =
            serde_json::from_value(json!({"id": 1, "method": "listDevices"})).unwrap();
        assert!(call.args.is_empty());
    }

    #[test]
    fn test_reply_shapes() {
        let ok = MethodReply::ok(7, json!([1, 2]));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"id": 7, "ok": [1, 2]})
        );

        let err = MethodReply::error(8, CallErrorCode::NotImplemented, None);
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"id": 8, "error": {"code": "not_implemented"}})
        );
    }

    #[test]
    fn test_error_code_tags() {
        assert_eq!(
            serde_json::to_value(CallErrorCode::SecurityException).unwrap(),
            json!("security_exception")
        );
        assert_eq!(
            serde_json::to_value(CallErrorCode::Internal).unwrap(),
            json!("error")
        );
    }

    #[test]
    fn test_event_serialization() {
        assert_eq!(
            serde_json::to_value(BridgeEvent::Ready).unwrap(),
            json!({"type": "ready"})
        );

        let changed = BridgeEvent::DevicesChanged {
            reason: ChangeReason::Attached,
            device_key: Some(DeviceKey::native("usb1")),
        };
        assert_eq!(
            serde_json::to_value(&changed).unwrap(),
            json!({"type": "devices_changed", "reason": "attached", "deviceKey": "native:usb1"})
        );

        let perm = BridgeEvent::PermissionResult {
            device_key: Some(DeviceKey::native("usb1")),
            granted: true,
        };
        assert_eq!(
            serde_json::to_value(&perm).unwrap(),
            json!({"type": "permission_result", "deviceKey": "native:usb1", "granted": true})
        );
    }

    #[test]
    fn test_event_round_trip() {
        let ev = BridgeEvent::DevicesChanged {
            reason: ChangeReason::InputRemoved,
            device_key: Some(DeviceKey::input(9)),
        };
        let bytes = serde_json::to_string(&ev).unwrap();
        let back: BridgeEvent = serde_json::from_str(&bytes).unwrap();
        assert_eq!(back, ev);
    }
}
