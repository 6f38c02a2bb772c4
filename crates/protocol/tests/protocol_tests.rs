//! Wire-shape tests for the bridge protocol
//!
//! The front-end pattern-matches on exact JSON field names, so these tests
//! pin the serialized shapes of method calls, replies, push events, and the
//! device records they carry.
//!
//! Run with: `cargo test -p protocol --test protocol_tests`

use protocol::{
    DeviceDetails, DeviceKey, DeviceSummary, MethodCall, PermissionOutcome,
    parse_device_descriptor,
};
use serde_json::json;

#[test]
fn test_method_call_wire_shape() {
    let call: MethodCall = serde_json::from_value(json!({
        "id": 42,
        "method": "getDeviceDetails",
        "args": {"deviceKey": "native:/dev/bus/usb/001/002"},
    }))
    .unwrap();

    assert_eq!(call.id, 42);
    assert_eq!(call.method, "getDeviceDetails");
    assert_eq!(
        call.string_arg("deviceKey").unwrap(),
        "native:/dev/bus/usb/001/002"
    );
}

#[test]
fn test_method_call_args_default_empty() {
    let call: MethodCall =
        serde_json::from_value(json!({"id": 1, "method": "listDevices"})).unwrap();
    assert!(call.args.is_empty());
    assert!(call.string_arg("deviceKey").is_err());
}

#[test]
fn test_details_record_wire_shape() {
    let raw = [
        0x12u8, 0x01, 0x10, 0x02, 0x00, 0x00, 0x00, 0x40, 0x34, 0x12, 0x78, 0x56, 0x01, 0x01,
        0x01, 0x02, 0x03, 0x01,
    ];
    let descriptor = parse_device_descriptor(&raw).unwrap();

    let details = DeviceDetails {
        summary: DeviceSummary::unavailable(DeviceKey::native("usb1")),
        interfaces: Vec::new(),
        configurations: Vec::new(),
        device_descriptor: Some(descriptor),
        input: None,
    };
    let value = serde_json::to_value(&details).unwrap();

    assert_eq!(value["summary"]["deviceKey"], "native:usb1");
    assert_eq!(value["deviceDescriptor"]["bcdUsb"], 0x0210);
    assert_eq!(value["deviceDescriptor"]["usbVersion"], "2.10");
    assert_eq!(value["deviceDescriptor"]["maxPacketSize0"], 0x40);
    assert_eq!(value["deviceDescriptor"]["numConfigurations"], 1);
    assert!(value["input"].is_null());
}

#[test]
fn test_device_key_round_trip() {
    for text in ["native:/dev/bus/usb/001/002", "input:12"] {
        let key: DeviceKey = text.parse().unwrap();
        assert_eq!(key.to_string(), text);
        assert_eq!(serde_json::to_value(&key).unwrap(), json!(text));
        let back: DeviceKey = serde_json::from_value(json!(text)).unwrap();
        assert_eq!(back, key);
    }

    // Native names may themselves contain colons.
    let key: DeviceKey = "native:usb:odd:name".parse().unwrap();
    assert_eq!(key, DeviceKey::native("usb:odd:name"));

    assert!("".parse::<DeviceKey>().is_err());
    assert!("native:".parse::<DeviceKey>().is_err());
    assert!("input:abc".parse::<DeviceKey>().is_err());
    assert!("serial:123".parse::<DeviceKey>().is_err());
}

#[test]
fn test_summary_camel_case_and_absent_fields() {
    let summary = DeviceSummary::unavailable(DeviceKey::native("usb1"));
    let value = serde_json::to_value(&summary).unwrap();

    assert_eq!(value["deviceKey"], "native:usb1");
    assert_eq!(value["hasPermission"], false);
    assert_eq!(value["isInputDevice"], false);
    // Absent optionals serialize as null, except inputSources which is
    // omitted entirely for USB entries.
    assert!(value["manufacturerName"].is_null());
    assert!(value.get("inputSources").is_none());
}

#[test]
fn test_permission_outcome_wire_shape() {
    assert_eq!(
        serde_json::to_value(PermissionOutcome::TimedOut).unwrap(),
        json!("timed_out")
    );
    assert!(PermissionOutcome::Granted.is_granted());
    assert!(!PermissionOutcome::TimedOut.is_granted());
}
