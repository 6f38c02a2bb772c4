//! Descriptor tree building
//!
//! Walks a native device's configuration -> interface -> endpoint
//! hierarchy into the structured records the front-end consumes, and reads
//! the raw device descriptor through a scoped connection.

use crate::platform::{
    NativeDevice, PlatformCapabilities, PlatformError, RawEndpoint, RawInterface, UsbSubsystem,
};
use protocol::descriptor::{endpoint_number, parse_device_descriptor};
use protocol::{
    ConfigurationInfo, DeviceDescriptorRaw, EndpointDirection, EndpointInfo, InterfaceInfo,
    TransferKind,
};
use tracing::debug;

pub fn endpoint_info(raw: &RawEndpoint) -> EndpointInfo {
    EndpointInfo {
        address: raw.address,
        direction: EndpointDirection::from_address(raw.address),
        kind: TransferKind::from_attributes(raw.attributes),
        max_packet_size: raw.max_packet_size,
        interval: raw.interval,
        attributes: raw.attributes,
        number: endpoint_number(raw.address),
    }
}

/// Endpoints stay in OS enumeration order; no re-sorting.
pub fn interface_info(raw: &RawInterface) -> InterfaceInfo {
    InterfaceInfo {
        id: raw.id,
        alternate_setting: raw.alternate_setting,
        name: raw.name.clone(),
        interface_class: raw.class,
        interface_subclass: raw.subclass,
        interface_protocol: raw.protocol,
        endpoint_count: raw.endpoints.len() as u32,
        endpoints: raw.endpoints.iter().map(endpoint_info).collect(),
    }
}

/// Device-level interface list for the active configuration
pub fn device_interfaces(dev: &NativeDevice) -> Vec<InterfaceInfo> {
    dev.interfaces.iter().map(interface_info).collect()
}

/// Full per-configuration trees in OS index order
///
/// Empty when the device exposes zero configurations (some devices do
/// before permission is granted).
pub fn configuration_list(dev: &NativeDevice) -> Vec<ConfigurationInfo> {
    dev.configurations
        .iter()
        .map(|cfg| ConfigurationInfo {
            id: cfg.id,
            name: cfg.name.clone(),
            attributes: cfg.attributes,
            max_power_ma: cfg.max_power_ma,
            interface_count: cfg.interfaces.len() as u32,
            interfaces: cfg.interfaces.iter().map(interface_info).collect(),
        })
        .collect()
}

/// Read and decode the raw device descriptor
///
/// Requires granted permission, the raw-descriptor capability, and a
/// successful scoped open; every other failure collapses to `None`. Only a
/// security fault propagates.
pub fn read_device_descriptor(
    usb: &dyn UsbSubsystem,
    caps: &PlatformCapabilities,
    dev: &NativeDevice,
) -> Result<Option<DeviceDescriptorRaw>, PlatformError> {
    if !caps.raw_descriptors || !usb.has_permission(&dev.name) {
        return Ok(None);
    }

    let conn = match usb.open(&dev.name) {
        Ok(conn) => conn,
        Err(PlatformError::Security(msg)) => return Err(PlatformError::Security(msg)),
        Err(e) => {
            debug!(device = %dev.name, "descriptor read skipped: {e}");
            return Ok(None);
        }
    };

    // Connection closes on drop whether or not the decode succeeds.
    let raw = match conn.raw_descriptors() {
        Some(raw) => raw,
        None => return Ok(None),
    };

    Ok(parse_device_descriptor(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::RawConfiguration;
    use crate::platform::sim::SimPlatform;

    fn hid_interface() -> RawInterface {
        RawInterface {
            id: 0,
            alternate_setting: 0,
            name: Some("HID".to_string()),
            class: 3,
            subclass: 1,
            protocol: 2,
            endpoints: vec![
                RawEndpoint {
                    address: 0x81,
                    attributes: 0x03,
                    max_packet_size: 8,
                    interval: 10,
                },
                RawEndpoint {
                    address: 0x02,
                    attributes: 0x02,
                    max_packet_size: 64,
                    interval: 0,
                },
            ],
        }
    }

    #[test]
    fn test_interface_info_decodes_endpoints() {
        let info = interface_info(&hid_interface());

        assert_eq!(info.endpoint_count, 2);
        assert_eq!(info.endpoints[0].direction, EndpointDirection::In);
        assert_eq!(info.endpoints[0].kind, TransferKind::Interrupt);
        assert_eq!(info.endpoints[0].number, 1);
        assert_eq!(info.endpoints[1].direction, EndpointDirection::Out);
        assert_eq!(info.endpoints[1].kind, TransferKind::Bulk);
        assert_eq!(info.endpoints[1].number, 2);
    }

    #[test]
    fn test_endpoint_order_preserved() {
        let mut raw = hid_interface();
        raw.endpoints.reverse();
        let info = interface_info(&raw);
        assert_eq!(info.endpoints[0].address, 0x02);
        assert_eq!(info.endpoints[1].address, 0x81);
    }

    #[test]
    fn test_configuration_list_empty_without_configs() {
        let dev = NativeDevice::new("usb1", 1, 1, 1);
        assert!(configuration_list(&dev).is_empty());
    }

    #[test]
    fn test_configuration_list() {
        let mut dev = NativeDevice::new("usb1", 1, 1, 1);
        dev.configurations = vec![RawConfiguration {
            id: 1,
            name: Some("default".to_string()),
            attributes: 0xa0,
            max_power_ma: 250,
            interfaces: vec![hid_interface()],
        }];

        let cfgs = configuration_list(&dev);
        assert_eq!(cfgs.len(), 1);
        assert_eq!(cfgs[0].max_power_ma, 250);
        assert_eq!(cfgs[0].interface_count, 1);
        assert_eq!(cfgs[0].interfaces[0].interface_class, 3);
    }

    #[test]
    fn test_read_device_descriptor_requires_permission() {
        let dev = NativeDevice::new("usb1", 1, 1, 1);
        let sim = SimPlatform::new()
            .with_native_device(dev.clone())
            .with_raw_descriptors("usb1", vec![0u8; 18]);

        let caps = PlatformCapabilities::all();
        assert!(read_device_descriptor(&sim, &caps, &dev).unwrap().is_none());
    }

    #[test]
    fn test_read_device_descriptor_capability_gated() {
        let dev = NativeDevice::new("usb1", 1, 1, 1);
        let sim = SimPlatform::new()
            .with_native_device(dev.clone())
            .with_permission("usb1")
            .with_raw_descriptors("usb1", vec![0u8; 18]);

        let caps = PlatformCapabilities {
            raw_descriptors: false,
            ..PlatformCapabilities::all()
        };
        assert!(read_device_descriptor(&sim, &caps, &dev).unwrap().is_none());
    }

    #[test]
    fn test_read_device_descriptor_decodes() {
        let dev = NativeDevice::new("usb1", 1, 1, 1);
        let raw = vec![
            0x12, 0x01, 0x10, 0x02, 0x00, 0x00, 0x00, 0x40, 0x34, 0x12, 0x78, 0x56, 0x00, 0x01,
            0x01, 0x02, 0x03, 0x01,
        ];
        let sim = SimPlatform::new()
            .with_native_device(dev.clone())
            .with_permission("usb1")
            .with_raw_descriptors("usb1", raw);

        let caps = PlatformCapabilities::all();
        let desc = read_device_descriptor(&sim, &caps, &dev).unwrap().unwrap();
        assert_eq!(desc.usb_version, "2.10");
        assert_eq!(desc.device_release, "1.00");
        assert_eq!(desc.max_packet_size0, 0x40);
    }

    #[test]
    fn test_read_device_descriptor_short_buffer() {
        let dev = NativeDevice::new("usb1", 1, 1, 1);
        let sim = SimPlatform::new()
            .with_native_device(dev.clone())
            .with_permission("usb1")
            .with_raw_descriptors("usb1", vec![0x12, 0x01]);

        let caps = PlatformCapabilities::all();
        assert!(read_device_descriptor(&sim, &caps, &dev).unwrap().is_none());
    }

    #[test]
    fn test_read_device_descriptor_security_fault() {
        let dev = NativeDevice::new("usb1", 1, 1, 1);
        let sim = SimPlatform::new()
            .with_native_device(dev.clone())
            .with_permission("usb1")
            .with_security_fault("usb1");

        let caps = PlatformCapabilities::all();
        assert!(matches!(
            read_device_descriptor(&sim, &caps, &dev),
            Err(PlatformError::Security(_))
        ));
    }
}
