//! Byte-level decoding of USB descriptors
//!
//! Pure functions over raw descriptor bytes as defined by the USB
//! specification: BCD version fields, little-endian reads, and the fixed
//! 18-byte device descriptor layout.

use crate::types::{DeviceDescriptorRaw, EndpointDirection, TransferKind};
use byteorder::{ByteOrder, LittleEndian};

/// USB HID device class code
pub const USB_CLASS_HID: u8 = 0x03;

/// Direction bit in an endpoint address
pub const USB_DIR_MASK: u8 = 0x80;
pub const USB_DIR_IN: u8 = 0x80;

/// Endpoint number bits in an endpoint address
pub const USB_ENDPOINT_NUMBER_MASK: u8 = 0x0f;

/// Transfer-type bits in the endpoint attributes byte
pub const USB_ENDPOINT_XFER_MASK: u8 = 0x03;

/// Length of the standard device descriptor
pub const DEVICE_DESCRIPTOR_LEN: usize = 18;

/// Format a BCD-encoded USB version word as `"major.minor"`
///
/// The top byte is the integer major version; the low byte holds the two
/// minor digits as nibbles. 0x0310 formats as "3.10". Total over all u16
/// inputs.
pub fn bcd_version_string(bcd: u16) -> String {
    let major = bcd >> 8;
    let minor = ((bcd >> 4) & 0x0f) * 10 + (bcd & 0x0f);
    format!("{major}.{minor:02}")
}

/// Little-endian 2-byte read
///
/// Caller guarantees `offset + 1` is in bounds; descriptor parsers validate
/// the buffer length before any field read.
pub fn read_le16(bytes: &[u8], offset: usize) -> u16 {
    LittleEndian::read_u16(&bytes[offset..offset + 2])
}

/// Decode the standard device descriptor from raw bytes
///
/// Returns `None` when the buffer is shorter than the fixed 18-byte
/// layout.
pub fn parse_device_descriptor(raw: &[u8]) -> Option<DeviceDescriptorRaw> {
    if raw.len() < DEVICE_DESCRIPTOR_LEN {
        return None;
    }

    let bcd_usb = read_le16(raw, 2);
    let bcd_device = read_le16(raw, 12);

    Some(DeviceDescriptorRaw {
        bcd_usb,
        usb_version: bcd_version_string(bcd_usb),
        bcd_device,
        device_release: bcd_version_string(bcd_device),
        max_packet_size0: raw[7],
        num_configurations: raw[17],
        i_manufacturer: raw[14],
        i_product: raw[15],
        i_serial_number: raw[16],
    })
}

impl EndpointDirection {
    /// Decode the direction label from an endpoint address byte
    pub fn from_address(address: u8) -> Self {
        if address & USB_DIR_MASK == USB_DIR_IN {
            EndpointDirection::In
        } else {
            EndpointDirection::Out
        }
    }
}

impl TransferKind {
    /// Decode the transfer-type label from an endpoint attributes byte
    pub fn from_attributes(attributes: u8) -> Self {
        match attributes & USB_ENDPOINT_XFER_MASK {
            0 => TransferKind::Control,
            1 => TransferKind::Isochronous,
            2 => TransferKind::Bulk,
            3 => TransferKind::Interrupt,
            _ => TransferKind::Unknown,
        }
    }
}

/// Endpoint number from an address byte
pub fn endpoint_number(address: u8) -> u8 {
    address & USB_ENDPOINT_NUMBER_MASK
}
