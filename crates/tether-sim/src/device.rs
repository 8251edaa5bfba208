//! Virtual device configuration

use std::io;

use serde::{Deserialize, Serialize};
use tether_core::DriverKind;

/// How a virtual device answers permission questions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    /// Access is held from the start
    #[default]
    Granted,
    /// Requests wait until the controller grants or denies them
    Prompt,
    /// Requests are refused immediately
    Deny,
}

/// Outcome of one simulated read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStep {
    /// Bytes arrive (split across reads if larger than the buffer)
    Data(Vec<u8>),
    /// Nothing arrives before the timeout
    Timeout,
    /// The transport fails
    Error(io::ErrorKind),
}

/// Configuration of a simulated USB serial device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualDevice {
    /// Driver family
    pub kind: DriverKind,
    /// USB Vendor ID
    #[serde(default)]
    pub vid: u16,
    /// USB Product ID
    #[serde(default)]
    pub pid: u16,
    /// USB manufacturer string
    #[serde(default)]
    pub manufacturer: Option<String>,
    /// USB product string
    #[serde(default)]
    pub product: Option<String>,
    /// USB serial number
    #[serde(default)]
    pub serial_number: Option<String>,
    /// Number of serial ports
    #[serde(default = "default_port_count")]
    pub port_count: usize,
    /// Inbound packet size reported by each port
    #[serde(default = "default_packet_size")]
    pub packet_size: usize,
    /// Permission behaviour
    #[serde(default)]
    pub permission: PermissionMode,
    /// Text queued on a port every time it is opened
    #[serde(default)]
    pub banner: Option<String>,
}

fn default_port_count() -> usize {
    1
}

fn default_packet_size() -> usize {
    64
}

impl VirtualDevice {
    /// Create a single-port device with the usual IDs for its driver family
    pub fn new(
        kind: DriverKind,
        manufacturer: impl Into<String>,
        product: impl Into<String>,
    ) -> Self {
        let (vid, pid) = default_ids(kind);
        Self {
            kind,
            vid,
            pid,
            manufacturer: Some(manufacturer.into()),
            product: Some(product.into()),
            serial_number: None,
            port_count: default_port_count(),
            packet_size: default_packet_size(),
            permission: PermissionMode::default(),
            banner: None,
        }
    }

    /// FTDI adapter
    pub fn ftdi(product: impl Into<String>) -> Self {
        Self::new(DriverKind::Ftdi, "FTDI", product)
    }

    /// CDC-ACM class device (Arduino-style boards)
    pub fn cdc_acm(product: impl Into<String>) -> Self {
        Self::new(DriverKind::CdcAcm, "Arduino", product)
    }

    /// Set the number of ports
    pub fn ports(mut self, count: usize) -> Self {
        self.port_count = count;
        self
    }

    /// Set the inbound packet size
    pub fn packet_size(mut self, size: usize) -> Self {
        self.packet_size = size;
        self
    }

    /// Set the permission behaviour
    pub fn permission(mut self, mode: PermissionMode) -> Self {
        self.permission = mode;
        self
    }

    /// Set the serial number
    pub fn serial(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }

    /// Queue `text` on every port when it is opened
    pub fn banner(mut self, text: impl Into<String>) -> Self {
        self.banner = Some(text.into());
        self
    }
}

/// Typical VID/PID for a driver family
pub(crate) fn default_ids(kind: DriverKind) -> (u16, u16) {
    match kind {
        DriverKind::Ftdi => (0x0403, 0x6001),
        DriverKind::Cp21xx => (0x10C4, 0xEA60),
        DriverKind::Ch34x => (0x1A86, 0x7523),
        DriverKind::Prolific => (0x067B, 0x2303),
        DriverKind::CdcAcm => (0x2341, 0x0043),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let device = VirtualDevice::ftdi("FT2232H").ports(2);

        assert_eq!(device.vid, 0x0403);
        assert_eq!(device.port_count, 2);
        assert_eq!(device.packet_size, 64);
        assert_eq!(device.permission, PermissionMode::Granted);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let json = r#"{ "kind": "Cp21xx", "product": "CP2102", "permission": "prompt" }"#;
        let device: VirtualDevice = serde_json::from_str(json).unwrap();

        assert_eq!(device.kind, DriverKind::Cp21xx);
        assert_eq!(device.port_count, 1);
        assert_eq!(device.permission, PermissionMode::Prompt);
        assert_eq!(device.manufacturer, None);
    }
}
