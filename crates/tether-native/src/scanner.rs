//! Serial port scanner
//!
//! Enumerates host serial ports and groups the USB ones by physical device.

use serde::{Deserialize, Serialize};
use serialport::{available_ports, SerialPortInfo, SerialPortType};
use tether_core::PlatformError;
use tracing::{debug, info};

/// Ports that share one USB device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortGroup {
    /// USB Vendor ID
    pub vid: u16,
    /// USB Product ID
    pub pid: u16,
    /// USB serial number (if available)
    pub serial_number: Option<String>,
    /// USB manufacturer string
    pub manufacturer: Option<String>,
    /// USB product string
    pub product: Option<String>,
    /// Port device paths in port-index order (e.g., /dev/ttyUSB0, COM3)
    pub paths: Vec<String>,
}

impl PortGroup {
    fn from_usb(name: String, usb: &serialport::UsbPortInfo) -> Self {
        Self {
            vid: usb.vid,
            pid: usb.pid,
            serial_number: usb.serial_number.clone(),
            manufacturer: usb.manufacturer.clone(),
            product: usb.product.clone(),
            paths: vec![name],
        }
    }

    /// Whether another port belongs to this device
    ///
    /// Without a serial number two identical adapters are indistinguishable,
    /// so such ports are never merged.
    fn same_device(&self, usb: &serialport::UsbPortInfo) -> bool {
        self.serial_number.is_some()
            && self.vid == usb.vid
            && self.pid == usb.pid
            && self.serial_number == usb.serial_number
    }
}

/// Serial port scanner configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Skip ports whose path contains any of these patterns
    #[serde(default = "default_skip_patterns")]
    pub skip_patterns: Vec<String>,
    /// Read buffer size reported for every port
    #[serde(default = "default_packet_size")]
    pub packet_size: usize,
}

fn default_skip_patterns() -> Vec<String> {
    vec![
        // Bluetooth ports on macOS
        "Bluetooth".to_string(),
        // Debug/logging ports
        "debug".to_string(),
    ]
}

fn default_packet_size() -> usize {
    64
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            skip_patterns: default_skip_patterns(),
            packet_size: default_packet_size(),
        }
    }
}

/// Serial port scanner
#[derive(Debug, Clone, Default)]
pub struct PortScanner {
    config: ScannerConfig,
}

impl PortScanner {
    /// Create a new scanner with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scanner with custom configuration
    pub fn with_config(config: ScannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Enumerate USB serial devices attached to the host
    pub fn enumerate(&self) -> Result<Vec<PortGroup>, PlatformError> {
        info!("Enumerating serial ports...");
        let ports = available_ports().map_err(|e| PlatformError::Enumeration(e.to_string()))?;
        let groups = self.group_ports(ports);

        if groups.is_empty() {
            info!("No USB serial devices found");
        } else {
            info!("Found {} USB serial device(s)", groups.len());
            for group in &groups {
                let desc = group.product.as_deref().unwrap_or("Unknown");
                let paths = group.paths.join(", ");
                info!("  {:04X}:{:04X} {} - {}", group.vid, group.pid, desc, paths);
            }
        }

        Ok(groups)
    }

    /// Group raw port listings into devices
    ///
    /// Devices keep the order of their first port; ports within a device are
    /// sorted by path so port 0 is the lowest-numbered node.
    pub fn group_ports(&self, ports: Vec<SerialPortInfo>) -> Vec<PortGroup> {
        let mut groups: Vec<PortGroup> = Vec::new();

        for port in ports {
            if self.should_skip(&port.port_name) {
                debug!("Skipping {}", port.port_name);
                continue;
            }
            let SerialPortType::UsbPort(usb) = &port.port_type else {
                debug!("Skipping non-USB port {}", port.port_name);
                continue;
            };

            match groups.iter_mut().find(|g| g.same_device(usb)) {
                Some(group) => group.paths.push(port.port_name),
                None => groups.push(PortGroup::from_usb(port.port_name, usb)),
            }
        }

        for group in &mut groups {
            group.paths.sort();
        }
        groups
    }

    fn should_skip(&self, path: &str) -> bool {
        self.config
            .skip_patterns
            .iter()
            .any(|pattern| path.contains(pattern.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serialport::UsbPortInfo;

    fn usb(name: &str, vid: u16, pid: u16, serial: Option<&str>) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.to_string(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid,
                pid,
                serial_number: serial.map(str::to_string),
                manufacturer: Some("FTDI".to_string()),
                product: Some("FT2232H".to_string()),
            }),
        }
    }

    #[test]
    fn test_groups_ports_by_serial() {
        let scanner = PortScanner::new();
        let groups = scanner.group_ports(vec![
            usb("/dev/ttyUSB1", 0x0403, 0x6010, Some("A1")),
            usb("/dev/ttyUSB0", 0x0403, 0x6010, Some("A1")),
            usb("/dev/ttyACM0", 0x2341, 0x0043, Some("B2")),
        ]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].paths, vec!["/dev/ttyUSB0", "/dev/ttyUSB1"]);
        assert_eq!(groups[1].vid, 0x2341);
    }

    #[test]
    fn test_ports_without_serial_stay_separate() {
        let scanner = PortScanner::new();
        let groups = scanner.group_ports(vec![
            usb("/dev/ttyUSB0", 0x1A86, 0x7523, None),
            usb("/dev/ttyUSB1", 0x1A86, 0x7523, None),
        ]);

        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_skips_patterns_and_non_usb() {
        let scanner = PortScanner::new();
        let groups = scanner.group_ports(vec![
            SerialPortInfo {
                port_name: "/dev/ttyS0".to_string(),
                port_type: SerialPortType::Unknown,
            },
            usb("/dev/cu.Bluetooth-Incoming-Port", 0x0403, 0x6001, None),
            usb("/dev/ttyUSB0", 0x0403, 0x6001, None),
        ]);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].paths, vec!["/dev/ttyUSB0"]);
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config: ScannerConfig = serde_json::from_str(r#"{ "packet_size": 512 }"#).unwrap();

        assert_eq!(config.packet_size, 512);
        assert_eq!(config.skip_patterns, default_skip_patterns());
    }

    proptest! {
        #[test]
        fn prop_every_port_lands_in_one_group(
            ports in prop::collection::vec((0u8..4, proptest::option::of(0u8..3)), 0..12)
        ) {
            let infos: Vec<_> = ports
                .iter()
                .enumerate()
                .map(|(i, (pid, serial))| {
                    let serial = serial.map(|s| format!("S{s}"));
                    usb(&format!("/dev/ttyUSB{i}"), 0x0403, *pid as u16, serial.as_deref())
                })
                .collect();

            let groups = PortScanner::new().group_ports(infos);
            let mut paths: Vec<_> = groups.iter().flat_map(|g| g.paths.iter().cloned()).collect();
            paths.sort();
            paths.dedup();

            prop_assert_eq!(paths.len(), ports.len());
        }
    }
}
