//! Device discovery and flat index mapping
//!
//! Every port of every discovered driver gets a flat index, assigned
//! driver-major, port-minor. The address table is built once per discovery
//! snapshot and thrown away by the next [`DeviceCatalog::discover`] call, so
//! indices are only meaningful within the snapshot that produced them.

use std::fmt;

use tracing::{debug, info, warn};

use crate::platform::{DriverKind, UsbPlatform, UsbSerialDriver};

/// Position of one port inside a discovery snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortAddress {
    /// Index into the snapshot's driver list
    pub driver: usize,
    /// Port number within that driver
    pub port: usize,
}

/// Human-facing description of one discovered port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub driver_kind: DriverKind,
    pub manufacturer: String,
    pub product: String,
    pub port_index: usize,
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{} Port {}",
            self.driver_kind, self.manufacturer, self.product, self.port_index
        )
    }
}

/// Snapshot of the serial-capable devices attached to the host
#[derive(Debug, Default)]
pub struct DeviceCatalog {
    drivers: Vec<UsbSerialDriver>,
    addresses: Vec<PortAddress>,
    discovered: bool,
    generation: u64,
}

impl DeviceCatalog {
    /// Create an empty, undiscovered catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Query the platform and replace the current snapshot
    ///
    /// Returns the total number of ports. An enumeration failure is logged and
    /// treated as zero devices; the catalog still counts as discovered.
    pub fn discover<P: UsbPlatform + ?Sized>(&mut self, platform: &mut P) -> usize {
        info!("Searching for USB serial devices...");
        let drivers = match platform.find_all_drivers() {
            Ok(drivers) => drivers,
            Err(e) => {
                warn!("Device enumeration failed, treating as no devices: {}", e);
                Vec::new()
            }
        };

        let count = self.replace(drivers);
        if count == 0 {
            info!("No USB serial devices found");
        } else {
            info!(
                "Found {} port(s) on {} device(s)",
                count,
                self.drivers.len()
            );
        }
        count
    }

    /// Install a new driver list, rebuilding the flat address table
    pub fn replace(&mut self, drivers: Vec<UsbSerialDriver>) -> usize {
        self.addresses = drivers
            .iter()
            .enumerate()
            .flat_map(|(driver, d)| {
                (0..d.port_count).map(move |port| PortAddress { driver, port })
            })
            .collect();
        self.drivers = drivers;
        self.discovered = true;
        self.generation += 1;

        debug!(
            "Catalog generation {} holds {} port(s)",
            self.generation,
            self.addresses.len()
        );
        self.addresses.len()
    }

    /// Whether discovery has run at least once
    pub fn is_discovered(&self) -> bool {
        self.discovered
    }

    /// Number of ports in the current snapshot
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// True when the snapshot holds no ports
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Counter bumped by every discovery; indices from different generations
    /// must not be mixed
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Address of a flat index
    pub fn address(&self, flat_index: usize) -> Option<PortAddress> {
        self.addresses.get(flat_index).copied()
    }

    /// Resolve a flat index to its driver and port number
    pub fn resolve(&self, flat_index: usize) -> Option<(&UsbSerialDriver, usize)> {
        let address = self.address(flat_index)?;
        let driver = self.drivers.get(address.driver)?;
        Some((driver, address.port))
    }

    /// Descriptor for a flat index
    pub fn descriptor(&self, flat_index: usize) -> Option<DeviceDescriptor> {
        self.resolve(flat_index)
            .map(|(driver, port_index)| DeviceDescriptor {
                driver_kind: driver.kind,
                manufacturer: driver.device.manufacturer_name().to_string(),
                product: driver.device.product_name().to_string(),
                port_index,
            })
    }

    /// Label for a flat index, or an empty string when it is out of range
    pub fn describe(&self, flat_index: usize) -> String {
        self.descriptor(flat_index)
            .map(|d| d.to_string())
            .unwrap_or_default()
    }

    /// Descriptors for every port, in flat index order
    pub fn descriptors(&self) -> impl Iterator<Item = DeviceDescriptor> + '_ {
        (0..self.len()).filter_map(|idx| self.descriptor(idx))
    }

    /// Flat index of the first port whose label equals `name`
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.descriptors().position(|d| d.to_string() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;
    use crate::platform::{DeviceId, PermissionCallback, SerialTransport, UsbDevice};
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn driver(id: u32, kind: DriverKind, ports: usize) -> UsbSerialDriver {
        UsbSerialDriver::new(
            kind,
            UsbDevice {
                id: DeviceId(id),
                vid: 0x0403,
                pid: 0x6001,
                manufacturer: Some("FTDI".to_string()),
                product: Some(format!("Adapter {}", id)),
                serial_number: None,
            },
            ports,
        )
    }

    struct FailingPlatform;

    impl UsbPlatform for FailingPlatform {
        fn find_all_drivers(&mut self) -> Result<Vec<UsbSerialDriver>, PlatformError> {
            Err(PlatformError::Enumeration("usb service unavailable".to_string()))
        }

        fn has_permission(&self, _device: &UsbDevice) -> bool {
            false
        }

        fn request_permission(&mut self, _device: &UsbDevice, _callback: PermissionCallback) {}

        fn open_device(
            &mut self,
            _device: &UsbDevice,
            _port_index: usize,
        ) -> Result<Option<Box<dyn SerialTransport>>, PlatformError> {
            Ok(None)
        }
    }

    #[test]
    fn test_driver_major_port_minor_order() {
        let mut catalog = DeviceCatalog::new();
        let count = catalog.replace(vec![
            driver(1, DriverKind::Ftdi, 2),
            driver(2, DriverKind::CdcAcm, 0),
            driver(3, DriverKind::Cp21xx, 1),
        ]);

        assert_eq!(count, 3);
        assert_eq!(catalog.address(0), Some(PortAddress { driver: 0, port: 0 }));
        assert_eq!(catalog.address(1), Some(PortAddress { driver: 0, port: 1 }));
        assert_eq!(catalog.address(2), Some(PortAddress { driver: 2, port: 0 }));
        assert_eq!(catalog.address(3), None);
    }

    #[test]
    fn test_describe_format() {
        let mut catalog = DeviceCatalog::new();
        catalog.replace(vec![driver(1, DriverKind::Ftdi, 2)]);

        assert_eq!(catalog.describe(1), "Ftdi FTDI/Adapter 1 Port 1");
        assert_eq!(catalog.describe(2), "");
    }

    #[test]
    fn test_describe_missing_strings() {
        let mut catalog = DeviceCatalog::new();
        let mut d = driver(1, DriverKind::Ch34x, 1);
        d.device.manufacturer = None;
        d.device.product = None;
        catalog.replace(vec![d]);

        assert_eq!(catalog.describe(0), "Ch34x Unknown/Unknown Port 0");
    }

    #[test]
    fn test_failed_enumeration_counts_as_empty() {
        let mut catalog = DeviceCatalog::new();
        catalog.replace(vec![driver(1, DriverKind::Ftdi, 1)]);

        let count = catalog.discover(&mut FailingPlatform);

        assert_eq!(count, 0);
        assert!(catalog.is_discovered());
        assert!(catalog.is_empty());
        assert_eq!(catalog.describe(0), "");
    }

    #[test]
    fn test_generation_bumps_on_every_discovery() {
        let mut catalog = DeviceCatalog::new();
        assert!(!catalog.is_discovered());
        assert_eq!(catalog.generation(), 0);

        catalog.replace(Vec::new());
        catalog.replace(vec![driver(1, DriverKind::Ftdi, 1)]);

        assert_eq!(catalog.generation(), 2);
    }

    #[test]
    fn test_index_of_label() {
        let mut catalog = DeviceCatalog::new();
        catalog.replace(vec![driver(1, DriverKind::Ftdi, 1), driver(2, DriverKind::Ftdi, 1)]);

        assert_eq!(catalog.index_of("Ftdi FTDI/Adapter 2 Port 0"), Some(1));
        assert_eq!(catalog.index_of("Ftdi FTDI/Adapter 3 Port 0"), None);
    }

    fn port_counts() -> impl Strategy<Value = Vec<usize>> {
        prop::collection::vec(0usize..5, 0..8)
    }

    proptest! {
        #[test]
        fn resolve_is_a_bijection(counts in port_counts()) {
            let mut catalog = DeviceCatalog::new();
            let drivers = counts
                .iter()
                .enumerate()
                .map(|(i, &n)| driver(i as u32, DriverKind::Ftdi, n))
                .collect();
            let count = catalog.replace(drivers);
            prop_assert_eq!(count, counts.iter().sum::<usize>());

            let mut seen = HashSet::new();
            for idx in 0..count {
                let (d, port) = catalog.resolve(idx).unwrap();
                prop_assert!(port < d.port_count);
                prop_assert!(seen.insert((d.device.id, port)));
            }
            prop_assert_eq!(seen.len(), count);
        }

        #[test]
        fn describe_empty_iff_out_of_range(counts in port_counts(), idx in 0usize..48) {
            let mut catalog = DeviceCatalog::new();
            let drivers = counts
                .iter()
                .enumerate()
                .map(|(i, &n)| driver(i as u32, DriverKind::Cp21xx, n))
                .collect();
            let count = catalog.replace(drivers);

            prop_assert_eq!(catalog.describe(idx).is_empty(), idx >= count);
        }
    }
}
