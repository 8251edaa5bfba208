//! Host platform implementation
//!
//! Desktop operating systems have no runtime permission prompt for serial
//! devices: access is decided by file permissions or group membership. An
//! open that fails with "permission denied" marks the device as not permitted,
//! and a permission request is answered with an immediate denial.

use std::collections::{HashMap, HashSet};
use std::io;

use tether_core::{
    DeviceId, LineParameters, PermissionCallback, PlatformError, SerialTransport, UsbDevice,
    UsbPlatform, UsbSerialDriver, READ_TIMEOUT,
};
use tracing::{debug, info, warn};

use crate::scanner::{PortGroup, PortScanner, ScannerConfig};
use crate::transport::NativeTransport;
use crate::usb_ids;

/// Identity of a physical device across scans
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DeviceKey {
    vid: u16,
    pid: u16,
    /// Serial number, or the first port path when there is none
    unique: String,
}

impl DeviceKey {
    fn of(group: &PortGroup) -> Self {
        let unique = group
            .serial_number
            .clone()
            .or_else(|| group.paths.first().cloned())
            .unwrap_or_default();
        Self {
            vid: group.vid,
            pid: group.pid,
            unique,
        }
    }
}

/// [`UsbPlatform`] over the host's serial ports
pub struct NativePlatform {
    scanner: PortScanner,
    ids: HashMap<DeviceKey, DeviceId>,
    next_id: u32,
    paths: HashMap<DeviceId, Vec<String>>,
    denied: HashSet<DeviceId>,
}

impl NativePlatform {
    pub fn new() -> Self {
        Self::with_config(ScannerConfig::default())
    }

    pub fn with_config(config: ScannerConfig) -> Self {
        Self {
            scanner: PortScanner::with_config(config),
            ids: HashMap::new(),
            next_id: 1,
            paths: HashMap::new(),
            denied: HashSet::new(),
        }
    }

    /// Device path of a port, if the device was seen in the last scan
    pub fn port_path(&self, device: DeviceId, port_index: usize) -> Option<&str> {
        self.paths
            .get(&device)
            .and_then(|paths| paths.get(port_index))
            .map(String::as_str)
    }

    /// Convert scanned groups into drivers, keeping ids stable across scans
    fn register(&mut self, groups: Vec<PortGroup>) -> Vec<UsbSerialDriver> {
        self.paths.clear();
        let mut drivers = Vec::with_capacity(groups.len());

        for group in groups {
            let key = DeviceKey::of(&group);
            let id = match self.ids.get(&key) {
                Some(id) => *id,
                None => {
                    let id = DeviceId(self.next_id);
                    self.next_id += 1;
                    self.ids.insert(key, id);
                    id
                }
            };

            let device = UsbDevice {
                id,
                vid: group.vid,
                pid: group.pid,
                manufacturer: group.manufacturer,
                product: group.product,
                serial_number: group.serial_number,
            };
            let kind = usb_ids::driver_kind(group.vid);
            drivers.push(UsbSerialDriver::new(kind, device, group.paths.len()));
            self.paths.insert(id, group.paths);
        }

        drivers
    }
}

impl Default for NativePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbPlatform for NativePlatform {
    fn find_all_drivers(&mut self) -> Result<Vec<UsbSerialDriver>, PlatformError> {
        let groups = self.scanner.enumerate()?;
        Ok(self.register(groups))
    }

    fn has_permission(&self, device: &UsbDevice) -> bool {
        !self.denied.contains(&device.id)
    }

    fn request_permission(&mut self, device: &UsbDevice, callback: PermissionCallback) {
        warn!(
            "No access to {} ({}); check the device node permissions or group membership",
            device,
            device.id
        );
        callback.deny();
    }

    fn open_device(
        &mut self,
        device: &UsbDevice,
        port_index: usize,
    ) -> Result<Option<Box<dyn SerialTransport>>, PlatformError> {
        let path = self
            .port_path(device.id, port_index)
            .ok_or_else(|| PlatformError::Detached(device.to_string()))?
            .to_string();

        debug!("Opening {}", path);
        let result = serialport::new(path.as_str(), LineParameters::FIXED.baud_rate)
            .timeout(READ_TIMEOUT)
            .open();

        match result {
            Ok(port) => {
                self.denied.remove(&device.id);
                info!("Opened {} for {}", path, device);
                let packet_size = self.scanner.config().packet_size;
                Ok(Some(Box::new(NativeTransport::new(path, port, packet_size))))
            }
            Err(e) if e.kind == serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
                warn!("Permission denied opening {}", path);
                self.denied.insert(device.id);
                Ok(None)
            }
            Err(e) if e.kind == serialport::ErrorKind::NoDevice => {
                Err(PlatformError::Detached(path))
            }
            Err(e) => Err(PlatformError::Open {
                device: path,
                reason: e.to_string(),
            }),
        }
    }
}
