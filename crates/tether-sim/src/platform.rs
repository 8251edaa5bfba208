//! Simulated platform and its controller
//!
//! [`SimPlatform`] and every [`SimController`] cloned from it share one
//! simulation state, so a test can move the platform into a bridge and keep
//! steering it from outside.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tether_core::{
    DeviceId, LineParameters, PermissionCallback, PlatformError, SerialTransport, UsbDevice,
    UsbPlatform, UsbSerialDriver,
};
use tracing::{debug, info};

use crate::device::{default_ids, PermissionMode, ReadStep, VirtualDevice};

#[derive(Debug, Default)]
struct PortState {
    script: VecDeque<ReadStep>,
    parameters: Option<LineParameters>,
    dtr: bool,
    open: bool,
    closes: usize,
    reads: usize,
}

#[derive(Debug)]
struct SimDevice {
    id: DeviceId,
    config: VirtualDevice,
    attached: bool,
    permitted: bool,
    pending: Vec<PermissionCallback>,
    requests: usize,
    ports: Vec<PortState>,
}

impl SimDevice {
    fn usb_device(&self) -> UsbDevice {
        UsbDevice {
            id: self.id,
            vid: self.config.vid,
            pid: self.config.pid,
            manufacturer: self.config.manufacturer.clone(),
            product: self.config.product.clone(),
            serial_number: self.config.serial_number.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    devices: Vec<SimDevice>,
    next_id: u32,
    fail_enumeration: bool,
    fail_open: bool,
}

impl SimState {
    fn device(&self, id: DeviceId) -> Option<&SimDevice> {
        self.devices.iter().find(|d| d.id == id)
    }

    fn device_mut(&mut self, id: DeviceId) -> Option<&mut SimDevice> {
        self.devices.iter_mut().find(|d| d.id == id)
    }

    fn port_mut(&mut self, id: DeviceId, port: usize) -> Option<&mut PortState> {
        self.device_mut(id).and_then(|d| d.ports.get_mut(port))
    }

    fn port(&self, id: DeviceId, port: usize) -> Option<&PortState> {
        self.device(id).and_then(|d| d.ports.get(port))
    }
}

type Shared = Arc<Mutex<SimState>>;

fn lock(state: &Shared) -> MutexGuard<'_, SimState> {
    // A panicking test thread must not take the rest of the simulation with it.
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Platform backed by virtual devices
#[derive(Debug, Default)]
pub struct SimPlatform {
    state: Shared,
}

impl SimPlatform {
    /// Create a platform with no devices attached
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a platform with the given devices attached
    pub fn with_devices(devices: impl IntoIterator<Item = VirtualDevice>) -> Self {
        let platform = Self::new();
        let controller = platform.controller();
        for device in devices {
            controller.add_device(device);
        }
        platform
    }

    /// Handle for steering this platform
    pub fn controller(&self) -> SimController {
        SimController {
            state: self.state.clone(),
        }
    }
}

impl UsbPlatform for SimPlatform {
    fn find_all_drivers(&mut self) -> Result<Vec<UsbSerialDriver>, PlatformError> {
        let state = lock(&self.state);
        if state.fail_enumeration {
            return Err(PlatformError::Enumeration(
                "simulated enumeration failure".to_string(),
            ));
        }
        Ok(state
            .devices
            .iter()
            .filter(|d| d.attached)
            .map(|d| UsbSerialDriver::new(d.config.kind, d.usb_device(), d.config.port_count))
            .collect())
    }

    fn has_permission(&self, device: &UsbDevice) -> bool {
        lock(&self.state)
            .device(device.id)
            .map(|d| d.permitted)
            .unwrap_or(false)
    }

    fn request_permission(&mut self, device: &UsbDevice, callback: PermissionCallback) {
        let mut state = lock(&self.state);
        let Some(sim) = state.device_mut(device.id) else {
            debug!("Permission requested for unknown device {}", device.id);
            callback.deny();
            return;
        };
        sim.requests += 1;
        match sim.config.permission {
            PermissionMode::Granted => {
                sim.permitted = true;
                callback.grant();
            }
            PermissionMode::Prompt => {
                info!("Permission prompt shown for {}", device);
                sim.pending.push(callback);
            }
            PermissionMode::Deny => callback.deny(),
        }
    }

    fn open_device(
        &mut self,
        device: &UsbDevice,
        port_index: usize,
    ) -> Result<Option<Box<dyn SerialTransport>>, PlatformError> {
        let mut state = lock(&self.state);
        if state.fail_open {
            return Err(PlatformError::Open {
                device: device.to_string(),
                reason: "simulated open failure".to_string(),
            });
        }
        let Some(sim) = state.device_mut(device.id).filter(|d| d.attached) else {
            return Err(PlatformError::Detached(device.to_string()));
        };
        if !sim.permitted {
            return Ok(None);
        }

        let packet_size = sim.config.packet_size;
        let banner = sim.config.banner.clone();
        let Some(port) = sim.ports.get_mut(port_index) else {
            return Err(PlatformError::Open {
                device: device.to_string(),
                reason: format!("no port {}", port_index),
            });
        };
        port.open = true;
        if let Some(text) = banner {
            port.script.push_back(ReadStep::Data(text.into_bytes()));
        }

        Ok(Some(Box::new(SimTransport {
            state: self.state.clone(),
            device: device.id,
            port: port_index,
            packet_size,
        })))
    }
}

struct SimTransport {
    state: Shared,
    device: DeviceId,
    port: usize,
    packet_size: usize,
}

impl SimTransport {
    fn with_port<T>(&self, f: impl FnOnce(&mut PortState) -> T) -> Result<T, PlatformError> {
        let mut state = lock(&self.state);
        let attached = state.device(self.device).map(|d| d.attached).unwrap_or(false);
        match state.port_mut(self.device, self.port) {
            Some(port) if attached => Ok(f(port)),
            _ => Err(PlatformError::Detached(self.device.to_string())),
        }
    }
}

impl SerialTransport for SimTransport {
    fn set_parameters(&mut self, params: &LineParameters) -> Result<(), PlatformError> {
        self.with_port(|port| port.parameters = Some(*params))
    }

    fn set_dtr(&mut self, asserted: bool) -> Result<(), PlatformError> {
        self.with_port(|port| port.dtr = asserted)
    }

    fn max_packet_size(&self) -> usize {
        self.packet_size
    }

    fn read(&mut self, buffer: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        let step = self
            .with_port(|port| {
                port.reads += 1;
                port.script.pop_front()
            })
            .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e.to_string()))?;

        match step {
            None | Some(ReadStep::Timeout) => Ok(0),
            Some(ReadStep::Error(kind)) => Err(io::Error::new(kind, "simulated read failure")),
            Some(ReadStep::Data(data)) => {
                let n = data.len().min(buffer.len());
                buffer[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    let rest = data[n..].to_vec();
                    // Reads past the end of the device are harmless here.
                    let _ = self.with_port(|port| port.script.push_front(ReadStep::Data(rest)));
                }
                Ok(n)
            }
        }
    }

    fn close(&mut self) -> Result<(), PlatformError> {
        let mut state = lock(&self.state);
        match state.port_mut(self.device, self.port) {
            Some(port) => {
                port.open = false;
                port.closes += 1;
                Ok(())
            }
            None => Err(PlatformError::Detached(self.device.to_string())),
        }
    }
}

/// Steering handle for a [`SimPlatform`]
#[derive(Debug, Clone)]
pub struct SimController {
    state: Shared,
}

impl SimController {
    /// Attach a device; returns its identifier
    pub fn add_device(&self, mut config: VirtualDevice) -> DeviceId {
        if config.vid == 0 && config.pid == 0 {
            (config.vid, config.pid) = default_ids(config.kind);
        }

        let mut state = lock(&self.state);
        state.next_id += 1;
        let id = DeviceId(state.next_id);
        debug!("Attached virtual device {} ({} port(s))", id, config.port_count);
        state.devices.push(SimDevice {
            id,
            permitted: config.permission == PermissionMode::Granted,
            ports: (0..config.port_count).map(|_| PortState::default()).collect(),
            config,
            attached: true,
            pending: Vec::new(),
            requests: 0,
        });
        id
    }

    /// Unplug a device; open transports start failing
    pub fn unplug(&self, id: DeviceId) {
        if let Some(device) = lock(&self.state).device_mut(id) {
            debug!("Unplugged virtual device {}", id);
            device.attached = false;
        }
    }

    /// Grant access and answer any pending prompts
    pub fn grant(&self, id: DeviceId) {
        let pending = {
            let mut state = lock(&self.state);
            let Some(device) = state.device_mut(id) else {
                return;
            };
            device.permitted = true;
            std::mem::take(&mut device.pending)
        };
        for callback in pending {
            callback.grant();
        }
    }

    /// Refuse any pending prompts
    pub fn deny(&self, id: DeviceId) {
        let pending = {
            let mut state = lock(&self.state);
            let Some(device) = state.device_mut(id) else {
                return;
            };
            device.permitted = false;
            std::mem::take(&mut device.pending)
        };
        for callback in pending {
            callback.deny();
        }
    }

    /// Withdraw access without answering anything
    pub fn revoke(&self, id: DeviceId) {
        if let Some(device) = lock(&self.state).device_mut(id) {
            device.permitted = false;
        }
    }

    /// Prompts waiting for an answer
    pub fn pending_prompts(&self, id: DeviceId) -> usize {
        lock(&self.state)
            .device(id)
            .map(|d| d.pending.len())
            .unwrap_or(0)
    }

    /// Permission requests the device has received
    pub fn permission_requests(&self, id: DeviceId) -> usize {
        lock(&self.state).device(id).map(|d| d.requests).unwrap_or(0)
    }

    /// Queue a read outcome on a port
    pub fn push_read(&self, id: DeviceId, port: usize, step: ReadStep) {
        if let Some(port) = lock(&self.state).port_mut(id, port) {
            port.script.push_back(step);
        }
    }

    /// Queue bytes on a port
    pub fn push_data(&self, id: DeviceId, port: usize, data: &[u8]) {
        self.push_read(id, port, ReadStep::Data(data.to_vec()));
    }

    /// Make enumeration fail
    pub fn set_fail_enumeration(&self, fail: bool) {
        lock(&self.state).fail_enumeration = fail;
    }

    /// Make every open fail with a platform error
    pub fn set_fail_open(&self, fail: bool) {
        lock(&self.state).fail_open = fail;
    }

    /// Line parameters last applied to a port
    pub fn line_parameters(&self, id: DeviceId, port: usize) -> Option<LineParameters> {
        lock(&self.state).port(id, port).and_then(|p| p.parameters)
    }

    /// DTR level of a port
    pub fn dtr(&self, id: DeviceId, port: usize) -> bool {
        lock(&self.state).port(id, port).map(|p| p.dtr).unwrap_or(false)
    }

    /// Whether a port is currently open
    pub fn is_open(&self, id: DeviceId, port: usize) -> bool {
        lock(&self.state).port(id, port).map(|p| p.open).unwrap_or(false)
    }

    /// How many times a port has been closed
    pub fn close_count(&self, id: DeviceId, port: usize) -> usize {
        lock(&self.state).port(id, port).map(|p| p.closes).unwrap_or(0)
    }

    /// How many reads a port has served
    pub fn read_count(&self, id: DeviceId, port: usize) -> usize {
        lock(&self.state).port(id, port).map(|p| p.reads).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::{AccessDecision, PermissionGate, PermissionState};

    #[test]
    fn test_enumeration_skips_unplugged() {
        let mut platform = SimPlatform::new();
        let sim = platform.controller();
        let a = sim.add_device(VirtualDevice::ftdi("A"));
        sim.add_device(VirtualDevice::cdc_acm("B").ports(2));

        sim.unplug(a);
        let drivers = platform.find_all_drivers().unwrap();

        assert_eq!(drivers.len(), 1);
        assert_eq!(drivers[0].port_count, 2);
    }

    #[test]
    fn test_prompt_waits_for_controller() {
        let mut platform = SimPlatform::new();
        let sim = platform.controller();
        let id = sim.add_device(VirtualDevice::ftdi("A").permission(PermissionMode::Prompt));
        let device = platform.find_all_drivers().unwrap()[0].device.clone();

        assert!(!platform.has_permission(&device));
        assert!(platform.open_device(&device, 0).unwrap().is_none());

        let mut gate = PermissionGate::new();
        assert_eq!(
            gate.ensure_access(&mut platform, &device),
            AccessDecision::Requested
        );
        assert_eq!(sim.pending_prompts(id), 1);
        assert_eq!(gate.state(), PermissionState::Requested { device: id });

        sim.grant(id);
        assert_eq!(gate.state(), PermissionState::Granted { device: id });
        assert!(platform.has_permission(&device));
        assert_eq!(sim.permission_requests(id), 1);
    }

    #[test]
    fn test_deny_mode_answers_immediately() {
        let mut platform = SimPlatform::new();
        let sim = platform.controller();
        let id = sim.add_device(VirtualDevice::ftdi("A").permission(PermissionMode::Deny));
        let device = platform.find_all_drivers().unwrap()[0].device.clone();

        let mut gate = PermissionGate::new();
        assert_eq!(
            gate.ensure_access(&mut platform, &device),
            AccessDecision::Denied
        );

        assert_eq!(gate.state(), PermissionState::Denied { device: id });
        assert_eq!(sim.pending_prompts(id), 0);
    }

    #[test]
    fn test_large_data_split_across_reads() {
        let mut platform = SimPlatform::new();
        let sim = platform.controller();
        let id = sim.add_device(VirtualDevice::ftdi("A").packet_size(4));
        let device = platform.find_all_drivers().unwrap()[0].device.clone();
        let mut transport = platform.open_device(&device, 0).unwrap().unwrap();

        sim.push_data(id, 0, b"abcdef");
        let mut buf = [0u8; 4];
        assert_eq!(transport.read(&mut buf, Duration::ZERO).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(transport.read(&mut buf, Duration::ZERO).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(transport.read(&mut buf, Duration::ZERO).unwrap(), 0);
    }

    #[test]
    fn test_unplugged_transport_fails() {
        let mut platform = SimPlatform::new();
        let sim = platform.controller();
        let id = sim.add_device(VirtualDevice::ftdi("A"));
        let device = platform.find_all_drivers().unwrap()[0].device.clone();
        let mut transport = platform.open_device(&device, 0).unwrap().unwrap();

        sim.unplug(id);

        let mut buf = [0u8; 8];
        let err = transport.read(&mut buf, Duration::ZERO).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
