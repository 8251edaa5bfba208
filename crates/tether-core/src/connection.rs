//! Open serial connection
//!
//! [`PortConnection`] exclusively owns the transport handle and the read
//! buffer. At most one connection is open at a time; opening again closes the
//! previous one first.

use std::io;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::ConnectError;
use crate::permission::{AccessDecision, PermissionGate};
use crate::platform::{DeviceId, LineParameters, SerialTransport, UsbDevice, UsbPlatform};

struct OpenPort {
    transport: Box<dyn SerialTransport>,
    buffer: Vec<u8>,
    device: DeviceId,
    port_index: usize,
}

/// Owner of the single open transport
#[derive(Default)]
pub struct PortConnection {
    port: Option<OpenPort>,
}

impl PortConnection {
    /// Create a closed connection
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `port_index` of `device` and apply the fixed line parameters
    ///
    /// When the platform hands out no handle, the permission gate decides
    /// whether the attempt is waiting on permission, was refused, or failed
    /// outright.
    pub fn open<P: UsbPlatform + ?Sized>(
        &mut self,
        platform: &mut P,
        gate: &mut PermissionGate,
        device: &UsbDevice,
        port_index: usize,
    ) -> Result<(), ConnectError> {
        self.close();

        let transport = match platform.open_device(device, port_index) {
            Ok(Some(transport)) => transport,
            Ok(None) => {
                return Err(match gate.ensure_access(platform, device) {
                    AccessDecision::Requested => {
                        info!("Asked for permission to access {}", device);
                        ConnectError::PermissionPending(device.to_string())
                    }
                    AccessDecision::Denied => {
                        warn!("Connection failed: permission denied for {}", device);
                        ConnectError::PermissionDenied(device.to_string())
                    }
                    AccessDecision::Granted => {
                        warn!("Connection failed: open failed for {}", device);
                        ConnectError::OpenFailed {
                            device: device.to_string(),
                            reason: "platform returned no handle".to_string(),
                        }
                    }
                });
            }
            Err(e) => {
                warn!("Connection failed: {}", e);
                return Err(ConnectError::OpenFailed {
                    device: device.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let port = configure(transport, device, port_index)?;
        info!(
            "Connected to {} port {} ({}, {} byte buffer)",
            device,
            port_index,
            LineParameters::FIXED,
            port.buffer.len()
        );
        self.port = Some(port);
        Ok(())
    }

    /// Whether a transport is currently held
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Device and port of the open connection
    pub fn endpoint(&self) -> Option<(DeviceId, usize)> {
        self.port.as_ref().map(|p| (p.device, p.port_index))
    }

    /// Size of the read buffer, if open
    pub fn buffer_len(&self) -> Option<usize> {
        self.port.as_ref().map(|p| p.buffer.len())
    }

    /// Release the transport. Safe to call when nothing is open.
    pub fn close(&mut self) {
        let Some(mut port) = self.port.take() else {
            return;
        };
        match port.transport.close() {
            Ok(()) => debug!("Closed {} port {}", port.device, port.port_index),
            Err(e) => warn!(
                "Failed to close {} port {}: {}",
                port.device, port.port_index, e
            ),
        }
    }

    /// One bounded read into the connection's buffer
    ///
    /// `None` when nothing is open.
    pub(crate) fn read(&mut self, timeout: Duration) -> Option<io::Result<&[u8]>> {
        let port = self.port.as_mut()?;
        let n = match port.transport.read(&mut port.buffer, timeout) {
            Ok(n) => n,
            Err(e) => return Some(Err(e)),
        };
        Some(Ok(&port.buffer[..n.min(port.buffer.len())]))
    }
}

impl Drop for PortConnection {
    fn drop(&mut self) {
        self.close();
    }
}

fn configure(
    mut transport: Box<dyn SerialTransport>,
    device: &UsbDevice,
    port_index: usize,
) -> Result<OpenPort, ConnectError> {
    let applied = transport
        .set_parameters(&LineParameters::FIXED)
        .and_then(|()| transport.set_dtr(true));
    let packet_size = transport.max_packet_size();

    let failure = match applied {
        Err(e) => Some(e.to_string()),
        Ok(()) if packet_size == 0 => Some("transport reported a zero packet size".to_string()),
        Ok(()) => None,
    };

    if let Some(reason) = failure {
        warn!("Failed to configure {}: {}", device, reason);
        if let Err(e) = transport.close() {
            debug!("Close after failed configuration also failed: {}", e);
        }
        return Err(ConnectError::ConfigurationFailed {
            device: device.to_string(),
            reason,
        });
    }

    Ok(OpenPort {
        transport,
        buffer: vec![0; packet_size],
        device: device.id,
        port_index,
    })
}
