//! Caller-facing bridge
//!
//! [`SerialBridge`] wires the catalog, permission gate, connection and read
//! channel together behind the small surface a UI layer consumes:
//! `discover`, `describe`, `connect`, `read_batch`, `has_error` and `close`.
//! None of these panic or return errors; failures come back as sentinels
//! (0, empty string, `false`, empty vector). [`SerialBridge::try_connect`]
//! exposes the typed reason for Rust callers.
//!
//! All operations take `&mut self`, so calls are serialized by construction.

use tracing::{debug, info};

use crate::catalog::DeviceCatalog;
use crate::channel::ReadChannel;
use crate::connection::PortConnection;
use crate::error::ConnectError;
use crate::permission::{PermissionGate, PermissionState};
use crate::platform::UsbPlatform;

/// Bridge to a single USB serial device
pub struct SerialBridge<P> {
    platform: P,
    catalog: DeviceCatalog,
    gate: PermissionGate,
    connection: PortConnection,
    channel: ReadChannel,
}

impl<P: UsbPlatform> SerialBridge<P> {
    /// Create a bridge over a platform USB stack
    pub fn new(platform: P) -> Self {
        Self {
            platform,
            catalog: DeviceCatalog::new(),
            gate: PermissionGate::new(),
            connection: PortConnection::new(),
            channel: ReadChannel::new(),
        }
    }

    /// Enumerate devices, replacing the previous snapshot; returns the port count
    pub fn discover(&mut self) -> usize {
        self.catalog.discover(&mut self.platform)
    }

    /// Label of a flat index, empty when out of range
    pub fn describe(&self, index: usize) -> String {
        self.catalog.describe(index)
    }

    /// Run discovery and return the label of every port
    pub fn device_names(&mut self) -> Vec<String> {
        let count = self.discover();
        (0..count).map(|idx| self.describe(idx)).collect()
    }

    /// Index of the port labelled `name` in the current snapshot
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.catalog.index_of(name)
    }

    /// Connect to a flat index; `false` on any failure
    pub fn connect(&mut self, index: usize) -> bool {
        self.try_connect(index).is_ok()
    }

    /// Connect to a flat index, reporting why an attempt did not succeed
    ///
    /// Discovery runs first if it never has. A [`ConnectError::PermissionPending`]
    /// means the platform is asking for access; call again once it answers.
    pub fn try_connect(&mut self, index: usize) -> Result<(), ConnectError> {
        if !self.catalog.is_discovered() {
            self.discover();
        }

        let (device, port_index) = match self.catalog.resolve(index) {
            Some((driver, port)) => (driver.device.clone(), port),
            None => {
                info!("Invalid device index {}", index);
                return Err(ConnectError::InvalidIndex {
                    index,
                    count: self.catalog.len(),
                });
            }
        };

        debug!("Connecting to index {} ({} port {})", index, device, port_index);
        // Opening drops any previous connection, and its error flag with it
        self.channel.rearm();
        self.connection
            .open(&mut self.platform, &mut self.gate, &device, port_index)?;

        self.gate.reset();
        Ok(())
    }

    /// Rediscover, look up a label and connect to it; `false` on any failure
    pub fn connect_by_name(&mut self, name: &str) -> bool {
        self.try_connect_by_name(name).is_ok()
    }

    /// Rediscover, look up a label and connect to it
    pub fn try_connect_by_name(&mut self, name: &str) -> Result<(), ConnectError> {
        self.discover();
        let index = self
            .find_by_name(name)
            .ok_or_else(|| ConnectError::UnknownDevice(name.to_string()))?;
        self.try_connect(index)
    }

    /// Read one batch; empty when closed, on timeout, or after a failure
    pub fn read_batch(&mut self) -> Vec<u8> {
        self.channel.read_batch(&mut self.connection)
    }

    /// Sticky read failure flag of the current connection
    ///
    /// Cleared when that connection goes away: on `close` and when a connect
    /// attempt replaces it.
    pub fn has_error(&self) -> bool {
        self.channel.has_error()
    }

    /// Whether a connection is open
    pub fn is_connected(&self) -> bool {
        self.connection.is_open()
    }

    /// Close the connection if open and forget any permission attempt
    pub fn close(&mut self) {
        if self.connection.is_open() {
            info!("Closing connection");
        }
        self.connection.close();
        self.channel.rearm();
        self.gate.reset();
    }

    /// Permission state of the current attempt
    pub fn permission_state(&mut self) -> PermissionState {
        self.gate.state()
    }

    /// Abandon the current permission attempt so the next connect asks again
    pub fn reset_permission(&mut self) {
        self.gate.reset();
    }

    /// Number of permission requests issued so far
    pub fn permission_requests(&self) -> u64 {
        self.gate.requests_issued()
    }

    /// Current discovery snapshot
    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    /// The open connection
    pub fn connection(&self) -> &PortConnection {
        &self.connection
    }
}
