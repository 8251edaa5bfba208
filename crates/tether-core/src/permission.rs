//! Access permission state machine
//!
//! Opening a device may require a permission the platform grants
//! asynchronously (a user prompt, a policy daemon). The gate issues at most
//! one request per attempt and learns the answer from an event channel that
//! the platform feeds through a [`PermissionCallback`]. The answer is never
//! awaited; callers retry the connect after it arrives.

use std::sync::mpsc::{self, Receiver, Sender};

use tracing::{debug, info, warn};

use crate::platform::{DeviceId, PermissionCallback, PermissionEvent, UsbDevice, UsbPlatform};

/// Permission state for the device of the current connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionState {
    /// Nothing is known yet and no request has been issued
    #[default]
    Unknown,
    /// A request is in flight
    Requested { device: DeviceId },
    /// The platform granted access
    Granted { device: DeviceId },
    /// The platform refused access
    Denied { device: DeviceId },
}

impl PermissionState {
    /// Device the state refers to, if any
    pub fn device(&self) -> Option<DeviceId> {
        match *self {
            PermissionState::Unknown => None,
            PermissionState::Requested { device }
            | PermissionState::Granted { device }
            | PermissionState::Denied { device } => Some(device),
        }
    }

    /// Unknown -> Requested. Every other state refuses to issue a request.
    fn begin_request(self, device: DeviceId) -> Option<PermissionState> {
        match self {
            PermissionState::Unknown => Some(PermissionState::Requested { device }),
            _ => None,
        }
    }

    /// Requested -> Granted | Denied for an answer about the requested device
    fn resolve(self, event: &PermissionEvent) -> PermissionState {
        match self {
            PermissionState::Requested { device } if device == event.device => {
                if event.granted {
                    PermissionState::Granted { device }
                } else {
                    PermissionState::Denied { device }
                }
            }
            other => other,
        }
    }
}

/// Outcome of [`PermissionGate::ensure_access`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// Access is held now
    Granted,
    /// A request is pending; try again later
    Requested,
    /// Access was refused
    Denied,
}

/// Tracks permission for one connection attempt
#[derive(Debug)]
pub struct PermissionGate {
    state: PermissionState,
    generation: u64,
    requests_issued: u64,
    tx: Sender<PermissionEvent>,
    rx: Receiver<PermissionEvent>,
}

impl PermissionGate {
    /// Create a gate in the Unknown state
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            state: PermissionState::Unknown,
            generation: 0,
            requests_issued: 0,
            tx,
            rx,
        }
    }

    /// Current state, after applying any answers that have arrived
    pub fn state(&mut self) -> PermissionState {
        self.poll_events();
        self.state
    }

    /// Total number of platform requests this gate has issued
    pub fn requests_issued(&self) -> u64 {
        self.requests_issued
    }

    /// Decide whether `device` may be opened, requesting permission if needed
    pub fn ensure_access<P: UsbPlatform + ?Sized>(
        &mut self,
        platform: &mut P,
        device: &UsbDevice,
    ) -> AccessDecision {
        self.poll_events();

        if let Some(current) = self.state.device() {
            if current != device.id {
                debug!(
                    "Permission target changed from {} to {}, starting over",
                    current, device.id
                );
                self.reset();
            }
        }

        if platform.has_permission(device) {
            self.state = PermissionState::Granted { device: device.id };
            return AccessDecision::Granted;
        }

        match self.state {
            PermissionState::Unknown => self.issue_request(platform, device),
            PermissionState::Requested { .. } => {
                debug!("Permission for {} still pending", device);
                AccessDecision::Requested
            }
            PermissionState::Granted { .. } => {
                warn!("Permission for {} was granted but is no longer held", device);
                self.state = PermissionState::Denied { device: device.id };
                AccessDecision::Denied
            }
            PermissionState::Denied { .. } => {
                warn!("Permission denied for {}", device);
                AccessDecision::Denied
            }
        }
    }

    fn issue_request<P: UsbPlatform + ?Sized>(
        &mut self,
        platform: &mut P,
        device: &UsbDevice,
    ) -> AccessDecision {
        let Some(next) = self.state.begin_request(device.id) else {
            return AccessDecision::Requested;
        };
        self.state = next;
        self.generation += 1;
        self.requests_issued += 1;
        info!("Requesting permission for {}", device);
        let callback = PermissionCallback::new(device.id, self.generation, self.tx.clone());
        platform.request_permission(device, callback);

        // Platforms without a prompt answer before returning
        self.poll_events();
        match self.state {
            PermissionState::Denied { .. } => {
                warn!("Permission denied for {}", device);
                AccessDecision::Denied
            }
            // A synchronous grant still needs a fresh open from the caller
            _ => AccessDecision::Requested,
        }
    }

    /// Start a fresh attempt: back to Unknown, late answers are ignored
    pub fn reset(&mut self) {
        self.poll_events();
        self.state = PermissionState::Unknown;
        // Answers to earlier requests carry an older generation and are dropped.
        self.generation += 1;
    }

    fn poll_events(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            if event.generation != self.generation {
                debug!("Ignoring stale permission answer for {}", event.device);
                continue;
            }
            let next = self.state.resolve(&event);
            if next != self.state {
                info!(
                    "Permission for {} {}",
                    event.device,
                    if event.granted { "granted" } else { "denied" }
                );
                self.state = next;
            }
        }
    }
}

impl Default for PermissionGate {
    fn default() -> Self {
        Self::new()
    }
}
