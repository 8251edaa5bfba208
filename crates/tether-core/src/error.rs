//! Error types for the serial bridge

use thiserror::Error;

/// Errors reported by a platform USB stack
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Driver enumeration failed
    #[error("failed to enumerate devices: {0}")]
    Enumeration(String),

    /// The device could not be opened for a reason other than permission
    #[error("failed to open {device}: {reason}")]
    Open { device: String, reason: String },

    /// Line parameters or control lines could not be applied
    #[error("failed to configure port: {0}")]
    Configuration(String),

    /// The device disappeared between enumeration and use
    #[error("device {0} is no longer attached")]
    Detached(String),

    /// I/O error from the underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a connect attempt did not produce an open connection
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Index outside the current discovery snapshot
    #[error("invalid device index {index} ({count} port(s) discovered)")]
    InvalidIndex { index: usize, count: usize },

    /// No device with the given label in the current snapshot
    #[error("no device named {0:?}")]
    UnknownDevice(String),

    /// Permission was requested and the platform has not answered yet
    #[error("waiting for permission to access {0}")]
    PermissionPending(String),

    /// The platform refused access to the device
    #[error("permission denied for {0}")]
    PermissionDenied(String),

    /// The transport could not be obtained
    #[error("failed to open {device}: {reason}")]
    OpenFailed { device: String, reason: String },

    /// The transport opened but line parameters could not be applied
    #[error("failed to configure {device}: {reason}")]
    ConfigurationFailed { device: String, reason: String },
}

impl ConnectError {
    /// True when the caller should retry after the platform's permission answer
    pub fn is_pending(&self) -> bool {
        matches!(self, ConnectError::PermissionPending(_))
    }
}
