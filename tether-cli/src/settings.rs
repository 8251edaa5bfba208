//! Application settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_native::ScannerConfig;
use tether_sim::VirtualDevice;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors loading or saving the settings file
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not determine settings path")]
    NoConfigDir,

    #[error("settings I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Host port scanning
    #[serde(default)]
    pub scanner: ScannerConfig,
    /// Pause between empty reads in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Pause between connect attempts while permission is pending
    #[serde(default = "default_connect_retry_ms")]
    pub connect_retry_ms: u64,
    /// Connect attempts before giving up on a pending permission
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// Device label to monitor when none is given on the command line
    #[serde(default)]
    pub preferred_device: Option<String>,
    /// Print received bytes as hex
    #[serde(default)]
    pub show_hex: bool,
    /// Virtual devices used with `--simulate`
    #[serde(default = "default_virtual_devices")]
    pub virtual_devices: Vec<VirtualDevice>,
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_connect_retry_ms() -> u64 {
    500
}

fn default_connect_attempts() -> u32 {
    20
}

fn default_virtual_devices() -> Vec<VirtualDevice> {
    vec![
        VirtualDevice::cdc_acm("Uno").banner("tether: simulated CDC-ACM device\n"),
        VirtualDevice::ftdi("FT2232H")
            .ports(2)
            .serial("SIM0001")
            .banner("tether: simulated FTDI port\n"),
    ]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scanner: ScannerConfig::default(),
            poll_interval_ms: default_poll_interval_ms(),
            connect_retry_ms: default_connect_retry_ms(),
            connect_attempts: default_connect_attempts(),
            preferred_device: None,
            show_hex: false,
            virtual_devices: default_virtual_devices(),
        }
    }
}

impl Settings {
    /// Get the XDG config directory for tether
    /// Uses $XDG_CONFIG_HOME/tether on Linux/macOS, falls back to ~/.config/tether
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("tether"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("tether"))
    }

    /// Get the default settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from the default location, falling back to defaults
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_or_default(&path),
            None => Self::default(),
        }
    }

    /// Load settings from `path`, falling back to defaults
    ///
    /// A missing file is normal; an unreadable or malformed one is logged.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Self::default();
        }
        Self::load_from(path).unwrap_or_else(|e| {
            warn!("Ignoring settings at {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Load settings from `path`
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Save settings to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_retry(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }
}
