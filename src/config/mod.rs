//! Driver configuration

use crate::core::session::Timeouts;
use crate::core::transport::SerialConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "paxlink", "paxlink")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Driver configuration: serial link settings plus exchange timeouts
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DriverConfig {
    /// Serial link settings
    pub serial: SerialConfig,
    /// Exchange timeouts
    pub timeouts: TimeoutSettings,
}

impl DriverConfig {
    /// Load config from the platform config directory, falling back to
    /// defaults when no file exists
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        match config_dir() {
            Some(dir) => Self::load_from(&dir.join("config.toml")),
            None => Ok(Self::default()),
        }
    }

    /// Load config from a specific file
    pub fn load_from(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the platform config directory
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let dir = config_dir().ok_or("could not determine config directory")?;
        std::fs::create_dir_all(&dir)?;
        let content = toml::to_string_pretty(self)?;
        std::fs::write(dir.join("config.toml"), content)?;
        Ok(())
    }
}

/// Timeout settings in milliseconds, convertible into [`Timeouts`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeoutSettings {
    /// Wait for an ACK or sync response
    pub protocol_ms: u64,
    /// Wait for a sale/refund response
    pub transaction_ms: u64,
    /// Sleep between polls of the receive queue
    pub poll_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        let defaults = Timeouts::default();
        Self {
            protocol_ms: defaults.protocol.as_millis() as u64,
            transaction_ms: defaults.transaction.as_millis() as u64,
            poll_ms: defaults.poll.as_millis() as u64,
        }
    }
}

impl From<TimeoutSettings> for Timeouts {
    fn from(settings: TimeoutSettings) -> Self {
        Self {
            protocol: Duration::from_millis(settings.protocol_ms),
            transaction: Duration::from_millis(settings.transaction_ms),
            poll: Duration::from_millis(settings.poll_ms),
        }
    }
}
