//! Controller configuration.
//!
//! Stored in TOML at `~/.config/seedferry/config.toml` (or XDG equivalent).
//!
//! ```toml
//! remote_scan_interval_ms = 30000
//! local_scan_interval_ms = 10000
//! active_scan_interval_ms = 1000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors when loading or saving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Validation error: {0}")]
    Validation(String),
}

fn default_remote_scan_interval_ms() -> u64 {
    30_000
}

fn default_local_scan_interval_ms() -> u64 {
    10_000
}

fn default_active_scan_interval_ms() -> u64 {
    1_000
}

/// Scan cadences for the three scanner workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// How often the remote listing is refreshed.
    #[serde(default = "default_remote_scan_interval_ms")]
    pub remote_scan_interval_ms: u64,

    /// How often the local listing is refreshed.
    #[serde(default = "default_local_scan_interval_ms")]
    pub local_scan_interval_ms: u64,

    /// How often in-flight files are sampled for progress.
    #[serde(default = "default_active_scan_interval_ms")]
    pub active_scan_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote_scan_interval_ms: default_remote_scan_interval_ms(),
            local_scan_interval_ms: default_local_scan_interval_ms(),
            active_scan_interval_ms: default_active_scan_interval_ms(),
        }
    }
}

impl Config {
    /// Load from the default location; a missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from a specific path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a specific path, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default config file path, honoring `XDG_CONFIG_HOME`.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config).join("seedferry").join("config.toml"));
        }
        dirs::config_dir()
            .map(|p| p.join("seedferry").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("remote_scan_interval_ms", self.remote_scan_interval_ms),
            ("local_scan_interval_ms", self.local_scan_interval_ms),
            ("active_scan_interval_ms", self.active_scan_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }

    pub fn remote_scan_interval(&self) -> Duration {
        Duration::from_millis(self.remote_scan_interval_ms)
    }

    pub fn local_scan_interval(&self) -> Duration {
        Duration::from_millis(self.local_scan_interval_ms)
    }

    pub fn active_scan_interval(&self) -> Duration {
        Duration::from_millis(self.active_scan_interval_ms)
    }
}
