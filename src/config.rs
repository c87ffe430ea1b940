//! Configuration types for Tapedeck

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Result, TapedeckError};

/// Operating mode of a recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Perform live calls and capture them into the cassette
    Recording,
    /// Serve captured interactions without touching the network
    Replaying,
}

impl Mode {
    /// Check if mode is Recording
    #[must_use]
    pub fn is_recording(&self) -> bool {
        matches!(self, Mode::Recording)
    }

    /// Check if mode is Replaying
    #[must_use]
    pub fn is_replaying(&self) -> bool {
        matches!(self, Mode::Replaying)
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Operating mode
    pub mode: Mode,
    /// Directory fixture names are resolved against
    #[serde(default)]
    pub cassette_dir: PathBuf,
    /// Settings for the direct HTTP transport
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Direct transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Seconds an idle pooled connection is kept
    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout_secs: u64,
    /// Maximum idle pooled connections per host
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,
}

fn default_pool_idle_timeout() -> u64 {
    90
}

fn default_pool_max_idle() -> usize {
    10
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            pool_idle_timeout_secs: default_pool_idle_timeout(),
            pool_max_idle_per_host: default_pool_max_idle(),
        }
    }
}

impl Config {
    /// Create a configuration for the given mode with default settings
    #[must_use]
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            cassette_dir: PathBuf::new(),
            transport: TransportConfig::default(),
        }
    }

    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TapedeckError::Config(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| TapedeckError::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.cassette_dir.is_file() {
            return Err(TapedeckError::Config(format!(
                "Cassette directory is a file: {}",
                self.cassette_dir.display()
            )));
        }

        if self.transport.pool_idle_timeout_secs == 0 {
            return Err(TapedeckError::Config(
                "transport.pool_idle_timeout_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve a fixture name against the cassette directory
    #[must_use]
    pub fn cassette_name(&self, name: &str) -> String {
        if self.cassette_dir.as_os_str().is_empty() {
            name.to_string()
        } else {
            self.cassette_dir.join(name).to_string_lossy().into_owned()
        }
    }
}
