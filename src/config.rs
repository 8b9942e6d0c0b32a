//! Controller configuration.
//!
//! Loaded from a JSON file by the simulator. Every field has a default, so
//! a partial file only overrides what it names.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::Mode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Mode after boot and after a watchdog reinitialisation.
    pub boot_mode: Mode,
    /// Control cycle period (milliseconds)
    pub cycle_period_ms: u64,
    /// Time without acknowledgement before the watchdog fires (milliseconds)
    pub watchdog_timeout_ms: u64,
    /// JSON file for persisted counters; volatile counters when unset
    pub counters_path: Option<PathBuf>,
    /// Simulator: TCP port of the serial line
    pub serial_port: u16,
    /// Simulator: TCP port of the input panel
    pub panel_port: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            boot_mode: Mode::Manual,
            cycle_period_ms: 10,
            watchdog_timeout_ms: 2000,
            counters_path: None,
            serial_port: 8080,
            panel_port: 8081,
        }
    }
}

impl ControllerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle_period_ms == 0 {
            return Err(ConfigError::Invalid("cycle_period_ms must be non-zero"));
        }
        if self.watchdog_timeout_ms == 0 {
            return Err(ConfigError::Invalid("watchdog_timeout_ms must be non-zero"));
        }
        if self.watchdog_timeout_ms <= self.cycle_period_ms {
            return Err(ConfigError::Invalid(
                "watchdog_timeout_ms must exceed cycle_period_ms",
            ));
        }
        Ok(())
    }

    pub fn cycle_period(&self) -> Duration {
        Duration::from_millis(self.cycle_period_ms)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }
}
