//! Operator configuration (narthex.toml).
//!
//! Deployment settings only: database path, log filter, sweep cadence.
//! Per-community admission policy (`CommunityConfig`) lives in the store and
//! is managed by the embedding product, not by the operator file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::CliError;

const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_SWEEP_INTERVAL: &str = "5m";

/// Operator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarthexConfig {
    /// Path to the SQLite database.
    #[serde(default = "default_database")]
    pub database: PathBuf,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub sweep: SweepConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Tracing filter (overridden by RUST_LOG when set).
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Interval between sweep passes in watch mode (humantime syntax).
    #[serde(default = "default_sweep_interval")]
    pub interval: String,
}

fn default_database() -> PathBuf {
    PathBuf::from("narthex.db")
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

fn default_sweep_interval() -> String {
    DEFAULT_SWEEP_INTERVAL.to_string()
}

impl Default for NarthexConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            logging: LoggingConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: default_sweep_interval(),
        }
    }
}

impl NarthexConfig {
    /// Load the config, writing a default file on first run.
    pub fn load_or_default(path: &Path) -> Result<Self, CliError> {
        if !path.exists() {
            let config = Self::default();
            let rendered = toml::to_string_pretty(&config)
                .map_err(|e| CliError::Config(e.to_string()))?;
            fs::write(path, rendered)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| CliError::Config(e.to_string()))
    }

    /// Parsed sweep interval.
    pub fn sweep_interval(&self) -> Result<Duration, CliError> {
        humantime::parse_duration(&self.sweep.interval)
            .map_err(|e| CliError::Config(format!("invalid sweep interval: {}", e)))
    }
}
