//! # Scheduler Configuration
//!
//! Layered configuration for one scheduler run.
//!
//! ## Sources
//!
//! 1. Built-in defaults ([`SchedulerConfig::default`])
//! 2. An optional TOML or YAML file
//! 3. `ESTIMATION__<SECTION>__<FIELD>` environment overrides
//!
//! ## Usage
//!
//! ```rust,no_run
//! use estimation_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load_from(Some("config/estimation.toml".as_ref()))?;
//! let batch_size = manager.config().streaming.batch_size;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Streaming loop behaviour
    pub streaming: StreamingConfig,

    /// Durable ledger layout
    pub ledger: LedgerConfig,

    /// Estimation parameters common to all items
    pub estimation: EstimationSettings,

    /// Skip items whose completion marker survives from an earlier attempt
    pub continue_run: bool,
}

impl SchedulerConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.streaming.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "streaming.batch_size",
                "must be at least 1",
            ));
        }
        if self.estimation.down_factor <= 0.0 {
            return Err(ConfigurationError::invalid_value(
                "estimation.down_factor",
                format!("must be positive, got {}", self.estimation.down_factor),
            ));
        }
        if self.estimation.low_res >= self.estimation.high_res {
            return Err(ConfigurationError::invalid_value(
                "estimation.low_res",
                format!(
                    "must be below high_res ({} >= {})",
                    self.estimation.low_res, self.estimation.high_res
                ),
            ));
        }
        if self.estimation.min_defocus_um > self.estimation.max_defocus_um {
            return Err(ConfigurationError::invalid_value(
                "estimation.min_defocus_um",
                format!(
                    "must not exceed max_defocus_um ({} > {})",
                    self.estimation.min_defocus_um, self.estimation.max_defocus_um
                ),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Items per estimation unit; 1 plans one unit per item
    pub batch_size: usize,
    /// Wait hint returned when every tracked item is accounted for but the
    /// input stream is still open
    pub idle_backoff_ms: u64,
    /// Record the items of a unit whose estimation raised as failed, so the
    /// run can terminate instead of waiting on them forever
    pub mark_failed_on_error: bool,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            idle_backoff_ms: 5000,
            mark_failed_on_error: false,
        }
    }
}

impl StreamingConfig {
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Root directory of the marker namespace and id records
    pub root: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("extra"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EstimationSettings {
    /// Downsampling applied before estimation; 1.0 disables it
    pub down_factor: f64,
    pub window_size: u32,
    /// Lowest resolution considered, normalized frequency
    pub low_res: f64,
    /// Highest resolution considered, normalized frequency
    pub high_res: f64,
    pub min_defocus_um: f64,
    pub max_defocus_um: f64,
}

impl Default for EstimationSettings {
    fn default() -> Self {
        Self {
            down_factor: 1.0,
            window_size: 256,
            low_res: 0.05,
            high_res: 0.35,
            min_defocus_um: 0.25,
            max_defocus_um: 4.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.streaming.batch_size, 1);
        assert_eq!(config.streaming.idle_backoff(), Duration::from_secs(5));
        assert_eq!(config.ledger.root, PathBuf::from("extra"));
        assert!(!config.continue_run);
    }

    #[test]
    fn test_validation_rejects_zero_batch() {
        let mut config = SchedulerConfig::default();
        config.streaming.batch_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("streaming.batch_size"));
    }

    #[test]
    fn test_validation_rejects_inverted_ranges() {
        let mut config = SchedulerConfig::default();
        config.estimation.low_res = 0.5;
        assert!(config.validate().is_err());

        let mut config = SchedulerConfig::default();
        config.estimation.min_defocus_um = 5.0;
        assert!(config.validate().is_err());

        let mut config = SchedulerConfig::default();
        config.estimation.down_factor = 0.0;
        assert!(config.validate().is_err());
    }
}
