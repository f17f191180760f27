//! Configuration Loader
//!
//! Layers defaults, an optional file, and environment overrides using the
//! `config` crate, then validates the result.

use super::error::ConfigResult;
use super::SchedulerConfig;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Environment variable prefix for overrides, e.g. `ESTIMATION__STREAMING__BATCH_SIZE`
pub const ENV_PREFIX: &str = "ESTIMATION";

#[derive(Debug)]
pub struct ConfigManager {
    config: SchedulerConfig,
}

impl ConfigManager {
    /// Load configuration, reading `path` if it is given and exists
    pub fn load_from(path: Option<&Path>) -> ConfigResult<Arc<ConfigManager>> {
        let defaults = config::Config::try_from(&SchedulerConfig::default())?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading scheduler configuration file");
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: SchedulerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            batch_size = config.streaming.batch_size,
            idle_backoff_ms = config.streaming.idle_backoff_ms,
            ledger_root = %config.ledger.root.display(),
            continue_run = config.continue_run,
            "Scheduler configuration loaded"
        );

        Ok(Arc::new(ConfigManager { config }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: SchedulerConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager { config }))
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }
}
