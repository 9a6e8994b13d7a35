//! Configuration Loader
//!
//! Layers built-in defaults, an optional TOML file and `BATCH_OPS_*`
//! environment variables, then validates the merged result.

use super::error::{ConfigResult, ConfigurationError};
use super::BatchOperationsConfig;
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the TOML configuration file
pub const CONFIG_PATH_ENV: &str = "BATCH_OPS_CONFIG_PATH";

/// Prefix for environment overrides; nested keys use `__`,
/// e.g. `BATCH_OPS_WORKER_POOL__SIZE=4`
pub const ENV_PREFIX: &str = "BATCH_OPS";

#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
    use_environment: bool,
}

impl ConfigLoader {
    /// Loader reading the file named by `BATCH_OPS_CONFIG_PATH` (if set) and
    /// environment overrides
    pub fn from_env() -> Self {
        Self {
            path: std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from),
            use_environment: true,
        }
    }

    /// Loader reading an explicit file without environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            use_environment: false,
        }
    }

    pub fn with_environment(mut self, enabled: bool) -> Self {
        self.use_environment = enabled;
        self
    }

    pub fn load(&self) -> ConfigResult<BatchOperationsConfig> {
        let defaults = Config::try_from(&BatchOperationsConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = &self.path {
            if !path.exists() {
                return Err(ConfigurationError::ConfigFileNotFound {
                    path: path.display().to_string(),
                });
            }
            debug!(path = %path.display(), "Loading batch operations configuration file");
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
        }

        if self.use_environment {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: BatchOperationsConfig = builder
            .build()?
            .try_deserialize()
            .map_err(|e| ConfigurationError::DeserializationError {
                error: e.to_string(),
            })?;

        config.validate()?;

        debug!(
            worker_pool_size = config.worker_pool.size,
            throttle_delay_ms = config.throttle.delay_ms,
            tenant = %config.topics.tenant_token,
            "Batch operations configuration loaded"
        );

        Ok(config)
    }
}
