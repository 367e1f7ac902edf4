//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered in this order,
//! later sources overriding earlier ones:
//!
//! 1. compiled-in defaults ([`RetentionConfig::default`])
//! 2. `<config_dir>/tasker-retention.yaml`
//! 3. `<config_dir>/tasker-retention.<environment>.yaml`
//! 4. `TASKER_RETENTION__<SECTION>__<KEY>` environment variables
//!
//! The merged result is validated before a [`ConfigManager`] is handed out.

use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::RetentionConfig;

const BASE_FILE_STEM: &str = "tasker-retention";
const ENV_PREFIX: &str = "TASKER_RETENTION";
const ENV_SEPARATOR: &str = "__";

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: Arc<RetentionConfig>,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for tests that must not touch process-wide environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let env_source = Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true);
        Self::load_with_sources(config_dir, environment, env_source)
    }

    fn load_with_sources(
        config_dir: Option<PathBuf>,
        environment: &str,
        env_source: Environment,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = %environment,
            config_directory = %config_directory.display(),
            "Loading retention configuration"
        );

        let config = Self::load_and_merge_config(&config_directory, environment, env_source)?;
        config.validate()?;

        info!(
            environment = %environment,
            chunk_size = config.batch.removal_time_update_chunk_size,
            invocations_per_batch_job = config.batch.invocations_per_batch_job,
            removal_time_strategy = %config.history.removal_time_strategy,
            worker_concurrency = config.worker.concurrency,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config: Arc::new(config),
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already built snapshot, validating it first
    pub fn from_config(config: RetentionConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config: Arc::new(config),
            environment: Self::detect_environment(),
            config_directory: PathBuf::from("config"),
        }))
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Shared snapshot handed to engine components
    pub fn snapshot(&self) -> Arc<RetentionConfig> {
        Arc::clone(&self.config)
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// TASKER_ENV || APP_ENV || 'development'
    pub fn detect_environment() -> String {
        env::var("TASKER_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
        env_source: Environment,
    ) -> ConfigResult<RetentionConfig> {
        let defaults = Config::try_from(&RetentionConfig::default())
            .map_err(|e| ConfigurationError::load_error("defaults", e))?;

        let base_file = config_directory.join(format!("{BASE_FILE_STEM}.yaml"));
        let env_file = config_directory.join(format!("{BASE_FILE_STEM}.{environment}.yaml"));

        for path in [&base_file, &env_file] {
            if path.exists() {
                debug!(file = %path.display(), "Applying configuration file");
            }
        }

        let merged = Config::builder()
            .add_source(defaults)
            .add_source(File::from(base_file.clone()).required(false))
            .add_source(File::from(env_file.clone()).required(false))
            .add_source(env_source)
            .build()
            .map_err(|e| {
                ConfigurationError::load_error(config_directory.display().to_string(), e)
            })?;

        Ok(merged.try_deserialize::<RetentionConfig>()?)
    }
}
