//! # Retention Engine Configuration
//!
//! Immutable configuration snapshot for the batch engine. A snapshot is loaded
//! once by [`ConfigManager`], validated, and then handed to every component as an
//! `Arc<RetentionConfig>`; nothing reads configuration from ambient state.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tasker_retention::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let chunk_size = manager.config().batch.removal_time_update_chunk_size;
//! let strategy = manager.config().history.removal_time_strategy;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::{
    batch_types, DEFAULT_CHUNK_SIZE, DEFAULT_INVOCATIONS_PER_BATCH_JOB, DEFAULT_JOB_RETRIES,
};
use crate::models::{BaseTimeStrategy, BatchType, ChunkSize, TimeToLive};

/// Root configuration structure mirroring tasker-retention.yaml
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Job sizing for batch operations
    pub batch: BatchConfig,

    /// Removal time strategy and batch retention
    pub history: HistoryConfig,

    /// Worker pool settings
    pub worker: WorkerConfig,

    /// Job and batch store connection
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Root entities per execution job
    pub invocations_per_batch_job: u32,
    /// Per batch type override of `invocations_per_batch_job`
    pub invocations_per_batch_job_by_batch_type: HashMap<String, u32>,
    /// Default row limit for chunked updates; kept signed so that bad values
    /// reach validation instead of failing deserialization
    pub removal_time_update_chunk_size: i64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            invocations_per_batch_job: DEFAULT_INVOCATIONS_PER_BATCH_JOB,
            invocations_per_batch_job_by_batch_type: HashMap::new(),
            removal_time_update_chunk_size: i64::from(DEFAULT_CHUNK_SIZE),
        }
    }
}

impl BatchConfig {
    /// Validated default chunk size
    pub fn chunk_size(&self) -> Result<ChunkSize, ConfigurationError> {
        ChunkSize::new(self.removal_time_update_chunk_size)
    }

    /// Unit-of-work size for a batch type, honoring the per-type override
    pub fn invocations_per_batch_job_for(&self, batch_type: BatchType) -> u32 {
        self.invocations_per_batch_job_by_batch_type
            .get(batch_type.as_str())
            .copied()
            .unwrap_or(self.invocations_per_batch_job)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Base time for calculated removal times
    pub removal_time_strategy: BaseTimeStrategy,
    /// Fallback time to live for historic batches of any type
    pub batch_operation_history_time_to_live: Option<TimeToLive>,
    /// Time to live per batch type, keyed by batch type tag
    pub batch_operations_for_history_cleanup: HashMap<String, TimeToLive>,
    /// Whether authorization rows follow their historic instance
    pub enable_historic_instance_permissions: bool,
}

impl HistoryConfig {
    /// Time to live applied to historic batches of the given type tag
    pub fn batch_time_to_live(&self, batch_type: &str) -> Option<TimeToLive> {
        self.batch_operations_for_history_cleanup
            .get(batch_type)
            .copied()
            .or(self.batch_operation_history_time_to_live)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Concurrent job attempts per pool
    pub concurrency: usize,
    /// Attempts per job before it is parked as failed
    pub max_retries: u32,
    /// Idle wait between empty polls
    pub poll_interval_ms: u64,
    /// Lease on a claimed job; an expired lease makes the job claimable again
    pub lock_time_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: DEFAULT_JOB_RETRIES,
            poll_interval_ms: 250,
            lock_time_ms: 300_000,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lock_time(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.lock_time_ms).unwrap_or(i64::MAX))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            acquire_timeout_seconds: 30,
        }
    }
}

impl RetentionConfig {
    /// Reject values the engine cannot run with.
    ///
    /// Unknown batch type keys in the invocation overrides are logged and ignored.
    pub fn validate(&self) -> ConfigResult<()> {
        self.batch.chunk_size()?;

        if self.batch.invocations_per_batch_job == 0 {
            return Err(ConfigurationError::invalid_value(
                "batch.invocations_per_batch_job",
                "0",
                "must be at least 1",
            ));
        }

        for (batch_type, invocations) in &self.batch.invocations_per_batch_job_by_batch_type {
            if !batch_types::ALL.contains(&batch_type.as_str()) {
                warn!(
                    batch_type = %batch_type,
                    "Ignoring invocations_per_batch_job override for unknown batch type"
                );
                continue;
            }
            if *invocations == 0 {
                return Err(ConfigurationError::invalid_value(
                    format!("batch.invocations_per_batch_job_by_batch_type.{batch_type}"),
                    "0",
                    "must be at least 1",
                ));
            }
        }

        if self.worker.concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.concurrency",
                "0",
                "must be at least 1",
            ));
        }

        if self.worker.max_retries == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.max_retries",
                "0",
                "a job needs at least one attempt",
            ));
        }

        if self.worker.lock_time_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.lock_time_ms",
                "0",
                "a claimed job needs a lease",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_CHUNK_SIZE;

    #[test]
    fn test_defaults_are_valid() {
        let config = RetentionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch.invocations_per_batch_job, 1);
        assert_eq!(config.batch.chunk_size().unwrap().get(), MAX_CHUNK_SIZE);
        assert_eq!(config.history.removal_time_strategy, BaseTimeStrategy::End);
        assert!(!config.history.enable_historic_instance_permissions);
    }

    #[test]
    fn test_global_chunk_size_rejected() {
        for invalid in [0, -5, i64::from(MAX_CHUNK_SIZE) + 5] {
            let mut config = RetentionConfig::default();
            config.batch.removal_time_update_chunk_size = invalid;

            let err = config.validate().unwrap_err();
            assert!(
                err.to_string().contains("chunk size should be between 1 and"),
                "unexpected error for {invalid}: {err}"
            );
        }
    }

    #[test]
    fn test_invocations_override() {
        let mut config = RetentionConfig::default();
        config.batch.invocations_per_batch_job = 5;
        config
            .batch
            .invocations_per_batch_job_by_batch_type
            .insert("decision-set-removal-time".to_string(), 20);
        config
            .batch
            .invocations_per_batch_job_by_batch_type
            .insert("unknown-type".to_string(), 7);

        assert!(config.validate().is_ok());
        assert_eq!(
            config
                .batch
                .invocations_per_batch_job_for(BatchType::DecisionSetRemovalTime),
            20
        );
        assert_eq!(
            config
                .batch
                .invocations_per_batch_job_for(BatchType::ProcessSetRemovalTime),
            5
        );
    }

    #[test]
    fn test_batch_time_to_live_lookup() {
        let mut history = HistoryConfig {
            batch_operation_history_time_to_live: Some(TimeToLive::days(10)),
            ..Default::default()
        };
        history.batch_operations_for_history_cleanup.insert(
            "process-set-removal-time".to_string(),
            TimeToLive::days(2),
        );

        assert_eq!(
            history.batch_time_to_live("process-set-removal-time"),
            Some(TimeToLive::days(2))
        );
        assert_eq!(
            history.batch_time_to_live("instance-migration"),
            Some(TimeToLive::days(10))
        );
    }

    #[test]
    fn test_zero_retries_rejected() {
        let mut config = RetentionConfig::default();
        config.worker.max_retries = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_zero_lock_time_rejected() {
        let mut config = RetentionConfig::default();
        config.worker.lock_time_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("worker.lock_time_ms"), "{err}");
        assert_eq!(RetentionConfig::default().worker.lock_time(), chrono::Duration::minutes(5));
    }
}
