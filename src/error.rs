//! Error types for the retention batch engine.
//!
//! Configuration and request-validation failures are raised before any batch or
//! job exists. Everything else surfaces from a store round trip and is safe to
//! retry because every job attempt is idempotent.

use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigurationError;

#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Batch not found: {0}")]
    BatchNotFound(Uuid),
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Store error: {0}")]
    StoreError(String),
}

impl From<sqlx::Error> for RetentionError {
    fn from(err: sqlx::Error) -> Self {
        RetentionError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for RetentionError {
    fn from(err: serde_json::Error) -> Self {
        RetentionError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RetentionError>;

/// Errors raised while building a set-removal-time request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("selection is empty")]
    EmptySelection,
    #[error("neither query nor ids provided")]
    NoSelection,
    #[error("removal time is null")]
    NoRemovalTimeMode,
    #[error("removal time modes are mutually exclusive: {existing} already selected, cannot select {requested}")]
    ModesMutuallyExclusive {
        existing: &'static str,
        requested: &'static str,
    },
    #[error("{0}")]
    ChunkSize(String),
}

impl From<ConfigurationError> for ValidationError {
    fn from(err: ConfigurationError) -> Self {
        ValidationError::ChunkSize(err.to_string())
    }
}
