//! Configuration Error Types
//!
//! Errors raised while loading or validating the engine configuration. All of
//! them surface before any batch or job is created.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Chunk size outside `1..=max`, both for the global default and per-request overrides
    #[error("chunk size should be between 1 and {max}, got {value}")]
    ChunkSizeOutOfRange { value: i64, max: u32 },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// Source file could not be read or parsed
    #[error("Failed to load configuration from '{source_name}': {error}")]
    LoadError { source_name: String, error: String },

    /// Merged configuration did not match the expected shape
    #[error("Failed to deserialize configuration: {0}")]
    DeserializeError(String),
}

impl ConfigurationError {
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }

    pub fn load_error(source_name: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::LoadError {
            source_name: source_name.into(),
            error: error.to_string(),
        }
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(err: config::ConfigError) -> Self {
        ConfigurationError::DeserializeError(err.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
