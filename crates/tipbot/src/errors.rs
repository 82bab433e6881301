//! Error types for the tipbot crate.
//!
//! Errors owned by a single module live next to it: [`crate::platform::PlatformError`],
//! [`crate::generator::GenerationError`] and [`crate::filter::Rejection`]. This
//! module holds the errors that cross module boundaries.

use thiserror::Error;

/// History store failures. Always fatal for the current run.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to prepare database path '{path}': {reason}")]
    Io { path: String, reason: String },

    #[error("History store lock poisoned")]
    LockPoisoned,

    #[error("A success record with hash {content_hash} already exists")]
    DuplicateSuccess { content_hash: String },

    #[error("Invalid record in history store: {reason}")]
    InvalidRecord { reason: String },
}

/// Configuration and setup failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse config file '{path}': {reason}")]
    Parse { path: String, reason: String },

    #[error("Invalid configuration value for '{key}': {reason}")]
    Invalid { key: String, reason: String },

    #[error("Missing environment variable {name}")]
    MissingEnv { name: &'static str },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for history store operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;
