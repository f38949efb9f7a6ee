//! Error types for the settings crate.
//!
//! This module provides structured error types for checker configuration and for
//! persistence of the current firmware result.

use std::io;
use thiserror::Error;

/// Errors related to checker configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    /// The configuration file format is not supported.
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
}

impl ConfigError {
    /// Check if the error is a validation failure rather than an I/O or format problem
    pub fn is_invalid_setting(&self) -> bool {
        matches!(self, ConfigError::InvalidSetting { .. })
    }
}

/// Errors related to persisting the current firmware result.
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error during persistence.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON error during persistence.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type alias for persistence operations.
pub type StoreResult<T> = Result<T, StoreError>;
