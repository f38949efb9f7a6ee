//! Error types for the firmware rules crate.
//!
//! [`RuleError`] covers loading and compiling the rule document. [`ClauseError`]
//! describes a malformed clause inside a version range expression; those are logged
//! by the matcher and make the expression fail closed rather than propagating.

use std::io;
use thiserror::Error;

/// Errors that can occur while loading the firmware rule document.
#[derive(Error, Debug)]
pub enum RuleError {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The working rule file could not be read or parsed.
    #[error("Rule file {path} is corrupt: {reason}")]
    RuleFileCorrupt { path: String, reason: String },

    /// The defaults could not be used to recreate the working rule file.
    #[error("Default rules unavailable at {path}: {reason}")]
    DefaultsUnavailable { path: String, reason: String },

    /// A family function could not be compiled.
    #[error("Invalid function '{slot}' for {family}: {reason}")]
    InvalidFunction {
        family: String,
        slot: String,
        reason: String,
    },
}

/// Errors in a single clause of a version range expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClauseError {
    /// The clause is empty, e.g. a trailing comma.
    #[error("Empty clause")]
    Empty,

    /// An operator with nothing to compare against.
    #[error("No value to compare in version check '{0}'")]
    MissingValue(String),

    /// The operator is not one of `<=`, `>=`, `!=`, `>`, `<`, `=`.
    #[error("Unknown logical operation '{operator}' in version check '{clause}'")]
    UnknownOperator { operator: String, clause: String },

    /// The value could not be parsed in the family's comparison mode.
    #[error("Could not parse '{0}' in version check")]
    UnparseableValue(String),
}

impl RuleError {
    /// Check if this error came from the working rule file rather than the defaults
    pub fn is_corrupt_rule_file(&self) -> bool {
        matches!(self, RuleError::RuleFileCorrupt { .. })
    }
}

/// Result type alias for rule loading operations.
pub type RuleResult<T> = Result<T, RuleError>;
