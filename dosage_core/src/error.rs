//! Error types for the dosage_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for dosage_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File could not be opened, read, or written
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Settings key absent from the settings file
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Unrecognized time window for a log query
    #[error("Invalid time filter: {0}")]
    InvalidFilter(String),

    /// Entry type name not one of meal, snack, correction, other
    #[error("Unknown entry type: {0}")]
    UnknownEntryType(String),

    /// Reading or amount given on the command line is out of range
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Malformed line in the log file
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
