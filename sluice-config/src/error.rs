// Error types for settings loading

use thiserror::Error;

/// Errors raised while loading or converting settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A settings file could not be read or its format is unknown.
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    /// A settings file is not valid JSON or TOML.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// A value is out of range or inconsistent.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The merged settings do not match the settings schema.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// Underlying I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for settings operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
