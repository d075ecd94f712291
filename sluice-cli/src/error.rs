//! Error types for the Sluice CLI.

use std::fmt;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types.
#[derive(Debug)]
pub enum CliError {
    /// IO error (input files, terminal)
    Io(std::io::Error),

    /// Settings could not be loaded or are invalid
    Config(String),

    /// Invalid argument
    InvalidArgument(String),

    /// A request came back invalid; carries the diagnostic report
    Request(String),

    /// Transport setup or sniffing failed
    Transport(String),

    /// A bulk run stopped before completing
    Bulk(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Io(e) => write!(f, "IO error: {}", e),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::Request(report) => write!(f, "Request failed\n{}", report),
            CliError::Transport(msg) => write!(f, "Transport error: {}", msg),
            CliError::Bulk(msg) => write!(f, "Bulk run failed: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<sluice_config::ConfigError> for CliError {
    fn from(e: sluice_config::ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<sluice_transport::TransportError> for CliError {
    fn from(e: sluice_transport::TransportError) -> Self {
        CliError::Transport(e.to_string())
    }
}

impl From<sluice_bulk::BulkError> for CliError {
    fn from(e: sluice_bulk::BulkError) -> Self {
        CliError::InvalidArgument(e.to_string())
    }
}

impl From<sluice_bulk::BulkAllError> for CliError {
    fn from(e: sluice_bulk::BulkAllError) -> Self {
        CliError::Bulk(e.to_string())
    }
}
