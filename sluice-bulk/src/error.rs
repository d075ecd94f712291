//! Error types for bulk operations.

use sluice_transport::PipelineFailure;
use thiserror::Error;

/// Errors raised while building operations or configuring a run.
#[derive(Error, Debug)]
pub enum BulkError {
    /// Invalid configuration value.
    #[error("Invalid bulk configuration: {0}")]
    Config(String),

    /// Document serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A raw source is not a single line of JSON.
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    /// The operation is missing a field its action requires.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Result type alias for bulk operations.
pub type Result<T> = std::result::Result<T, BulkError>;

/// Terminal condition of a bulk run that did not complete.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BulkAllError {
    /// A buffer hit a pipeline failure that retrying cannot fix.
    #[error("Bulk request for buffer {buffer} failed: {failure}")]
    Pipeline {
        /// Buffer that failed.
        buffer: u64,
        /// Pipeline failure.
        failure: PipelineFailure,
    },

    /// The cluster answered with something that is not a bulk response.
    #[error("Malformed bulk response for buffer {buffer}: {reason}")]
    Response {
        /// Buffer that failed.
        buffer: u64,
        /// What was wrong.
        reason: String,
    },

    /// An operation from the input could not be encoded.
    #[error("Could not encode operation {seq}: {reason}")]
    Encode {
        /// Input sequence number.
        seq: u64,
        /// Encoder error.
        reason: String,
    },

    /// The run was cancelled.
    #[error("Bulk run cancelled")]
    Cancelled,

    /// The run task ended without reporting an outcome.
    #[error("Bulk run aborted: {0}")]
    Aborted(String),
}

impl BulkAllError {
    /// Whether this is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
