//! Transport error types.

use std::time::Duration;
use thiserror::Error;

/// Result type for transport setup operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors raised while building or configuring the transport.
///
/// These fail fast at call time. Failures of an individual request never
/// surface through this type; they are reported on the
/// [`ResponseEnvelope`](crate::ResponseEnvelope) instead.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Request body serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Sniffing could not refresh the node list.
    #[error("Sniff failed: {0}")]
    Sniff(String),
}

/// Failure of a single call against a single node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The node refused or could not establish the connection (includes DNS failures).
    #[error("Connection error: {0}")]
    Connect(String),

    /// The call did not complete within the per-request timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The connection broke while sending or receiving.
    #[error("I/O error: {0}")]
    Io(String),

    /// The request could not be issued at all.
    #[error("Request error: {0}")]
    Other(String),
}

impl ConnectionError {
    /// Whether the failure points at the node rather than the request.
    ///
    /// Node faults mark the node dead and are candidates for retrying elsewhere.
    pub fn is_node_fault(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout(_) | Self::Io(_))
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this is a connection error.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connect(_))
    }
}

impl From<reqwest::Error> for ConnectionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            // reqwest does not report the configured duration
            Self::Timeout(Duration::ZERO)
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_request() || e.is_body() || e.is_decode() {
            Self::Io(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

/// Terminal failure attached to an invalid [`ResponseEnvelope`](crate::ResponseEnvelope).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineFailure {
    /// Every allowed attempt failed with a retryable outcome.
    #[error("Request failed after {attempts} attempts: {last}")]
    MaxRetriesExceeded {
        /// Number of attempts made.
        attempts: u32,
        /// Description of the last failure.
        last: String,
    },

    /// The overall retry time budget ran out.
    #[error("Maximum retry time of {0:?} exceeded")]
    MaxRetryTimeExceeded(Duration),

    /// The pool had no node left to try.
    #[error("No live nodes available ({dead} dead)")]
    NoLiveNodes {
        /// Number of nodes marked dead when selection gave up.
        dead: usize,
    },

    /// The cluster rejected the credentials.
    #[error("Authentication failed with status {status}")]
    Authentication {
        /// HTTP status code (401 or 403).
        status: u16,
    },

    /// The cluster answered with a status that is not retried.
    #[error("Response error: {status} - {message}")]
    BadResponse {
        /// HTTP status code.
        status: u16,
        /// Error reason extracted from the body, if any.
        message: String,
    },

    /// A transport failure that is not retried.
    #[error("Transport error: {0}")]
    Transport(ConnectionError),
}

impl PipelineFailure {
    /// Whether the failure came from cluster availability rather than the request itself.
    ///
    /// Callers batching work (the bulk coordinator) may try the same request
    /// again later when this returns `true`.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::MaxRetriesExceeded { .. } | Self::MaxRetryTimeExceeded(_) | Self::NoLiveNodes { .. }
        )
    }

    /// Get the HTTP status code if the failure carries one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Authentication { status } | Self::BadResponse { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_fault_classification() {
        assert!(ConnectionError::Connect("refused".into()).is_node_fault());
        assert!(ConnectionError::Timeout(Duration::from_secs(1)).is_node_fault());
        assert!(ConnectionError::Io("reset".into()).is_node_fault());
        assert!(!ConnectionError::Other("bad header".into()).is_node_fault());
    }

    #[test]
    fn test_transient_failures() {
        assert!(PipelineFailure::NoLiveNodes { dead: 3 }.is_transient());
        assert!(
            PipelineFailure::MaxRetriesExceeded {
                attempts: 4,
                last: "503".into()
            }
            .is_transient()
        );
        assert!(!PipelineFailure::Authentication { status: 401 }.is_transient());
        assert_eq!(
            PipelineFailure::BadResponse {
                status: 400,
                message: String::new()
            }
            .status_code(),
            Some(400)
        );
    }
}
