//! Responses and per-attempt records.

use crate::error::PipelineFailure;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt::Write as _;
use std::time::Duration;
use url::Url;

/// What one node answered.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl RawResponse {
    /// Create a response with no headers.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Create a `200 OK` response with a JSON body.
    pub fn json(body: &serde_json::Value) -> Self {
        Self::new(StatusCode::OK, body.to_string())
    }
}

/// How one attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 2xx answer.
    Success,
    /// Answer that is final but not successful (4xx, non-retryable 5xx).
    BadResponse,
    /// Answer with a retryable status; the node was marked dead.
    RetryableStatus,
    /// Transport failure; the node was marked dead.
    TransportError,
}

/// Record of one attempt. Immutable once recorded.
#[derive(Debug, Clone)]
pub struct RequestAttempt {
    /// Node the attempt went to.
    pub node: Url,
    /// HTTP status, when the node answered.
    pub status: Option<u16>,
    /// Wall time of the attempt.
    pub latency: Duration,
    /// Classification.
    pub outcome: AttemptOutcome,
    /// Transport error message, when the node did not answer.
    pub error: Option<String>,
    /// The node was dead and tried again.
    pub resurrected: bool,
}

/// Result of one pipeline call: the final answer plus every attempt made.
///
/// Never an error value. Callers check [`is_valid`](Self::is_valid) and read
/// [`failure`](Self::failure) for the terminal reason.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub(crate) status: Option<StatusCode>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) attempts: Vec<RequestAttempt>,
    pub(crate) failure: Option<PipelineFailure>,
    pub(crate) took: Duration,
}

impl ResponseEnvelope {
    pub(crate) fn from_response(
        response: Option<RawResponse>,
        attempts: Vec<RequestAttempt>,
        failure: Option<PipelineFailure>,
        took: Duration,
    ) -> Self {
        let (status, headers, body) = match response {
            Some(raw) => (Some(raw.status), raw.headers, raw.body),
            None => (None, HeaderMap::new(), Bytes::new()),
        };
        Self {
            status,
            headers,
            body,
            attempts,
            failure,
            took,
        }
    }

    /// Whether the call succeeded with a 2xx answer.
    pub fn is_valid(&self) -> bool {
        self.failure.is_none() && self.status.is_some_and(|s| s.is_success())
    }

    /// Final HTTP status, if any node answered.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Final status as a number.
    pub fn status_code(&self) -> Option<u16> {
        self.status.map(|s| s.as_u16())
    }

    /// Headers of the final answer.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw body of the final answer.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as text, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Every attempt, in order.
    pub fn attempts(&self) -> &[RequestAttempt] {
        &self.attempts
    }

    /// Terminal failure, if the call did not succeed.
    pub fn failure(&self) -> Option<&PipelineFailure> {
        self.failure.as_ref()
    }

    /// Wall time of the whole call including retries.
    pub fn took(&self) -> Duration {
        self.took
    }

    /// Convert into a `Result`, keeping the envelope on success.
    pub fn into_result(self) -> Result<Self, PipelineFailure> {
        match self.failure {
            Some(failure) => Err(failure),
            None => Ok(self),
        }
    }

    /// Human-readable account of the call for error reports.
    pub fn debug_information(&self) -> String {
        let mut out = String::new();
        match &self.failure {
            Some(failure) => {
                let _ = writeln!(out, "Invalid response: {}", failure);
            }
            None => {
                let _ = writeln!(out, "Valid response");
            }
        }
        if let Some(status) = self.status {
            let _ = writeln!(out, "Final status: {}", status);
        }
        let _ = writeln!(out, "Attempts ({}) in {:?}:", self.attempts.len(), self.took);
        for (i, attempt) in self.attempts.iter().enumerate() {
            let _ = write!(
                out,
                "  [{}] {} {:?} after {:?}",
                i + 1,
                attempt.node,
                attempt.outcome,
                attempt.latency
            );
            if let Some(status) = attempt.status {
                let _ = write!(out, " status={}", status);
            }
            if let Some(error) = &attempt.error {
                let _ = write!(out, " error={}", error);
            }
            if attempt.resurrected {
                out.push_str(" (resurrected)");
            }
            out.push('\n');
        }
        out
    }
}

/// Pull the most useful error reason out of an error body.
///
/// Handles `{"error": {"reason": ..}}`, `{"error": "text"}` and plain text.
pub(crate) fn error_reason(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        match value.get("error") {
            Some(serde_json::Value::String(reason)) => return reason.clone(),
            Some(error) => {
                if let Some(reason) = error.get("reason").and_then(|r| r.as_str()) {
                    return reason.to_string();
                }
                return error.to_string();
            }
            None => {}
        }
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.len() > 512 {
        let mut end = 512;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(outcome: AttemptOutcome, status: Option<u16>) -> RequestAttempt {
        RequestAttempt {
            node: Url::parse("http://a:9200").unwrap(),
            status,
            latency: Duration::from_millis(3),
            outcome,
            error: None,
            resurrected: false,
        }
    }

    #[test]
    fn test_valid_envelope() {
        let envelope = ResponseEnvelope::from_response(
            Some(RawResponse::json(&serde_json::json!({"acknowledged": true}))),
            vec![attempt(AttemptOutcome::Success, Some(200))],
            None,
            Duration::from_millis(3),
        );

        assert!(envelope.is_valid());
        assert_eq!(envelope.status_code(), Some(200));
        let body: serde_json::Value = envelope.json().unwrap();
        assert_eq!(body["acknowledged"], true);
        assert!(envelope.into_result().is_ok());
    }

    #[test]
    fn test_invalid_envelope_reports_failure() {
        let envelope = ResponseEnvelope::from_response(
            None,
            vec![
                attempt(AttemptOutcome::TransportError, None),
                attempt(AttemptOutcome::RetryableStatus, Some(503)),
            ],
            Some(PipelineFailure::MaxRetriesExceeded {
                attempts: 2,
                last: "503".into(),
            }),
            Duration::from_millis(6),
        );

        assert!(!envelope.is_valid());
        let info = envelope.debug_information();
        assert!(info.contains("Request failed after 2 attempts"));
        assert!(info.contains("status=503"));
        assert!(envelope.into_result().is_err());
    }

    #[test]
    fn test_error_reason() {
        assert_eq!(
            error_reason(br#"{"error":{"type":"x","reason":"index missing"},"status":404}"#),
            "index missing"
        );
        assert_eq!(error_reason(br#"{"error":"plain"}"#), "plain");
        assert_eq!(error_reason(b"  bad gateway \n"), "bad gateway");
    }
}
