//! Classification of failed bulk items.

use crate::response::BulkItemResult;

/// Verdict for one item of a bulk response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemVerdict {
    /// The item is done.
    Succeeded,
    /// The item may succeed if sent again.
    Retry,
    /// The item failed for good.
    Fail,
}

/// Decides which failed items are worth sending again.
///
/// An item is retried when its error type or its status is in the policy.
/// Everything else (version conflicts, mapping and validation errors) fails
/// permanently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRetryPolicy {
    /// Error types that are retried.
    pub retryable_error_types: Vec<String>,
    /// Item statuses that are retried. Also applies to the bulk call's own status.
    pub retryable_statuses: Vec<u16>,
}

impl Default for ItemRetryPolicy {
    fn default() -> Self {
        Self {
            retryable_error_types: vec![
                "es_rejected_execution_exception".to_string(),
                "circuit_breaking_exception".to_string(),
            ],
            retryable_statuses: vec![429],
        }
    }
}

impl ItemRetryPolicy {
    /// A policy that never retries items.
    pub fn never() -> Self {
        Self {
            retryable_error_types: Vec::new(),
            retryable_statuses: Vec::new(),
        }
    }

    /// Add a retryable error type.
    pub fn retry_error_type(mut self, error_type: impl Into<String>) -> Self {
        self.retryable_error_types.push(error_type.into());
        self
    }

    /// Add a retryable status.
    pub fn retry_status(mut self, status: u16) -> Self {
        self.retryable_statuses.push(status);
        self
    }

    /// Whether a status is retryable.
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Classify one item result.
    pub fn classify(&self, item: &BulkItemResult) -> ItemVerdict {
        if item.is_valid() {
            return ItemVerdict::Succeeded;
        }

        let status = item.status();
        let retryable_type = status
            .error
            .as_ref()
            .and_then(|e| e.error_type())
            .is_some_and(|t| self.retryable_error_types.iter().any(|r| r == t));

        if retryable_type || self.is_retryable_status(status.status) {
            ItemVerdict::Retry
        } else {
            ItemVerdict::Fail
        }
    }
}
