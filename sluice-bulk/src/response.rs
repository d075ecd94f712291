//! Bulk response model.

use crate::operation::BulkAction;
use serde::{Deserialize, Serialize};

/// Bulk API response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkResponse {
    /// Time taken in milliseconds.
    #[serde(default)]
    pub took: u64,
    /// Whether the cluster flagged any error.
    pub errors: bool,
    /// Per-item results, in request order.
    #[serde(default)]
    pub items: Vec<BulkItemResult>,
}

impl BulkResponse {
    /// Whether the whole request succeeded.
    ///
    /// The `errors` flag alone is enough to make a response invalid, even when
    /// every item looks successful.
    pub fn is_valid(&self) -> bool {
        !self.errors && self.items.iter().all(BulkItemResult::is_valid)
    }

    /// Items that did not succeed.
    pub fn item_errors(&self) -> impl Iterator<Item = &BulkItemResult> {
        self.items.iter().filter(|item| !item.is_valid())
    }
}

/// Result of one item, keyed by its action on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkItemResult {
    /// Index result.
    Index(BulkItemStatus),
    /// Create result.
    Create(BulkItemStatus),
    /// Update result.
    Update(BulkItemStatus),
    /// Delete result.
    Delete(BulkItemStatus),
}

impl BulkItemResult {
    /// Action of the item.
    pub fn action(&self) -> BulkAction {
        match self {
            Self::Index(_) => BulkAction::Index,
            Self::Create(_) => BulkAction::Create,
            Self::Update(_) => BulkAction::Update,
            Self::Delete(_) => BulkAction::Delete,
        }
    }

    /// Item status details.
    pub fn status(&self) -> &BulkItemStatus {
        match self {
            Self::Index(s) | Self::Create(s) | Self::Update(s) | Self::Delete(s) => s,
        }
    }

    /// Whether the item succeeded.
    ///
    /// A delete answered with 404 is a success: the document is gone either way.
    pub fn is_valid(&self) -> bool {
        let status = self.status();
        if status.error.is_some() {
            return false;
        }
        status.is_success() || (self.action() == BulkAction::Delete && status.status == 404)
    }
}

/// Status of a bulk item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItemStatus {
    /// Index name.
    #[serde(rename = "_index", default)]
    pub index: Option<String>,
    /// Document ID.
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    /// Document version.
    #[serde(rename = "_version", default)]
    pub version: Option<i64>,
    /// Result, e.g. `created`.
    #[serde(default)]
    pub result: Option<String>,
    /// HTTP status code.
    pub status: u16,
    /// Error details.
    #[serde(default)]
    pub error: Option<ItemError>,
}

impl BulkItemStatus {
    /// Check if the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Item error as reported by the cluster: either a structured object or a
/// bare reason string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemError {
    /// `{"type": ..., "reason": ...}`.
    Detailed(ItemErrorDetail),
    /// `"reason"`.
    Reason(String),
}

impl ItemError {
    /// Error type, when structured.
    pub fn error_type(&self) -> Option<&str> {
        match self {
            Self::Detailed(detail) => Some(&detail.error_type),
            Self::Reason(_) => None,
        }
    }

    /// Human-readable reason.
    pub fn reason(&self) -> &str {
        match self {
            Self::Detailed(detail) => detail.reason.as_deref().unwrap_or(&detail.error_type),
            Self::Reason(reason) => reason,
        }
    }
}

/// Structured item error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemErrorDetail {
    /// Error type.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error reason.
    #[serde(default)]
    pub reason: Option<String>,
    /// Underlying cause.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caused_by: Option<Box<ItemErrorDetail>>,
}
