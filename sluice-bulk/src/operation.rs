//! Bulk operations and their NDJSON encoding.

use crate::error::{BulkError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

/// Bulk action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    /// Index a document, replacing any existing one.
    Index,
    /// Create a document, failing if it exists.
    Create,
    /// Update a document.
    Update,
    /// Delete a document.
    Delete,
}

impl BulkAction {
    /// Action name on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Whether the action carries a source line.
    pub fn has_source(&self) -> bool {
        !matches!(self, Self::Delete)
    }
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize)]
struct ActionMeta<'a> {
    #[serde(rename = "_index", skip_serializing_if = "Option::is_none")]
    index: Option<&'a str>,
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    routing: Option<&'a str>,
}

/// One write in a bulk request.
///
/// The source is kept as serialized bytes so encoding never touches the
/// caller's document type again, and retries reuse the same bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOperation {
    pub(crate) action: BulkAction,
    pub(crate) index: Option<String>,
    pub(crate) id: Option<String>,
    pub(crate) routing: Option<String>,
    pub(crate) source: Option<Bytes>,
}

impl BulkOperation {
    fn with_source(action: BulkAction, source: Bytes) -> Self {
        Self {
            action,
            index: None,
            id: None,
            routing: None,
            source: Some(source),
        }
    }

    /// Index a serializable document.
    pub fn index<T: Serialize + ?Sized>(doc: &T) -> Result<Self> {
        Ok(Self::with_source(BulkAction::Index, serde_json::to_vec(doc)?.into()))
    }

    /// Index a pre-serialized JSON document.
    pub fn index_source(source: impl Into<Bytes>) -> Result<Self> {
        Ok(Self::with_source(BulkAction::Index, single_line(source.into())?))
    }

    /// Create a serializable document.
    pub fn create<T: Serialize + ?Sized>(doc: &T) -> Result<Self> {
        Ok(Self::with_source(BulkAction::Create, serde_json::to_vec(doc)?.into()))
    }

    /// Create a pre-serialized JSON document.
    pub fn create_source(source: impl Into<Bytes>) -> Result<Self> {
        Ok(Self::with_source(BulkAction::Create, single_line(source.into())?))
    }

    /// Partially update document `id` with `doc`.
    pub fn update<T: Serialize + ?Sized>(id: impl Into<String>, doc: &T) -> Result<Self> {
        let body = serde_json::to_vec(&json!({ "doc": doc }))?;
        Ok(Self::with_source(BulkAction::Update, body.into()).with_id(id))
    }

    /// Update document `id` with a raw update body (`doc`, `script`, `upsert`...).
    pub fn update_source(id: impl Into<String>, body: impl Into<Bytes>) -> Result<Self> {
        Ok(Self::with_source(BulkAction::Update, single_line(body.into())?).with_id(id))
    }

    /// Delete document `id`.
    pub fn delete(id: impl Into<String>) -> Self {
        Self {
            action: BulkAction::Delete,
            index: None,
            id: Some(id.into()),
            routing: None,
            source: None,
        }
    }

    /// Set the target index. Without one, the run's default index applies.
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Set the document id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the routing value.
    pub fn with_routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }

    /// Action.
    pub fn action(&self) -> BulkAction {
        self.action
    }

    /// Target index.
    pub fn index_name(&self) -> Option<&str> {
        self.index.as_deref()
    }

    /// Document id.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Routing value.
    pub fn routing(&self) -> Option<&str> {
        self.routing.as_deref()
    }

    /// Serialized source line.
    pub fn source(&self) -> Option<&Bytes> {
        self.source.as_ref()
    }

    /// Encode as NDJSON: the action line, then the source line if any.
    pub fn encode(&self) -> Result<Bytes> {
        if self.action == BulkAction::Delete && self.id.is_none() {
            return Err(BulkError::InvalidOperation("delete requires an id".to_string()));
        }
        if self.action == BulkAction::Update && self.id.is_none() {
            return Err(BulkError::InvalidOperation("update requires an id".to_string()));
        }

        let meta = ActionMeta {
            index: self.index.as_deref(),
            id: self.id.as_deref(),
            routing: self.routing.as_deref(),
        };
        let source_len = self.source.as_ref().map_or(0, |s| s.len() + 1);
        let mut out = Vec::with_capacity(64 + source_len);
        out.extend_from_slice(b"{\"");
        out.extend_from_slice(self.action.as_str().as_bytes());
        out.extend_from_slice(b"\":");
        serde_json::to_writer(&mut out, &meta)?;
        out.extend_from_slice(b"}\n");

        if self.action.has_source() {
            match &self.source {
                Some(source) => {
                    out.extend_from_slice(source);
                    out.push(b'\n');
                }
                None => {
                    return Err(BulkError::InvalidOperation(format!(
                        "{} requires a source",
                        self.action
                    )));
                }
            }
        }

        Ok(out.into())
    }
}

/// Trim a trailing newline and reject sources spanning several lines.
fn single_line(source: Bytes) -> Result<Bytes> {
    let trimmed_len = source
        .iter()
        .rposition(|b| !matches!(b, b'\n' | b'\r'))
        .map_or(0, |p| p + 1);
    let source = source.slice(..trimmed_len);
    if source.is_empty() {
        return Err(BulkError::InvalidSource("source is empty".to_string()));
    }
    if source.contains(&b'\n') {
        return Err(BulkError::InvalidSource(
            "source must be a single line of JSON".to_string(),
        ));
    }
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_encode_index_with_metadata() {
        let op = BulkOperation::index(&json!({"title": "hello"}))
            .unwrap()
            .with_index("articles")
            .with_id("1")
            .with_routing("user-7");

        let encoded = op.encode().unwrap();
        let text = std::str::from_utf8(&encoded).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(text.ends_with('\n'));
        let action: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(
            action,
            json!({"index": {"_index": "articles", "_id": "1", "routing": "user-7"}})
        );
        assert_eq!(lines[1], r#"{"title":"hello"}"#);
    }

    #[test]
    fn test_encode_delete_has_no_source() {
        let encoded = BulkOperation::delete("42").encode().unwrap();
        assert_eq!(&encoded[..], b"{\"delete\":{\"_id\":\"42\"}}\n");
    }

    #[test]
    fn test_update_wraps_doc() {
        let op = BulkOperation::update("7", &json!({"views": 3})).unwrap();
        let encoded = op.encode().unwrap();
        let text = std::str::from_utf8(&encoded).unwrap();
        assert_eq!(text.lines().nth(1), Some(r#"{"doc":{"views":3}}"#));
    }

    #[test]
    fn test_raw_source_validation() {
        let op = BulkOperation::index_source("{\"a\":1}\n").unwrap();
        assert_eq!(op.source().unwrap().as_ref(), b"{\"a\":1}");

        assert!(matches!(
            BulkOperation::index_source("{\"a\":\n1}"),
            Err(BulkError::InvalidSource(_))
        ));
        assert!(BulkOperation::create_source("").is_err());
    }

    #[test]
    fn test_update_without_id_is_rejected() {
        let op = BulkOperation {
            action: BulkAction::Update,
            index: None,
            id: None,
            routing: None,
            source: Some(Bytes::from_static(b"{}")),
        };
        assert!(matches!(op.encode(), Err(BulkError::InvalidOperation(_))));
    }
}
