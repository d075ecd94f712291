// Bulk responder: answers NDJSON bulk bodies item by item

use serde_json::{Value, json};
use std::sync::Arc;

/// One operation parsed out of a bulk request body.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkRequestItem {
    /// `index`, `create`, `update` or `delete`.
    pub action: String,
    /// Target index (from the action line or the request path).
    pub index: Option<String>,
    /// Document id.
    pub id: Option<String>,
    /// Source line, absent for deletes.
    pub source: Option<Value>,
    /// How many times this item has been seen by the cluster, starting at 1.
    pub seen: usize,
}

impl BulkRequestItem {
    /// Key used to count deliveries: the id, or the source for id-less items.
    pub fn key(&self) -> String {
        match (&self.id, &self.source) {
            (Some(id), _) => id.clone(),
            (None, Some(source)) => source.to_string(),
            (None, None) => String::new(),
        }
    }
}

/// Answer for one bulk item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemReply {
    /// Success with the usual status for the action.
    Ok,
    /// Item error with status, error type and reason.
    Error {
        /// Item status.
        status: u16,
        /// Error type, e.g. `mapper_parsing_exception`.
        error_type: String,
        /// Error reason.
        reason: String,
    },
    /// Item error reported as a bare string.
    Reason {
        /// Item status.
        status: u16,
        /// Error text.
        reason: String,
    },
    /// Non-2xx status without an error payload.
    Status(u16),
}

impl ItemReply {
    /// Thread pool rejection (retryable).
    pub fn rejected() -> Self {
        Self::Error {
            status: 429,
            error_type: "es_rejected_execution_exception".to_string(),
            reason: "rejected execution of coordinating operation".to_string(),
        }
    }

    /// Version conflict (permanent).
    pub fn conflict() -> Self {
        Self::Error {
            status: 409,
            error_type: "version_conflict_engine_exception".to_string(),
            reason: "version conflict, document already exists".to_string(),
        }
    }

    /// Mapping failure (permanent).
    pub fn mapping() -> Self {
        Self::Error {
            status: 400,
            error_type: "mapper_parsing_exception".to_string(),
            reason: "failed to parse field".to_string(),
        }
    }
}

/// Decides the reply for each bulk item.
pub type ItemRule = Arc<dyn Fn(&BulkRequestItem) -> ItemReply + Send + Sync>;

/// Wrap a closure as an [`ItemRule`].
pub fn item_rule<F>(rule: F) -> ItemRule
where
    F: Fn(&BulkRequestItem) -> ItemReply + Send + Sync + 'static,
{
    Arc::new(rule)
}

/// Parse a bulk body into items. `seen` is left at zero.
pub fn parse_bulk_body(body: &[u8], default_index: Option<&str>) -> Result<Vec<BulkRequestItem>, String> {
    let text = std::str::from_utf8(body).map_err(|e| e.to_string())?;
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let mut items = Vec::new();

    while let Some(line) = lines.next() {
        let action: Value = serde_json::from_str(line).map_err(|e| format!("bad action line: {}", e))?;
        let Some((name, meta)) = action.as_object().and_then(|o| o.iter().next()) else {
            return Err(format!("empty action line: {}", line));
        };

        let source = if name == "delete" {
            None
        } else {
            let line = lines.next().ok_or_else(|| format!("missing source for {}", name))?;
            Some(serde_json::from_str(line).map_err(|e| format!("bad source line: {}", e))?)
        };

        items.push(BulkRequestItem {
            action: name.clone(),
            index: meta
                .get("_index")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| default_index.map(str::to_string)),
            id: meta.get("_id").and_then(Value::as_str).map(str::to_string),
            source,
            seen: 0,
        });
    }

    Ok(items)
}

/// Render the bulk response for items and their replies.
pub fn render_bulk_response(replies: &[(BulkRequestItem, ItemReply)]) -> Value {
    let mut errors = false;
    let items: Vec<Value> = replies
        .iter()
        .enumerate()
        .map(|(i, (item, reply))| {
            let id = item.id.clone().unwrap_or_else(|| format!("auto-{}", i));
            let mut entry = json!({
                "_index": item.index.clone().unwrap_or_default(),
                "_id": id,
            });
            match reply {
                ItemReply::Ok => {
                    let (status, result) = match item.action.as_str() {
                        "index" | "create" => (201, "created"),
                        "update" => (200, "updated"),
                        _ => (200, "deleted"),
                    };
                    entry["status"] = json!(status);
                    entry["result"] = json!(result);
                }
                ItemReply::Error {
                    status,
                    error_type,
                    reason,
                } => {
                    errors = true;
                    entry["status"] = json!(status);
                    entry["error"] = json!({"type": error_type, "reason": reason});
                }
                ItemReply::Reason { status, reason } => {
                    errors = true;
                    entry["status"] = json!(status);
                    entry["error"] = json!(reason);
                }
                ItemReply::Status(status) => {
                    if !(200..300).contains(status) {
                        errors = true;
                    }
                    entry["status"] = json!(status);
                    if *status == 404 {
                        entry["result"] = json!("not_found");
                    }
                }
            }
            let mut wrapper = serde_json::Map::new();
            wrapper.insert(item.action.clone(), entry);
            Value::Object(wrapper)
        })
        .collect();

    json!({
        "took": 1,
        "errors": errors,
        "items": items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bulk_body() {
        let body = concat!(
            "{\"index\":{\"_index\":\"logs\",\"_id\":\"1\"}}\n",
            "{\"msg\":\"a\"}\n",
            "{\"delete\":{\"_id\":\"2\"}}\n",
            "{\"update\":{\"_id\":\"3\"}}\n",
            "{\"doc\":{\"msg\":\"c\"}}\n",
        );

        let items = parse_bulk_body(body.as_bytes(), Some("default")).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].index.as_deref(), Some("logs"));
        assert_eq!(items[1].action, "delete");
        assert_eq!(items[1].index.as_deref(), Some("default"));
        assert!(items[1].source.is_none());
        assert_eq!(items[2].source, Some(json!({"doc": {"msg": "c"}})));
    }

    #[test]
    fn test_parse_rejects_missing_source() {
        assert!(parse_bulk_body(b"{\"index\":{}}\n", None).is_err());
    }

    #[test]
    fn test_render_marks_errors() {
        let item = BulkRequestItem {
            action: "index".into(),
            index: Some("logs".into()),
            id: Some("1".into()),
            source: Some(json!({})),
            seen: 1,
        };
        let ok = render_bulk_response(&[(item.clone(), ItemReply::Ok)]);
        assert_eq!(ok["errors"], false);
        assert_eq!(ok["items"][0]["index"]["status"], 201);

        let failed = render_bulk_response(&[(item, ItemReply::rejected())]);
        assert_eq!(failed["errors"], true);
        assert_eq!(
            failed["items"][0]["index"]["error"]["type"],
            "es_rejected_execution_exception"
        );
    }
}
