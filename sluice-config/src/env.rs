// Environment variable overlay

use serde_json::Value;
use std::collections::HashMap;
use std::env;

/// Separator between nesting levels in variable names,
/// e.g. `SLUICE_BULK__CONCURRENCY`.
pub const NESTING: &str = "__";

/// Reads prefixed environment variables.
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    /// Loader for variables starting with `prefix`, or all variables.
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    /// Load matching variables with the prefix removed and keys lowercased.
    pub fn load(&self) -> HashMap<String, String> {
        env::vars()
            .filter_map(|(key, value)| match &self.prefix {
                Some(prefix) => key
                    .strip_prefix(prefix.as_str())
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|rest| (rest.to_lowercase(), value)),
                None => Some((key.to_lowercase(), value)),
            })
            .collect()
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(Some("SLUICE".to_string()))
    }
}

/// Overlay variables onto a settings tree.
///
/// Keys address existing fields only (`bulk__concurrency` sets
/// `bulk.concurrency`); unknown keys are returned so callers can report them.
/// String and unset fields take the raw text. List fields accept a JSON array
/// or comma separated items. Other fields are parsed as JSON.
pub fn overlay(tree: &mut Value, vars: &HashMap<String, String>) -> Vec<String> {
    let mut unknown = Vec::new();
    let mut keys: Vec<&String> = vars.keys().collect();
    keys.sort();

    for key in keys {
        let raw = &vars[key];
        match lookup(tree, key) {
            Some(slot) => *slot = coerce(slot, raw),
            None => unknown.push(key.clone()),
        }
    }
    unknown
}

fn lookup<'a>(tree: &'a mut Value, key: &str) -> Option<&'a mut Value> {
    key.split(NESTING)
        .try_fold(tree, |node, part| node.as_object_mut()?.get_mut(part))
}

fn coerce(current: &Value, raw: &str) -> Value {
    match current {
        Value::String(_) | Value::Null => Value::String(raw.to_string()),
        Value::Array(_) => match serde_json::from_str::<Value>(raw) {
            Ok(parsed @ Value::Array(_)) => parsed,
            _ => Value::Array(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string())))
                    .collect(),
            ),
        },
        _ => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_overlay_typed_values() {
        let mut tree = json!({
            "transport": {"nodes": ["http://localhost:9200"], "max_retries": 3, "username": null},
            "sniff": {"on_start": false},
            "bulk": {"index": null, "retryable_statuses": [429]}
        });

        let unknown = overlay(
            &mut tree,
            &vars(&[
                ("transport__nodes", "http://es-1:9200, http://es-2:9200"),
                ("transport__max_retries", "7"),
                ("transport__username", "elastic"),
                ("sniff__on_start", "true"),
                ("bulk__index", "2024"),
                ("bulk__retryable_statuses", "429,503"),
            ]),
        );

        assert!(unknown.is_empty());
        assert_eq!(tree["transport"]["nodes"], json!(["http://es-1:9200", "http://es-2:9200"]));
        assert_eq!(tree["transport"]["max_retries"], 7);
        assert_eq!(tree["transport"]["username"], "elastic");
        assert_eq!(tree["sniff"]["on_start"], true);
        assert_eq!(tree["bulk"]["retryable_statuses"], json!([429, 503]));
        assert_eq!(tree["bulk"]["index"], "2024");
    }

    #[test]
    fn test_overlay_reports_unknown_keys() {
        let mut tree = json!({"bulk": {"concurrency": 4}});
        let unknown = overlay(&mut tree, &vars(&[("log_level", "debug"), ("bulk__nope", "1")]));

        assert_eq!(unknown, ["bulk__nope", "log_level"]);
        assert_eq!(tree, json!({"bulk": {"concurrency": 4}}));
    }

    #[test]
    fn test_env_loader_strips_prefix() {
        // PATH is set on every system the tests run on
        let loader = EnvLoader::new(Some("PAT".to_string()));
        assert!(!loader.load().contains_key("h"));

        let all = EnvLoader::new(None).load();
        if std::env::var("PATH").is_ok() {
            assert!(all.contains_key("path"));
        }
    }
}
