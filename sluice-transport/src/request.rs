//! Request description handed to the pipeline.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// Content type of bulk request bodies.
pub const NDJSON: &str = "application/x-ndjson";

/// One logical request, independent of the node it ends up on.
///
/// Cheap to clone: the body is reference counted so every retry attempt
/// reuses the same bytes.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<Bytes>,
    retryable: bool,
    timeout: Option<Duration>,
}

impl RequestSpec {
    /// Create a request. A missing leading `/` is added to the path.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        Self {
            method,
            path,
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            retryable: true,
            timeout: None,
        }
    }

    /// Create a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Create a POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Create a PUT request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Create a DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Create a HEAD request.
    pub fn head(path: impl Into<String>) -> Self {
        Self::new(Method::HEAD, path)
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_ref()),
            HeaderValue::try_from(value.as_ref()),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Set a raw body with its content type.
    pub fn body(mut self, body: impl Into<Bytes>, content_type: &str) -> Self {
        self.body = Some(body.into());
        self.header(CONTENT_TYPE.as_str(), content_type)
    }

    /// Set a newline-delimited JSON body.
    pub fn ndjson(self, body: impl Into<Bytes>) -> Self {
        self.body(body, NDJSON)
    }

    /// Serialize a JSON body.
    pub fn json<T: Serialize + ?Sized>(self, body: &T) -> Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(body)?;
        Ok(self.body(bytes, "application/json"))
    }

    /// Whether the request may be sent more than once.
    ///
    /// Non-idempotent calls should pass `false`; the pipeline then makes a
    /// single attempt.
    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Override the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path, always starting with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters in insertion order.
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request body.
    pub fn body_bytes(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Whether the request may be retried.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Per-attempt timeout override.
    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }

    /// Resolve the full URL against a node's base URL.
    ///
    /// A path prefix on the node URL (proxies) is kept.
    pub fn url_for(&self, base: &Url) -> Url {
        let mut url = base.clone();
        let prefix = base.path().trim_end_matches('/');
        url.set_path(&format!("{}{}", prefix, self.path));
        url.set_query(None);
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_is_normalized() {
        assert_eq!(RequestSpec::get("_cluster/health").path(), "/_cluster/health");
        assert_eq!(RequestSpec::get("/_bulk").path(), "/_bulk");
    }

    #[test]
    fn test_url_for_keeps_prefix_and_query() {
        let request = RequestSpec::post("/logs/_bulk")
            .query("refresh", "wait_for")
            .query("pipeline", "geo ip");

        let base = Url::parse("http://proxy:8080/es/").unwrap();
        assert_eq!(
            request.url_for(&base).as_str(),
            "http://proxy:8080/es/logs/_bulk?refresh=wait_for&pipeline=geo+ip"
        );

        let base = Url::parse("http://10.0.0.1:9200").unwrap();
        assert_eq!(
            request.url_for(&base).as_str(),
            "http://10.0.0.1:9200/logs/_bulk?refresh=wait_for&pipeline=geo+ip"
        );
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let request = RequestSpec::post("/idx/_search")
            .json(&serde_json::json!({"query": {"match_all": {}}}))
            .unwrap();

        assert_eq!(
            request.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert!(request.body_bytes().unwrap().starts_with(b"{\"query\""));
    }

    #[test]
    fn test_defaults() {
        let request = RequestSpec::delete("/idx").retryable(false);
        assert!(!request.is_retryable());
        assert_eq!(request.method(), Method::DELETE);
        assert!(request.timeout_override().is_none());
    }
}
