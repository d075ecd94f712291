//! The wire seam between the pipeline and a node.

use crate::config::TransportConfig;
use crate::error::{ConnectionError, Result};
use crate::request::RequestSpec;
use crate::response::RawResponse;
use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
use tracing::trace;
use url::Url;

/// Sends one request to one node.
///
/// Implementations do not retry and do not track node health; the pipeline
/// does both. Any HTTP answer, whatever its status, is `Ok`.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Send `request` to the node at `node`, giving up after `timeout`.
    async fn send(
        &self,
        node: &Url,
        request: &RequestSpec,
        timeout: Duration,
    ) -> std::result::Result<RawResponse, ConnectionError>;
}

/// [`Connection`] over a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpConnection {
    client: reqwest::Client,
    credentials: Option<(String, Option<String>)>,
}

impl HttpConnection {
    /// Build the HTTP client from the transport configuration.
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let name = HeaderName::try_from(name.as_str()).map_err(|e| {
                crate::TransportError::Config(format!("invalid header name '{}': {}", name, e))
            })?;
            let value = HeaderValue::try_from(value.as_str()).map_err(|e| {
                crate::TransportError::Config(format!("invalid header value: {}", e))
            })?;
            default_headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .default_headers(default_headers)
            .gzip(config.gzip)
            .build()?;

        let credentials = config
            .username
            .as_ref()
            .map(|user| (user.clone(), config.password.clone()));

        Ok(Self {
            client,
            credentials,
        })
    }

    /// Wrap an existing client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self {
            client,
            credentials: None,
        }
    }
}

#[async_trait]
impl Connection for HttpConnection {
    async fn send(
        &self,
        node: &Url,
        request: &RequestSpec,
        timeout: Duration,
    ) -> std::result::Result<RawResponse, ConnectionError> {
        let url = request.url_for(node);
        trace!(method = %request.method(), url = %url, "Sending request");

        let mut builder = self
            .client
            .request(request.method().clone(), url)
            .headers(request.headers().clone())
            .timeout(timeout);
        if let Some((user, password)) = &self.credentials {
            builder = builder.basic_auth(user, password.as_ref());
        }
        if let Some(body) = request.body_bytes() {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| timed_out(e, timeout))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| timed_out(e, timeout))?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

fn timed_out(error: reqwest::Error, timeout: Duration) -> ConnectionError {
    match ConnectionError::from(error) {
        ConnectionError::Timeout(_) => ConnectionError::Timeout(timeout),
        other => other,
    }
}
