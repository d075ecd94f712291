//! Transport configuration.

use crate::error::{Result, TransportError};
use crate::node::Node;
use crate::retry::RetryConfig;
use crate::sniff::SniffFilter;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the pool picks among several selectable nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Rotate through nodes in insertion order.
    #[default]
    RoundRobin,
    /// Always use the first selectable node in insertion order.
    Sticky,
    /// Weighted random selection.
    Random,
}

/// What the pool does when every node is dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResurrectPolicy {
    /// Hand out the node whose last failure is the oldest.
    #[default]
    LeastRecentlyFailed,
    /// Report the pool as exhausted.
    FailFast,
}

/// Node pool configuration.
#[derive(Debug, Clone)]
pub struct NodePoolConfig {
    /// Selection strategy among selectable nodes.
    pub strategy: SelectionStrategy,
    /// Behaviour when all nodes are dead.
    pub resurrect: ResurrectPolicy,
    /// Dead time after the first failure.
    pub dead_timeout: Duration,
    /// Upper bound for the dead time.
    pub max_dead_timeout: Duration,
}

impl Default for NodePoolConfig {
    fn default() -> Self {
        Self {
            strategy: SelectionStrategy::RoundRobin,
            resurrect: ResurrectPolicy::LeastRecentlyFailed,
            dead_timeout: Duration::from_secs(60),
            max_dead_timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Sniffing (node discovery) configuration.
#[derive(Debug, Clone)]
pub struct SniffConfig {
    /// Sniff before the first request.
    pub on_start: bool,
    /// Sniff once per request after a node fault.
    pub on_connection_fault: bool,
    /// Sniff again before a request when the last sniff is older than this.
    pub lifespan: Option<Duration>,
    /// Timeout for one sniff call.
    pub timeout: Duration,
    /// Which discovered nodes join the pool.
    pub filter: SniffFilter,
    /// Nodes info endpoint.
    pub path: String,
}

impl Default for SniffConfig {
    fn default() -> Self {
        Self {
            on_start: false,
            on_connection_fault: false,
            lifespan: None,
            timeout: Duration::from_secs(2),
            filter: SniffFilter::ExcludeMasterOnly,
            path: "/_nodes/http".to_string(),
        }
    }
}

impl SniffConfig {
    /// Whether any sniffing trigger is enabled.
    pub fn is_enabled(&self) -> bool {
        self.on_start || self.on_connection_fault || self.lifespan.is_some()
    }
}

/// Transport configuration: one value object per client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Seed node URLs.
    pub nodes: Vec<String>,
    /// Per-attempt request timeout.
    pub request_timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Retry configuration.
    pub retry: RetryConfig,
    /// Node pool configuration.
    pub pool: NodePoolConfig,
    /// Sniffing configuration.
    pub sniff: SniffConfig,
    /// Basic auth username.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Default headers for all requests.
    pub default_headers: Vec<(String, String)>,
    /// User agent string.
    pub user_agent: String,
    /// Enable gzip response decompression.
    pub gzip: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            nodes: vec!["http://localhost:9200".to_string()],
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
            pool: NodePoolConfig::default(),
            sniff: SniffConfig::default(),
            username: None,
            password: None,
            default_headers: Vec::new(),
            user_agent: format!("sluice-transport/{}", env!("CARGO_PKG_VERSION")),
            gzip: true,
        }
    }
}

impl TransportConfig {
    /// Create a configuration for a single node.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            nodes: vec![url.into()],
            ..Default::default()
        }
    }

    /// Create a configuration for several seed nodes.
    pub fn cluster<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            nodes: urls.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Create a new configuration builder.
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::default()
    }

    /// Check the configuration for values that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(TransportError::Config("at least one node is required".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(TransportError::Config("request_timeout must be positive".to_string()));
        }
        if self.pool.max_dead_timeout < self.pool.dead_timeout {
            return Err(TransportError::Config(
                "max_dead_timeout must not be smaller than dead_timeout".to_string(),
            ));
        }
        if !self.sniff.path.starts_with('/') {
            return Err(TransportError::Config("sniff path must start with '/'".to_string()));
        }
        self.seed_nodes().map(|_| ())
    }

    /// Parse the seed URLs into pool nodes.
    pub fn seed_nodes(&self) -> Result<Vec<Node>> {
        self.nodes
            .iter()
            .map(|raw| {
                let node = Node::parse(raw)?;
                match node.url().scheme() {
                    "http" | "https" => Ok(node),
                    scheme => Err(TransportError::Config(format!(
                        "unsupported scheme '{}' for node {}",
                        scheme, raw
                    ))),
                }
            })
            .collect()
    }
}

/// Builder for transport configuration.
#[derive(Debug, Default)]
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl TransportConfigBuilder {
    /// Replace the seed nodes.
    pub fn nodes<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.nodes = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Set the per-attempt request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set retry configuration.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.config.retry = config;
        self
    }

    /// Set node pool configuration.
    pub fn pool(mut self, config: NodePoolConfig) -> Self {
        self.config.pool = config;
        self
    }

    /// Set sniffing configuration.
    pub fn sniff(mut self, config: SniffConfig) -> Self {
        self.config.sniff = config;
        self
    }

    /// Set basic authentication credentials.
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self.config.password = Some(password.into());
        self
    }

    /// Add a default header for all requests.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.push((name.into(), value.into()));
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Enable or disable gzip decompression.
    pub fn gzip(mut self, enable: bool) -> Self {
        self.config.gzip = enable;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> TransportConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TransportConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_retries, 3);
        assert!(!config.sniff.is_enabled());
    }

    #[test]
    fn test_builder() {
        let config = TransportConfig::builder()
            .nodes(["http://a:9200", "http://b:9200"])
            .request_timeout(Duration::from_secs(5))
            .basic_auth("elastic", "changeme")
            .build();

        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.username.as_deref(), Some("elastic"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let empty = TransportConfig::cluster(Vec::<String>::new());
        assert!(matches!(empty.validate(), Err(TransportError::Config(_))));

        let bad_url = TransportConfig::new("not a url");
        assert!(matches!(bad_url.validate(), Err(TransportError::UrlParse(_))));

        let bad_scheme = TransportConfig::new("ftp://localhost:9200");
        assert!(matches!(bad_scheme.validate(), Err(TransportError::Config(_))));

        let zero_timeout = TransportConfig::builder()
            .request_timeout(Duration::ZERO)
            .build();
        assert!(zero_timeout.validate().is_err());
    }
}
