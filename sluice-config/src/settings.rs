// Settings schema and conversion into component configuration

use crate::env::{self, EnvLoader};
use crate::loader::{ConfigLoader, merge};
use crate::validation::{ConfigValidator, Validate};
use crate::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sluice_bulk::{BulkAllConfig, ItemRetryPolicy, Refresh};
use sluice_transport::{
    BackoffStrategy, NodePoolConfig, ResurrectPolicy, RetryConfig, SelectionStrategy, SniffConfig,
    SniffFilter, TransportConfig,
};
use std::path::Path;
use std::time::Duration;

/// Everything a Sluice client needs, in one value.
///
/// Durations are plain integers with the unit in the field name so the same
/// schema reads naturally from JSON, TOML and environment variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Nodes, timeouts, retries and credentials.
    pub transport: TransportSettings,
    /// Node pool behaviour.
    pub pool: PoolSettings,
    /// Node discovery.
    pub sniff: SniffSettings,
    /// Bulk ingestion.
    pub bulk: BulkSettings,
}

/// Transport section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportSettings {
    /// Seed node URLs.
    pub nodes: Vec<String>,
    /// Per-attempt request timeout.
    pub request_timeout_ms: u64,
    /// Connection timeout.
    pub connect_timeout_ms: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Statuses that move a request on to another node.
    pub retry_status_codes: Vec<u16>,
    /// Delay before each retry, doubled per retry. 0 retries immediately.
    pub retry_backoff_ms: u64,
    /// Wall time budget for one request and its retries. 0 is unbounded.
    pub max_retry_time_ms: u64,
    /// Basic auth username.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// User agent override.
    pub user_agent: Option<String>,
    /// Request gzip compressed responses.
    pub gzip: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        let config = TransportConfig::default();
        Self {
            nodes: config.nodes,
            request_timeout_ms: millis(config.request_timeout),
            connect_timeout_ms: millis(config.connect_timeout),
            max_retries: config.retry.max_retries,
            retry_status_codes: config.retry.retry_status_codes,
            retry_backoff_ms: 0,
            max_retry_time_ms: 0,
            username: None,
            password: None,
            user_agent: None,
            gzip: config.gzip,
        }
    }
}

/// Node pool section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// `round_robin`, `sticky` or `random`.
    pub strategy: SelectionStrategy,
    /// `least_recently_failed` or `fail_fast`.
    pub resurrect: ResurrectPolicy,
    /// Dead time after the first failure.
    pub dead_timeout_ms: u64,
    /// Upper bound for the dead time.
    pub max_dead_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        let config = NodePoolConfig::default();
        Self {
            strategy: config.strategy,
            resurrect: config.resurrect,
            dead_timeout_ms: millis(config.dead_timeout),
            max_dead_timeout_ms: millis(config.max_dead_timeout),
        }
    }
}

/// Sniffing section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SniffSettings {
    /// Sniff before the first request.
    pub on_start: bool,
    /// Sniff after a node fault.
    pub on_connection_fault: bool,
    /// Re-sniff when the topology is older than this. 0 disables.
    pub lifespan_secs: u64,
    /// Timeout for the sniff call.
    pub timeout_ms: u64,
    /// `all`, `exclude_master_only` or `data_only`.
    pub filter: SniffFilter,
}

impl Default for SniffSettings {
    fn default() -> Self {
        let config = SniffConfig::default();
        Self {
            on_start: config.on_start,
            on_connection_fault: config.on_connection_fault,
            lifespan_secs: 0,
            timeout_ms: millis(config.timeout),
            filter: config.filter,
        }
    }
}

/// Bulk section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BulkSettings {
    /// Maximum operations per buffer.
    pub buffer_size: usize,
    /// Maximum request body size per buffer.
    pub max_buffer_bytes: usize,
    /// Maximum buffers in flight.
    pub concurrency: usize,
    /// How many times one item may be sent again.
    pub max_item_retries: u32,
    /// First item retry delay.
    pub backoff_initial_ms: u64,
    /// Largest item retry delay.
    pub backoff_max_ms: u64,
    /// Item error types that are retried.
    pub retryable_error_types: Vec<String>,
    /// Item and bulk call statuses that are retried.
    pub retryable_statuses: Vec<u16>,
    /// Default index.
    pub index: Option<String>,
    /// `true`, `false` or `wait_for`.
    pub refresh: Option<Refresh>,
    /// Ingest pipeline.
    pub pipeline: Option<String>,
    /// Default routing.
    pub routing: Option<String>,
}

impl Default for BulkSettings {
    fn default() -> Self {
        let config = BulkAllConfig::default();
        Self {
            buffer_size: config.buffer_size,
            max_buffer_bytes: config.max_buffer_bytes,
            concurrency: config.concurrency,
            max_item_retries: config.max_item_retries,
            backoff_initial_ms: 1_000,
            backoff_max_ms: 30_000,
            retryable_error_types: config.retry_policy.retryable_error_types,
            retryable_statuses: config.retry_policy.retryable_statuses,
            index: None,
            refresh: None,
            pipeline: None,
            routing: None,
        }
    }
}

impl Settings {
    /// Settings from a JSON or TOML file, on top of the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let overlay = ConfigLoader::auto(&path)?.load_file(&path)?;
        let mut tree = Self::default().to_value()?;
        merge(&mut tree, overlay);
        Self::from_value(tree)
    }

    /// Settings from a value tree. Missing fields take their defaults.
    pub fn from_value(value: Value) -> Result<Self> {
        let settings: Settings = serde_json::from_value(value)
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults, then the optional file, then `SLUICE_*` variables (a `.env`
    /// file in the working directory is read first if present).
    ///
    /// Variable names map to fields with `__` between levels:
    /// `SLUICE_TRANSPORT__NODES=http://es-1:9200,http://es-2:9200`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::load_with(path, &EnvLoader::default())
    }

    /// [`load`](Self::load) with an explicit environment source.
    pub fn load_with(path: Option<&Path>, env: &EnvLoader) -> Result<Self> {
        let mut tree = Self::default().to_value()?;
        if let Some(path) = path {
            merge(&mut tree, ConfigLoader::auto(path)?.load_file(path)?);
        }
        // variables for other components (e.g. SLUICE_LOG_LEVEL) share the prefix
        let _unknown = env::overlay(&mut tree, &env.load());
        Self::from_value(tree)
    }

    /// Transport configuration for [`sluice_transport::RequestPipeline`].
    pub fn transport_config(&self) -> Result<TransportConfig> {
        let t = &self.transport;
        let mut retry = RetryConfig {
            max_retries: t.max_retries,
            retry_status_codes: t.retry_status_codes.clone(),
            ..RetryConfig::default()
        };
        if t.retry_backoff_ms > 0 {
            retry.backoff = BackoffStrategy::doubling(
                Duration::from_millis(t.retry_backoff_ms),
                Duration::from_millis(t.retry_backoff_ms.saturating_mul(32)),
            );
        }
        if t.max_retry_time_ms > 0 {
            retry = retry.with_max_retry_time(Duration::from_millis(t.max_retry_time_ms));
        }

        let mut builder = TransportConfig::builder()
            .nodes(t.nodes.iter().cloned())
            .request_timeout(Duration::from_millis(t.request_timeout_ms))
            .connect_timeout(Duration::from_millis(t.connect_timeout_ms))
            .retry(retry)
            .pool(NodePoolConfig {
                strategy: self.pool.strategy,
                resurrect: self.pool.resurrect,
                dead_timeout: Duration::from_millis(self.pool.dead_timeout_ms),
                max_dead_timeout: Duration::from_millis(self.pool.max_dead_timeout_ms),
            })
            .sniff(SniffConfig {
                on_start: self.sniff.on_start,
                on_connection_fault: self.sniff.on_connection_fault,
                lifespan: (self.sniff.lifespan_secs > 0)
                    .then(|| Duration::from_secs(self.sniff.lifespan_secs)),
                timeout: Duration::from_millis(self.sniff.timeout_ms),
                filter: self.sniff.filter,
                ..SniffConfig::default()
            })
            .gzip(t.gzip);
        if let Some(username) = &t.username {
            builder = builder.basic_auth(username, t.password.clone().unwrap_or_default());
        }
        if let Some(user_agent) = &t.user_agent {
            builder = builder.user_agent(user_agent);
        }

        let config = builder.build();
        config
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        Ok(config)
    }

    /// Bulk run configuration for [`sluice_bulk::bulk_all`].
    pub fn bulk_config(&self) -> Result<BulkAllConfig> {
        let b = &self.bulk;
        let mut builder = BulkAllConfig::builder()
            .buffer_size(b.buffer_size)
            .max_buffer_bytes(b.max_buffer_bytes)
            .concurrency(b.concurrency)
            .max_item_retries(b.max_item_retries)
            .backoff(BackoffStrategy::doubling(
                Duration::from_millis(b.backoff_initial_ms),
                Duration::from_millis(b.backoff_max_ms),
            ))
            .retry_policy(ItemRetryPolicy {
                retryable_error_types: b.retryable_error_types.clone(),
                retryable_statuses: b.retryable_statuses.clone(),
            });
        if let Some(index) = &b.index {
            builder = builder.index(index);
        }
        if let Some(refresh) = b.refresh {
            builder = builder.refresh(refresh);
        }
        if let Some(pipeline) = &b.pipeline {
            builder = builder.pipeline(pipeline);
        }
        if let Some(routing) = &b.routing {
            builder = builder.routing(routing);
        }

        let config = builder.build();
        config
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        Ok(config)
    }

    fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| ConfigError::DeserializationError(e.to_string()))
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        ConfigValidator::not_empty_list(&self.transport.nodes, "transport.nodes")?;
        for node in &self.transport.nodes {
            ConfigValidator::is_url(node, "transport.nodes")?;
        }
        for status in &self.transport.retry_status_codes {
            ConfigValidator::is_status(*status, "transport.retry_status_codes")?;
        }
        ConfigValidator::in_range(self.transport.request_timeout_ms, 1, u64::MAX, "transport.request_timeout_ms")?;
        ConfigValidator::in_range(self.pool.dead_timeout_ms, 1, self.pool.max_dead_timeout_ms, "pool.dead_timeout_ms")?;

        ConfigValidator::in_range(self.bulk.buffer_size, 1, 100_000, "bulk.buffer_size")?;
        ConfigValidator::in_range(self.bulk.concurrency, 1, 256, "bulk.concurrency")?;
        ConfigValidator::in_range(self.bulk.max_buffer_bytes, 1, usize::MAX, "bulk.max_buffer_bytes")?;
        ConfigValidator::in_range(self.bulk.backoff_initial_ms, 0, self.bulk.backoff_max_ms, "bulk.backoff_initial_ms")?;
        for status in &self.bulk.retryable_statuses {
            ConfigValidator::is_status(*status, "bulk.retryable_statuses")?;
        }
        if let Some(index) = &self.bulk.index {
            ConfigValidator::not_empty(index, "bulk.index")?;
        }
        if let Some(username) = &self.transport.username {
            ConfigValidator::not_empty(username, "transport.username")?;
        }
        Ok(())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
