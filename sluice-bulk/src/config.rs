//! Bulk run configuration.

use crate::classify::ItemRetryPolicy;
use crate::error::{BulkError, Result};
use serde::{Deserialize, Serialize};
use sluice_transport::BackoffStrategy;
use std::time::Duration;

/// Refresh behaviour requested from the cluster after the bulk call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Refresh {
    /// Refresh the affected shards immediately.
    True,
    /// Do not refresh.
    False,
    /// Wait for the next scheduled refresh before answering.
    WaitFor,
}

impl Refresh {
    /// Query parameter value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::True => "true",
            Self::False => "false",
            Self::WaitFor => "wait_for",
        }
    }
}

/// Configuration of one bulk run.
#[derive(Debug, Clone)]
pub struct BulkAllConfig {
    /// Maximum operations per buffer.
    pub buffer_size: usize,
    /// Maximum request body size per buffer.
    pub max_buffer_bytes: usize,
    /// Maximum buffers in flight.
    pub concurrency: usize,
    /// How many times one item may be sent again.
    pub max_item_retries: u32,
    /// Delay before re-sending retried items.
    pub backoff: BackoffStrategy,
    /// Which failed items are retried.
    pub retry_policy: ItemRetryPolicy,
    /// Default index, used in the request path.
    pub index: Option<String>,
    /// Refresh parameter.
    pub refresh: Option<Refresh>,
    /// Ingest pipeline parameter.
    pub pipeline: Option<String>,
    /// Default routing parameter.
    pub routing: Option<String>,
    /// Server-side timeout parameter.
    pub timeout: Option<Duration>,
}

impl Default for BulkAllConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            max_buffer_bytes: 5 * 1024 * 1024,
            concurrency: 4,
            max_item_retries: 3,
            backoff: BackoffStrategy::doubling(Duration::from_secs(1), Duration::from_secs(30)),
            retry_policy: ItemRetryPolicy::default(),
            index: None,
            refresh: None,
            pipeline: None,
            routing: None,
            timeout: None,
        }
    }
}

impl BulkAllConfig {
    /// Configuration targeting a default index.
    pub fn for_index(index: impl Into<String>) -> Self {
        Self {
            index: Some(index.into()),
            ..Default::default()
        }
    }

    /// Create a new configuration builder.
    pub fn builder() -> BulkAllConfigBuilder {
        BulkAllConfigBuilder::default()
    }

    /// Check the configuration for values that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(BulkError::Config("buffer_size must be at least 1".to_string()));
        }
        if self.max_buffer_bytes == 0 {
            return Err(BulkError::Config("max_buffer_bytes must be at least 1".to_string()));
        }
        if self.concurrency == 0 {
            return Err(BulkError::Config("concurrency must be at least 1".to_string()));
        }
        if let Some(index) = &self.index
            && (index.is_empty() || index.contains('/'))
        {
            return Err(BulkError::Config(format!("invalid index name '{}'", index)));
        }
        Ok(())
    }

    /// Request path for the bulk call.
    pub fn path(&self) -> String {
        match &self.index {
            Some(index) => format!("/{}/_bulk", index),
            None => "/_bulk".to_string(),
        }
    }

    /// Query parameters for the bulk call.
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(refresh) = self.refresh {
            query.push(("refresh", refresh.as_str().to_string()));
        }
        if let Some(pipeline) = &self.pipeline {
            query.push(("pipeline", pipeline.clone()));
        }
        if let Some(routing) = &self.routing {
            query.push(("routing", routing.clone()));
        }
        if let Some(timeout) = self.timeout {
            query.push(("timeout", format!("{}ms", timeout.as_millis())));
        }
        query
    }
}

/// Builder for bulk run configuration.
#[derive(Debug, Default)]
pub struct BulkAllConfigBuilder {
    config: BulkAllConfig,
}

impl BulkAllConfigBuilder {
    /// Set the maximum operations per buffer.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    /// Set the maximum request body size per buffer.
    pub fn max_buffer_bytes(mut self, bytes: usize) -> Self {
        self.config.max_buffer_bytes = bytes;
        self
    }

    /// Set the maximum buffers in flight.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    /// Set how many times one item may be sent again.
    pub fn max_item_retries(mut self, retries: u32) -> Self {
        self.config.max_item_retries = retries;
        self
    }

    /// Set the retry backoff.
    pub fn backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Set the item retry policy.
    pub fn retry_policy(mut self, policy: ItemRetryPolicy) -> Self {
        self.config.retry_policy = policy;
        self
    }

    /// Set the default index.
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.config.index = Some(index.into());
        self
    }

    /// Set the refresh parameter.
    pub fn refresh(mut self, refresh: Refresh) -> Self {
        self.config.refresh = Some(refresh);
        self
    }

    /// Set the ingest pipeline.
    pub fn pipeline(mut self, pipeline: impl Into<String>) -> Self {
        self.config.pipeline = Some(pipeline.into());
        self
    }

    /// Set the default routing.
    pub fn routing(mut self, routing: impl Into<String>) -> Self {
        self.config.routing = Some(routing.into());
        self
    }

    /// Set the server-side timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> BulkAllConfig {
        self.config
    }
}
