//! Request pipeline: node selection, failover, retries and sniffing.

use crate::config::TransportConfig;
use crate::connection::{Connection, HttpConnection};
use crate::error::{ConnectionError, PipelineFailure, Result, TransportError};
use crate::pool::{NodePool, Selection, SniffDelta};
use crate::request::RequestSpec;
use crate::response::{AttemptOutcome, RawResponse, RequestAttempt, ResponseEnvelope, error_reason};
use crate::sniff::parse_nodes_info;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Sends requests to the cluster with failover across the node pool.
///
/// Cloning is cheap; clones share the pool and the connection.
#[derive(Clone)]
pub struct RequestPipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    config: TransportConfig,
    pool: Arc<NodePool>,
    connection: Arc<dyn Connection>,
    started: AtomicBool,
    created: Instant,
}

enum Step {
    Done(ResponseEnvelope),
    Retry { reason: String },
}

impl RequestPipeline {
    /// Create a pipeline over the given connection.
    ///
    /// Fails fast on invalid configuration.
    pub fn new(config: TransportConfig, connection: impl Connection) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(NodePool::new(config.seed_nodes()?, config.pool.clone()));
        Ok(Self::assemble(config, pool, Arc::new(connection)))
    }

    /// Create a pipeline over HTTP.
    pub fn http(config: TransportConfig) -> Result<Self> {
        let connection = HttpConnection::new(&config)?;
        Self::new(config, connection)
    }

    /// Create a pipeline sharing an existing pool.
    pub fn with_pool(
        config: TransportConfig,
        pool: Arc<NodePool>,
        connection: Arc<dyn Connection>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, pool, connection))
    }

    fn assemble(config: TransportConfig, pool: Arc<NodePool>, connection: Arc<dyn Connection>) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                config,
                pool,
                connection,
                started: AtomicBool::new(false),
                created: Instant::now(),
            }),
        }
    }

    /// Get the transport configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    /// Get the node pool.
    pub fn pool(&self) -> &Arc<NodePool> {
        &self.inner.pool
    }

    /// Send a request, failing over between nodes.
    ///
    /// Never returns an error; the envelope records every attempt and the
    /// terminal failure, if any.
    pub async fn execute(&self, request: RequestSpec) -> ResponseEnvelope {
        let start = Instant::now();
        self.sniff_before_request().await;

        let retry = &self.inner.config.retry;
        let max_attempts = if request.is_retryable() {
            retry.max_retries.saturating_add(1)
        } else {
            1
        };
        let timeout = request
            .timeout_override()
            .unwrap_or(self.inner.config.request_timeout);

        let mut attempts: Vec<RequestAttempt> = Vec::new();
        let mut last_response: Option<RawResponse> = None;
        let mut sniffed_on_fault = false;

        loop {
            if let Some(max_time) = retry.max_retry_time
                && !attempts.is_empty()
                && start.elapsed() >= max_time
            {
                warn!(method = %request.method(), path = request.path(), "Maximum retry time exceeded");
                return ResponseEnvelope::from_response(
                    last_response,
                    attempts,
                    Some(PipelineFailure::MaxRetryTimeExceeded(max_time)),
                    start.elapsed(),
                );
            }

            let lease = match self.inner.pool.next() {
                Selection::Node(lease) => lease,
                Selection::Exhausted { dead } => {
                    warn!(dead, path = request.path(), "No live nodes to send request to");
                    return ResponseEnvelope::from_response(
                        last_response,
                        attempts,
                        Some(PipelineFailure::NoLiveNodes { dead }),
                        start.elapsed(),
                    );
                }
            };

            let node = lease.url().clone();
            let attempt_number = attempts.len() + 1;
            debug!(
                node = %node,
                attempt = attempt_number,
                method = %request.method(),
                path = request.path(),
                "Sending request"
            );

            let sent_at = Instant::now();
            let result = match tokio::time::timeout(
                timeout,
                self.inner.connection.send(&node, &request, timeout),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ConnectionError::Timeout(timeout)),
            };
            let latency = sent_at.elapsed();
            let resurrected = lease.is_resurrected();
            drop(lease);

            let step = self.classify(result, node, latency, resurrected, &mut attempts, &mut last_response, start);
            let reason = match step {
                Step::Done(envelope) => return envelope,
                Step::Retry { reason } => reason,
            };

            if attempts.len() as u32 >= max_attempts {
                warn!(
                    attempts = attempts.len(),
                    path = request.path(),
                    last = %reason,
                    "Request failed on every attempt"
                );
                return ResponseEnvelope::from_response(
                    last_response,
                    attempts,
                    Some(PipelineFailure::MaxRetriesExceeded {
                        attempts: max_attempts,
                        last: reason,
                    }),
                    start.elapsed(),
                );
            }

            if self.inner.config.sniff.on_connection_fault && !sniffed_on_fault {
                sniffed_on_fault = true;
                self.sniff_logged("connection fault").await;
            }

            let delay = retry.delay_for_attempt(attempts.len() as u32 - 1);
            debug!(attempt = attempts.len(), delay = ?delay, reason = %reason, "Retrying request");
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn classify(
        &self,
        result: std::result::Result<RawResponse, ConnectionError>,
        node: url::Url,
        latency: Duration,
        resurrected: bool,
        attempts: &mut Vec<RequestAttempt>,
        last_response: &mut Option<RawResponse>,
        start: Instant,
    ) -> Step {
        let pool = &self.inner.pool;
        let retry = &self.inner.config.retry;

        match result {
            Ok(raw) => {
                let status = raw.status.as_u16();
                if raw.status.is_success() {
                    pool.mark_alive(&node);
                    attempts.push(attempt(node, Some(status), latency, AttemptOutcome::Success, None, resurrected));
                    let attempts = std::mem::take(attempts);
                    return Step::Done(ResponseEnvelope::from_response(Some(raw), attempts, None, start.elapsed()));
                }

                if retry.should_retry_status(status) {
                    pool.mark_dead(&node, format!("status {}", status));
                    let reason = format!("status {} from {}", status, node);
                    attempts.push(attempt(node, Some(status), latency, AttemptOutcome::RetryableStatus, None, resurrected));
                    *last_response = Some(raw);
                    return Step::Retry { reason };
                }

                // the node answered, so it is healthy even if the request was bad
                pool.mark_alive(&node);
                let failure = match status {
                    401 | 403 => PipelineFailure::Authentication { status },
                    _ => PipelineFailure::BadResponse {
                        status,
                        message: error_reason(&raw.body),
                    },
                };
                debug!(node = %node, status, "Request rejected by the cluster");
                attempts.push(attempt(node, Some(status), latency, AttemptOutcome::BadResponse, None, resurrected));
                let attempts = std::mem::take(attempts);
                Step::Done(ResponseEnvelope::from_response(Some(raw), attempts, Some(failure), start.elapsed()))
            }
            Err(error) => {
                let message = error.to_string();
                if error.is_node_fault() {
                    pool.mark_dead(&node, message.clone());
                }
                let reason = format!("{} ({})", message, node);
                attempts.push(attempt(
                    node,
                    None,
                    latency,
                    AttemptOutcome::TransportError,
                    Some(message),
                    resurrected,
                ));

                if retry.should_retry_error(&error) {
                    Step::Retry { reason }
                } else {
                    let attempts = std::mem::take(attempts);
                    Step::Done(ResponseEnvelope::from_response(
                        last_response.take(),
                        attempts,
                        Some(PipelineFailure::Transport(error)),
                        start.elapsed(),
                    ))
                }
            }
        }
    }

    async fn sniff_before_request(&self) {
        let sniff = &self.inner.config.sniff;
        let first = !self.inner.started.swap(true, Ordering::AcqRel);
        if first && sniff.on_start {
            self.sniff_logged("start").await;
            return;
        }

        if let Some(lifespan) = sniff.lifespan {
            let since = self.inner.pool.last_sniff().unwrap_or(self.inner.created);
            if since.elapsed() >= lifespan {
                self.sniff_logged("stale topology").await;
            }
        }
    }

    async fn sniff_logged(&self, trigger: &str) {
        if let Err(e) = self.sniff().await {
            warn!(trigger, error = %e, "Sniffing failed, keeping the current node pool");
        }
    }

    /// Refresh the pool from the cluster's nodes info API.
    ///
    /// Asks selectable nodes first and stops at the first usable answer. A
    /// sniff already running elsewhere makes this a no-op.
    pub async fn sniff(&self) -> Result<SniffDelta> {
        let pool = &self.inner.pool;
        let Some(_guard) = pool.try_begin_sniff() else {
            debug!("Sniff already in progress");
            return Ok(SniffDelta::default());
        };

        let sniff = &self.inner.config.sniff;
        let request = RequestSpec::get(sniff.path.as_str()).retryable(false);
        let mut last_error: Option<String> = None;

        for node in pool.sniff_candidates() {
            let result = tokio::time::timeout(
                sniff.timeout,
                self.inner.connection.send(&node, &request, sniff.timeout),
            )
            .await;

            match result {
                Ok(Ok(raw)) if raw.status.is_success() => {
                    match parse_nodes_info(&raw.body, node.scheme(), sniff.filter) {
                        Ok(discovered) => {
                            info!(node = %node, discovered = discovered.len(), "Sniffed cluster nodes");
                            let delta = pool.update_from_sniff(discovered);
                            // the answering node proved itself reachable
                            pool.mark_alive(&node);
                            pool.record_sniff();
                            return Ok(delta);
                        }
                        Err(e) => last_error = Some(format!("invalid nodes info from {}: {}", node, e)),
                    }
                }
                Ok(Ok(raw)) => last_error = Some(format!("status {} from {}", raw.status.as_u16(), node)),
                Ok(Err(e)) => last_error = Some(format!("{} ({})", e, node)),
                Err(_) => last_error = Some(format!("timed out after {:?} ({})", sniff.timeout, node)),
            }
            debug!(node = %node, error = ?last_error, "Sniff attempt failed");
        }

        pool.record_sniff();
        Err(TransportError::Sniff(
            last_error.unwrap_or_else(|| "no nodes to sniff from".to_string()),
        ))
    }
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("nodes", &self.inner.pool.len())
            .field("alive", &self.inner.pool.alive_count())
            .finish()
    }
}

fn attempt(
    node: url::Url,
    status: Option<u16>,
    latency: Duration,
    outcome: AttemptOutcome,
    error: Option<String>,
    resurrected: bool,
) -> RequestAttempt {
    RequestAttempt {
        node,
        status,
        latency,
        outcome,
        error,
        resurrected,
    }
}
