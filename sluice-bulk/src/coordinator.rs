//! Bulk coordinator: buffering, concurrent dispatch and item retries.

use crate::buffer::{BufferAssembler, BulkBuffer, BulkItem, BulkItemState, encode_body};
use crate::classify::ItemVerdict;
use crate::config::BulkAllConfig;
use crate::error::{BulkAllError, Result};
use crate::observer::{
    BufferResult, BulkAllCounters, BulkAllEvent, BulkAllObserver, BulkAllPhase, ItemFailure,
};
use crate::operation::BulkOperation;
use crate::response::{BulkItemResult, BulkResponse};
use futures::{Stream, StreamExt};
use sluice_transport::{RequestPipeline, RequestSpec, ResponseEnvelope};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Index a stream of operations with bounded concurrency.
///
/// The stream is drawn incrementally and never held in memory as a whole.
/// Progress is reported through the returned observer. Must be called from
/// within a tokio runtime.
///
/// # Examples
///
/// ```rust,no_run
/// use sluice_bulk::{BulkAllConfig, BulkOperation, bulk_all_iter};
/// use sluice_transport::{RequestPipeline, TransportConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pipeline = RequestPipeline::http(TransportConfig::new("http://localhost:9200"))?;
/// let docs = (0..10_000).map(|i| {
///     BulkOperation::index(&serde_json::json!({"n": i})).map(|op| op.with_id(i.to_string()))
/// });
/// let operations: Vec<BulkOperation> = docs.collect::<Result<_, _>>()?;
///
/// let observer = bulk_all_iter(pipeline, BulkAllConfig::for_index("numbers"), operations)?;
/// let summary = observer.wait().await?;
/// println!("{} indexed, {} failed", summary.items_succeeded, summary.items_failed);
/// # Ok(())
/// # }
/// ```
pub fn bulk_all<S>(
    pipeline: RequestPipeline,
    config: BulkAllConfig,
    operations: S,
) -> Result<BulkAllObserver>
where
    S: Stream<Item = BulkOperation> + Send + 'static,
{
    config.validate()?;

    let (events, receiver) = mpsc::channel(EVENT_QUEUE);
    let counters = Arc::new(BulkAllCounters::default());
    let cancel = CancellationToken::new();

    let run = BulkRun {
        dispatcher: Dispatcher {
            pipeline,
            config: Arc::new(config),
            counters: counters.clone(),
            stop: cancel.child_token(),
        },
        cancel: cancel.clone(),
        events,
    };
    let handle = tokio::spawn(run.run(operations));

    Ok(BulkAllObserver::new(receiver, counters, cancel, handle))
}

/// [`bulk_all`] over an iterator.
pub fn bulk_all_iter<I>(
    pipeline: RequestPipeline,
    config: BulkAllConfig,
    operations: I,
) -> Result<BulkAllObserver>
where
    I: IntoIterator<Item = BulkOperation>,
    I::IntoIter: Send + 'static,
{
    bulk_all(pipeline, config, futures::stream::iter(operations))
}

struct BulkRun {
    dispatcher: Dispatcher,
    cancel: CancellationToken,
    events: mpsc::Sender<BulkAllEvent>,
}

/// Events queued before the run waits for the observer.
const EVENT_QUEUE: usize = 256;

type BufferOutcome = (BufferResult, Option<BulkAllError>);

impl BulkRun {
    async fn run<S>(self, operations: S)
    where
        S: Stream<Item = BulkOperation> + Send + 'static,
    {
        let started = Instant::now();
        let counters = self.dispatcher.counters.clone();
        let outcome = self.drive(operations).await;
        let elapsed = started.elapsed();

        let event = match outcome {
            Ok(took) => {
                counters.set_phase(BulkAllPhase::Completed);
                let summary = counters.summary(took, elapsed);
                info!(
                    buffers = summary.buffers,
                    succeeded = summary.items_succeeded,
                    failed = summary.items_failed,
                    retries = summary.total_retries,
                    elapsed = ?elapsed,
                    "Bulk run completed"
                );
                BulkAllEvent::Completed(summary)
            }
            Err(error) => {
                counters.set_phase(BulkAllPhase::Failed);
                warn!(error = %error, elapsed = ?elapsed, "Bulk run stopped");
                BulkAllEvent::Failed(error)
            }
        };
        let _ = self.events.send(event).await;
    }

    async fn drive<S>(&self, operations: S) -> std::result::Result<Duration, BulkAllError>
    where
        S: Stream<Item = BulkOperation> + Send + 'static,
    {
        let config = &self.dispatcher.config;
        let counters = &self.dispatcher.counters;
        let mut input = std::pin::pin!(operations);
        let mut assembler = BufferAssembler::new(config.buffer_size, config.max_buffer_bytes);
        let mut ready: VecDeque<BulkBuffer> = VecDeque::new();
        let mut tasks: JoinSet<BufferOutcome> = JoinSet::new();

        let mut seq = 0u64;
        let mut took = Duration::ZERO;
        let mut input_done = false;
        let mut cancelled = false;
        let mut fatal: Option<BulkAllError> = None;

        loop {
            let stopping = cancelled || fatal.is_some();
            if stopping {
                if fatal.is_some() && !self.dispatcher.stop.is_cancelled() {
                    debug!(in_flight = tasks.len(), "Run failed, stopping in-flight retries");
                    self.dispatcher.stop.cancel();
                }
                if !ready.is_empty() {
                    let items: usize = ready.iter().map(BulkBuffer::len).sum();
                    debug!(buffers = ready.len(), items, "Dropping buffers that were never sent");
                    ready.clear();
                }
            } else {
                while tasks.len() < config.concurrency
                    && let Some(buffer) = ready.pop_front()
                {
                    self.spawn(&mut tasks, buffer);
                }
            }

            let can_draw =
                !input_done && !stopping && ready.is_empty() && tasks.len() < config.concurrency;
            if !can_draw && tasks.is_empty() {
                break;
            }
            if can_draw {
                counters.set_phase(BulkAllPhase::Buffering);
            }

            tokio::select! {
                biased;

                _ = self.cancel.cancelled(), if !cancelled => {
                    info!(in_flight = tasks.len(), "Bulk run cancelled, waiting for in-flight buffers");
                    cancelled = true;
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => match joined {
                    Ok((result, error)) => {
                        took += result.took;
                        self.report(result).await;
                        if let Some(error) = error
                            && fatal.is_none()
                        {
                            fatal = Some(error);
                        }
                    }
                    Err(e) => {
                        if fatal.is_none() {
                            fatal = Some(BulkAllError::Aborted(e.to_string()));
                        }
                    }
                },

                next = input.next(), if can_draw => match next {
                    Some(operation) => {
                        let item_seq = seq;
                        seq += 1;
                        match operation.encode() {
                            Ok(encoded) => {
                                let item = BulkItem::new(item_seq, operation, encoded);
                                ready.extend(assembler.push(item));
                                ready.extend(assembler.take_full());
                            }
                            Err(e) => {
                                fatal = Some(BulkAllError::Encode {
                                    seq: item_seq,
                                    reason: e.to_string(),
                                });
                            }
                        }
                    }
                    None => {
                        input_done = true;
                        ready.extend(assembler.finish());
                        debug!(operations = seq, buffers = assembler.buffers_cut(), "Input exhausted");
                    }
                },

                else => break,
            }
        }

        match fatal {
            Some(error) => Err(error),
            None if cancelled => Err(BulkAllError::Cancelled),
            None => Ok(took),
        }
    }

    fn spawn(&self, tasks: &mut JoinSet<BufferOutcome>, buffer: BulkBuffer) {
        debug!(
            buffer = buffer.id(),
            items = buffer.len(),
            bytes = buffer.byte_len(),
            "Dispatching buffer"
        );
        self.dispatcher.counters.set_phase(BulkAllPhase::Dispatching);
        let dispatcher = self.dispatcher.clone();
        tasks.spawn(async move { dispatcher.process(buffer).await });
    }

    async fn report(&self, result: BufferResult) {
        self.dispatcher.counters.record_buffer(&result);
        debug!(
            buffer = result.buffer,
            succeeded = result.succeeded,
            failed = result.failed,
            retried = result.retried,
            abandoned = result.abandoned,
            "Buffer finished"
        );
        let _ = self.events.send(BulkAllEvent::Buffer(result)).await;
    }
}

enum Dispatch {
    Response(BulkResponse),
    Transient(String),
    Fatal(BulkAllError),
}

/// Sends one buffer and its retries. Shared by all buffer tasks of a run.
#[derive(Clone)]
struct Dispatcher {
    pipeline: RequestPipeline,
    config: Arc<BulkAllConfig>,
    counters: Arc<BulkAllCounters>,
    /// Cancelled by the caller or by the first run-fatal error.
    stop: CancellationToken,
}

impl Dispatcher {
    async fn process(&self, buffer: BulkBuffer) -> BufferOutcome {
        let buffer_id = buffer.id();
        let mut result = BufferResult::new(buffer_id, buffer.len());
        let mut pending = buffer.into_items();

        loop {
            for item in pending.iter_mut() {
                item.set_state(BulkItemState::InFlight);
            }
            let envelope = self.pipeline.execute(self.request(&pending)).await;
            result.dispatches += 1;
            self.counters.set_phase(BulkAllPhase::Classifying);

            let mut candidates: Vec<(BulkItem, ItemFailure)> = Vec::new();
            match self.read(buffer_id, envelope) {
                Dispatch::Response(response) => {
                    result.took += Duration::from_millis(response.took);
                    if response.items.len() != pending.len() {
                        let reason = format!(
                            "expected {} items, got {}",
                            pending.len(),
                            response.items.len()
                        );
                        fail_all(&mut result, pending, &reason);
                        return (
                            result,
                            Some(BulkAllError::Response {
                                buffer: buffer_id,
                                reason,
                            }),
                        );
                    }
                    if !response.is_valid() {
                        debug!(
                            buffer = buffer_id,
                            item_errors = response.item_errors().count(),
                            "Bulk response reported errors"
                        );
                    }

                    for (mut item, outcome) in pending.into_iter().zip(response.items.iter()) {
                        match self.config.retry_policy.classify(outcome) {
                            ItemVerdict::Succeeded => {
                                item.set_state(BulkItemState::Succeeded);
                                result.succeeded += 1;
                            }
                            ItemVerdict::Retry => {
                                let failure = item_failure(&item, outcome);
                                candidates.push((item, failure));
                            }
                            ItemVerdict::Fail => {
                                item.set_state(BulkItemState::Failed);
                                let failure = item_failure(&item, outcome);
                                warn!(
                                    buffer = buffer_id,
                                    seq = failure.seq,
                                    status = ?failure.status,
                                    reason = %failure.reason,
                                    "Bulk item failed"
                                );
                                result.failed += 1;
                                result.failures.push(failure);
                            }
                        }
                    }
                }
                Dispatch::Transient(reason) => {
                    warn!(
                        buffer = buffer_id,
                        items = pending.len(),
                        reason = %reason,
                        "Bulk request failed, retrying its items"
                    );
                    candidates = pending
                        .into_iter()
                        .map(|item| {
                            let failure = ItemFailure {
                                seq: item.seq(),
                                id: item.operation().id().map(str::to_string),
                                status: None,
                                error_type: None,
                                reason: reason.clone(),
                                retries: item.retries(),
                            };
                            (item, failure)
                        })
                        .collect();
                }
                Dispatch::Fatal(error) => {
                    fail_all(&mut result, pending, &error.to_string());
                    return (result, Some(error));
                }
            }

            let mut next = Vec::with_capacity(candidates.len());
            for (mut item, failure) in candidates {
                if item.retries() >= self.config.max_item_retries {
                    item.set_state(BulkItemState::Failed);
                    warn!(
                        buffer = buffer_id,
                        seq = failure.seq,
                        retries = item.retries(),
                        reason = %failure.reason,
                        "Bulk item failed after exhausting retries"
                    );
                    result.failed += 1;
                    result.failures.push(ItemFailure {
                        retries: item.retries(),
                        ..failure
                    });
                } else {
                    item.record_retry();
                    next.push(item);
                }
            }
            if next.is_empty() {
                return (result, None);
            }

            self.counters.begin_backoff();
            let delay = self.config.backoff.delay_for_attempt(result.dispatches - 1);
            debug!(buffer = buffer_id, items = next.len(), delay = ?delay, "Retrying bulk items");
            let interrupted = self.stop.is_cancelled()
                || tokio::select! {
                    _ = self.stop.cancelled() => true,
                    _ = tokio::time::sleep(delay) => false,
                };
            self.counters.end_backoff();
            if interrupted {
                debug!(buffer = buffer_id, items = next.len(), "Abandoning retries, run is stopping");
                result.abandoned = next.len();
                return (result, None);
            }

            let first_retries = next.iter().filter(|item| item.retries() == 1).count();
            result.retried += first_retries;
            self.counters.record_retry_dispatch(first_retries);
            pending = next;
        }
    }

    fn request(&self, items: &[BulkItem]) -> RequestSpec {
        let mut request = RequestSpec::post(self.config.path()).ndjson(encode_body(items));
        for (key, value) in self.config.query() {
            request = request.query(key, value);
        }
        request
    }

    fn read(&self, buffer: u64, envelope: ResponseEnvelope) -> Dispatch {
        if envelope.is_valid() {
            return match envelope.json::<BulkResponse>() {
                Ok(response) => Dispatch::Response(response),
                Err(e) => Dispatch::Fatal(BulkAllError::Response {
                    buffer,
                    reason: e.to_string(),
                }),
            };
        }

        match envelope.failure() {
            Some(failure) if failure.is_transient() => Dispatch::Transient(failure.to_string()),
            Some(failure)
                if failure
                    .status_code()
                    .is_some_and(|s| self.config.retry_policy.is_retryable_status(s)) =>
            {
                Dispatch::Transient(failure.to_string())
            }
            Some(failure) => Dispatch::Fatal(BulkAllError::Pipeline {
                buffer,
                failure: failure.clone(),
            }),
            None => Dispatch::Fatal(BulkAllError::Response {
                buffer,
                reason: format!("unexpected status {:?}", envelope.status_code()),
            }),
        }
    }
}

fn item_failure(item: &BulkItem, outcome: &BulkItemResult) -> ItemFailure {
    let status = outcome.status();
    ItemFailure {
        seq: item.seq(),
        id: item
            .operation()
            .id()
            .map(str::to_string)
            .or_else(|| status.id.clone()),
        status: Some(status.status),
        error_type: status
            .error
            .as_ref()
            .and_then(|e| e.error_type())
            .map(str::to_string),
        reason: status
            .error
            .as_ref()
            .map(|e| e.reason().to_string())
            .unwrap_or_else(|| format!("status {}", status.status)),
        retries: item.retries(),
    }
}

fn fail_all(result: &mut BufferResult, items: Vec<BulkItem>, reason: &str) {
    for mut item in items {
        item.set_state(BulkItemState::Failed);
        result.failed += 1;
        result.failures.push(ItemFailure {
            seq: item.seq(),
            id: item.operation().id().map(str::to_string),
            status: None,
            error_type: None,
            reason: reason.to_string(),
            retries: item.retries(),
        });
    }
}
