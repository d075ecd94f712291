//! Progress reporting for bulk runs.

use crate::error::BulkAllError;
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Phase of a bulk run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAllPhase {
    /// Not started.
    Idle,
    /// Drawing operations from the input.
    Buffering,
    /// Sending a buffer.
    Dispatching,
    /// Reading a bulk response.
    Classifying,
    /// Waiting to send retried items.
    Retrying,
    /// Finished; every buffer is terminal.
    Completed,
    /// Stopped by a fatal error or cancellation.
    Failed,
}

impl BulkAllPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Buffering,
            2 => Self::Dispatching,
            3 => Self::Classifying,
            4 => Self::Retrying,
            5 => Self::Completed,
            6 => Self::Failed,
            _ => Self::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Buffering => 1,
            Self::Dispatching => 2,
            Self::Classifying => 3,
            Self::Retrying => 4,
            Self::Completed => 5,
            Self::Failed => 6,
        }
    }

    /// Whether the run is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Live counters of a run, readable from any thread at any time.
///
/// Counters only ever increase.
#[derive(Debug, Default)]
pub struct BulkAllCounters {
    total_retries: AtomicU64,
    failed_buffers: AtomicU64,
    buffers_completed: AtomicU64,
    items_succeeded: AtomicU64,
    items_failed: AtomicU64,
    items_retried: AtomicU64,
    phase: AtomicU8,
    backing_off: AtomicUsize,
}

impl BulkAllCounters {
    /// Retry dispatches made so far.
    pub fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }

    /// Buffers that ended with at least one permanently failed item.
    pub fn failed_buffers(&self) -> u64 {
        self.failed_buffers.load(Ordering::Relaxed)
    }

    /// Buffers that reached a terminal state.
    pub fn buffers_completed(&self) -> u64 {
        self.buffers_completed.load(Ordering::Relaxed)
    }

    /// Items accepted by the cluster.
    pub fn items_succeeded(&self) -> u64 {
        self.items_succeeded.load(Ordering::Relaxed)
    }

    /// Items that failed permanently.
    pub fn items_failed(&self) -> u64 {
        self.items_failed.load(Ordering::Relaxed)
    }

    /// Distinct items sent more than once.
    pub fn items_retried(&self) -> u64 {
        self.items_retried.load(Ordering::Relaxed)
    }

    /// Current phase.
    ///
    /// `Retrying` while any buffer waits out a retry backoff. Otherwise the
    /// last transition made by the run or one of its buffers.
    pub fn phase(&self) -> BulkAllPhase {
        let phase = BulkAllPhase::from_u8(self.phase.load(Ordering::Relaxed));
        if !phase.is_terminal() && self.backing_off.load(Ordering::Relaxed) > 0 {
            return BulkAllPhase::Retrying;
        }
        phase
    }

    pub(crate) fn set_phase(&self, phase: BulkAllPhase) {
        self.phase.store(phase.as_u8(), Ordering::Relaxed);
    }

    pub(crate) fn begin_backoff(&self) {
        self.backing_off.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn end_backoff(&self) {
        self.backing_off.fetch_sub(1, Ordering::Relaxed);
    }

    /// One retry dispatch; `first_retries` counts items re-sent for the first time.
    pub(crate) fn record_retry_dispatch(&self, first_retries: usize) {
        self.total_retries.fetch_add(1, Ordering::Relaxed);
        self.items_retried
            .fetch_add(first_retries as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_buffer(&self, result: &BufferResult) {
        self.buffers_completed.fetch_add(1, Ordering::Relaxed);
        self.items_succeeded
            .fetch_add(result.succeeded as u64, Ordering::Relaxed);
        self.items_failed.fetch_add(result.failed as u64, Ordering::Relaxed);
        if result.failed > 0 {
            self.failed_buffers.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn summary(&self, took: Duration, elapsed: Duration) -> BulkAllSummary {
        BulkAllSummary {
            buffers: self.buffers_completed(),
            items_succeeded: self.items_succeeded(),
            items_failed: self.items_failed(),
            items_retried: self.items_retried(),
            total_retries: self.total_retries(),
            failed_buffers: self.failed_buffers(),
            took,
            elapsed,
        }
    }
}

/// A permanently failed item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    /// Position in the input.
    pub seq: u64,
    /// Document id, if known.
    pub id: Option<String>,
    /// Item status, when the cluster answered for the item.
    pub status: Option<u16>,
    /// Error type, when structured.
    pub error_type: Option<String>,
    /// Reason.
    pub reason: String,
    /// Times the item was sent again before giving up.
    pub retries: u32,
}

/// Outcome of one buffer, including every retry of its items.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferResult {
    /// Buffer number within the run.
    pub buffer: u64,
    /// Items in the buffer.
    pub items: usize,
    /// Items accepted.
    pub succeeded: usize,
    /// Items failed for good.
    pub failed: usize,
    /// Distinct items sent more than once.
    pub retried: usize,
    /// Items whose retries were dropped by cancellation.
    pub abandoned: usize,
    /// Bulk calls made for this buffer.
    pub dispatches: u32,
    /// Server-side time reported by the cluster, summed over dispatches.
    pub took: Duration,
    /// Details of permanently failed items.
    pub failures: Vec<ItemFailure>,
}

impl BufferResult {
    pub(crate) fn new(buffer: u64, items: usize) -> Self {
        Self {
            buffer,
            items,
            succeeded: 0,
            failed: 0,
            retried: 0,
            abandoned: 0,
            dispatches: 0,
            took: Duration::ZERO,
            failures: Vec::new(),
        }
    }

    /// Whether every item succeeded.
    pub fn is_clean(&self) -> bool {
        self.succeeded == self.items
    }
}

/// Totals of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkAllSummary {
    /// Buffers processed.
    pub buffers: u64,
    /// Items accepted.
    pub items_succeeded: u64,
    /// Items failed for good.
    pub items_failed: u64,
    /// Distinct items sent more than once.
    pub items_retried: u64,
    /// Retry dispatches.
    pub total_retries: u64,
    /// Buffers with at least one permanently failed item.
    pub failed_buffers: u64,
    /// Server-side time reported by the cluster.
    pub took: Duration,
    /// Wall time of the run.
    pub elapsed: Duration,
}

/// Event delivered to the observer.
#[derive(Debug, Clone)]
pub enum BulkAllEvent {
    /// A buffer reached a terminal state. Sent once per buffer, in
    /// completion order.
    Buffer(BufferResult),
    /// The run finished. Sent at most once, never together with `Failed`.
    Completed(BulkAllSummary),
    /// The run stopped. Sent at most once, never together with `Completed`.
    Failed(BulkAllError),
}

impl BulkAllEvent {
    /// Whether this event ends the run.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Buffer(_))
    }
}

/// Handle to a running bulk run.
///
/// Events are held in a bounded queue: a run whose events are not read
/// pauses until they are. Read them with [`next_event`](Self::next_event)
/// or [`wait`](Self::wait). Dropping the observer does not stop the run;
/// call [`cancel`](Self::cancel) for that.
#[derive(Debug)]
pub struct BulkAllObserver {
    events: mpsc::Receiver<BulkAllEvent>,
    counters: std::sync::Arc<BulkAllCounters>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl BulkAllObserver {
    pub(crate) fn new(
        events: mpsc::Receiver<BulkAllEvent>,
        counters: std::sync::Arc<BulkAllCounters>,
        cancel: CancellationToken,
        handle: JoinHandle<()>,
    ) -> Self {
        Self {
            events,
            counters,
            cancel,
            handle,
        }
    }

    /// Next event, or `None` once the terminal event has been taken.
    pub async fn next_event(&mut self) -> Option<BulkAllEvent> {
        self.events.recv().await
    }

    /// Live counters.
    pub fn counters(&self) -> &BulkAllCounters {
        &self.counters
    }

    /// Shared handle to the live counters.
    pub fn counters_handle(&self) -> std::sync::Arc<BulkAllCounters> {
        self.counters.clone()
    }

    /// Current phase.
    pub fn phase(&self) -> BulkAllPhase {
        self.counters.phase()
    }

    /// Stop drawing input and drop pending retries. In-flight requests finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels the run, for wiring into signal handlers.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drain remaining events and return the run's outcome.
    pub async fn wait(mut self) -> Result<BulkAllSummary, BulkAllError> {
        let mut outcome = None;
        while let Some(event) = self.events.recv().await {
            match event {
                BulkAllEvent::Buffer(_) => {}
                BulkAllEvent::Completed(summary) => outcome = Some(Ok(summary)),
                BulkAllEvent::Failed(error) => outcome = Some(Err(error)),
            }
        }

        let joined = (&mut self.handle).await;
        match (outcome, joined) {
            (Some(outcome), _) => outcome,
            (None, Err(e)) => Err(BulkAllError::Aborted(e.to_string())),
            (None, Ok(())) => Err(BulkAllError::Aborted(
                "run ended without a terminal event".to_string(),
            )),
        }
    }
}
