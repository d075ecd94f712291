//! Grouping operations into size- and byte-bounded buffers.

use crate::operation::BulkOperation;
use bytes::{Bytes, BytesMut};

/// Lifecycle of an item within a run. An item is in exactly one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkItemState {
    /// Drawn from the input, not yet sent.
    Pending,
    /// Part of a request on the wire.
    InFlight,
    /// Waiting to be sent again.
    RetryQueued,
    /// Accepted by the cluster.
    Succeeded,
    /// Failed for good.
    Failed,
}

/// An operation tracked through a run.
#[derive(Debug, Clone)]
pub struct BulkItem {
    seq: u64,
    operation: BulkOperation,
    encoded: Bytes,
    retries: u32,
    state: BulkItemState,
}

impl BulkItem {
    /// Wrap an operation with its encoded NDJSON lines.
    pub fn new(seq: u64, operation: BulkOperation, encoded: Bytes) -> Self {
        Self {
            seq,
            operation,
            encoded,
            retries: 0,
            state: BulkItemState::Pending,
        }
    }

    /// Position in the input, starting at 0.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// The operation.
    pub fn operation(&self) -> &BulkOperation {
        &self.operation
    }

    /// Encoded NDJSON lines.
    pub fn encoded(&self) -> &Bytes {
        &self.encoded
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        self.encoded.len()
    }

    /// Times the item has been sent again.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Current state.
    pub fn state(&self) -> BulkItemState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: BulkItemState) {
        self.state = state;
    }

    pub(crate) fn record_retry(&mut self) {
        self.retries += 1;
        self.state = BulkItemState::RetryQueued;
    }
}

/// Items sent together in one bulk request. Never empty.
#[derive(Debug, Clone)]
pub struct BulkBuffer {
    id: u64,
    items: Vec<BulkItem>,
    bytes: usize,
}

impl BulkBuffer {
    pub(crate) fn new(id: u64, items: Vec<BulkItem>) -> Self {
        let bytes = items.iter().map(BulkItem::encoded_len).sum();
        Self { id, items, bytes }
    }

    /// Buffer number within the run, starting at 0.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Items in input order.
    pub fn items(&self) -> &[BulkItem] {
        &self.items
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Request body size in bytes.
    pub fn byte_len(&self) -> usize {
        self.bytes
    }

    pub(crate) fn into_items(self) -> Vec<BulkItem> {
        self.items
    }
}

/// Concatenate the encoded lines of items into one request body.
pub fn encode_body<'a, I>(items: I) -> Bytes
where
    I: IntoIterator<Item = &'a BulkItem>,
{
    let mut body = BytesMut::new();
    for item in items {
        body.extend_from_slice(&item.encoded);
    }
    body.freeze()
}

/// Accumulates items and cuts buffers at the item or byte limit.
#[derive(Debug)]
pub struct BufferAssembler {
    max_items: usize,
    max_bytes: usize,
    pending: Vec<BulkItem>,
    pending_bytes: usize,
    next_id: u64,
}

impl BufferAssembler {
    /// Create an assembler. Limits below one are raised to one.
    pub fn new(max_items: usize, max_bytes: usize) -> Self {
        Self {
            max_items: max_items.max(1),
            max_bytes: max_bytes.max(1),
            pending: Vec::new(),
            pending_bytes: 0,
            next_id: 0,
        }
    }

    /// Add an item. Returns the buffer it displaced when adding it would
    /// break a limit.
    ///
    /// A single item larger than the byte limit still forms a buffer of its
    /// own.
    pub fn push(&mut self, item: BulkItem) -> Option<BulkBuffer> {
        let overflows = !self.pending.is_empty()
            && (self.pending.len() >= self.max_items
                || self.pending_bytes + item.encoded_len() > self.max_bytes);
        let flushed = if overflows { self.cut() } else { None };

        self.pending_bytes += item.encoded_len();
        self.pending.push(item);
        flushed
    }

    /// Take the pending items if they already fill a buffer.
    pub fn take_full(&mut self) -> Option<BulkBuffer> {
        if self.pending.len() >= self.max_items || self.pending_bytes >= self.max_bytes {
            self.cut()
        } else {
            None
        }
    }

    /// Take whatever is pending at end of input.
    pub fn finish(&mut self) -> Option<BulkBuffer> {
        self.cut()
    }

    /// Items waiting for a buffer.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Buffers produced so far.
    pub fn buffers_cut(&self) -> u64 {
        self.next_id
    }

    fn cut(&mut self) -> Option<BulkBuffer> {
        if self.pending.is_empty() {
            return None;
        }
        let items = std::mem::take(&mut self.pending);
        self.pending_bytes = 0;
        let id = self.next_id;
        self.next_id += 1;
        Some(BulkBuffer::new(id, items))
    }
}
