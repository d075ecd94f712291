//! # Sluice Bulk
//!
//! Concurrent bulk indexing on top of [`sluice_transport`]. A stream of
//! operations is cut into buffers, buffers are sent with bounded
//! concurrency, and items the cluster rejects for transient reasons are
//! sent again with backoff.
//!
//! ## Features
//!
//! - **Buffering**: buffers are cut by item count and request body size
//! - **Bounded Concurrency**: at most `concurrency` buffers in flight, input is drawn lazily
//! - **Item Retries**: only the rejected items of a buffer are re-sent
//! - **Observer**: per-buffer events, live counters and cooperative cancellation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sluice_bulk::prelude::*;
//! use sluice_transport::{RequestPipeline, TransportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = RequestPipeline::http(TransportConfig::new("http://localhost:9200"))?;
//!     let config = BulkAllConfig::builder()
//!         .index("products")
//!         .buffer_size(500)
//!         .concurrency(8)
//!         .build();
//!
//!     let operations = (0..100_000).map(|i| {
//!         BulkOperation::index_source(format!(r#"{{"sku":{i}}}"#))
//!             .map(|op| op.with_id(i.to_string()))
//!     });
//!     let operations: Vec<BulkOperation> = operations.collect::<Result<_, _>>()?;
//!
//!     let mut observer = bulk_all_iter(pipeline, config, operations)?;
//!     while let Some(event) = observer.next_event().await {
//!         match event {
//!             BulkAllEvent::Buffer(buffer) => {
//!                 println!("buffer {} done, {} failed", buffer.buffer, buffer.failed)
//!             }
//!             BulkAllEvent::Completed(summary) => println!("{:?}", summary),
//!             BulkAllEvent::Failed(error) => eprintln!("bulk run failed: {}", error),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod buffer;
mod classify;
mod config;
mod coordinator;
mod error;
mod observer;
mod operation;
mod response;

pub use buffer::{BufferAssembler, BulkBuffer, BulkItem, BulkItemState, encode_body};
pub use classify::{ItemRetryPolicy, ItemVerdict};
pub use config::{BulkAllConfig, BulkAllConfigBuilder, Refresh};
pub use coordinator::{bulk_all, bulk_all_iter};
pub use error::{BulkAllError, BulkError, Result};
pub use observer::{
    BufferResult, BulkAllCounters, BulkAllEvent, BulkAllObserver, BulkAllPhase, BulkAllSummary,
    ItemFailure,
};
pub use operation::{BulkAction, BulkOperation};
pub use response::{BulkItemResult, BulkItemStatus, BulkResponse, ItemError, ItemErrorDetail};

/// Prelude for common imports.
///
/// ```
/// use sluice_bulk::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{BulkAllConfig, Refresh};
    pub use crate::coordinator::{bulk_all, bulk_all_iter};
    pub use crate::error::{BulkAllError, BulkError};
    pub use crate::observer::{BulkAllEvent, BulkAllObserver, BulkAllSummary};
    pub use crate::operation::{BulkAction, BulkOperation};
}
