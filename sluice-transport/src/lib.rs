//! # Sluice Transport
//!
//! Low-level transport for search cluster HTTP APIs: a shared node pool with
//! dead-node backoff, a request pipeline that fails over between nodes, and
//! sniffing to keep the pool in step with the cluster topology.
//!
//! ## Features
//!
//! - **Node Pool**: round-robin, sticky or weighted random selection with resurrection
//! - **Failover**: retryable statuses and transport errors move on to the next node
//! - **Backoff**: exponential dead-node timeouts and optional retry delays
//! - **Sniffing**: on start, on connection fault, or when the topology is stale
//! - **Diagnostics**: every attempt is recorded on the response envelope
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sluice_transport::{RequestPipeline, RequestSpec, TransportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TransportConfig::cluster(["http://es-1:9200", "http://es-2:9200"]);
//!     let pipeline = RequestPipeline::http(config)?;
//!
//!     let response = pipeline.execute(RequestSpec::get("/_cluster/health")).await;
//!     if response.is_valid() {
//!         let health: serde_json::Value = response.json()?;
//!         println!("Cluster status: {}", health["status"]);
//!     } else {
//!         eprintln!("{}", response.debug_information());
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod connection;
mod error;
mod node;
mod pipeline;
mod pool;
mod request;
mod response;
mod retry;
mod sniff;

pub use config::{
    NodePoolConfig, ResurrectPolicy, SelectionStrategy, SniffConfig, TransportConfig,
    TransportConfigBuilder,
};
pub use connection::{Connection, HttpConnection};
pub use error::{ConnectionError, PipelineFailure, Result, TransportError};
pub use node::{Node, NodeRoles, NodeState};
pub use pipeline::RequestPipeline;
pub use pool::{NodeLease, NodePool, Selection, SniffDelta, SniffGuard};
pub use request::{NDJSON, RequestSpec};
pub use response::{AttemptOutcome, RawResponse, RequestAttempt, ResponseEnvelope};
pub use retry::{BackoffStrategy, RetryConfig};
pub use sniff::{PublishAddress, SniffFilter, parse_nodes_info};

// Re-export common types
pub use bytes::Bytes;
pub use http::{HeaderMap, Method, StatusCode};
pub use url::Url;

/// Prelude for common imports.
///
/// ```
/// use sluice_transport::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{NodePoolConfig, SniffConfig, TransportConfig};
    pub use crate::connection::{Connection, HttpConnection};
    pub use crate::error::{ConnectionError, PipelineFailure, TransportError};
    pub use crate::pipeline::RequestPipeline;
    pub use crate::request::RequestSpec;
    pub use crate::response::{RawResponse, ResponseEnvelope};
    pub use crate::retry::{BackoffStrategy, RetryConfig};
    pub use http::{Method, StatusCode};
}
