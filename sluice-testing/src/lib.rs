//! Testing utilities for Sluice.
//!
//! [`VirtualCluster`] stands in for a real cluster behind the transport's
//! [`Connection`](sluice_transport::Connection) seam: nodes follow scripted
//! [`Behavior`]s, bulk requests are answered item by item and every call is
//! recorded for assertions.
//!
//! ```
//! use sluice_testing::{Behavior, VirtualCluster};
//! use sluice_transport::RequestSpec;
//!
//! # tokio_test::block_on(async {
//! let cluster = VirtualCluster::new(2).with_behavior(0, Behavior::Refuse);
//! let pipeline = cluster.pipeline(cluster.transport_config()).unwrap();
//!
//! let response = pipeline.execute(RequestSpec::get("/")).await;
//! assert!(response.is_valid());
//! assert_eq!(response.attempts().len(), 2);
//! # });
//! ```

#![warn(missing_docs)]

mod behavior;
mod bulk;
mod cluster;

pub use behavior::Behavior;
pub use bulk::{
    BulkRequestItem, ItemReply, ItemRule, item_rule, parse_bulk_body, render_bulk_response,
};
pub use cluster::{RecordedCall, Route, VirtualCluster};
