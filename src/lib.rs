// Sluice - transport and bulk ingestion core for search engine clients
//
// This library re-exports the transport pipeline, the bulk coordinator and,
// behind features, settings loading, logging setup and the virtual cluster
// used for testing.

// Re-export core functionality
pub use sluice_bulk as bulk;
pub use sluice_transport as transport;

pub use sluice_bulk::{
    BulkAction, BulkAllConfig, BulkAllError, BulkAllEvent, BulkAllObserver, BulkAllPhase,
    BulkAllSummary, BulkOperation, bulk_all, bulk_all_iter,
};
pub use sluice_transport::{
    BackoffStrategy, Connection, HttpConnection, Node, NodePool, PipelineFailure,
    RequestPipeline, RequestSpec, ResponseEnvelope, RetryConfig, TransportConfig,
    TransportError,
};

// Re-export optional crates
#[cfg(feature = "config")]
pub use sluice_config as config;

#[cfg(feature = "config")]
pub use sluice_config::Settings;

#[cfg(feature = "log")]
pub use sluice_log as log;

#[cfg(feature = "testing")]
pub use sluice_testing as testing;

// Prelude for common imports
pub mod prelude {
    pub use sluice_bulk::prelude::*;
    pub use sluice_transport::prelude::*;

    #[cfg(feature = "config")]
    pub use sluice_config::Settings;
}
