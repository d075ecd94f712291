//! # Sluice Config
//!
//! Loads one [`Settings`] value from a JSON or TOML file and `SLUICE_*`
//! environment variables, validates it, and converts it into the
//! configuration objects the transport and bulk crates take.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sluice_config::Settings;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), sluice_config::ConfigError> {
//! let settings = Settings::load(Some(Path::new("sluice.toml")))?;
//! let transport = settings.transport_config()?;
//! let bulk = settings.bulk_config()?;
//! println!("{} nodes, {} buffers in flight", transport.nodes.len(), bulk.concurrency);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod env;
mod error;
mod loader;
mod settings;
mod validation;

pub use env::{EnvLoader, NESTING, overlay};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat, merge};
pub use settings::{BulkSettings, PoolSettings, Settings, SniffSettings, TransportSettings};
pub use validation::{ConfigValidator, Validate};
