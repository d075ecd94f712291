//! CLI command implementations.

pub mod bulk;
pub mod request;
pub mod sniff;
