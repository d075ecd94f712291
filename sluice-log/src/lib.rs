//! Sluice logging setup
//!
//! Installs a `tracing` subscriber for binaries built on the Sluice crates.
//! The library crates only emit events; nothing is printed until a binary
//! calls [`init`] or installs a subscriber of its own.
//!
//! # Usage
//!
//! ```rust,no_run
//! use sluice_log::LogConfig;
//!
//! LogConfig::from_env().init().ok();
//! tracing::info!(nodes = 3, "transport ready");
//! ```
//!
//! # Environment Variables
//!
//! - `SLUICE_DEBUG=1` - Enable debug logging
//! - `SLUICE_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `SLUICE_LOG_FORMAT=pretty|compact|json` - Set output format
//! - `SLUICE_LOG_COLOR=1|0` - Enable/disable colors
//! - `RUST_LOG` - Full filter directives, takes precedence over the level

#![warn(missing_docs)]

use std::env;
use std::io;
use thiserror::Error;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

// ============================================================================
// Log Levels
// ============================================================================

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Trace level (most verbose)
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warning level
    Warn,
    /// Error level (least verbose)
    Error,
    /// Off (no logging)
    Off,
}

impl Level {
    /// Parse a level name, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Filter directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }

    /// One step more verbose, saturating at trace.
    pub fn more_verbose(self) -> Self {
        match self {
            Level::Off => Level::Error,
            Level::Error => Level::Warn,
            Level::Warn => Level::Info,
            Level::Info => Level::Debug,
            Level::Debug | Level::Trace => Level::Trace,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line human readable output
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON lines for log shippers
    Json,
}

impl Format {
    /// Parse a format name, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Errors from installing the subscriber.
#[derive(Error, Debug)]
pub enum LogError {
    /// Filter directives could not be parsed.
    #[error("Invalid log filter: {0}")]
    Filter(String),

    /// A global subscriber is already installed.
    #[error("Failed to install log subscriber: {0}")]
    Install(String),
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// Minimum level for Sluice and its dependencies.
    pub level: Level,
    /// Output format.
    pub format: Format,
    /// ANSI colors.
    pub color: bool,
    /// Include event targets (module paths).
    pub targets: bool,
    /// Explicit filter directives; overrides `level` and `RUST_LOG`.
    pub env_filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::Warn,
            format: Format::Compact,
            color: false,
            targets: true,
            env_filter: None,
        }
    }
}

impl LogConfig {
    /// Create config from `SLUICE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| lookup(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"));

        let debug = flag("SLUICE_DEBUG").unwrap_or(false);
        let level = lookup("SLUICE_LOG_LEVEL")
            .and_then(|s| Level::parse(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Warn });
        let format = lookup("SLUICE_LOG_FORMAT")
            .and_then(|s| Format::parse(&s))
            .unwrap_or(Format::Compact);
        let color = flag("SLUICE_LOG_COLOR")
            .unwrap_or_else(|| lookup("NO_COLOR").is_none() && lookup("TERM").is_some());

        Self {
            level,
            format,
            color,
            ..Self::default()
        }
    }

    /// Set the level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set the format.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Set explicit filter directives, e.g. `"sluice_bulk=debug,reqwest=warn"`.
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Filter built from the configuration. `RUST_LOG` wins over `level`.
    pub fn filter(&self) -> Result<EnvFilter, LogError> {
        match &self.env_filter {
            Some(directives) => {
                EnvFilter::try_new(directives).map_err(|e| LogError::Filter(e.to_string()))
            }
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))),
        }
    }

    /// Install the global subscriber, writing to stderr.
    pub fn init(&self) -> Result<(), LogError> {
        let filter = self.filter()?;
        let registry = tracing_subscriber::registry().with(filter);

        let installed = match self.format {
            Format::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(io::stderr)
                        .with_target(self.targets),
                )
                .try_init(),
            Format::Pretty => registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_writer(io::stderr)
                        .with_target(self.targets)
                        .with_ansi(self.color),
                )
                .try_init(),
            Format::Compact => registry
                .with(
                    fmt::layer()
                        .compact()
                        .with_writer(io::stderr)
                        .with_target(self.targets)
                        .with_ansi(self.color),
                )
                .try_init(),
        };
        installed.map_err(|e| LogError::Install(e.to_string()))
    }
}

/// Install the subscriber configured from the environment.
pub fn init() -> Result<(), LogError> {
    LogConfig::from_env().init()
}

// ============================================================================
// Tests
// ============================================================================
