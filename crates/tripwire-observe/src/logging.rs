//! Log subscriber setup.
//!
//! Breakers emit `tracing` events (`breaker`, `from`, `to`, `generation`
//! fields). This module installs a formatting subscriber for binaries and
//! tests that do not bring their own.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::error::{ObserveError, Result};

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line human-readable output.
    Pretty,
    /// Single-line output.
    #[default]
    Compact,
}

/// Subscriber configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Output format.
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset or invalid.
    pub default_directive: String,
    /// Include the event target (module path).
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Compact,
            default_directive: "info".to_string(),
            with_target: true,
        }
    }
}

impl LogConfig {
    /// Creates the default configuration with `directive` as fallback filter.
    #[must_use]
    pub fn new(directive: impl Into<String>) -> Self {
        Self {
            default_directive: directive.into(),
            ..Self::default()
        }
    }

    /// Sets the output format.
    #[must_use]
    pub const fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets whether the event target is printed.
    #[must_use]
    pub const fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    /// Builds the filter: `RUST_LOG` if valid, otherwise the default directive.
    ///
    /// # Errors
    /// Returns an error if the default directive does not parse either.
    pub fn filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.default_directive))
            .map_err(|e| {
                ObserveError::logging(format!(
                    "invalid log directive '{}': {e}",
                    self.default_directive
                ))
            })
    }
}

/// Installs the global subscriber.
///
/// # Errors
/// Returns an error if the filter is invalid or a global subscriber is
/// already installed.
pub fn try_init(config: &LogConfig) -> Result<()> {
    let filter = config.filter()?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_target(config.with_target))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(config.with_target))
            .try_init(),
    };

    installed.map_err(|e| ObserveError::logging(e.to_string()))
}

/// Installs the global subscriber unless one is already present.
///
/// Returns true if this call installed it.
pub fn init(config: &LogConfig) -> bool {
    match try_init(config) {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(error = %err, "log subscriber not installed");
            false
        }
    }
}
