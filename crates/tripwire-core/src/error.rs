//! Error types for tripwire-core.
//!
//! Per Iron Lotus Framework: rejections are explicit values, never panics,
//! and the protected call's own error is handed back untouched.

use std::fmt;
use std::sync::Arc;

use crate::context::CancelReason;

/// Result type alias for configuration and registry operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Rejection returned when a breaker refuses to admit a request.
///
/// The protected call is never invoked when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BreakerError {
    /// The breaker is open and its timeout has not yet elapsed.
    #[error("circuit breaker '{name}' is open")]
    Open {
        /// Name of the rejecting breaker.
        name: Arc<str>,
    },

    /// The breaker is half-open and its probe budget is spent.
    #[error("circuit breaker '{name}' is half-open and has too many requests in flight")]
    TooManyRequests {
        /// Name of the rejecting breaker.
        name: Arc<str>,
    },
}

impl BreakerError {
    /// Returns the name of the breaker that rejected the request.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Open { name } | Self::TooManyRequests { name } => name,
        }
    }

    /// Returns true for the `Open` rejection.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

/// Outcome of a call executed through a breaker.
///
/// `Inner` carries the protected call's error exactly as it was returned.
#[derive(Debug)]
pub enum CallError<E> {
    /// The breaker refused the request.
    Rejected(BreakerError),
    /// The call context was cancelled.
    Cancelled,
    /// The call context's deadline passed.
    DeadlineExceeded,
    /// The protected call failed.
    Inner(E),
}

impl<E> CallError<E> {
    /// Returns true if the breaker refused the request.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Returns the rejection, if any.
    #[must_use]
    pub const fn rejection(&self) -> Option<&BreakerError> {
        match self {
            Self::Rejected(err) => Some(err),
            _ => None,
        }
    }

    /// Returns the protected call's error, if that is what failed.
    #[must_use]
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(err) => Some(err),
            _ => None,
        }
    }

    /// Maps the inner error, leaving breaker outcomes unchanged.
    pub fn map_inner<F, O>(self, op: O) -> CallError<F>
    where
        O: FnOnce(E) -> F,
    {
        match self {
            Self::Rejected(err) => CallError::Rejected(err),
            Self::Cancelled => CallError::Cancelled,
            Self::DeadlineExceeded => CallError::DeadlineExceeded,
            Self::Inner(err) => CallError::Inner(op(err)),
        }
    }
}

impl<E> From<BreakerError> for CallError<E> {
    fn from(err: BreakerError) -> Self {
        Self::Rejected(err)
    }
}

impl<E> From<CancelReason> for CallError<E> {
    fn from(reason: CancelReason) -> Self {
        match reason {
            CancelReason::Cancelled => Self::Cancelled,
            CancelReason::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

impl<E: fmt::Display> fmt::Display for CallError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(err) => err.fmt(f),
            Self::Cancelled => f.write_str("call cancelled"),
            Self::DeadlineExceeded => f.write_str("call deadline exceeded"),
            Self::Inner(err) => err.fmt(f),
        }
    }
}

impl<E> std::error::Error for CallError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rejected(err) => Some(err),
            Self::Inner(err) => Some(err),
            Self::Cancelled | Self::DeadlineExceeded => None,
        }
    }
}

/// Configuration and registry errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The configuration could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    /// Creates a parse error.
    #[must_use]
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
