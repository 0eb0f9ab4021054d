//! Observability error types.

/// Result type alias for observe operations.
pub type Result<T> = std::result::Result<T, ObserveError>;

/// Observability errors.
#[derive(Debug, thiserror::Error)]
pub enum ObserveError {
    /// The log subscriber could not be installed.
    #[error("logging error: {0}")]
    Logging(String),

    /// A snapshot could not be exported.
    #[error("export error: {0}")]
    Export(String),
}

impl ObserveError {
    /// Creates a logging error.
    #[must_use]
    pub fn logging(msg: impl Into<String>) -> Self {
        Self::Logging(msg.into())
    }

    /// Creates an export error.
    #[must_use]
    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }
}
