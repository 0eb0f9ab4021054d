//! Test error types.

/// Result type alias for test operations.
pub type Result<T> = std::result::Result<T, TestError>;

/// Testing errors.
#[derive(Debug, thiserror::Error)]
pub enum TestError {
    /// Chaos injection error.
    #[error("chaos injection error: {0}")]
    Chaos(String),

    /// Load test error.
    #[error("load test error: {0}")]
    LoadTest(String),

    /// Assertion failed.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// Breaker configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] tripwire_core::ConfigError),
}

impl TestError {
    /// Creates a chaos injection error.
    #[must_use]
    pub fn chaos(msg: impl Into<String>) -> Self {
        Self::Chaos(msg.into())
    }

    /// Creates a load test error.
    #[must_use]
    pub fn load_test(msg: impl Into<String>) -> Self {
        Self::LoadTest(msg.into())
    }

    /// Creates an assertion error.
    #[must_use]
    pub fn assertion(msg: impl Into<String>) -> Self {
        Self::Assertion(msg.into())
    }
}
