//! Breaker state and per-generation statistics.
//!
//! State transitions follow a strict cycle with no terminal state:
//! ```text
//!            ready_to_trip               timeout elapsed
//!   Closed ───────────────→ Open ───────────────────→ HalfOpen
//!     ↑ ↺ interval elapsed   ↑                           │
//!     │                      └────── any failure ────────┤
//!     └──────────── max_requests consecutive successes ──┘
//! ```

use serde::{Deserialize, Serialize};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum State {
    /// Requests pass through; failures are tallied.
    #[default]
    Closed,
    /// Requests are rejected without invoking the protected call.
    Open,
    /// A limited number of probe requests are let through.
    HalfOpen,
}

impl State {
    /// All states, in gauge order.
    pub const ALL: [Self; 3] = [Self::Closed, Self::Open, Self::HalfOpen];

    /// Returns the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        }
    }

    /// Returns the numeric value exported on state gauges.
    #[must_use]
    pub const fn as_gauge(&self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
        }
    }

    /// Inverse of [`State::as_gauge`].
    #[must_use]
    pub const fn from_gauge(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Closed),
            1 => Some(Self::Open),
            2 => Some(Self::HalfOpen),
            _ => None,
        }
    }

    /// Returns true unless the breaker fails fast in this state.
    ///
    /// A `HalfOpen` breaker may still reject once its probe budget is spent.
    #[must_use]
    pub const fn allows_requests(&self) -> bool {
        matches!(self, Self::Closed | Self::HalfOpen)
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request statistics for the current generation.
///
/// Cleared whenever the breaker changes state or its `Closed` window expires.
/// The two streak counters are mutually exclusive: at most one is non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counts {
    /// Requests admitted in this generation.
    pub requests: u32,
    /// Successful completions in this generation.
    pub total_successes: u32,
    /// Failed completions in this generation.
    pub total_failures: u32,
    /// Successes since the last failure.
    pub consecutive_successes: u32,
    /// Failures since the last success.
    pub consecutive_failures: u32,
}

impl Counts {
    pub(crate) fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    pub(crate) fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    pub(crate) fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    /// Failures as a fraction of admitted requests (0.0 when nothing was admitted).
    #[must_use]
    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            f64::from(self.total_failures) / f64::from(self.requests)
        }
    }

    /// Completions observed so far (successes plus failures).
    #[must_use]
    pub const fn completed(&self) -> u32 {
        self.total_successes.saturating_add(self.total_failures)
    }

    /// Returns true if nothing has been counted in this generation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
