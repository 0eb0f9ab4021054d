//! Breaker construction settings.
//!
//! Per Iron Lotus Framework (Poka-Yoke): out-of-range values are clamped to
//! safe defaults when the breaker is built, so a breaker is always usable.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::observer::BreakerObserver;
use crate::state::{Counts, State};

/// Probe budget used when none (or zero) is configured.
pub const DEFAULT_MAX_REQUESTS: u32 = 1;

/// `Closed` statistics window used when none is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// `Open` timeout used when none (or zero) is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Minimum requests before the default trip predicate may fire.
pub const DEFAULT_TRIP_MIN_REQUESTS: u32 = 20;

/// Decides, after a failure in `Closed`, whether the breaker should trip.
pub type ReadyToTrip = Arc<dyn Fn(&Counts) -> bool + Send + Sync>;

/// Classifies a call's error; returning true counts it as a success.
pub type IsSuccessful = Arc<dyn Fn(&(dyn std::error::Error + 'static)) -> bool + Send + Sync>;

/// Invoked with `(name, from, to)` on every transition, under the breaker lock.
pub type OnStateChange = Arc<dyn Fn(&str, State, State) + Send + Sync>;

/// Default trip predicate: at least 20 requests and more failures than successes.
///
/// A coarse majority-failure heuristic, not a percentage SLA.
#[must_use]
pub fn default_ready_to_trip(counts: &Counts) -> bool {
    counts.requests >= DEFAULT_TRIP_MIN_REQUESTS && counts.total_failures > counts.total_successes
}

/// Default classifier: every error returned by the call is a failure.
#[must_use]
pub fn every_error_is_failure(_err: &(dyn std::error::Error + 'static)) -> bool {
    false
}

/// Breaker settings.
///
/// Only the name is required; everything else falls back to the defaults above.
#[derive(Clone)]
pub struct Settings {
    pub(crate) name: String,
    pub(crate) max_requests: u32,
    pub(crate) interval: Duration,
    pub(crate) timeout: Duration,
    pub(crate) ready_to_trip: ReadyToTrip,
    pub(crate) is_successful: IsSuccessful,
    pub(crate) on_state_change: Option<OnStateChange>,
    pub(crate) observer: Option<Arc<dyn BreakerObserver>>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Settings {
    /// Creates settings for a breaker named `name` with default values.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_requests: DEFAULT_MAX_REQUESTS,
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            ready_to_trip: Arc::new(default_ready_to_trip),
            is_successful: Arc::new(every_error_is_failure),
            on_state_change: None,
            observer: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets the number of probes allowed while half-open.
    ///
    /// This is also the success streak that closes a half-open breaker.
    #[must_use]
    pub const fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    /// Sets the `Closed` statistics window. `Duration::ZERO` never resets.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets how long the breaker stays open before probing.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the trip predicate.
    #[must_use]
    pub fn with_ready_to_trip<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Counts) -> bool + Send + Sync + 'static,
    {
        self.ready_to_trip = Arc::new(predicate);
        self
    }

    /// Sets the trip predicate from a declarative policy.
    #[must_use]
    pub fn with_trip_policy(mut self, policy: TripPolicy) -> Self {
        self.ready_to_trip = policy.into_predicate();
        self
    }

    /// Sets the error classifier.
    #[must_use]
    pub fn with_is_successful<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&(dyn std::error::Error + 'static)) -> bool + Send + Sync + 'static,
    {
        self.is_successful = Arc::new(classifier);
        self
    }

    /// Sets the state-change callback.
    ///
    /// The callback runs while the breaker lock is held and must not call
    /// back into the same breaker. It must not panic either: a call that
    /// panics is recorded while unwinding, and a second panic there aborts
    /// the process.
    #[must_use]
    pub fn with_on_state_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, State, State) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(callback));
        self
    }

    /// Attaches an observer (metrics sink, audit log, ...).
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn BreakerObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Renames the settings, keeping every other value.
    #[must_use]
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the probe budget after clamping.
    #[must_use]
    pub fn effective_max_requests(&self) -> u32 {
        if self.max_requests == 0 {
            DEFAULT_MAX_REQUESTS
        } else {
            self.max_requests
        }
    }

    /// Returns the `Closed` window. `None` means counts are never reset.
    #[must_use]
    pub fn effective_interval(&self) -> Option<Duration> {
        if self.interval.is_zero() {
            None
        } else {
            Some(self.interval)
        }
    }

    /// Returns the `Open` timeout after clamping.
    #[must_use]
    pub fn effective_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            self.timeout
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("name", &self.name)
            .field("max_requests", &self.max_requests)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("on_state_change", &self.on_state_change.is_some())
            .field("observer", &self.observer.is_some())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

/// Declarative trip predicates, usable from configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TripPolicy {
    /// At least 20 requests and more failures than successes.
    #[default]
    Default,
    /// Trip after `threshold` failures in a row.
    ConsecutiveFailures {
        /// Failure streak that trips the breaker.
        threshold: u32,
    },
    /// Trip once `min_requests` were seen and the failure ratio reaches `ratio`.
    FailureRatio {
        /// Requests required before the ratio is considered.
        min_requests: u32,
        /// Failure ratio in `(0, 1]`.
        ratio: f64,
    },
    /// Trip once `threshold` failures accumulated in the window.
    TotalFailures {
        /// Failure total that trips the breaker.
        threshold: u32,
    },
}

impl TripPolicy {
    /// Evaluates the policy against a counts snapshot.
    #[must_use]
    pub fn should_trip(&self, counts: &Counts) -> bool {
        match *self {
            Self::Default => default_ready_to_trip(counts),
            Self::ConsecutiveFailures { threshold } => {
                counts.consecutive_failures >= threshold.max(1)
            }
            Self::FailureRatio {
                min_requests,
                ratio,
            } => counts.requests >= min_requests && counts.failure_ratio() >= ratio,
            Self::TotalFailures { threshold } => counts.total_failures >= threshold.max(1),
        }
    }

    /// Converts the policy into a trip predicate.
    #[must_use]
    pub fn into_predicate(self) -> ReadyToTrip {
        Arc::new(move |counts: &Counts| self.should_trip(counts))
    }
}
