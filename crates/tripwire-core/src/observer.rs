//! Notification seam for metrics and audit collaborators.
//!
//! # Toyota Way: Visual Management (目で見る管理)
//! Every admission decision and transition is made visible, but the state
//! machine never waits on, or depends on, whoever is watching.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::state::State;

/// Result of one request as seen by the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// The call ran and was classified as a success.
    Success,
    /// The call ran and failed, panicked, or was abandoned.
    Failure,
    /// The breaker refused the request.
    Rejected,
}

impl Outcome {
    /// All outcomes, in label order.
    pub const ALL: [Self; 3] = [Self::Success, Self::Failure, Self::Rejected];

    /// Returns the outcome label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Rejected => "rejected",
        }
    }

    /// Position of this outcome in [`Outcome::ALL`].
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Rejected => 2,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives breaker events.
///
/// `on_state_change` runs while the breaker's lock is held, so an
/// implementation must not call back into the breaker that notified it.
/// `on_request` runs after the lock is released. Neither method may panic,
/// since both can run while a panicking call is being unwound.
pub trait BreakerObserver: Send + Sync {
    /// Called once per request with the state it was admitted (or rejected) in.
    fn on_request(&self, name: &str, state: State, outcome: Outcome) {
        let _ = (name, state, outcome);
    }

    /// Called on every state transition.
    fn on_state_change(&self, name: &str, from: State, to: State) {
        let _ = (name, from, to);
    }
}

/// Fans events out to several observers in registration order.
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn BreakerObserver>>,
}

impl ObserverSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer.
    #[must_use]
    pub fn with(mut self, observer: Arc<dyn BreakerObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Returns the number of observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Returns true if no observer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl BreakerObserver for ObserverSet {
    fn on_request(&self, name: &str, state: State, outcome: Outcome) {
        for observer in &self.observers {
            observer.on_request(name, state, outcome);
        }
    }

    fn on_state_change(&self, name: &str, from: State, to: State) {
        for observer in &self.observers {
            observer.on_state_change(name, from, to);
        }
    }
}
