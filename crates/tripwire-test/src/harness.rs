//! Breaker test harness.
//!
//! # Toyota Way: Built-in Quality (品質の作り込み)
//! Quality cannot be inspected in; it must be built in.
//!
//! [`BreakerHarness`] wires a breaker to a [`ManualClock`] and a
//! [`RecordingObserver`], so a test can step through windows and timeouts
//! without sleeping and then assert on exactly what the breaker reported.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tripwire_core::{
    BreakerObserver, CallError, CircuitBreaker, Clock, Counts, ManualClock, Outcome, Settings,
    State,
};

use crate::chaos::InjectedFailure;
use crate::error::{Result, TestError};

/// One event delivered to a [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    /// A request was admitted and completed, or rejected.
    Request {
        /// Breaker name.
        name: String,
        /// State at admission or rejection.
        state: State,
        /// What happened.
        outcome: Outcome,
    },
    /// The breaker changed state.
    StateChange {
        /// Breaker name.
        name: String,
        /// Previous state.
        from: State,
        /// New state.
        to: State,
    },
}

/// Observer that keeps every event in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every event recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the recorded transitions as `(from, to)` pairs.
    #[must_use]
    pub fn transitions(&self) -> Vec<(State, State)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ObservedEvent::StateChange { from, to, .. } => Some((from, to)),
                ObservedEvent::Request { .. } => None,
            })
            .collect()
    }

    /// Returns how many requests ended with `outcome`.
    #[must_use]
    pub fn outcomes(&self, outcome: Outcome) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, ObservedEvent::Request { outcome: o, .. } if *o == outcome))
            .count()
    }

    /// Forgets every recorded event.
    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn push(&self, event: ObservedEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl BreakerObserver for RecordingObserver {
    fn on_request(&self, name: &str, state: State, outcome: Outcome) {
        self.push(ObservedEvent::Request {
            name: name.to_string(),
            state,
            outcome,
        });
    }

    fn on_state_change(&self, name: &str, from: State, to: State) {
        self.push(ObservedEvent::StateChange {
            name: name.to_string(),
            from,
            to,
        });
    }
}

/// Breaker under test with a manual clock and an event recorder.
#[derive(Debug)]
pub struct BreakerHarness {
    clock: Arc<ManualClock>,
    recorder: Arc<RecordingObserver>,
    breaker: Arc<CircuitBreaker>,
}

impl BreakerHarness {
    /// Builds a breaker from `settings`, replacing its clock and observer.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        let clock = Arc::new(ManualClock::new());
        let recorder = Arc::new(RecordingObserver::new());
        let breaker = Arc::new(CircuitBreaker::new(
            settings
                .with_clock(Arc::clone(&clock) as Arc<dyn Clock>)
                .with_observer(Arc::clone(&recorder) as Arc<dyn BreakerObserver>),
        ));
        Self {
            clock,
            recorder,
            breaker,
        }
    }

    /// Returns the breaker.
    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Returns the clock driving the breaker.
    #[must_use]
    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Returns the event recorder.
    #[must_use]
    pub fn recorder(&self) -> &RecordingObserver {
        &self.recorder
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Returns the breaker state.
    #[must_use]
    pub fn state(&self) -> State {
        self.breaker.state()
    }

    /// Returns the breaker counts.
    #[must_use]
    pub fn counts(&self) -> Counts {
        self.breaker.counts()
    }

    /// Runs one successful call through the breaker.
    ///
    /// # Errors
    /// Returns the rejection if the breaker refused the call.
    pub fn succeed(&self) -> std::result::Result<(), CallError<InjectedFailure>> {
        self.breaker.execute(|| Ok(()))
    }

    /// Runs one failing call through the breaker.
    ///
    /// # Errors
    /// Always errors: with the injected failure, or with the rejection.
    pub fn fail(&self) -> std::result::Result<(), CallError<InjectedFailure>> {
        self.breaker.execute(|| Err(InjectedFailure))
    }

    /// Runs `n` successful calls, returning how many were admitted.
    pub fn succeed_times(&self, n: u32) -> u32 {
        (0..n).map(|_| u32::from(self.succeed().is_ok())).sum()
    }

    /// Runs `n` failing calls, returning how many were admitted.
    pub fn fail_times(&self, n: u32) -> u32 {
        (0..n)
            .map(|_| u32::from(!self.fail().is_err_and(|e| e.is_rejected())))
            .sum()
    }

    /// Fails calls until the breaker opens, returning how many it took.
    ///
    /// # Errors
    /// Returns an assertion error if it is still not open after `max_attempts`.
    pub fn trip(&self, max_attempts: u32) -> Result<u32> {
        for attempt in 1..=max_attempts {
            let _ = self.fail();
            if self.state() == State::Open {
                return Ok(attempt);
            }
        }
        Err(TestError::assertion(format!(
            "breaker '{}' still {} after {max_attempts} failures",
            self.breaker.name(),
            self.state()
        )))
    }

    /// Checks the current state.
    ///
    /// # Errors
    /// Returns an assertion error on mismatch.
    pub fn assert_state(&self, expected: State) -> Result<()> {
        let actual = self.state();
        if actual == expected {
            Ok(())
        } else {
            Err(TestError::assertion(format!(
                "expected state {expected}, got {actual}"
            )))
        }
    }

    /// Checks the full transition history.
    ///
    /// # Errors
    /// Returns an assertion error on mismatch.
    pub fn assert_transitions(&self, expected: &[(State, State)]) -> Result<()> {
        let actual = self.recorder.transitions();
        if actual == expected {
            Ok(())
        } else {
            Err(TestError::assertion(format!(
                "expected transitions {expected:?}, got {actual:?}"
            )))
        }
    }
}
