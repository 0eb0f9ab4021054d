//! Circuit breaker state machine.
//!
//! # Reference
//! Nygard, M. (2007). *Release It!* Pragmatic Bookshelf. Chapter 5.
//!
//! # Toyota Way: Jidoka (自働化)
//! Stop the line when the downstream keeps failing, then probe before resuming.
//!
//! # Concurrency
//! State, generation, counts and expiry sit behind one mutex. The lock is
//! held for admission and for completion bookkeeping, never across the
//! protected call, so any number of calls may be in flight at once.
//!
//! Every transition and every `Closed` window expiry starts a new
//! generation. A completion that reports against an older generation is
//! discarded, so a slow call cannot disturb statistics it was not part of.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::context::CallContext;
use crate::error::{BreakerError, CallError};
use crate::observer::{BreakerObserver, Outcome};
use crate::settings::{IsSuccessful, OnStateChange, ReadyToTrip, Settings};
use crate::state::{Counts, State};

/// Mutable breaker state, guarded as one unit.
#[derive(Debug)]
struct Inner {
    state: State,
    generation: u64,
    counts: Counts,
    /// End of the `Closed` window, or end of the `Open` timeout.
    /// `None` while half-open, or when the window never expires.
    expiry: Option<Instant>,
}

/// Request-admission state machine protecting one downstream resource.
///
/// Share it by reference (typically `Arc<CircuitBreaker>`) across every
/// caller of that resource.
///
/// ```rust,ignore
/// use tripwire_core::{CircuitBreaker, Settings};
///
/// let breaker = CircuitBreaker::new(Settings::new("inventory-db"));
/// match breaker.execute(|| db.fetch(42)) {
///     Ok(row) => use_row(row),
///     Err(err) if err.is_rejected() => serve_cached(),
///     Err(err) => return Err(err.into()),
/// }
/// ```
pub struct CircuitBreaker {
    name: Arc<str>,
    max_requests: u32,
    interval: Option<Duration>,
    timeout: Duration,
    ready_to_trip: ReadyToTrip,
    is_successful: IsSuccessful,
    on_state_change: Option<OnStateChange>,
    observer: Option<Arc<dyn BreakerObserver>>,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker from `settings`.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        let max_requests = settings.effective_max_requests();
        let interval = settings.effective_interval();
        let timeout = settings.effective_timeout();
        let now = settings.clock.now();

        let breaker = Self {
            name: Arc::from(settings.name),
            max_requests,
            interval,
            timeout,
            ready_to_trip: settings.ready_to_trip,
            is_successful: settings.is_successful,
            on_state_change: settings.on_state_change,
            observer: settings.observer,
            clock: settings.clock,
            inner: Mutex::new(Inner {
                state: State::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry: interval.and_then(|interval| now.checked_add(interval)),
            }),
        };

        tracing::debug!(
            breaker = %breaker.name,
            max_requests,
            interval = ?interval,
            timeout = ?timeout,
            "circuit breaker created"
        );

        breaker
    }

    /// Returns the breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the half-open probe budget.
    #[must_use]
    pub const fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Returns the `Closed` window, or `None` if counts never reset.
    #[must_use]
    pub const fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Returns how long the breaker stays open before probing.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the current state, applying any transition that is due.
    #[must_use]
    pub fn state(&self) -> State {
        let mut inner = self.lock();
        let now = self.clock.now();
        self.current_state(&mut inner, now).0
    }

    /// Returns the current generation's counts, applying any transition that is due.
    #[must_use]
    pub fn counts(&self) -> Counts {
        let mut inner = self.lock();
        let now = self.clock.now();
        self.current_state(&mut inner, now);
        inner.counts
    }

    /// Runs `call` if the breaker admits it.
    ///
    /// The call's value or error is returned unchanged (errors in
    /// [`CallError::Inner`]). A rejected call is never invoked. If `call`
    /// panics the attempt is recorded as a failure and the panic continues.
    pub fn execute<T, E, F>(&self, call: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::error::Error + 'static,
    {
        let permit = self.allow()?;
        let result = call();
        permit.report(self.classify(&result));
        result.map_err(CallError::Inner)
    }

    /// Async form of [`CircuitBreaker::execute`].
    ///
    /// The future is only created once the request is admitted. Dropping the
    /// returned future mid-call records a failure.
    pub async fn execute_async<T, E, F, Fut>(&self, call: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let permit = self.allow()?;
        let result = call().await;
        permit.report(self.classify(&result));
        result.map_err(CallError::Inner)
    }

    /// Runs `call` with a cancellation context.
    ///
    /// A context that is already done is refused without being admitted or
    /// counted. Once admitted, the call receives a clone of `ctx`; if the
    /// context finishes first the call is dropped, a failure is recorded and
    /// [`CallError::Cancelled`] or [`CallError::DeadlineExceeded`] is returned.
    pub async fn execute_with_context<T, E, F, Fut>(
        &self,
        ctx: &CallContext,
        call: F,
    ) -> Result<T, CallError<E>>
    where
        F: FnOnce(CallContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        if let Some(reason) = ctx.reason() {
            return Err(reason.into());
        }

        let permit = self.allow()?;
        let call = call(ctx.clone());

        tokio::select! {
            biased;
            result = call => {
                permit.report(self.classify(&result));
                result.map_err(CallError::Inner)
            }
            reason = ctx.done() => {
                tracing::debug!(breaker = %self.name, reason = ?reason, "call abandoned by context");
                permit.failure();
                Err(reason.into())
            }
        }
    }

    /// Two-step admission: asks for a permit, reporting the outcome later.
    ///
    /// A permit dropped without a report counts as a failure.
    pub fn allow(&self) -> Result<Permit<'_>, BreakerError> {
        match self.before_request() {
            Ok((generation, state)) => Ok(Permit {
                breaker: self,
                generation,
                state,
                reported: false,
            }),
            Err((state, err)) => {
                self.notify_request(state, Outcome::Rejected);
                Err(err)
            }
        }
    }

    /// Forces the breaker closed with fresh counts.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let now = self.clock.now();
        if inner.state == State::Closed {
            self.to_new_generation(&mut inner, now);
        } else {
            self.set_state(&mut inner, State::Closed, now);
        }
        tracing::info!(breaker = %self.name, generation = inner.generation, "circuit breaker reset");
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // State machine (all called with the lock held)
    // ═══════════════════════════════════════════════════════════════════════════

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn classify<T, E>(&self, result: &Result<T, E>) -> bool
    where
        E: std::error::Error + 'static,
    {
        match result {
            Ok(_) => true,
            Err(err) => (self.is_successful)(err as &(dyn std::error::Error + 'static)),
        }
    }

    fn before_request(&self) -> Result<(u64, State), (State, BreakerError)> {
        let mut inner = self.lock();
        let now = self.clock.now();
        let (state, generation) = self.current_state(&mut inner, now);

        match state {
            State::Open => {
                tracing::debug!(breaker = %self.name, "rejected: circuit open");
                Err((
                    state,
                    BreakerError::Open {
                        name: Arc::clone(&self.name),
                    },
                ))
            }
            State::HalfOpen if inner.counts.requests >= self.max_requests => {
                tracing::debug!(breaker = %self.name, "rejected: probe budget spent");
                Err((
                    state,
                    BreakerError::TooManyRequests {
                        name: Arc::clone(&self.name),
                    },
                ))
            }
            State::Closed | State::HalfOpen => {
                inner.counts.on_request();
                Ok((generation, state))
            }
        }
    }

    fn after_request(&self, generation: u64, admitted_in: State, success: bool) {
        {
            let mut inner = self.lock();
            let now = self.clock.now();
            let (state, current) = self.current_state(&mut inner, now);

            if current != generation {
                tracing::debug!(
                    breaker = %self.name,
                    generation,
                    current,
                    "discarding outcome from stale generation"
                );
            } else if success {
                self.on_success(&mut inner, state, now);
            } else {
                self.on_failure(&mut inner, state, now);
            }
        }

        let outcome = if success {
            Outcome::Success
        } else {
            Outcome::Failure
        };
        self.notify_request(admitted_in, outcome);
    }

    fn on_success(&self, inner: &mut Inner, state: State, now: Instant) {
        match state {
            State::Closed => inner.counts.on_success(),
            State::HalfOpen => {
                inner.counts.on_success();
                if inner.counts.consecutive_successes >= self.max_requests {
                    self.set_state(inner, State::Closed, now);
                }
            }
            State::Open => {}
        }
    }

    fn on_failure(&self, inner: &mut Inner, state: State, now: Instant) {
        match state {
            State::Closed => {
                inner.counts.on_failure();
                if (self.ready_to_trip)(&inner.counts) {
                    self.set_state(inner, State::Open, now);
                }
            }
            State::HalfOpen => self.set_state(inner, State::Open, now),
            State::Open => {}
        }
    }

    fn current_state(&self, inner: &mut Inner, now: Instant) -> (State, u64) {
        let expired = inner.expiry.is_some_and(|expiry| now >= expiry);
        match inner.state {
            State::Closed if expired => self.to_new_generation(inner, now),
            State::Open if expired => self.set_state(inner, State::HalfOpen, now),
            _ => {}
        }
        (inner.state, inner.generation)
    }

    fn set_state(&self, inner: &mut Inner, to: State, now: Instant) {
        if inner.state == to {
            return;
        }

        let from = inner.state;
        inner.state = to;
        self.to_new_generation(inner, now);

        match to {
            State::Open => tracing::warn!(
                breaker = %self.name,
                from = %from,
                to = %to,
                generation = inner.generation,
                "circuit breaker opened"
            ),
            State::HalfOpen => tracing::info!(
                breaker = %self.name,
                from = %from,
                to = %to,
                generation = inner.generation,
                "circuit breaker half-open, probing recovery"
            ),
            State::Closed => tracing::info!(
                breaker = %self.name,
                from = %from,
                to = %to,
                generation = inner.generation,
                "circuit breaker closed"
            ),
        }

        if let Some(callback) = &self.on_state_change {
            callback(&self.name, from, to);
        }
        if let Some(observer) = &self.observer {
            observer.on_state_change(&self.name, from, to);
        }
    }

    fn to_new_generation(&self, inner: &mut Inner, now: Instant) {
        inner.generation = inner.generation.wrapping_add(1);
        inner.counts.clear();
        inner.expiry = match inner.state {
            State::Closed => self.interval.and_then(|interval| now.checked_add(interval)),
            State::Open => now.checked_add(self.timeout),
            State::HalfOpen => None,
        };
    }

    fn notify_request(&self, state: State, outcome: Outcome) {
        if let Some(observer) = &self.observer {
            observer.on_request(&self.name, state, outcome);
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("generation", &inner.generation)
            .field("counts", &inner.counts)
            .field("max_requests", &self.max_requests)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Admission granted by [`CircuitBreaker::allow`].
///
/// Report the outcome with [`Permit::success`], [`Permit::failure`] or
/// [`Permit::report`]. Dropping an unreported permit records a failure, which
/// is how panics and abandoned futures stay visible in the statistics.
#[must_use = "dropping a permit without reporting records a failure"]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    state: State,
    reported: bool,
}

impl Permit<'_> {
    /// Returns the state the request was admitted in.
    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// Records a success.
    pub fn success(self) {
        self.report(true);
    }

    /// Records a failure.
    pub fn failure(self) {
        self.report(false);
    }

    /// Records the outcome.
    pub fn report(mut self, success: bool) {
        self.reported = true;
        self.breaker
            .after_request(self.generation, self.state, success);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.reported {
            self.breaker.after_request(self.generation, self.state, false);
        }
    }
}

impl std::fmt::Debug for Permit<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permit")
            .field("breaker", &self.breaker.name)
            .field("state", &self.state)
            .field("reported", &self.reported)
            .finish_non_exhaustive()
    }
}
