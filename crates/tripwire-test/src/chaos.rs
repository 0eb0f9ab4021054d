//! Chaos injection for resilience testing.
//!
//! # Reference
//! Netflix. (2012). Chaos Monkey. GitHub.
//! <https://github.com/Netflix/chaosmonkey>
//!
//! A [`ChaosService`] stands in for a flaky downstream. Draws come from a
//! seeded generator, so a failing run replays exactly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::error::{Result, TestError};

/// Error returned by a [`ChaosService`] call chosen to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("injected failure")]
pub struct InjectedFailure;

/// Chaos injection configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ChaosConfig {
    /// Probability that a call fails.
    pub failure_rate: f64,
    /// Latency injection: (probability, delay). Async calls only.
    pub latency: Option<(f64, Duration)>,
    /// Generator seed.
    pub seed: u64,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.0,
            latency: None,
            seed: 0x5EED,
        }
    }
}

impl ChaosConfig {
    /// Creates a config that fails calls with probability `rate`.
    #[must_use]
    pub fn failures(rate: f64) -> Self {
        Self {
            failure_rate: rate,
            ..Default::default()
        }
    }

    /// Adds latency injection.
    #[must_use]
    pub const fn with_latency(mut self, probability: f64, delay: Duration) -> Self {
        self.latency = Some((probability, delay));
        self
    }

    /// Sets the generator seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validates the probabilities.
    ///
    /// # Errors
    /// Returns an error if a probability is outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        check_probability("failure rate", self.failure_rate)?;
        if let Some((probability, _)) = self.latency {
            check_probability("latency probability", probability)?;
        }
        Ok(())
    }
}

fn check_probability(what: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(TestError::chaos(format!("{what} must be in [0, 1], got {value}")))
    }
}

/// Counters for what a [`ChaosService`] injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChaosStats {
    /// Calls received.
    pub calls: u64,
    /// Calls that failed.
    pub failures: u64,
    /// Calls that were delayed.
    pub delays: u64,
}

/// Simulated downstream with seeded failure and latency injection.
#[derive(Debug)]
pub struct ChaosService {
    latency: Option<(f64, Duration)>,
    failure_rate_bits: AtomicU64,
    rng: Mutex<fastrand::Rng>,
    calls: AtomicU64,
    failures: AtomicU64,
    delays: AtomicU64,
}

impl ChaosService {
    /// Creates a service from a validated config.
    ///
    /// # Errors
    /// Returns an error if the config does not validate.
    pub fn new(config: &ChaosConfig) -> Result<Self> {
        config.validate()?;
        tracing::debug!(
            failure_rate = config.failure_rate,
            latency = ?config.latency,
            seed = config.seed,
            "chaos service created"
        );
        Ok(Self::from_valid(config))
    }

    /// Creates a service that always succeeds.
    #[must_use]
    pub fn healthy() -> Self {
        Self::from_valid(&ChaosConfig::default())
    }

    /// Creates a service that always fails.
    #[must_use]
    pub fn down() -> Self {
        Self::from_valid(&ChaosConfig::failures(1.0))
    }

    fn from_valid(config: &ChaosConfig) -> Self {
        Self {
            latency: config.latency,
            failure_rate_bits: AtomicU64::new(config.failure_rate.to_bits()),
            rng: Mutex::new(fastrand::Rng::with_seed(config.seed)),
            calls: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            delays: AtomicU64::new(0),
        }
    }

    /// Returns the current failure rate.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        f64::from_bits(self.failure_rate_bits.load(Ordering::Relaxed))
    }

    /// Changes the failure rate, e.g. to simulate an outage and its recovery.
    ///
    /// # Errors
    /// Returns an error if `rate` is outside `[0, 1]`.
    pub fn set_failure_rate(&self, rate: f64) -> Result<()> {
        check_probability("failure rate", rate)?;
        self.failure_rate_bits.store(rate.to_bits(), Ordering::Relaxed);
        tracing::info!(failure_rate = rate, "chaos failure rate changed");
        Ok(())
    }

    fn draw(&self) -> f64 {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .f64()
    }

    fn decide_failure(&self) -> std::result::Result<(), InjectedFailure> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let rate = self.failure_rate();
        if rate > 0.0 && self.draw() < rate {
            self.failures.fetch_add(1, Ordering::Relaxed);
            Err(InjectedFailure)
        } else {
            Ok(())
        }
    }

    /// Handles one call synchronously. Latency injection does not apply.
    ///
    /// # Errors
    /// Returns [`InjectedFailure`] when the draw selects a failure.
    pub fn call(&self) -> std::result::Result<(), InjectedFailure> {
        self.decide_failure()
    }

    /// Handles one call, sleeping first if latency injection fires.
    ///
    /// # Errors
    /// Returns [`InjectedFailure`] when the draw selects a failure.
    pub async fn call_async(&self) -> std::result::Result<(), InjectedFailure> {
        if let Some((probability, delay)) = self.latency {
            if probability > 0.0 && self.draw() < probability {
                self.delays.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(delay = ?delay, "injecting latency");
                tokio::time::sleep(delay).await;
            }
        }
        self.decide_failure()
    }

    /// Returns the injection counters.
    #[must_use]
    pub fn stats(&self) -> ChaosStats {
        ChaosStats {
            calls: self.calls.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            delays: self.delays.load(Ordering::Relaxed),
        }
    }
}
