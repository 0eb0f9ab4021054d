//! Per-breaker metrics collected through [`BreakerObserver`].
//!
//! # Toyota Way: Visual Management (目で見る管理)
//! Make every breaker's health visible at a glance.
//!
//! Attach one [`BreakerMetrics`] to many breakers; series are keyed by
//! breaker name and created on the first event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tripwire_core::{BreakerObserver, Outcome, State};

use crate::error::{ObserveError, Result};

/// Thread-safe breaker metrics that can be shared across tasks.
#[derive(Debug, Clone)]
pub struct BreakerMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    series: RwLock<HashMap<String, Arc<Series>>>,
    start_time: Instant,
}

#[derive(Debug, Default)]
struct Series {
    // Indexed by [state gauge][outcome index]
    requests: [[AtomicU64; 3]; 3],
    state: AtomicU8,
    trips: AtomicU64,
    recoveries: AtomicU64,
    transitions: AtomicU64,
}

impl Series {
    fn count(&self, state: State, outcome: Outcome) -> u64 {
        self.requests[usize::from(state.as_gauge())][outcome.index()].load(Ordering::Relaxed)
    }

    fn outcome_total(&self, outcome: Outcome) -> u64 {
        State::ALL
            .iter()
            .map(|state| self.count(*state, outcome))
            .sum()
    }

    fn state(&self) -> State {
        State::from_gauge(self.state.load(Ordering::Relaxed)).unwrap_or_default()
    }

    fn clear_counters(&self) {
        for cell in self.requests.iter().flatten() {
            cell.store(0, Ordering::Relaxed);
        }
        self.trips.store(0, Ordering::Relaxed);
        self.recoveries.store(0, Ordering::Relaxed);
        self.transitions.store(0, Ordering::Relaxed);
    }
}

impl BreakerMetrics {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                series: RwLock::new(HashMap::new()),
                start_time: Instant::now(),
            }),
        }
    }

    /// Returns this collector as an observer for [`tripwire_core::Settings::with_observer`].
    #[must_use]
    pub fn observer(&self) -> Arc<dyn BreakerObserver> {
        Arc::new(self.clone())
    }

    fn series(&self, name: &str) -> Arc<Series> {
        if let Some(series) = self.find(name) {
            return series;
        }
        let mut map = self
            .inner
            .series
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(name.to_string()).or_default())
    }

    fn find(&self, name: &str) -> Option<Arc<Series>> {
        self.inner
            .series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(Arc::clone)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════════

    /// Returns the request count for `(state, outcome)` on breaker `name`.
    #[must_use]
    pub fn requests(&self, name: &str, state: State, outcome: Outcome) -> u64 {
        self.find(name).map_or(0, |s| s.count(state, outcome))
    }

    /// Returns the number of requests with `outcome` in any state.
    #[must_use]
    pub fn outcome_total(&self, name: &str, outcome: Outcome) -> u64 {
        self.find(name).map_or(0, |s| s.outcome_total(outcome))
    }

    /// Returns the last state reported for `name`.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<State> {
        self.find(name).map(|s| s.state())
    }

    /// Returns how many times `name` opened.
    #[must_use]
    pub fn trips(&self, name: &str) -> u64 {
        self.find(name)
            .map_or(0, |s| s.trips.load(Ordering::Relaxed))
    }

    /// Returns how many times `name` closed from half-open.
    #[must_use]
    pub fn recoveries(&self, name: &str) -> u64 {
        self.find(name)
            .map_or(0, |s| s.recoveries.load(Ordering::Relaxed))
    }

    /// Returns the number of transitions `name` went through.
    #[must_use]
    pub fn transitions(&self, name: &str) -> u64 {
        self.find(name)
            .map_or(0, |s| s.transitions.load(Ordering::Relaxed))
    }

    /// Zeroes every counter.
    ///
    /// Known breakers keep their series and their last reported state, so an
    /// open breaker still reads as open until its next transition.
    pub fn reset(&self) {
        for series in self
            .inner
            .series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
        {
            series.clear_counters();
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Snapshot
    // ═══════════════════════════════════════════════════════════════════════════

    /// Returns a point-in-time copy of every series, sorted by breaker name.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let series: Vec<(String, Arc<Series>)> = self
            .inner
            .series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, series)| (name.clone(), Arc::clone(series)))
            .collect();

        let mut breakers: Vec<BreakerSnapshot> = series
            .into_iter()
            .map(|(name, series)| BreakerSnapshot::from_series(name, &series))
            .collect();
        breakers.sort_by(|a, b| a.name.cmp(&b.name));

        MetricsSnapshot {
            uptime_secs: self.inner.start_time.elapsed().as_secs_f64(),
            breakers,
        }
    }
}

impl Default for BreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerObserver for BreakerMetrics {
    fn on_request(&self, name: &str, state: State, outcome: Outcome) {
        let series = self.series(name);
        series.requests[usize::from(state.as_gauge())][outcome.index()]
            .fetch_add(1, Ordering::Relaxed);
    }

    fn on_state_change(&self, name: &str, from: State, to: State) {
        let series = self.series(name);
        series.state.store(to.as_gauge(), Ordering::Relaxed);
        series.transitions.fetch_add(1, Ordering::Relaxed);
        if to == State::Open {
            series.trips.fetch_add(1, Ordering::Relaxed);
        }
        if from == State::HalfOpen && to == State::Closed {
            series.recoveries.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Point-in-time metrics for every observed breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Seconds since the collector was created.
    pub uptime_secs: f64,
    /// Per-breaker series, sorted by name.
    pub breakers: Vec<BreakerSnapshot>,
}

impl MetricsSnapshot {
    /// Returns the series for `name`.
    #[must_use]
    pub fn breaker(&self, name: &str) -> Option<&BreakerSnapshot> {
        self.breakers.iter().find(|b| b.name == name)
    }

    /// Serializes the snapshot as JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ObserveError::export(e.to_string()))
    }
}

/// One breaker's metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    /// Breaker name.
    pub name: String,
    /// Last reported state.
    pub state: State,
    /// Non-zero request counts by state and outcome.
    pub requests: Vec<RequestCount>,
    /// Times the breaker opened.
    pub trips: u64,
    /// Times the breaker closed from half-open.
    pub recoveries: u64,
    /// Total transitions.
    pub transitions: u64,
}

impl BreakerSnapshot {
    fn from_series(name: String, series: &Series) -> Self {
        let mut requests = Vec::new();
        for state in State::ALL {
            for outcome in Outcome::ALL {
                let count = series.count(state, outcome);
                if count > 0 {
                    requests.push(RequestCount {
                        state,
                        outcome,
                        count,
                    });
                }
            }
        }

        Self {
            name,
            state: series.state(),
            requests,
            trips: series.trips.load(Ordering::Relaxed),
            recoveries: series.recoveries.load(Ordering::Relaxed),
            transitions: series.transitions.load(Ordering::Relaxed),
        }
    }

    /// Returns the number of requests with `outcome` in any state.
    #[must_use]
    pub fn total(&self, outcome: Outcome) -> u64 {
        self.requests
            .iter()
            .filter(|r| r.outcome == outcome)
            .map(|r| r.count)
            .sum()
    }

    /// Returns rejected / (admitted + rejected), or 0 with no traffic.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rejection_rate(&self) -> f64 {
        let all: u64 = self.requests.iter().map(|r| r.count).sum();
        if all == 0 {
            0.0
        } else {
            self.total(Outcome::Rejected) as f64 / all as f64
        }
    }
}

/// Request count for one `(state, outcome)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCount {
    /// State the request was admitted or rejected in.
    pub state: State,
    /// What happened to it.
    pub outcome: Outcome,
    /// How many times.
    pub count: u64,
}
