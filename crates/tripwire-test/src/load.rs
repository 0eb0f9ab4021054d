//! Load testing for circuit breakers.
//!
//! # Toyota Way: Heijunka (平準化)
//! Level loading to understand how a breaker behaves under contention.
//!
//! # Implementation
//! Concurrent tokio workers share one breaker. Each request goes through
//! [`CircuitBreaker::execute_async`]; the report separates what the breaker
//! rejected from what the downstream did with the calls it let through.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tripwire_core::{CircuitBreaker, State};

use crate::chaos::{ChaosService, InjectedFailure};
use crate::error::{Result, TestError};

/// Longest run (`ramp_up + duration`) a load test accepts.
///
/// Every admitted request keeps one latency sample, so the run length bounds
/// memory as well as wall time.
pub const MAX_RUN_TIME: Duration = Duration::from_secs(60 * 60);

/// Load test configuration.
#[derive(Debug, Clone)]
pub struct LoadTestConfig {
    /// Number of concurrent workers.
    pub concurrent_users: u32,
    /// Time to reach full concurrency.
    pub ramp_up: Duration,
    /// Test duration after ramp-up.
    pub duration: Duration,
    /// Stop each worker after this many requests.
    pub requests_per_user: Option<u32>,
    /// Pause between a worker's requests.
    pub think_time: Option<Duration>,
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            concurrent_users: 10,
            ramp_up: Duration::from_secs(1),
            duration: Duration::from_secs(10),
            requests_per_user: None,
            think_time: None,
        }
    }
}

impl LoadTestConfig {
    /// Creates a quick config for tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            concurrent_users: 4,
            ramp_up: Duration::from_millis(10),
            duration: Duration::from_millis(500),
            requests_per_user: Some(25),
            think_time: None,
        }
    }

    /// Creates a heavy config: many workers contending on one breaker.
    #[must_use]
    pub fn heavy() -> Self {
        Self {
            concurrent_users: 64,
            ramp_up: Duration::from_millis(100),
            duration: Duration::from_secs(5),
            requests_per_user: Some(500),
            think_time: None,
        }
    }

    /// Validates the config.
    ///
    /// # Errors
    /// Returns an error if there are no workers or the run is longer than
    /// [`MAX_RUN_TIME`].
    pub fn validate(&self) -> Result<()> {
        if self.concurrent_users == 0 {
            return Err(TestError::load_test("concurrent_users must be at least 1"));
        }
        match self.ramp_up.checked_add(self.duration) {
            Some(run) if run <= MAX_RUN_TIME => {}
            _ => {
                return Err(TestError::load_test(format!(
                    "ramp_up + duration must not exceed {MAX_RUN_TIME:?}"
                )));
            }
        }
        if self.think_time.is_some_and(|pause| pause > MAX_RUN_TIME) {
            return Err(TestError::load_test(format!(
                "think_time must not exceed {MAX_RUN_TIME:?}"
            )));
        }
        Ok(())
    }
}

/// Request handler: receives `(user_id, request_id)`, returns true on success.
pub type RequestHandler = Arc<dyn Fn(u32, u64) -> bool + Send + Sync>;

#[derive(Clone)]
enum Workload {
    Simulated,
    Handler(RequestHandler),
    Chaos(Arc<ChaosService>),
}

impl Workload {
    async fn call(&self, user_id: u32, request_id: u64) -> std::result::Result<(), InjectedFailure> {
        match self {
            Self::Simulated => {
                tokio::time::sleep(Duration::from_micros(100)).await;
                if request_id % 100 == 0 {
                    Err(InjectedFailure)
                } else {
                    Ok(())
                }
            }
            Self::Handler(handler) => {
                if handler(user_id, request_id) {
                    Ok(())
                } else {
                    Err(InjectedFailure)
                }
            }
            Self::Chaos(service) => service.call_async().await,
        }
    }
}

/// Shared counters for concurrent workers.
#[derive(Default)]
struct LoadMetrics {
    total_requests: AtomicU64,
    rejected: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    latencies_us: Mutex<Vec<u64>>,
}

impl LoadMetrics {
    fn record_admitted(&self, success: bool, latency_us: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.latencies_us
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(latency_us);
    }

    fn record_rejected(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    fn latencies(&self) -> Vec<u64> {
        self.latencies_us
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Drives one shared breaker from many workers.
pub struct LoadTester {
    config: LoadTestConfig,
    breaker: Arc<CircuitBreaker>,
    workload: Workload,
}

impl LoadTester {
    /// Creates a load tester with a simulated downstream
    /// (100µs per call, every hundredth request of a worker fails).
    #[must_use]
    pub fn new(config: LoadTestConfig, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            config,
            breaker,
            workload: Workload::Simulated,
        }
    }

    /// Uses a custom handler as the downstream.
    #[must_use]
    pub fn with_handler(mut self, handler: RequestHandler) -> Self {
        self.workload = Workload::Handler(handler);
        self
    }

    /// Uses a chaos service as the downstream.
    #[must_use]
    pub fn with_chaos(mut self, service: Arc<ChaosService>) -> Self {
        self.workload = Workload::Chaos(service);
        self
    }

    /// Returns the test config.
    #[must_use]
    pub const fn config(&self) -> &LoadTestConfig {
        &self.config
    }

    /// Runs the load test.
    ///
    /// # Errors
    /// Returns an error if the config is invalid or a worker panicked.
    pub async fn run(&self) -> Result<LoadTestReport> {
        self.config.validate()?;

        tracing::info!(
            breaker = %self.breaker.name(),
            users = self.config.concurrent_users,
            duration = ?self.config.duration,
            ramp_up = ?self.config.ramp_up,
            "starting load test"
        );

        let metrics = Arc::new(LoadMetrics::default());
        let start_time = Instant::now();
        let test_end = start_time
            .checked_add(self.config.ramp_up + self.config.duration)
            .ok_or_else(|| TestError::load_test("test end time overflows the clock"))?;

        let users = self.config.concurrent_users;
        let ramp_step = if users > 1 {
            self.config.ramp_up / (users - 1)
        } else {
            Duration::ZERO
        };

        let mut handles = Vec::with_capacity(users as usize);
        for user_id in 0..users {
            let metrics = Arc::clone(&metrics);
            let breaker = Arc::clone(&self.breaker);
            let workload = self.workload.clone();
            let requests_per_user = self.config.requests_per_user;
            let think_time = self.config.think_time;
            let start_delay = ramp_step * user_id;

            handles.push(tokio::spawn(async move {
                tokio::time::sleep(start_delay).await;

                let mut request_id = 0u64;
                loop {
                    if Instant::now() >= test_end {
                        break;
                    }
                    if requests_per_user.is_some_and(|max| request_id >= u64::from(max)) {
                        break;
                    }

                    let req_start = Instant::now();
                    let result = breaker
                        .execute_async(|| workload.call(user_id, request_id))
                        .await;
                    let latency_us =
                        u64::try_from(req_start.elapsed().as_micros()).unwrap_or(u64::MAX);

                    match result {
                        Ok(()) => metrics.record_admitted(true, latency_us),
                        Err(err) if err.is_rejected() => metrics.record_rejected(),
                        Err(_) => metrics.record_admitted(false, latency_us),
                    }

                    request_id += 1;
                    match think_time {
                        Some(pause) => tokio::time::sleep(pause).await,
                        None => tokio::task::yield_now().await,
                    }
                }
            }));
        }

        for handle in handles {
            handle
                .await
                .map_err(|e| TestError::load_test(format!("worker failed: {e}")))?;
        }

        let elapsed = start_time.elapsed();
        let mut latencies = metrics.latencies();
        latencies.sort_unstable();

        let report = LoadTestReport {
            total_requests: metrics.total_requests.load(Ordering::Relaxed),
            rejected: metrics.rejected.load(Ordering::Relaxed),
            successful: metrics.successful.load(Ordering::Relaxed),
            failed: metrics.failed.load(Ordering::Relaxed),
            latency_p50_us: percentile(&latencies, 50),
            latency_p95_us: percentile(&latencies, 95),
            latency_p99_us: percentile(&latencies, 99),
            elapsed,
            final_state: self.breaker.state(),
        };

        tracing::info!(
            breaker = %self.breaker.name(),
            total = report.total_requests,
            rejected = report.rejected,
            successful = report.successful,
            failed = report.failed,
            throughput_rps = format!("{:.2}", report.throughput_rps()),
            p50_us = report.latency_p50_us,
            p99_us = report.latency_p99_us,
            final_state = %report.final_state,
            "load test completed"
        );

        Ok(report)
    }
}

impl std::fmt::Debug for LoadTester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadTester")
            .field("config", &self.config)
            .field("breaker", &self.breaker.name())
            .finish_non_exhaustive()
    }
}

/// Returns the `p`th percentile of a sorted slice.
fn percentile(sorted: &[u64], p: usize) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = (sorted.len() * p / 100).min(sorted.len() - 1);
    sorted[idx]
}

/// Load test report.
#[derive(Debug, Clone)]
pub struct LoadTestReport {
    /// Requests attempted.
    pub total_requests: u64,
    /// Requests the breaker refused.
    pub rejected: u64,
    /// Admitted requests that succeeded.
    pub successful: u64,
    /// Admitted requests that failed.
    pub failed: u64,
    /// P50 latency of admitted requests, in microseconds.
    pub latency_p50_us: u64,
    /// P95 latency of admitted requests, in microseconds.
    pub latency_p95_us: u64,
    /// P99 latency of admitted requests, in microseconds.
    pub latency_p99_us: u64,
    /// Wall time of the run.
    pub elapsed: Duration,
    /// Breaker state once every worker finished.
    pub final_state: State,
}

#[allow(clippy::cast_precision_loss)]
impl LoadTestReport {
    /// Returns the number of requests the breaker let through.
    #[must_use]
    pub const fn admitted(&self) -> u64 {
        self.successful + self.failed
    }

    /// Returns rejected / total, or 0 with no requests.
    #[must_use]
    pub fn rejection_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.rejected as f64 / self.total_requests as f64
        }
    }

    /// Returns failed / admitted, or 0 with nothing admitted.
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        let admitted = self.admitted();
        if admitted == 0 {
            0.0
        } else {
            self.failed as f64 / admitted as f64
        }
    }

    /// Returns requests per second over the run.
    #[must_use]
    pub fn throughput_rps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_requests as f64 / secs
        } else {
            0.0
        }
    }
}
