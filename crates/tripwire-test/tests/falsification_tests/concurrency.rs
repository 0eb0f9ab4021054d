//! Falsification Tests: Category C - Concurrency (F031-F040)
//!
//! # Toyota Way: Heijunka (平準化)
//! Many callers, one breaker, one consistent view.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tripwire_core::{
    BreakerRegistry, CallContext, CallError, CircuitBreaker, Settings, State, TripPolicy,
};
use tripwire_test::{
    ChaosConfig, ChaosService, InjectedFailure, LoadTestConfig, LoadTester, RequestHandler,
};

/// F031: Concurrent completions never lose a count
///
/// # Falsification Attempt
/// 16 threads x 500 calls with a predicate that never trips.
#[test]
fn f031_no_lost_updates() {
    let breaker = Arc::new(CircuitBreaker::new(
        Settings::new("contended")
            .with_ready_to_trip(|_| false)
            .with_interval(Duration::ZERO),
    ));
    let handles: Vec<_> = (0..16)
        .map(|t| {
            let breaker = Arc::clone(&breaker);
            std::thread::spawn(move || {
                for i in 0..500u32 {
                    let fail = (t + i) % 3 == 0;
                    let _ = breaker.execute(|| {
                        if fail {
                            Err(InjectedFailure)
                        } else {
                            Ok(())
                        }
                    });
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let counts = breaker.counts();
    assert_eq!(counts.requests, 8000, "F031 FALSIFIED: Lost admissions");
    assert_eq!(
        counts.total_successes + counts.total_failures,
        8000,
        "F031 FALSIFIED: Lost completions"
    );
}

/// F032: Concurrent half-open probes never exceed the budget
///
/// # Falsification Attempt
/// 32 threads race for 3 probe slots while holding their permits.
#[test]
fn f032_probe_budget_under_contention() {
    let clock = Arc::new(tripwire_core::ManualClock::new());
    let breaker = Arc::new(CircuitBreaker::new(
        Settings::new("race")
            .with_trip_policy(TripPolicy::ConsecutiveFailures { threshold: 1 })
            .with_timeout(Duration::from_millis(10))
            .with_max_requests(3)
            .with_clock(Arc::clone(&clock) as Arc<dyn tripwire_core::Clock>),
    ));
    let _ = breaker.execute(|| Err::<(), _>(InjectedFailure));
    clock.advance(Duration::from_millis(10));

    let admitted = Arc::new(AtomicU32::new(0));
    let barrier = Arc::new(std::sync::Barrier::new(32));
    let handles: Vec<_> = (0..32)
        .map(|_| {
            let breaker = Arc::clone(&breaker);
            let admitted = Arc::clone(&admitted);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let permit = breaker.allow().ok();
                if permit.is_some() {
                    admitted.fetch_add(1, Ordering::SeqCst);
                }
                barrier.wait();
                if let Some(permit) = permit {
                    permit.success();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(
        admitted.load(Ordering::SeqCst),
        3,
        "F032 FALSIFIED: Probe budget exceeded under contention"
    );
    assert_eq!(breaker.state(), State::Closed);
}

/// F033: A persistent outage trips the breaker under load
///
/// # Falsification Attempt
/// Drive a fully failing service with 8 workers.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn f033_outage_trips_under_load() {
    let breaker = Arc::new(CircuitBreaker::new(
        Settings::new("outage").with_trip_policy(TripPolicy::ConsecutiveFailures { threshold: 5 }),
    ));
    let config = LoadTestConfig {
        concurrent_users: 8,
        requests_per_user: Some(50),
        ..LoadTestConfig::quick()
    };
    let report = LoadTester::new(config, Arc::clone(&breaker))
        .with_chaos(Arc::new(ChaosService::down()))
        .run()
        .await
        .unwrap();

    assert_eq!(report.final_state, State::Open, "F033 FALSIFIED: Did not trip");
    assert!(
        report.rejected > report.admitted(),
        "F033 FALSIFIED: Breaker let most of the outage through"
    );
    assert_eq!(report.successful, 0);
}

/// F034: A healthy service is never rejected under load
///
/// # Falsification Attempt
/// 16 workers against a healthy service with the default predicate.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn f034_healthy_service_never_rejected() {
    let breaker = Arc::new(CircuitBreaker::new(Settings::new("healthy")));
    let config = LoadTestConfig {
        concurrent_users: 16,
        ..LoadTestConfig::quick()
    };
    let report = LoadTester::new(config, breaker)
        .with_chaos(Arc::new(ChaosService::healthy()))
        .run()
        .await
        .unwrap();

    assert_eq!(report.rejected, 0, "F034 FALSIFIED: Healthy calls rejected");
    assert_eq!(report.successful, 16 * 25);
}

/// F035: Sparse failures below the majority do not trip
///
/// # Falsification Attempt
/// 10% seeded failure rate with the default predicate.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn f035_sparse_failures_do_not_trip() {
    let breaker = Arc::new(CircuitBreaker::new(Settings::new("sparse")));
    let service = ChaosService::new(&ChaosConfig::failures(0.1).with_seed(99)).unwrap();
    let report = LoadTester::new(LoadTestConfig::quick(), breaker)
        .with_chaos(Arc::new(service))
        .run()
        .await
        .unwrap();

    assert_eq!(report.final_state, State::Closed, "F035 FALSIFIED: Tripped on 10%");
    assert_eq!(report.rejected, 0);
}

/// F036: Every request is either admitted or rejected, never both or neither
///
/// # Falsification Attempt
/// Mixed handler failing two thirds of the time.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn f036_request_accounting() {
    let breaker = Arc::new(CircuitBreaker::new(
        Settings::new("accounting").with_trip_policy(TripPolicy::ConsecutiveFailures { threshold: 4 }),
    ));
    let handler: RequestHandler = Arc::new(|_, request| request % 3 == 0);
    let report = LoadTester::new(LoadTestConfig::quick(), breaker)
        .with_handler(handler)
        .run()
        .await
        .unwrap();

    assert_eq!(
        report.admitted() + report.rejected,
        report.total_requests,
        "F036 FALSIFIED: Requests unaccounted for"
    );
    assert_eq!(report.total_requests, 100);
}

/// F037: Dropping an in-flight async call records a failure
///
/// # Falsification Attempt
/// Time out the caller's future while the downstream hangs.
#[tokio::test(start_paused = true)]
async fn f037_dropped_future_is_failure() {
    let breaker = CircuitBreaker::new(
        Settings::new("dropped").with_trip_policy(TripPolicy::ConsecutiveFailures { threshold: 1 }),
    );
    let hung = breaker.execute_async(|| async {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok::<_, InjectedFailure>(())
    });
    let timed_out = tokio::time::timeout(Duration::from_millis(50), hung).await;

    assert!(timed_out.is_err());
    assert_eq!(
        breaker.state(),
        State::Open,
        "F037 FALSIFIED: Dropped call not recorded as failure"
    );
}

/// F038: A cancelled context aborts the call and counts a failure
///
/// # Falsification Attempt
/// Cancel from another task while the call hangs.
#[tokio::test]
async fn f038_cancelled_context() {
    let breaker = Arc::new(CircuitBreaker::new(Settings::new("cancel")));
    let ctx = CallContext::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let result = breaker
        .execute_with_context(&ctx, |inner| async move {
            inner.done().await;
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, InjectedFailure>(())
        })
        .await;

    assert!(
        matches!(result, Err(CallError::Cancelled)),
        "F038 FALSIFIED: Cancellation not reported"
    );
    assert_eq!(breaker.counts().total_failures, 1, "F038 FALSIFIED: Not counted");
}

/// F039: A call that beats its deadline returns its own result
///
/// # Falsification Attempt
/// Deadline 1s, call finishes in 10ms.
#[tokio::test(start_paused = true)]
async fn f039_fast_call_beats_deadline() {
    let breaker = CircuitBreaker::new(Settings::new("fast"));
    let ctx = CallContext::with_timeout(Duration::from_secs(1));
    let result = breaker
        .execute_with_context(&ctx, |_| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, InjectedFailure>(42)
        })
        .await;

    assert_eq!(result.unwrap(), 42, "F039 FALSIFIED: Deadline fired early");
    assert_eq!(breaker.counts().total_successes, 1);
}

/// F040: Racing first use of a name yields one shared breaker
///
/// # Falsification Attempt
/// 32 threads call `get_or_create` on the same name at once.
#[test]
fn f040_registry_single_instance() {
    let registry = Arc::new(BreakerRegistry::default());
    let barrier = Arc::new(std::sync::Barrier::new(32));
    let handles: Vec<_> = (0..32)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                registry.get_or_create("GET /orders")
            })
        })
        .collect();

    let breakers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(
        breakers.iter().all(|b| Arc::ptr_eq(b, &breakers[0])),
        "F040 FALSIFIED: Duplicate breakers constructed"
    );
    assert_eq!(registry.len(), 1);
}
