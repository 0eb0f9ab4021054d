//! Falsification Tests: Category B - Generations and Windows (F021-F030)
//!
//! # Toyota Way: Genchi Genbutsu (現地現物)
//! Statistics describe only the calls that belong to the current window.

use std::time::Duration;

use tripwire_core::{Settings, State, TripPolicy};
use tripwire_test::BreakerHarness;

fn windowed(interval: Duration) -> BreakerHarness {
    BreakerHarness::new(
        Settings::new("window")
            .with_interval(interval)
            .with_trip_policy(TripPolicy::TotalFailures { threshold: 3 }),
    )
}

/// F021: The closed window clears counts when it expires
///
/// # Falsification Attempt
/// Interval 50ms, two failures, wait 60ms, read counts.
#[test]
fn f021_window_expiry_clears_counts() {
    let h = windowed(Duration::from_millis(50));
    h.fail_times(2);
    h.advance(Duration::from_millis(60));

    let counts = h.counts();
    assert_eq!(counts.requests, 0, "F021 FALSIFIED: Requests survived window");
    assert_eq!(
        counts.total_failures, 0,
        "F021 FALSIFIED: Failures survived window"
    );
    assert_eq!(h.state(), State::Closed, "F021 FALSIFIED: State changed");
}

/// F022: Failures spread across windows never accumulate
///
/// # Falsification Attempt
/// Two failures per 50ms window for ten windows with a threshold of three.
#[test]
fn f022_failures_do_not_cross_windows() {
    let h = windowed(Duration::from_millis(50));
    for _ in 0..10 {
        h.fail_times(2);
        h.advance(Duration::from_millis(50));
    }
    assert_eq!(
        h.state(),
        State::Closed,
        "F022 FALSIFIED: Failures accumulated across windows"
    );
}

/// F023: A zero interval never clears counts
///
/// # Falsification Attempt
/// Interval zero, one failure, wait a day.
#[test]
fn f023_zero_interval_never_resets() {
    let h = windowed(Duration::ZERO);
    h.fail_times(2);
    h.advance(Duration::from_secs(86_400));
    assert_eq!(h.counts().total_failures, 2, "F023 FALSIFIED: Counts reset");

    h.fail_times(1);
    assert_eq!(h.state(), State::Open, "F023 FALSIFIED: Threshold not reached");
}

/// F024: A completion from an expired window is discarded
///
/// # Falsification Attempt
/// Admit, let the window roll, record new traffic, then report the old call.
#[test]
fn f024_stale_window_completion_discarded() {
    let h = windowed(Duration::from_millis(50));
    let stale = h.breaker().allow().unwrap();

    h.advance(Duration::from_millis(50));
    h.fail_times(2);
    let before = h.counts();

    stale.failure();
    assert_eq!(h.counts(), before, "F024 FALSIFIED: Stale failure counted");
    assert_eq!(h.state(), State::Closed, "F024 FALSIFIED: Stale failure tripped");
}

/// F025: A probe admitted before a reopen cannot close the breaker
///
/// # Falsification Attempt
/// Two probes in flight, one fails (reopen), then the other succeeds.
#[test]
fn f025_stale_probe_cannot_close() {
    let h = BreakerHarness::new(
        Settings::new("probe")
            .with_trip_policy(TripPolicy::ConsecutiveFailures { threshold: 1 })
            .with_timeout(Duration::from_millis(100))
            .with_max_requests(2),
    );
    h.trip(1).unwrap();
    h.advance(Duration::from_millis(100));

    let slow = h.breaker().allow().unwrap();
    let fast = h.breaker().allow().unwrap();
    fast.failure();
    assert_eq!(h.state(), State::Open);

    slow.success();
    assert_eq!(h.state(), State::Open, "F025 FALSIFIED: Stale probe closed breaker");
    assert!(h.counts().is_empty(), "F025 FALSIFIED: Stale probe counted");
}

/// F026: A call admitted while closed cannot reopen a recovered breaker
///
/// # Falsification Attempt
/// Admit in closed, trip and recover, then report the old call as failure.
#[test]
fn f026_old_closed_call_cannot_reopen() {
    let h = BreakerHarness::new(
        Settings::new("old")
            .with_trip_policy(TripPolicy::ConsecutiveFailures { threshold: 1 })
            .with_timeout(Duration::from_millis(10)),
    );
    let old = h.breaker().allow().unwrap();
    h.trip(1).unwrap();
    h.advance(Duration::from_millis(10));
    h.succeed().unwrap();
    assert_eq!(h.state(), State::Closed);

    old.failure();
    assert_eq!(h.state(), State::Closed, "F026 FALSIFIED: Old call reopened");
}

/// F027: Every transition clears counts
///
/// # Falsification Attempt
/// Check counts right after each of the three transitions.
#[test]
fn f027_transitions_clear_counts() {
    let h = BreakerHarness::new(
        Settings::new("clear")
            .with_trip_policy(TripPolicy::ConsecutiveFailures { threshold: 2 })
            .with_timeout(Duration::from_millis(10))
            .with_max_requests(1),
    );
    h.succeed_times(3);
    h.trip(2).unwrap();
    assert!(h.counts().is_empty(), "F027 FALSIFIED: Counts kept on open");

    h.advance(Duration::from_millis(10));
    assert!(h.counts().is_empty(), "F027 FALSIFIED: Counts kept on half-open");

    h.succeed().unwrap();
    assert!(h.counts().is_empty(), "F027 FALSIFIED: Counts kept on close");
}

/// F028: Streak counters are mutually exclusive after every completion
///
/// # Falsification Attempt
/// Alternate outcomes in irregular runs.
#[test]
fn f028_streaks_exclusive() {
    let h = BreakerHarness::new(Settings::new("streaks").with_ready_to_trip(|_| false));
    for run in [1u32, 3, 2, 5, 1, 1, 4] {
        h.succeed_times(run);
        let c = h.counts();
        assert!(
            c.consecutive_failures == 0 && c.consecutive_successes == run,
            "F028 FALSIFIED: Success streak {c:?}"
        );
        h.fail_times(run);
        let c = h.counts();
        assert!(
            c.consecutive_successes == 0 && c.consecutive_failures == run,
            "F028 FALSIFIED: Failure streak {c:?}"
        );
    }
}

/// F029: The window restarts after recovery
///
/// # Falsification Attempt
/// After closing, failures just inside the new window still count.
#[test]
fn f029_window_restarts_on_close() {
    let h = BreakerHarness::new(
        Settings::new("restart")
            .with_interval(Duration::from_millis(100))
            .with_timeout(Duration::from_millis(500))
            .with_trip_policy(TripPolicy::TotalFailures { threshold: 2 }),
    );
    h.trip(2).unwrap();
    h.advance(Duration::from_millis(500));
    h.succeed().unwrap();
    assert_eq!(h.state(), State::Closed);

    h.advance(Duration::from_millis(99));
    h.fail_times(1);
    assert_eq!(
        h.counts().total_failures,
        1,
        "F029 FALSIFIED: Window measured from before the close"
    );
}

/// F030: Reset discards completions of calls already in flight
///
/// # Falsification Attempt
/// Admit, reset, report failure.
#[test]
fn f030_reset_starts_new_generation() {
    let h = windowed(Duration::from_secs(60));
    let inflight = h.breaker().allow().unwrap();
    h.breaker().reset();
    inflight.failure();
    assert!(
        h.counts().is_empty(),
        "F030 FALSIFIED: In-flight call counted after reset"
    );
}
