// Iron Lotus: Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # tripwire-test
//!
//! Testing infrastructure for Tripwire circuit breakers.
//!
//! This crate provides:
//! - **Test harness**: a breaker on a manual clock with an event recorder
//! - **Chaos injection**: seeded failure and latency injection
//! - **Load testing**: many tokio workers contending on one breaker
//! - **Falsification tests**: Popperian tests for the breaker's claims
//!
//! ## Iron Lotus Framework
//!
//! - **Built-in Quality** (品質の作り込み): Quality cannot be inspected in
//! - **Popperian Falsification**: Tests designed to refute claims
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use tripwire_core::{Settings, State, TripPolicy};
//! use tripwire_test::BreakerHarness;
//!
//! let h = BreakerHarness::new(
//!     Settings::new("db").with_trip_policy(TripPolicy::ConsecutiveFailures { threshold: 3 }),
//! );
//! h.trip(3)?;
//! h.advance(Duration::from_secs(60));
//! h.assert_state(State::HalfOpen)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod chaos;
pub mod error;
pub mod harness;
pub mod load;

pub use chaos::{ChaosConfig, ChaosService, ChaosStats, InjectedFailure};
pub use error::{Result, TestError};
pub use harness::{BreakerHarness, ObservedEvent, RecordingObserver};
pub use load::{LoadTestConfig, LoadTestReport, LoadTester, MAX_RUN_TIME, RequestHandler};
