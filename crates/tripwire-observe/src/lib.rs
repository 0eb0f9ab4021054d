// Iron Lotus: Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # tripwire-observe
//!
//! Observability for Tripwire circuit breakers.
//!
//! This crate provides:
//! - **Logging**: `tracing-subscriber` setup honoring `RUST_LOG`
//! - **Metrics**: [`BreakerMetrics`], an observer counting requests by state
//!   and outcome, trips and recoveries, with serde snapshots
//!
//! ## Iron Lotus Framework
//!
//! - **Genchi Genbutsu** (現地現物): Every transition is a structured event
//! - **Visual Management** (目で見る管理): Per-breaker counters and state gauges
//!
//! ## Example
//!
//! ```rust,ignore
//! use tripwire_core::{CircuitBreaker, Settings};
//! use tripwire_observe::{BreakerMetrics, LogConfig};
//!
//! tripwire_observe::logging::init(&LogConfig::new("tripwire_core=info"));
//!
//! let metrics = BreakerMetrics::new();
//! let breaker = CircuitBreaker::new(Settings::new("db").with_observer(metrics.observer()));
//!
//! println!("{}", metrics.snapshot().to_json()?);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{ObserveError, Result};
pub use logging::{LogConfig, LogFormat};
pub use metrics::{BreakerMetrics, BreakerSnapshot, MetricsSnapshot, RequestCount};
