// Iron Lotus: Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # tripwire-core
//!
//! Circuit breaker primitives for the Tripwire resilience toolkit.
//!
//! - [`CircuitBreaker`] three-state admission control around a downstream
//! - [`Settings`] construction options with clamped defaults
//! - [`BreakerRegistry`] named breakers created on first use
//! - [`RegistryConfig`] TOML configuration for a whole registry
//! - [`BreakerObserver`] seam for metrics and audit sinks
//!
//! ## Iron Lotus Framework
//!
//! - **Jidoka**: Stop calling a failing downstream, probe before resuming
//! - **Poka-Yoke**: Out-of-range settings are clamped, config is validated at load
//! - **Genchi Genbutsu**: Every transition is logged with its generation
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use tripwire_core::{CircuitBreaker, Settings, TripPolicy};
//!
//! let breaker = CircuitBreaker::new(
//!     Settings::new("payments")
//!         .with_timeout(Duration::from_secs(30))
//!         .with_trip_policy(TripPolicy::ConsecutiveFailures { threshold: 5 }),
//! );
//!
//! let receipt = breaker.execute_async(|| client.charge(order)).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

pub mod breaker;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod observer;
pub mod registry;
pub mod settings;
pub mod state;

pub use breaker::{CircuitBreaker, Permit};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BreakerConfig, BreakerDefaults, RegistryConfig, validate_name};
pub use context::{CallContext, CancelReason};
pub use error::{BreakerError, CallError, ConfigError, Result};
pub use observer::{BreakerObserver, ObserverSet, Outcome};
pub use registry::BreakerRegistry;
pub use settings::{
    DEFAULT_INTERVAL, DEFAULT_MAX_REQUESTS, DEFAULT_TIMEOUT, DEFAULT_TRIP_MIN_REQUESTS,
    IsSuccessful, OnStateChange, ReadyToTrip, Settings, TripPolicy, default_ready_to_trip,
    every_error_is_failure,
};
pub use state::{Counts, State};
