// Iron Lotus: Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! Tripwire: Circuit Breakers for Failing Dependencies
//!
//! Part of the PAIML Sovereign AI Stack.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tripwire::prelude::*;
//!
//! let metrics = BreakerMetrics::new();
//! let registry = BreakerRegistry::new(Settings::new("default").with_observer(metrics.observer()));
//!
//! let orders = registry.get_or_create("orders-db");
//! match orders.execute(|| db.load(order_id)) {
//!     Ok(order) => respond(order),
//!     Err(err) if err.is_rejected() => respond_from_cache(order_id),
//!     Err(err) => return Err(err.into()),
//! }
//! ```

pub use tripwire_core as core;
pub use tripwire_observe as observe;

/// Prelude module for common imports.
pub mod prelude {
    pub use tripwire_core::{
        BreakerError, BreakerObserver, BreakerRegistry, CallContext, CallError, CircuitBreaker,
        Counts, Outcome, Permit, RegistryConfig, Settings, State, TripPolicy,
    };
    pub use tripwire_observe::{BreakerMetrics, LogConfig, MetricsSnapshot};
}
