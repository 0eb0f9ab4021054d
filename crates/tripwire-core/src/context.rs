//! Cancellation context for breaker-protected async calls.
//!
//! A [`CallContext`] is handed to the protected call so it can observe
//! cancellation itself, and is raced against the call by
//! [`CircuitBreaker::execute_with_context`](crate::CircuitBreaker::execute_with_context)
//! so an abandoned call is still recorded as a failure.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Why a context finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// [`CallContext::cancel`] was called.
    Cancelled,
    /// The deadline passed.
    DeadlineExceeded,
}

/// Cloneable cancellation signal with an optional deadline.
///
/// Clones share the same signal: cancelling one cancels all of them.
#[derive(Debug, Clone)]
pub struct CallContext {
    cancel_tx: Arc<watch::Sender<bool>>,
    deadline: Option<Instant>,
}

impl CallContext {
    /// Creates a context with no deadline.
    #[must_use]
    pub fn new() -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            cancel_tx: Arc::new(cancel_tx),
            deadline: None,
        }
    }

    /// Creates a context that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().deadline_in(timeout)
    }

    /// Creates a context that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        let mut ctx = Self::new();
        ctx.deadline = Some(deadline);
        ctx
    }

    /// Returns a context sharing this signal whose deadline is at most
    /// `timeout` from now.
    #[must_use]
    pub fn deadline_in(&self, timeout: Duration) -> Self {
        let candidate = Instant::now().checked_add(timeout);
        let deadline = match (self.deadline, candidate) {
            (Some(current), Some(candidate)) => Some(current.min(candidate)),
            (current, candidate) => current.or(candidate),
        };
        Self {
            cancel_tx: Arc::clone(&self.cancel_tx),
            deadline,
        }
    }

    /// Cancels this context and every clone of it.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns why the context finished, or `None` if it is still live.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        if *self.cancel_tx.borrow() {
            Some(CancelReason::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(CancelReason::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Returns true if the context was cancelled or its deadline passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Waits until the context finishes.
    pub async fn done(&self) -> CancelReason {
        let mut cancel_rx = self.cancel_tx.subscribe();
        let cancelled = async move {
            // The sender lives as long as `self`, so this only returns on cancel.
            let _ = cancel_rx.wait_for(|cancelled| *cancelled).await;
        };

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = cancelled => CancelReason::Cancelled,
                    () = tokio::time::sleep_until(deadline) => CancelReason::DeadlineExceeded,
                }
            }
            None => {
                cancelled.await;
                CancelReason::Cancelled
            }
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}
