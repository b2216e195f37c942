//! One-shot signals and caller cancellation tokens.
//!
//! [`Signal`] is raised at most once and observed by any number of waiters.
//! The device manager uses one as its process-wide shutdown signal and one per
//! open port (raised when the port is closed), so every blocking wait in the
//! background tasks can `select!` on it instead of polling a flag.
//!
//! [`CancelToken`] is what a caller hands to a send operation: an optional
//! deadline, an optional [`Signal`], or both.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{sleep, sleep_until, Instant};

/// A broadcast flag that can be raised exactly once.
///
/// Cloning a `Signal` yields another handle to the same flag.
#[derive(Debug, Clone)]
pub struct Signal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal {
    /// Creates a signal that has not been raised.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raises the signal.  Returns `true` only for the call that raised it.
    pub fn trigger(&self) -> bool {
        !self.tx.send_replace(true)
    }

    /// Returns `true` once the signal has been raised.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Completes once the signal has been raised (immediately if it already was).
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so `wait_for` cannot fail here.
        let _ = rx.wait_for(|raised| *raised).await;
    }

    /// Sleeps for `delay` unless the signal is raised first.
    ///
    /// Returns `true` if the full delay elapsed, `false` if the signal fired.
    pub async fn sleep_or_triggered(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.triggered() => false,
            _ = sleep(delay) => true,
        }
    }
}

/// Why a [`CancelToken`] fired.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("canceled by caller")]
    Canceled,
}

/// Caller-side cancellation for a blocking send.
///
/// A token built with [`CancelToken::never`] never fires.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    deadline: Option<Instant>,
    signal: Option<Signal>,
}

impl CancelToken {
    /// A token that never fires.
    pub fn never() -> Self {
        Self::default()
    }

    /// Fires once `timeout` has elapsed from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Fires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            signal: None,
        }
    }

    /// Fires when `signal` is raised.
    pub fn from_signal(signal: Signal) -> Self {
        Self {
            deadline: None,
            signal: Some(signal),
        }
    }

    /// Adds an explicit cancellation signal to this token.
    #[must_use]
    pub fn or_signal(mut self, signal: Signal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Returns the reason if the token has already fired.
    pub fn reason(&self) -> Option<CancelReason> {
        if self.signal.as_ref().is_some_and(Signal::is_triggered) {
            return Some(CancelReason::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Completes when the token fires.  Pends forever for [`CancelToken::never`].
    pub async fn cancelled(&self) -> CancelReason {
        match (self.deadline, &self.signal) {
            (None, None) => std::future::pending().await,
            (Some(deadline), None) => {
                sleep_until(deadline).await;
                CancelReason::DeadlineExceeded
            }
            (None, Some(signal)) => {
                signal.triggered().await;
                CancelReason::Canceled
            }
            (Some(deadline), Some(signal)) => tokio::select! {
                biased;
                _ = signal.triggered() => CancelReason::Canceled,
                _ = sleep_until(deadline) => CancelReason::DeadlineExceeded,
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
