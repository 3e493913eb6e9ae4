//! Cancellation context for outbound calls.
//!
//! # Responsibilities
//! - Carry a caller-owned cancellation signal through every suspension point
//! - Carry an optional deadline (earliest deadline along the chain wins)
//! - Report why the context ended (canceled vs deadline exceeded)
//!
//! # Design Decisions
//! - Cancellation uses a `watch` channel per `with_cancel`, so any number of
//!   waiters observe the same signal without registration
//! - Children inherit every parent signal; canceling a parent ends all children
//! - Dropping a `CancelHandle` without calling `cancel` never ends the context

use std::time::Duration;

use futures_util::future::select_all;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a context ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The context was canceled through its `CancelHandle`.
    #[error("context canceled")]
    Canceled,

    /// The context deadline elapsed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// A cancellation scope passed to every resilience operation.
#[derive(Debug, Clone, Default)]
pub struct Context {
    signals: Vec<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Handle that ends the context it was created with.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel the associated context and all contexts derived from it.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true once `cancel` has been called.
    pub fn is_canceled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Context {
    /// A context that never ends.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a child context that can be canceled independently.
    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let mut child = self.clone();
        child.signals.push(rx);
        (child, CancelHandle { tx })
    }

    /// Derive a child context that ends at `deadline` (or earlier, if the parent does).
    pub fn with_deadline(&self, deadline: Instant) -> Context {
        let mut child = self.clone();
        child.deadline = Some(match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        });
        child
    }

    /// Derive a child context that ends after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Context {
        self.with_deadline(Instant::now() + timeout)
    }

    /// The effective deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Non-blocking probe: `Some` once the context has ended.
    pub fn err(&self) -> Option<ContextError> {
        if self.signals.iter().any(|rx| *rx.borrow()) {
            return Some(ContextError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves the instant the context ends.
    pub async fn done(&self) -> ContextError {
        if let Some(err) = self.err() {
            return err;
        }

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.canceled() => ContextError::Canceled,
                    _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
                }
            }
            None => {
                self.canceled().await;
                ContextError::Canceled
            }
        }
    }

    async fn canceled(&self) {
        if self.signals.is_empty() {
            return std::future::pending().await;
        }

        let waiters = self.signals.iter().map(|rx| {
            let mut rx = rx.clone();
            Box::pin(async move {
                // Sender dropped without canceling: this signal can never fire.
                if rx.wait_for(|canceled| *canceled).await.is_err() {
                    std::future::pending::<()>().await;
                }
            })
        });

        select_all(waiters).await;
    }
}
