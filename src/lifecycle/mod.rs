//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Caller creates Context (context.rs)
//!     → with_cancel / with_timeout derive child scopes
//!     → passed by reference into rate limiters, backoff sleeps, sends
//!
//! Signals (signals.rs):
//!     SIGINT (Ctrl-C) → CancelHandle::cancel → every suspension point unblocks
//! ```
//!
//! # Design Decisions
//! - The caller's context is the only cancellation mechanism
//! - Ending a context wakes all waiters at once; nothing polls

pub mod context;
pub mod signals;

pub use context::{CancelHandle, Context, ContextError};
