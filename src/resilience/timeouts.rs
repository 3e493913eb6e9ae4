//! Cancelable waiting.
//!
//! # Responsibilities
//! - Sleep for a computed duration unless the caller's context ends first
//! - Release the timer as soon as either side wins
//!
//! # Design Decisions
//! - Uses Tokio's timer facilities
//! - An already-ended context returns immediately, even for a zero sleep
//! - Context errors are returned as-is so callers can tell them apart

use std::time::Duration;

use crate::lifecycle::{Context, ContextError};

/// Sleep for `duration`, returning early with the context's error if it ends first.
pub async fn sleep(ctx: &Context, duration: Duration) -> Result<(), ContextError> {
    if let Some(err) = ctx.err() {
        return Err(err);
    }
    if duration.is_zero() {
        return Ok(());
    }

    tokio::select! {
        err = ctx.done() => Err(err),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
