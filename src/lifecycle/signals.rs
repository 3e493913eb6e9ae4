//! OS signal handling.
//!
//! # Responsibilities
//! - Translate Ctrl-C into cancellation of an in-flight call context

use crate::lifecycle::context::CancelHandle;

/// Spawn a task that cancels `handle` when Ctrl-C is received.
pub fn cancel_on_ctrl_c(handle: CancelHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, canceling in-flight requests");
                handle.cancel();
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            }
        }
    })
}
