//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Attempt completed (response and/or transport error):
//!     → retries.rs (classify: retry-worthy or final)
//!     → backoff.rs (compute wait for this attempt number)
//!     → timeouts.rs (sleep, unless the caller's context ends first)
//! ```
//!
//! # Design Decisions
//! - Strategies are trait objects; closures implement them directly
//! - Retries are bounded by the client's max retry count, never by the strategy
//! - Every wait is cancelable through the caller's context

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use backoff::{BackoffStrategy, ConstantBackoff, ExponentialBackoff, LinearBackoff, NoBackoff};
pub use retries::{AnyOf, NoRetry, RetryOnServerError, RetryOnStatus, RetryOnTransportError, RetryStrategy};
