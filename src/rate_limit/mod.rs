//! Outbound rate limiting subsystem.
//!
//! # Data Flow
//! ```text
//! Before send:
//!     strategy.rs (Apply: wait or fail fast)
//!         → scope.rs (shared limiter, or per-host limiter created on first use)
//!             → adaptive.rs (server-signaled backoff dominates, if enabled)
//!                 → token_bucket.rs | fixed_window.rs (local admission)
//!
//! After response:
//!     strategy.rs (Observe)
//!         → adaptive.rs (429 / RateLimit headers → backoff_until, observed limit)
//!             → headers.rs (Retry-After, X-RateLimit-*, RateLimit-*)
//! ```
//!
//! # Design Decisions
//! - `allow` never blocks; `wait` blocks until admitted or the context ends
//! - Limiter state is in-process only; nothing is persisted or shared across processes
//! - Only `rate limit exceeded` is a new error; everything else is a context error

use async_trait::async_trait;
use thiserror::Error;

use crate::lifecycle::{Context, ContextError};

pub mod adaptive;
pub mod fixed_window;
pub mod headers;
pub mod scope;
pub mod strategy;
pub mod token_bucket;

pub use adaptive::AdaptiveRateLimiter;
pub use fixed_window::FixedWindowRateLimiter;
pub use scope::{LimiterFactory, PerHostRateLimiter, Scope, ScopedRateLimiter};
pub use strategy::{
    Behavior, NoRateLimitStrategy, RateLimitOptions, RateLimitStrategy, ScopedRateLimitStrategy,
};
pub use token_bucket::TokenBucketRateLimiter;

/// Errors raised while applying a rate limit before a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// The limiter denied the request and the behavior is fail-fast.
    #[error("rate limit exceeded")]
    Exceeded,

    /// The caller's context ended while waiting for admission.
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Admission control primitive.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Non-blocking probe. Consumes one admission when it returns true.
    fn allow(&self, ctx: &Context) -> bool;

    /// Block until one admission is granted or the context ends.
    async fn wait(&self, ctx: &Context) -> Result<(), ContextError>;
}

/// A limiter that admits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRateLimit;

#[async_trait]
impl RateLimiter for NoRateLimit {
    fn allow(&self, _ctx: &Context) -> bool {
        true
    }

    async fn wait(&self, _ctx: &Context) -> Result<(), ContextError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_rate_limit_always_admits() {
        let ctx = Context::background();
        let limiter = NoRateLimit;

        for _ in 0..100 {
            assert!(limiter.allow(&ctx));
        }
        assert!(limiter.wait(&ctx).await.is_ok());
    }

    #[test]
    fn error_display() {
        assert_eq!(RateLimitError::Exceeded.to_string(), "rate limit exceeded");
        assert_eq!(
            RateLimitError::from(ContextError::Canceled).to_string(),
            "context canceled"
        );
    }
}
