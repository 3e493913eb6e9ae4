//! Rate limit orchestration around each outbound attempt.
//!
//! # Responsibilities
//! - `apply` before sending: wait for admission or fail fast
//! - `observe` after sending: feed the adaptive limiter, if any
//! - Assemble scoped and adaptive limiters from a limiter factory
//!
//! # Design Decisions
//! - Fail-fast mode probes the adaptive backoff without touching the base
//!   limiter, so a denied request never spends a local token
//! - With host scope, adaptive wrapping happens per host but no adaptive
//!   handle is kept, so responses cannot be observed. Adaptive limiting is
//!   only effective with client scope

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Response;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::lifecycle::Context;
use crate::observability::metrics;
use crate::rate_limit::{
    AdaptiveRateLimiter, FixedWindowRateLimiter, LimiterFactory, RateLimitError, RateLimiter, Scope,
    ScopedRateLimiter, TokenBucketRateLimiter,
};

/// What to do when the limiter denies a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// Block until admitted.
    #[default]
    Wait,
    /// Fail immediately with `RateLimitError::Exceeded`.
    Error,
}

impl Behavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wait => "wait",
            Self::Error => "error",
        }
    }
}

/// Options shared by every rate limit strategy constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateLimitOptions {
    pub scope: Scope,
    pub behavior: Behavior,
    pub adaptive: bool,
}

impl RateLimitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Enable backoff driven by 429 responses and rate limit headers.
    pub fn with_adaptive(mut self, adaptive: bool) -> Self {
        self.adaptive = adaptive;
        self
    }
}

/// Applied by the client around every attempt.
#[async_trait]
pub trait RateLimitStrategy: Send + Sync {
    /// Called before each send. Errors are terminal for the call.
    async fn apply(&self, ctx: &Context, host: &str) -> Result<(), RateLimitError>;

    /// Called after each send with the response, if one was received.
    fn observe(&self, response: Option<&Response>);
}

/// Admits everything and observes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRateLimitStrategy;

#[async_trait]
impl RateLimitStrategy for NoRateLimitStrategy {
    async fn apply(&self, _ctx: &Context, _host: &str) -> Result<(), RateLimitError> {
        Ok(())
    }

    fn observe(&self, _response: Option<&Response>) {}
}

/// Scoped limiter with an optional adaptive layer and a wait-or-error policy.
#[derive(Debug)]
pub struct ScopedRateLimitStrategy {
    limiter: ScopedRateLimiter,
    adaptive: Option<Arc<AdaptiveRateLimiter>>,
    behavior: Behavior,
}

impl ScopedRateLimitStrategy {
    /// Token bucket admitting `rate` requests per second with bursts of `burst`.
    pub fn token_bucket(rate: f64, burst: u32, options: RateLimitOptions) -> Self {
        let factory: LimiterFactory =
            Arc::new(move || Arc::new(TokenBucketRateLimiter::new(rate, burst)) as Arc<dyn RateLimiter>);
        Self::build(factory, options)
    }

    /// Fixed window admitting `limit` requests per `window`.
    pub fn fixed_window(limit: u32, window: Duration, options: RateLimitOptions) -> Self {
        let factory: LimiterFactory =
            Arc::new(move || Arc::new(FixedWindowRateLimiter::new(limit, window)) as Arc<dyn RateLimiter>);
        Self::build(factory, options)
    }

    /// Caller-supplied limiter. With host scope every host shares this one instance.
    pub fn custom(limiter: Arc<dyn RateLimiter>, options: RateLimitOptions) -> Self {
        let factory: LimiterFactory = Arc::new(move || Arc::clone(&limiter));
        Self::build(factory, options)
    }

    fn build(factory: LimiterFactory, options: RateLimitOptions) -> Self {
        match (options.scope, options.adaptive) {
            (Scope::Client, true) => {
                let adaptive = Arc::new(AdaptiveRateLimiter::new(factory()));
                let shared: Arc<dyn RateLimiter> = adaptive.clone();
                Self {
                    limiter: ScopedRateLimiter::client(Some(shared)),
                    adaptive: Some(adaptive),
                    behavior: options.behavior,
                }
            }
            (Scope::Client, false) => Self {
                limiter: ScopedRateLimiter::client(Some(factory())),
                adaptive: None,
                behavior: options.behavior,
            },
            (Scope::Host, true) => {
                let adaptive_factory: LimiterFactory =
                    Arc::new(move || Arc::new(AdaptiveRateLimiter::new(factory())) as Arc<dyn RateLimiter>);
                Self {
                    limiter: ScopedRateLimiter::host(adaptive_factory),
                    adaptive: None,
                    behavior: options.behavior,
                }
            }
            (Scope::Host, false) => Self {
                limiter: ScopedRateLimiter::host(factory),
                adaptive: None,
                behavior: options.behavior,
            },
        }
    }

    pub fn behavior(&self) -> Behavior {
        self.behavior
    }

    pub fn scope(&self) -> Scope {
        self.limiter.scope()
    }

    /// The client-scoped adaptive limiter, when adaptive limiting is observable.
    pub fn adaptive(&self) -> Option<&Arc<AdaptiveRateLimiter>> {
        self.adaptive.as_ref()
    }

    fn denied(&self, host: &str) -> RateLimitError {
        debug!(host = host, behavior = self.behavior.as_str(), "Rate limit denied request");
        metrics::record_rate_limited(self.behavior.as_str());
        RateLimitError::Exceeded
    }
}

#[async_trait]
impl RateLimitStrategy for ScopedRateLimitStrategy {
    async fn apply(&self, ctx: &Context, host: &str) -> Result<(), RateLimitError> {
        match self.behavior {
            Behavior::Wait => {
                self.limiter.wait(ctx, host).await?;
                Ok(())
            }
            Behavior::Error => {
                if self.adaptive.as_ref().is_some_and(|a| a.is_backing_off()) {
                    return Err(self.denied(host));
                }
                if !self.limiter.allow(ctx, host) {
                    return Err(self.denied(host));
                }
                Ok(())
            }
        }
    }

    fn observe(&self, response: Option<&Response>) {
        if let Some(adaptive) = &self.adaptive {
            adaptive.observe_response(response);
        }
    }
}
