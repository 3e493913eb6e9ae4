//! Limiter scoping: one shared limiter per client, or one limiter per host.
//!
//! # Design Decisions
//! - Per-host limiters are created lazily on first use and live as long as the
//!   scoped limiter
//! - Lookups go through `DashMap` shards; no global writer lock on the hot path
//! - Racing first accesses for a host converge on the first inserted limiter;
//!   the losing candidate is dropped

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::lifecycle::{Context, ContextError};
use crate::rate_limit::RateLimiter;

/// Builds a fresh limiter for a newly seen host.
pub type LimiterFactory = Arc<dyn Fn() -> Arc<dyn RateLimiter> + Send + Sync>;

/// Where limiter state is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// One limiter shared by every request from the client.
    #[default]
    Client,
    /// One limiter per destination host.
    Host,
}

/// Caches one limiter per host string.
pub struct PerHostRateLimiter {
    factory: LimiterFactory,
    limiters: DashMap<String, Arc<dyn RateLimiter>>,
}

impl PerHostRateLimiter {
    pub fn new(factory: LimiterFactory) -> Self {
        Self {
            factory,
            limiters: DashMap::new(),
        }
    }

    pub fn allow(&self, ctx: &Context, host: &str) -> bool {
        self.limiter_for(host).allow(ctx)
    }

    pub async fn wait(&self, ctx: &Context, host: &str) -> Result<(), ContextError> {
        let limiter = self.limiter_for(host);
        limiter.wait(ctx).await
    }

    /// Number of hosts seen so far.
    pub fn host_count(&self) -> usize {
        self.limiters.len()
    }

    /// Returns the limiter for `host`, creating it on first access.
    pub fn limiter_for(&self, host: &str) -> Arc<dyn RateLimiter> {
        if let Some(limiter) = self.limiters.get(host) {
            return Arc::clone(limiter.value());
        }

        let candidate = (self.factory)();
        let entry = self
            .limiters
            .entry(host.to_string())
            .or_insert(candidate);
        Arc::clone(entry.value())
    }
}

impl std::fmt::Debug for PerHostRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerHostRateLimiter")
            .field("hosts", &self.limiters.len())
            .finish()
    }
}

/// Routes admission checks according to the configured scope.
pub enum ScopedRateLimiter {
    /// Shared limiter; `None` admits everything.
    Client(Option<Arc<dyn RateLimiter>>),
    /// Per-host limiters built from a factory.
    Host(PerHostRateLimiter),
}

impl ScopedRateLimiter {
    pub fn client(limiter: Option<Arc<dyn RateLimiter>>) -> Self {
        Self::Client(limiter)
    }

    pub fn host(factory: LimiterFactory) -> Self {
        Self::Host(PerHostRateLimiter::new(factory))
    }

    pub fn scope(&self) -> Scope {
        match self {
            Self::Client(_) => Scope::Client,
            Self::Host(_) => Scope::Host,
        }
    }

    /// Non-blocking probe. `host` is ignored for client scope.
    pub fn allow(&self, ctx: &Context, host: &str) -> bool {
        match self {
            Self::Client(None) => true,
            Self::Client(Some(limiter)) => limiter.allow(ctx),
            Self::Host(per_host) => per_host.allow(ctx, host),
        }
    }

    /// Block until admitted or the context ends. `host` is ignored for client scope.
    pub async fn wait(&self, ctx: &Context, host: &str) -> Result<(), ContextError> {
        match self {
            Self::Client(None) => Ok(()),
            Self::Client(Some(limiter)) => limiter.wait(ctx).await,
            Self::Host(per_host) => per_host.wait(ctx, host).await,
        }
    }
}

impl std::fmt::Debug for ScopedRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client(limiter) => f
                .debug_struct("ScopedRateLimiter::Client")
                .field("limited", &limiter.is_some())
                .finish(),
            Self::Host(per_host) => f.debug_tuple("ScopedRateLimiter::Host").field(per_host).finish(),
        }
    }
}
