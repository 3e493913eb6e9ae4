//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files, and
//! convert into the strategy objects the client runs with.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::http::auth::StaticTokenProvider;
use crate::rate_limit::{Behavior, RateLimitOptions, RateLimitStrategy, Scope, ScopedRateLimitStrategy};
use crate::resilience::backoff::{
    BackoffStrategy, ConstantBackoff, ExponentialBackoff, LinearBackoff, NoBackoff,
};
use crate::resilience::retries::{
    AnyOf, NoRetry, RetryOnServerError, RetryOnStatus, RetryOnTransportError, RetryStrategy,
};

/// Root configuration for the client.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Transport and header settings.
    pub client: ClientSection,

    /// Retry budget and classification.
    pub retry: RetryConfig,

    /// Wait between attempts.
    pub backoff: BackoffConfig,

    /// Outbound rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Logging settings for the binary.
    pub observability: ObservabilityConfig,
}

/// Transport and header settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClientSection {
    /// Sent as `User-Agent`.
    pub app_name: String,

    /// Per-attempt timeout in seconds.
    pub timeout_secs: u64,

    /// Ignore system proxy settings.
    pub no_proxy: bool,

    /// Headers set on every attempt.
    pub headers: BTreeMap<String, String>,

    /// Optional Authorization credentials.
    pub auth: Option<AuthConfig>,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            app_name: crate::http::client::DEFAULT_APP_NAME.to_string(),
            timeout_secs: 30,
            no_proxy: false,
            headers: BTreeMap::new(),
            auth: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    Bearer,
    Basic,
}

/// Authorization credentials.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AuthConfig {
    pub kind: AuthKind,

    /// Bearer token.
    #[serde(default)]
    pub token: Option<String>,

    /// Basic auth user name.
    #[serde(default)]
    pub username: Option<String>,

    /// Basic auth password.
    #[serde(default)]
    pub password: Option<String>,
}

impl AuthConfig {
    /// Missing fields become empty strings; validation rejects them beforehand.
    pub fn token_provider(&self) -> StaticTokenProvider {
        match self.kind {
            AuthKind::Bearer => StaticTokenProvider::bearer(self.token.clone().unwrap_or_default()),
            AuthKind::Basic => StaticTokenProvider::basic(
                self.username.as_deref().unwrap_or_default(),
                self.password.as_deref().unwrap_or_default(),
            ),
        }
    }
}

/// Conditions that make an attempt retry-worthy.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetryOn {
    ServerError,
    TransportError,
    TooManyRequests,
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Lower bound handed to the backoff strategy (ms).
    pub min_wait_ms: u64,

    /// Upper bound handed to the backoff strategy (ms); 0 means none.
    pub max_wait_ms: u64,

    /// Empty means never retry.
    pub retry_on: Vec<RetryOn>,
}

impl RetryConfig {
    pub fn strategy(&self) -> Arc<dyn RetryStrategy> {
        if self.retry_on.is_empty() {
            return Arc::new(NoRetry);
        }

        let strategies = self
            .retry_on
            .iter()
            .map(|condition| -> Arc<dyn RetryStrategy> {
                match condition {
                    RetryOn::ServerError => Arc::new(RetryOnServerError),
                    RetryOn::TransportError => Arc::new(RetryOnTransportError),
                    RetryOn::TooManyRequests => Arc::new(RetryOnStatus::new([StatusCode::TOO_MANY_REQUESTS])),
                }
            })
            .collect();
        Arc::new(AnyOf::new(strategies))
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    #[default]
    Constant,
    Linear,
    Exponential,
    None,
}

/// Backoff configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BackoffConfig {
    pub kind: BackoffKind,

    /// Constant delay, linear step, or exponential base (ms).
    pub delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            kind: BackoffKind::Constant,
            delay_ms: 300,
        }
    }
}

impl BackoffConfig {
    pub fn strategy(&self) -> Arc<dyn BackoffStrategy> {
        let delay = Duration::from_millis(self.delay_ms);
        match self.kind {
            BackoffKind::Constant => Arc::new(ConstantBackoff::new(delay)),
            BackoffKind::Linear => Arc::new(LinearBackoff::new(delay)),
            BackoffKind::Exponential => Arc::new(ExponentialBackoff::new(delay)),
            BackoffKind::None => Arc::new(NoBackoff),
        }
    }
}

/// Rate limiting algorithm and its parameters.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum LimiterConfig {
    TokenBucket { requests_per_second: f64, burst: u32 },
    FixedWindow { limit: u32, window_ms: u64 },
}

impl Default for LimiterConfig {
    fn default() -> Self {
        LimiterConfig::TokenBucket {
            requests_per_second: 10.0,
            burst: 10,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub scope: Scope,
    pub behavior: Behavior,

    /// Honor 429 / RateLimit headers (client scope only).
    pub adaptive: bool,

    pub limiter: LimiterConfig,
}

impl RateLimitConfig {
    /// `None` when rate limiting is disabled.
    pub fn strategy(&self) -> Option<Arc<dyn RateLimitStrategy>> {
        if !self.enabled {
            return None;
        }

        let options = RateLimitOptions::new()
            .with_scope(self.scope)
            .with_behavior(self.behavior)
            .with_adaptive(self.adaptive);

        let strategy = match &self.limiter {
            LimiterConfig::TokenBucket {
                requests_per_second,
                burst,
            } => ScopedRateLimitStrategy::token_bucket(*requests_per_second, *burst, options),
            LimiterConfig::FixedWindow { limit, window_ms } => {
                ScopedRateLimitStrategy::fixed_window(*limit, Duration::from_millis(*window_ms), options)
            }
        };
        Some(Arc::new(strategy))
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
