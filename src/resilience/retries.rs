//! Retry classification.
//!
//! # Responsibilities
//! - Decide whether a completed attempt is worth retrying
//! - Combine classifiers with OR semantics
//!
//! # Design Decisions
//! - Classifiers are pure: no side effects, no clock, no blocking
//! - Connection errors are retried only when `RetryOnTransportError` is configured
//! - Composite order matters for short-circuiting only

use std::sync::Arc;

use reqwest::{Response, StatusCode};

use crate::lifecycle::Context;

/// Classifies an attempt outcome into a retry decision.
pub trait RetryStrategy: Send + Sync {
    fn classify(&self, ctx: &Context, response: Option<&Response>, error: Option<&reqwest::Error>) -> bool;
}

impl<F> RetryStrategy for F
where
    F: Fn(&Context, Option<&Response>, Option<&reqwest::Error>) -> bool + Send + Sync,
{
    fn classify(&self, ctx: &Context, response: Option<&Response>, error: Option<&reqwest::Error>) -> bool {
        self(ctx, response, error)
    }
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryStrategy for NoRetry {
    fn classify(&self, _: &Context, _: Option<&Response>, _: Option<&reqwest::Error>) -> bool {
        false
    }
}

/// Retries when a response with a 5xx status was received.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryOnServerError;

impl RetryStrategy for RetryOnServerError {
    fn classify(&self, _: &Context, response: Option<&Response>, _: Option<&reqwest::Error>) -> bool {
        response.is_some_and(|r| r.status().as_u16() >= StatusCode::INTERNAL_SERVER_ERROR.as_u16())
    }
}

/// Retries when the transport failed (connect error, timeout, reset).
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryOnTransportError;

impl RetryStrategy for RetryOnTransportError {
    fn classify(&self, _: &Context, _: Option<&Response>, error: Option<&reqwest::Error>) -> bool {
        error.is_some()
    }
}

/// Retries on an explicit set of status codes.
#[derive(Debug, Clone, Default)]
pub struct RetryOnStatus {
    statuses: Vec<StatusCode>,
}

impl RetryOnStatus {
    pub fn new(statuses: impl IntoIterator<Item = StatusCode>) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
        }
    }
}

impl RetryStrategy for RetryOnStatus {
    fn classify(&self, _: &Context, response: Option<&Response>, _: Option<&reqwest::Error>) -> bool {
        response.is_some_and(|r| self.statuses.contains(&r.status()))
    }
}

/// Logical OR over an ordered list of classifiers.
#[derive(Clone, Default)]
pub struct AnyOf {
    strategies: Vec<Arc<dyn RetryStrategy>>,
}

impl AnyOf {
    pub fn new(strategies: Vec<Arc<dyn RetryStrategy>>) -> Self {
        Self { strategies }
    }

    /// Append a classifier; evaluated after those already present.
    pub fn with(mut self, strategy: impl RetryStrategy + 'static) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl RetryStrategy for AnyOf {
    fn classify(&self, ctx: &Context, response: Option<&Response>, error: Option<&reqwest::Error>) -> bool {
        self.strategies
            .iter()
            .any(|strategy| strategy.classify(ctx, response, error))
    }
}

impl std::fmt::Debug for AnyOf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyOf")
            .field("strategies", &self.strategies.len())
            .finish()
    }
}
