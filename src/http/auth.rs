//! Authorization tokens attached to outbound requests.
//!
//! # Responsibilities
//! - Model an access token with optional expiry
//! - Resolve a token per attempt through a `TokenProvider`
//! - Built-in static, bearer, and basic providers
//!
//! # Design Decisions
//! - The provider is consulted on every attempt so refreshed tokens are picked up by retries
//! - A token without expiry never expires (basic credentials, static API keys)

use std::future::Future;
use std::time::SystemTime;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::header::HeaderValue;
use thiserror::Error;

use crate::lifecycle::Context;

/// Failure to obtain a usable token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("token provider failed: {0}")]
pub struct TokenError(pub String);

/// An access token and the scheme it is sent with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub expires_at: Option<SystemTime>,
    /// Authorization scheme, e.g. `Bearer` or `Basic`.
    pub kind: String,
}

impl Token {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: None,
            kind: "Bearer".to_string(),
        }
    }

    pub fn basic(username: &str, password: &str) -> Self {
        let credentials = format!("{}:{}", username, password);
        Self {
            access_token: STANDARD.encode(credentials.as_bytes()),
            expires_at: None,
            kind: "Basic".to_string(),
        }
    }

    pub fn with_expiry(mut self, expires_at: SystemTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Non-empty and not yet expired.
    pub fn is_valid(&self) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => SystemTime::now() < expires_at,
            None => true,
        }
    }

    /// `Authorization` header value: `<kind> <access_token>`.
    pub fn header_value(&self) -> Result<HeaderValue, TokenError> {
        let mut value = HeaderValue::from_str(&format!("{} {}", self.kind, self.access_token))
            .map_err(|_| TokenError("token contains characters not allowed in a header".to_string()))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

/// Supplies the token for each attempt.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self, ctx: &Context) -> Result<Token, TokenError>;
}

#[async_trait]
impl<F, Fut> TokenProvider for F
where
    F: Fn(&Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Token, TokenError>> + Send,
{
    async fn token(&self, ctx: &Context) -> Result<Token, TokenError> {
        self(ctx).await
    }
}

/// Always returns the same token.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: Token,
}

impl StaticTokenProvider {
    pub fn new(token: Token) -> Self {
        Self { token }
    }

    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self::new(Token::bearer(access_token))
    }

    pub fn basic(username: &str, password: &str) -> Self {
        Self::new(Token::basic(username, password))
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self, _ctx: &Context) -> Result<Token, TokenError> {
        Ok(self.token.clone())
    }
}
