//! Crate-level error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::http::auth::TokenError;
use crate::http::response::ResponseError;
use crate::lifecycle::ContextError;
use crate::rate_limit::RateLimitError;

#[derive(Debug, Error)]
pub enum Error {
    /// The rate limiter denied the request in fail-fast mode.
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// The caller's context ended before the call completed.
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    /// The final attempt produced a retry-worthy response or a transport error.
    #[error(transparent)]
    Response(#[from] ResponseError),

    #[error("failed to build HTTP transport: {0}")]
    Transport(#[source] reqwest::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<RateLimitError> for Error {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Exceeded => Error::RateLimitExceeded,
            RateLimitError::Context(err) => Error::Context(err),
        }
    }
}

impl Error {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimitExceeded)
    }

    /// True when the call was canceled or timed out by its context.
    pub fn is_context(&self) -> bool {
        matches!(self, Error::Context(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_errors_map_to_distinct_variants() {
        assert!(Error::from(RateLimitError::Exceeded).is_rate_limited());

        let err = Error::from(RateLimitError::Context(ContextError::DeadlineExceeded));
        assert!(err.is_context());
        assert_eq!(err.to_string(), "context deadline exceeded");
    }
}
