//! Resilient outbound HTTP client library.
//!
//! Every request goes through rate limiting (token bucket or fixed window,
//! per client or per host, optionally adapting to 429 and `RateLimit` headers),
//! retry classification, and cancelable backoff between attempts.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod rate_limit;
pub mod resilience;

pub use config::schema::ClientConfig;
pub use error::{Error, Result};
pub use http::{Client, ClientBuilder};
pub use lifecycle::{CancelHandle, Context, ContextError};
