//! Outbound HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! Caller (Context, method, url, payload)
//!     → request.rs (build JSON request, buffer body, request ID)
//!     → client.rs attempt loop:
//!         → rate_limit strategy (apply)
//!         → request.rs + auth.rs (headers, Authorization)
//!         → transport.rs (send)
//!         → rate_limit strategy (observe)
//!         → resilience (classify, back off, cancelable sleep)
//!     → response.rs (drain discarded responses, final error)
//!     → Response returned to caller
//! ```

pub mod auth;
pub mod client;
pub mod request;
pub mod response;
pub mod transport;

pub use auth::{StaticTokenProvider, Token, TokenError, TokenProvider};
pub use client::{Client, ClientBuilder};
pub use request::{build_json_request, host_key, X_REQUEST_ID};
pub use response::ResponseError;
pub use transport::{ReqwestTransport, Transport, TransportSettings};
