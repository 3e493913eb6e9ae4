//! Response handling for the retry loop.
//!
//! # Responsibilities
//! - Drain a discarded response so its connection can be reused
//! - Report a call that ended without a usable response
//!
//! # Design Decisions
//! - Draining stops at a fixed ceiling; larger bodies are dropped with the connection
//! - The last response is kept intact in the error so callers can read its body

use std::fmt;

use reqwest::{Method, Response, StatusCode};
use url::Url;

/// Bytes read from a discarded response before giving up on connection reuse.
pub const DRAIN_LIMIT: usize = 10 * 1024 * 1024;

/// Read and discard up to [`DRAIN_LIMIT`] bytes, then close the response.
pub async fn drain_body(mut response: Response) -> usize {
    let mut drained = 0;
    while drained < DRAIN_LIMIT {
        match response.chunk().await {
            Ok(Some(chunk)) => drained += chunk.len(),
            Ok(None) | Err(_) => break,
        }
    }
    drained
}

/// A call that failed after its final attempt.
///
/// Carries the last response when the server answered (retries exhausted), or
/// the transport error when it did not.
#[derive(Debug)]
pub struct ResponseError {
    method: Method,
    url: Url,
    response: Option<Box<Response>>,
    source: Option<reqwest::Error>,
}

impl ResponseError {
    pub fn new(method: Method, url: Url, response: Option<Response>, source: Option<reqwest::Error>) -> Self {
        Self {
            method,
            url,
            response: response.map(Box::new),
            source,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.response.as_ref().map(|r| r.status())
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_deref()
    }

    pub fn into_response(self) -> Option<Response> {
        self.response.map(|r| *r)
    }

    pub fn transport_error(&self) -> Option<&reqwest::Error> {
        self.source.as_ref()
    }
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.response, &self.source) {
            (Some(response), _) => write!(f, "{} {}: {}", self.method, self.url, response.status().as_u16()),
            (None, Some(source)) => write!(f, "{}", source),
            (None, None) => write!(f, "{} {}: request failed", self.method, self.url),
        }
    }
}

impl std::error::Error for ResponseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}
