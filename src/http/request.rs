//! Request construction and per-attempt decoration.
//!
//! # Responsibilities
//! - Build JSON requests
//! - Capture a buffered body once so every attempt replays identical bytes
//! - Stamp per-attempt headers (defaults, User-Agent, request ID, Authorization)
//! - Derive the host key used for per-host rate limiting
//!
//! # Design Decisions
//! - Request ID is generated once per logical call and reused across retries
//! - A caller-supplied `X-Request-ID` is never overwritten
//! - Streaming bodies cannot be replayed; they are sent exactly once

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Body, Method, Request};
use serde::Serialize;
use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

const APPLICATION_JSON: &str = "application/json";

/// Build a request with an optional JSON body.
pub fn build_json_request<T>(method: Method, url: &str, payload: Option<&T>) -> Result<Request>
where
    T: Serialize + ?Sized,
{
    let url = Url::parse(url)?;
    let mut request = Request::new(method, url);

    if let Some(payload) = payload {
        let body = serde_json::to_vec(payload)?;
        request
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        *request.body_mut() = Some(Body::from(body));
    }

    Ok(request)
}

/// Key identifying a destination for host-scoped limiting: `host` or `host:port`.
///
/// The port is included only when the URL carries a non-default one. `url`
/// normalizes default ports away while parsing, so `https://x:443` and
/// `https://x` key as `x` and share one limiter, as do `http://x:80` and `http://x`.
pub fn host_key(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    }
}

/// Returns the caller's request ID, or a fresh UUID v4.
pub fn request_id(request: &Request) -> String {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Replays one logical request across attempts.
pub(crate) struct ReplayableRequest {
    template: Request,
    body: ReplayBody,
}

enum ReplayBody {
    Empty,
    Buffered(Bytes),
    /// Taken on first use.
    Streaming(Option<Body>),
}

impl ReplayableRequest {
    pub(crate) fn new(mut request: Request) -> Self {
        let body = match request.body_mut().take() {
            None => ReplayBody::Empty,
            Some(body) => match body.as_bytes() {
                Some(bytes) => ReplayBody::Buffered(Bytes::copy_from_slice(bytes)),
                None => ReplayBody::Streaming(Some(body)),
            },
        };
        Self { template: request, body }
    }

    /// False when the body is a stream that can only be sent once.
    pub(crate) fn is_replayable(&self) -> bool {
        !matches!(self.body, ReplayBody::Streaming(_))
    }

    pub(crate) fn method(&self) -> &Method {
        self.template.method()
    }

    pub(crate) fn url(&self) -> &Url {
        self.template.url()
    }

    /// A fresh request for the next attempt, with the body re-attached.
    pub(crate) fn next_attempt(&mut self) -> Request {
        let mut request = Request::new(self.template.method().clone(), self.template.url().clone());
        *request.headers_mut() = self.template.headers().clone();
        *request.timeout_mut() = self.template.timeout().copied();
        *request.version_mut() = self.template.version();

        *request.body_mut() = match &mut self.body {
            ReplayBody::Empty => None,
            ReplayBody::Buffered(bytes) => Some(Body::from(bytes.clone())),
            ReplayBody::Streaming(body) => body.take(),
        };
        request
    }
}

/// Headers stamped onto every attempt, in order: defaults, User-Agent, request ID.
#[derive(Debug, Clone)]
pub(crate) struct HeaderDecorator {
    pub(crate) defaults: HeaderMap,
    pub(crate) user_agent: HeaderValue,
}

impl HeaderDecorator {
    pub(crate) fn apply(&self, request: &mut Request, request_id: &str) -> Result<()> {
        let headers = request.headers_mut();
        for (name, value) in &self.defaults {
            headers.insert(name.clone(), value.clone());
        }
        headers.insert(USER_AGENT, self.user_agent.clone());

        if !headers.contains_key(X_REQUEST_ID) {
            let value = HeaderValue::from_str(request_id)
                .map_err(|_| Error::InvalidHeader(format!("{}: {}", X_REQUEST_ID, request_id)))?;
            headers.insert(X_REQUEST_ID, value);
        }
        Ok(())
    }
}
