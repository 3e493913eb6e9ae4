//! Underlying HTTP transport.
//!
//! # Responsibilities
//! - Send one fully built request and return the raw outcome
//! - Drop idle pooled connections on demand
//!
//! # Design Decisions
//! - The retry loop talks to a trait so tests and embedders can swap the transport
//! - `reqwest` exposes no pool flush, so `close_idle_connections` swaps in a
//!   freshly built client; the old pool is released once in-flight requests finish

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use reqwest::{Request, Response};

/// Default overall timeout for a single attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends requests on behalf of the client retry loop.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response, reqwest::Error>;

    /// Release idle keep-alive connections. Called when a call is aborted mid-backoff.
    fn close_idle_connections(&self);
}

/// Settings used to (re)build the underlying `reqwest::Client`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSettings {
    pub timeout: Duration,
    pub no_proxy: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            no_proxy: false,
        }
    }
}

impl TransportSettings {
    fn build_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        let mut builder = reqwest::Client::builder().timeout(self.timeout);
        if self.no_proxy {
            builder = builder.no_proxy();
        }
        builder.build()
    }
}

/// `reqwest`-backed transport with a swappable connection pool.
pub struct ReqwestTransport {
    settings: TransportSettings,
    client: ArcSwap<reqwest::Client>,
}

impl ReqwestTransport {
    pub fn new(settings: TransportSettings) -> Result<Self, reqwest::Error> {
        let client = settings.build_client()?;
        Ok(Self {
            settings,
            client: ArcSwap::from_pointee(client),
        })
    }

    pub fn settings(&self) -> TransportSettings {
        self.settings
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: Request) -> Result<Response, reqwest::Error> {
        let client = self.client.load_full();
        client.execute(request).await
    }

    fn close_idle_connections(&self) {
        match self.settings.build_client() {
            Ok(fresh) => {
                self.client.store(Arc::new(fresh));
                tracing::debug!("Idle connections released");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to rebuild HTTP client, keeping existing pool");
            }
        }
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("settings", &self.settings)
            .finish()
    }
}
