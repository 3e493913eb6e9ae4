//! Resilient HTTP client.
//!
//! # Responsibilities
//! - Run the per-call attempt loop: rate limit, send, observe, classify, back off
//! - Replay the buffered request body on every attempt
//! - Abort promptly when the caller's context ends
//!
//! # Design Decisions
//! - Rate limit and context errors are terminal; they are never retried here
//! - A non-retried error status (e.g. 404) is returned as `Ok`; callers inspect it
//! - On cancellation during backoff the transport's idle connections are released

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, Request, Response};
use serde::Serialize;
use tracing::{debug, info, warn, Instrument};

use crate::config::validation::validate_config;
use crate::config::{ClientConfig, ConfigError};
use crate::error::{Error, Result};
use crate::http::auth::{StaticTokenProvider, TokenError, TokenProvider};
use crate::http::request::{self, HeaderDecorator, ReplayableRequest};
use crate::http::response::{drain_body, ResponseError};
use crate::http::transport::{ReqwestTransport, Transport, TransportSettings};
use crate::lifecycle::Context;
use crate::observability::metrics;
use crate::rate_limit::{NoRateLimitStrategy, RateLimitStrategy};
use crate::resilience::backoff::{BackoffStrategy, ConstantBackoff};
use crate::resilience::retries::{NoRetry, RetryStrategy};
use crate::resilience::timeouts;

/// User-Agent sent when no app name is configured.
pub const DEFAULT_APP_NAME: &str = "resilient-http";

/// Wait between attempts when no backoff strategy is configured.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(300);

struct ClientInner {
    transport: Arc<dyn Transport>,
    headers: HeaderDecorator,
    token_provider: Option<Arc<dyn TokenProvider>>,
    retry: Arc<dyn RetryStrategy>,
    max_retries: u32,
    backoff: Arc<dyn BackoffStrategy>,
    min_wait: Duration,
    max_wait: Duration,
    rate_limit: Arc<dyn RateLimitStrategy>,
}

/// HTTP client with rate limiting, retries and backoff.
///
/// Cheap to clone; clones share limiter state and the connection pool.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Build a client from a configuration file's contents.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        validate_config(config).map_err(ConfigError::Validation)?;

        let mut builder = Client::builder()
            .app_name(config.client.app_name.clone())
            .timeout(Duration::from_secs(config.client.timeout_secs))
            .max_retries(config.retry.max_retries)
            .retry_wait_times(
                Duration::from_millis(config.retry.min_wait_ms),
                Duration::from_millis(config.retry.max_wait_ms),
            );

        if config.client.no_proxy {
            builder = builder.no_proxy();
        }
        for (name, value) in &config.client.headers {
            builder = builder.header(name.clone(), value.clone());
        }
        if let Some(auth) = &config.client.auth {
            builder = builder.token_provider(auth.token_provider());
        }

        builder.retry = config.retry.strategy();
        builder.backoff = config.backoff.strategy();
        if let Some(strategy) = config.rate_limit.strategy() {
            builder.rate_limit = strategy;
        }

        builder.build()
    }

    /// Send a request with an optional JSON body.
    pub async fn do_json<T>(
        &self,
        ctx: &Context,
        method: Method,
        url: &str,
        payload: Option<&T>,
    ) -> Result<Response>
    where
        T: Serialize + ?Sized,
    {
        let request = request::build_json_request(method, url, payload)?;
        self.execute(ctx, request).await
    }

    pub async fn get(&self, ctx: &Context, url: &str) -> Result<Response> {
        self.do_json::<()>(ctx, Method::GET, url, None).await
    }

    /// Run the attempt loop for an already built request.
    pub async fn execute(&self, ctx: &Context, request: Request) -> Result<Response> {
        let request_id = request::request_id(&request);
        let span = tracing::debug_span!(
            "http_call",
            request_id = %request_id,
            method = %request.method(),
            url = %request.url(),
        );

        let result = self.run(ctx, request, &request_id).instrument(span).await;
        metrics::record_call(outcome(&result));
        result
    }

    async fn run(&self, ctx: &Context, request: Request, request_id: &str) -> Result<Response> {
        let inner = &*self.inner;
        let host = request::host_key(request.url());
        let mut replay = ReplayableRequest::new(request);
        let max_retries = if replay.is_replayable() { inner.max_retries } else { 0 };
        let method = replay.method().clone();
        let url = replay.url().clone();

        let mut attempt: u32 = 0;
        loop {
            let mut request = replay.next_attempt();

            inner.rate_limit.apply(ctx, &host).await?;
            self.decorate(ctx, &mut request, request_id).await?;

            metrics::record_attempt(method.as_str());
            debug!(attempt = attempt, host = %host, "Sending request");

            let outcome = tokio::select! {
                biased;
                err = ctx.done() => return Err(Error::Context(err)),
                outcome = inner.transport.send(request) => outcome,
            };
            let (response, error) = match outcome {
                Ok(response) => (Some(response), None),
                Err(e) => (None, Some(e)),
            };

            inner.rate_limit.observe(response.as_ref());
            if let Some(e) = &error {
                warn!(attempt = attempt, error = %e, "Request attempt failed");
            }

            if !inner.retry.classify(ctx, response.as_ref(), error.as_ref()) {
                return match (response, error) {
                    (Some(response), None) => Ok(response),
                    (response, error) => Err(ResponseError::new(method, url, response, error).into()),
                };
            }

            if attempt >= max_retries {
                debug!(attempt = attempt, max_retries = max_retries, "Retries exhausted");
                return Err(ResponseError::new(method, url, response, error).into());
            }

            let wait = inner
                .backoff
                .backoff(inner.min_wait, inner.max_wait, attempt, response.as_ref());
            let status = response.as_ref().map(|r| r.status());
            metrics::record_retry(if status.is_some() { "status" } else { "transport" });
            info!(attempt = attempt, delay = ?wait, status = ?status, "Retrying request");

            if let Some(response) = response {
                tokio::select! {
                    biased;
                    _ = ctx.done() => {}
                    _ = drain_body(response) => {}
                }
            }

            if let Err(err) = timeouts::sleep(ctx, wait).await {
                debug!(attempt = attempt, "Context ended during backoff");
                inner.transport.close_idle_connections();
                return Err(Error::Context(err));
            }

            attempt += 1;
        }
    }

    async fn decorate(&self, ctx: &Context, request: &mut Request, request_id: &str) -> Result<()> {
        self.inner.headers.apply(request, request_id)?;

        if let Some(provider) = &self.inner.token_provider {
            let token = provider.token(ctx).await?;
            if !token.is_valid() {
                return Err(TokenError("token is empty or expired".to_string()).into());
            }
            request.headers_mut().insert(AUTHORIZATION, token.header_value()?);
        }
        Ok(())
    }

    pub fn max_retries(&self) -> u32 {
        self.inner.max_retries
    }
}

fn outcome(result: &Result<Response>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(Error::RateLimitExceeded) => "rate_limited",
        Err(Error::Context(_)) => "canceled",
        Err(_) => "failed",
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("max_retries", &self.inner.max_retries)
            .field("min_wait", &self.inner.min_wait)
            .field("max_wait", &self.inner.max_wait)
            .field("authorized", &self.inner.token_provider.is_some())
            .finish()
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    app_name: String,
    settings: TransportSettings,
    headers: Vec<(String, String)>,
    token_provider: Option<Arc<dyn TokenProvider>>,
    retry: Arc<dyn RetryStrategy>,
    max_retries: u32,
    backoff: Arc<dyn BackoffStrategy>,
    min_wait: Duration,
    max_wait: Duration,
    rate_limit: Arc<dyn RateLimitStrategy>,
    transport: Option<Arc<dyn Transport>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            settings: TransportSettings::default(),
            headers: Vec::new(),
            token_provider: None,
            retry: Arc::new(NoRetry),
            max_retries: 0,
            backoff: Arc::new(ConstantBackoff::new(DEFAULT_BACKOFF)),
            min_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
            rate_limit: Arc::new(NoRateLimitStrategy),
            transport: None,
        }
    }
}

impl ClientBuilder {
    /// Sent as the `User-Agent` header.
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// Per-attempt timeout of the default transport.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = timeout;
        self
    }

    /// Ignore system proxy settings in the default transport.
    pub fn no_proxy(mut self) -> Self {
        self.settings.no_proxy = true;
        self
    }

    /// Header set on every attempt, replacing any value the request carries.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn token_provider(mut self, provider: impl TokenProvider + 'static) -> Self {
        self.token_provider = Some(Arc::new(provider));
        self
    }

    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        self.token_provider(StaticTokenProvider::bearer(token))
    }

    pub fn basic_auth(self, username: &str, password: &str) -> Self {
        self.token_provider(StaticTokenProvider::basic(username, password))
    }

    pub fn retry_strategy(mut self, strategy: impl RetryStrategy + 'static) -> Self {
        self.retry = Arc::new(strategy);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn retry_wait_times(self, min: Duration, max: Duration) -> Self {
        self.min_retry_wait(min).max_retry_wait(max)
    }

    pub fn min_retry_wait(mut self, min: Duration) -> Self {
        self.min_wait = min;
        self
    }

    pub fn max_retry_wait(mut self, max: Duration) -> Self {
        self.max_wait = max;
        self
    }

    pub fn backoff(mut self, strategy: impl BackoffStrategy + 'static) -> Self {
        self.backoff = Arc::new(strategy);
        self
    }

    pub fn constant_backoff(self, delay: Duration) -> Self {
        self.backoff(ConstantBackoff::new(delay))
    }

    pub fn rate_limit(mut self, strategy: impl RateLimitStrategy + 'static) -> Self {
        self.rate_limit = Arc::new(strategy);
        self
    }

    /// Replace the default `reqwest` transport. Timeout and proxy settings are then ignored.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn build(self) -> Result<Client> {
        let mut defaults = HeaderMap::new();
        for (name, value) in &self.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|_| Error::InvalidHeader(name.clone()))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| Error::InvalidHeader(format!("{}: {}", name, value)))?;
            defaults.insert(header_name, header_value);
        }

        let user_agent = HeaderValue::from_str(&self.app_name)
            .map_err(|_| Error::InvalidHeader(format!("user-agent: {}", self.app_name)))?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(self.settings).map_err(Error::Transport)?),
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                transport,
                headers: HeaderDecorator { defaults, user_agent },
                token_provider: self.token_provider,
                retry: self.retry,
                max_retries: self.max_retries,
                backoff: self.backoff,
                min_wait: self.min_wait,
                max_wait: self.max_wait,
                rate_limit: self.rate_limit,
            }),
        })
    }
}
