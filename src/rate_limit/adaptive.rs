//! Response-driven rate limiting.
//!
//! # Responsibilities
//! - Wrap a base limiter and deny admission while a server-signaled backoff is active
//! - Derive the backoff from 429 responses and rate limit headers
//! - Remember the last quota the server advertised
//!
//! # Design Decisions
//! - Backoff is checked before the base limiter; an active backoff always wins
//! - Every qualifying observation overwrites `backoff_until`, even with an
//!   earlier instant. The most recent signal from the server is the one honored
//! - Deadlines are wall-clock (`SystemTime`) because servers send absolute times

use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};
use tracing::{debug, warn};

use crate::lifecycle::{Context, ContextError};
use crate::observability::metrics;
use crate::rate_limit::headers;
use crate::rate_limit::RateLimiter;
use crate::resilience::timeouts;

/// Backoff applied after a 429 that carries no usable timing header.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct AdaptiveState {
    backoff_until: Option<SystemTime>,
    last_observed_limit: u64,
}

/// Decorates a limiter with server-signaled backoff.
pub struct AdaptiveRateLimiter {
    base: Arc<dyn RateLimiter>,
    state: RwLock<AdaptiveState>,
}

impl AdaptiveRateLimiter {
    pub fn new(base: Arc<dyn RateLimiter>) -> Self {
        Self {
            base,
            state: RwLock::new(AdaptiveState::default()),
        }
    }

    /// Remaining backoff, or `None` when no backoff is active.
    fn remaining_backoff(&self) -> Option<Duration> {
        let until = self.state.read().expect("adaptive state lock poisoned").backoff_until?;
        until.duration_since(SystemTime::now()).ok().filter(|d| !d.is_zero())
    }

    pub fn is_backing_off(&self) -> bool {
        self.remaining_backoff().is_some()
    }

    /// Instant the current backoff ends, if one was ever set.
    pub fn backoff_until(&self) -> Option<SystemTime> {
        self.state.read().expect("adaptive state lock poisoned").backoff_until
    }

    /// Last quota advertised by `X-RateLimit-Limit` or `RateLimit-Limit`; 0 if unknown.
    pub fn last_observed_limit(&self) -> u64 {
        self.state.read().expect("adaptive state lock poisoned").last_observed_limit
    }

    /// Feed a completed exchange. `None` (transport failure) is ignored.
    pub fn observe_response(&self, response: Option<&Response>) {
        if let Some(response) = response {
            self.observe(response.status(), response.headers());
        }
    }

    /// Update backoff and quota from a status line and its headers.
    pub fn observe(&self, status: StatusCode, headers: &HeaderMap) {
        let now = SystemTime::now();
        let mut state = self.state.write().expect("adaptive state lock poisoned");

        if status == StatusCode::TOO_MANY_REQUESTS {
            let (until, source) = backoff_from_429(headers, now);
            state.backoff_until = Some(until);
            warn!(
                source = source,
                backoff_secs = until.duration_since(now).unwrap_or_default().as_secs_f64(),
                "Server rejected request with 429, backing off"
            );
            metrics::record_adaptive_backoff(source);
        }

        if let Some(limit) = headers::header_int(headers, headers::X_RATELIMIT_LIMIT)
            .and_then(|l| u64::try_from(l).ok())
        {
            state.last_observed_limit = limit;
        }
        if let Some(limit) = headers::header_int(headers, headers::RATELIMIT_LIMIT)
            .and_then(|l| u64::try_from(l).ok())
        {
            state.last_observed_limit = limit;
        }

        // Quota exhausted: back off until the advertised reset, before the server starts rejecting.
        if headers::header_int(headers, headers::X_RATELIMIT_REMAINING) == Some(0) {
            if let Some(reset) = headers::header_unix_timestamp(headers, headers::X_RATELIMIT_RESET) {
                state.backoff_until = Some(reset);
                debug!(
                    backoff_secs = reset.duration_since(now).unwrap_or_default().as_secs_f64(),
                    "Rate limit quota exhausted, backing off until reset"
                );
                metrics::record_adaptive_backoff("remaining_exhausted");
            }
        }
    }
}

/// First match wins: Retry-After, X-RateLimit-Reset, RateLimit-Reset, then the default.
fn backoff_from_429(headers: &HeaderMap, now: SystemTime) -> (SystemTime, &'static str) {
    if let Some(until) = headers::retry_after(headers, now) {
        return (until, "retry_after");
    }
    if let Some(until) = headers::header_unix_timestamp(headers, headers::X_RATELIMIT_RESET) {
        return (until, "x_ratelimit_reset");
    }
    if let Some(until) = headers::header_unix_timestamp(headers, headers::RATELIMIT_RESET) {
        return (until, "ratelimit_reset");
    }
    (now + DEFAULT_BACKOFF, "default")
}

#[async_trait]
impl RateLimiter for AdaptiveRateLimiter {
    fn allow(&self, ctx: &Context) -> bool {
        if self.is_backing_off() {
            return false;
        }
        self.base.allow(ctx)
    }

    async fn wait(&self, ctx: &Context) -> Result<(), ContextError> {
        if let Some(remaining) = self.remaining_backoff() {
            debug!(wait_ms = remaining.as_millis() as u64, "Waiting out adaptive backoff");
            timeouts::sleep(ctx, remaining).await?;
        }
        self.base.wait(ctx).await
    }
}

impl std::fmt::Debug for AdaptiveRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read().expect("adaptive state lock poisoned");
        f.debug_struct("AdaptiveRateLimiter")
            .field("backoff_until", &state.backoff_until)
            .field("last_observed_limit", &state.last_observed_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::{NoRateLimit, TokenBucketRateLimiter};
    use reqwest::header::HeaderValue;
    use std::time::UNIX_EPOCH;

    fn adaptive() -> AdaptiveRateLimiter {
        AdaptiveRateLimiter::new(Arc::new(NoRateLimit))
    }

    fn headers(pairs: &[(&'static str, String)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn unix_now() -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
    }

    fn response(status: u16, pairs: &[(&'static str, &str)]) -> Response {
        let mut builder = http::Response::builder().status(status);
        for (name, value) in pairs {
            builder = builder.header(*name, *value);
        }
        Response::from(builder.body("").unwrap())
    }

    #[tokio::test]
    async fn retry_after_seconds_blocks_then_releases() {
        let ctx = Context::background();
        let limiter = adaptive();
        assert!(limiter.allow(&ctx));

        limiter.observe_response(Some(&response(429, &[("retry-after", "1")])));
        assert!(!limiter.allow(&ctx));
        assert!(limiter.is_backing_off());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(limiter.allow(&ctx));
    }

    #[test]
    fn retry_after_date_is_used_verbatim() {
        let limiter = adaptive();
        limiter.observe(
            StatusCode::TOO_MANY_REQUESTS,
            &headers(&[("retry-after", "Wed, 21 Oct 2015 07:28:00 GMT".to_string())]),
        );
        assert_eq!(
            limiter.backoff_until(),
            Some(UNIX_EPOCH + Duration::from_secs(1_445_412_480))
        );
        assert!(!limiter.is_backing_off(), "date in the past imposes no backoff");
    }

    #[test]
    fn retry_after_beats_x_ratelimit_reset() {
        let limiter = adaptive();
        let before = SystemTime::now();
        limiter.observe(
            StatusCode::TOO_MANY_REQUESTS,
            &headers(&[
                ("retry-after", "5".to_string()),
                ("x-ratelimit-reset", (unix_now() + 500).to_string()),
            ]),
        );

        let backoff = limiter.backoff_until().unwrap().duration_since(before).unwrap();
        assert!(backoff >= Duration::from_secs(5) && backoff < Duration::from_secs(6));
    }

    #[test]
    fn exhausted_quota_on_429_overrides_retry_after() {
        let limiter = adaptive();
        let reset = unix_now() + 2;
        limiter.observe(
            StatusCode::TOO_MANY_REQUESTS,
            &headers(&[
                ("retry-after", "100".to_string()),
                ("x-ratelimit-remaining", "0".to_string()),
                ("x-ratelimit-reset", reset.to_string()),
            ]),
        );

        assert_eq!(
            limiter.backoff_until(),
            Some(UNIX_EPOCH + Duration::from_secs(reset as u64))
        );
        assert!(limiter.is_backing_off());
    }

    #[test]
    fn x_ratelimit_reset_beats_draft_header() {
        let limiter = adaptive();
        let reset = unix_now() + 30;
        limiter.observe(
            StatusCode::TOO_MANY_REQUESTS,
            &headers(&[
                ("x-ratelimit-reset", reset.to_string()),
                ("ratelimit-reset", (reset + 100).to_string()),
            ]),
        );
        assert_eq!(
            limiter.backoff_until(),
            Some(UNIX_EPOCH + Duration::from_secs(reset as u64))
        );
    }

    #[test]
    fn draft_reset_header_on_429() {
        let limiter = adaptive();
        let reset = unix_now() + 45;
        limiter.observe(
            StatusCode::TOO_MANY_REQUESTS,
            &headers(&[("ratelimit-reset", reset.to_string())]),
        );
        assert_eq!(
            limiter.backoff_until(),
            Some(UNIX_EPOCH + Duration::from_secs(reset as u64))
        );
    }

    #[test]
    fn unparseable_retry_after_falls_through_to_reset() {
        let limiter = adaptive();
        let reset = unix_now() + 20;
        limiter.observe(
            StatusCode::TOO_MANY_REQUESTS,
            &headers(&[
                ("retry-after", "later".to_string()),
                ("x-ratelimit-reset", reset.to_string()),
            ]),
        );
        assert_eq!(
            limiter.backoff_until(),
            Some(UNIX_EPOCH + Duration::from_secs(reset as u64))
        );
    }

    #[test]
    fn bare_429_backs_off_for_a_minute() {
        let limiter = adaptive();
        let before = SystemTime::now();
        limiter.observe(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new());

        let until = limiter.backoff_until().unwrap();
        let backoff = until.duration_since(before).unwrap();
        assert!(backoff >= Duration::from_secs(59) && backoff <= Duration::from_secs(61));
    }

    #[test]
    fn exhausted_quota_backs_off_on_success() {
        let limiter = adaptive();
        let reset = unix_now() + 10;
        limiter.observe(
            StatusCode::OK,
            &headers(&[
                ("x-ratelimit-remaining", "0".to_string()),
                ("x-ratelimit-reset", reset.to_string()),
            ]),
        );
        assert!(limiter.is_backing_off());
        assert!(!limiter.allow(&Context::background()));
    }

    #[test]
    fn remaining_quota_does_not_back_off() {
        let limiter = adaptive();
        let reset = unix_now() + 10;
        limiter.observe(
            StatusCode::OK,
            &headers(&[
                ("x-ratelimit-remaining", "5".to_string()),
                ("x-ratelimit-reset", reset.to_string()),
            ]),
        );
        assert!(!limiter.is_backing_off());

        limiter.observe(
            StatusCode::OK,
            &headers(&[("x-ratelimit-remaining", "0".to_string())]),
        );
        assert!(!limiter.is_backing_off(), "zero remaining without a reset is ignored");
    }

    #[test]
    fn observed_limit_prefers_draft_header() {
        let limiter = adaptive();
        assert_eq!(limiter.last_observed_limit(), 0);

        limiter.observe(StatusCode::OK, &headers(&[("x-ratelimit-limit", "100".to_string())]));
        assert_eq!(limiter.last_observed_limit(), 100);

        limiter.observe(
            StatusCode::OK,
            &headers(&[
                ("x-ratelimit-limit", "100".to_string()),
                ("ratelimit-limit", "250".to_string()),
            ]),
        );
        assert_eq!(limiter.last_observed_limit(), 250);

        limiter.observe(StatusCode::OK, &headers(&[("ratelimit-limit", "bogus".to_string())]));
        assert_eq!(limiter.last_observed_limit(), 250);
    }

    #[test]
    fn later_observation_can_shorten_backoff() {
        let limiter = adaptive();
        limiter.observe(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new());
        assert!(limiter.is_backing_off());

        limiter.observe(
            StatusCode::TOO_MANY_REQUESTS,
            &headers(&[("retry-after", "0".to_string())]),
        );
        assert!(!limiter.is_backing_off());
    }

    #[test]
    fn missing_response_is_ignored() {
        let limiter = adaptive();
        limiter.observe_response(None);
        assert_eq!(limiter.backoff_until(), None);
    }

    #[test]
    fn backoff_dominates_base_limiter() {
        let ctx = Context::background();
        let limiter = AdaptiveRateLimiter::new(Arc::new(TokenBucketRateLimiter::new(1.0, 5)));
        limiter.observe(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new());

        for _ in 0..10 {
            assert!(!limiter.allow(&ctx));
        }
    }

    #[tokio::test]
    async fn wait_sleeps_through_backoff() {
        let ctx = Context::background();
        let limiter = adaptive();
        limiter.observe(
            StatusCode::TOO_MANY_REQUESTS,
            &headers(&[("retry-after", "1".to_string())]),
        );

        let start = std::time::Instant::now();
        limiter.wait(&ctx).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn wait_is_cancelable_during_backoff() {
        let limiter = adaptive();
        limiter.observe(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new());

        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        let start = std::time::Instant::now();
        assert_eq!(limiter.wait(&ctx).await, Err(ContextError::DeadlineExceeded));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
