//! Token bucket rate limiter.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::lifecycle::{Context, ContextError};
use crate::rate_limit::RateLimiter;
use crate::resilience::timeouts;

/// Bucket state guarded by the limiter's mutex.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn refill(&mut self, capacity: f64, refill_rate: f64) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        self.refill(capacity, refill_rate);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until one whole token is available; `None` if it never will be.
    fn time_to_token(&self, capacity: f64, refill_rate: f64) -> Option<Duration> {
        if capacity < 1.0 || refill_rate <= 0.0 {
            return None;
        }
        let missing = (1.0 - self.tokens).max(0.0);
        Duration::try_from_secs_f64(missing / refill_rate).ok()
    }
}

/// Admits up to `burst` requests at once, refilling at `rate` tokens per second.
///
/// A rate of `f64::INFINITY` disables limiting. A burst of 0 denies forever.
///
/// When no token can ever arrive (rate 0 or burst 0), `wait` does not fail
/// early: it blocks until the context ends and returns the context's error.
/// Callers passing `Context::background()` to such a limiter wait forever.
#[derive(Debug)]
pub struct TokenBucketRateLimiter {
    rate: f64,
    burst: u32,
    bucket: Mutex<TokenBucket>,
}

impl TokenBucketRateLimiter {
    pub fn new(rate_per_second: f64, burst: u32) -> Self {
        let rate = if rate_per_second.is_nan() || rate_per_second < 0.0 {
            0.0
        } else {
            rate_per_second
        };
        Self {
            rate,
            burst,
            bucket: Mutex::new(TokenBucket::new(burst as f64)),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Tokens currently available, after refilling.
    pub fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().expect("token bucket mutex poisoned");
        bucket.refill(self.burst as f64, self.rate);
        bucket.tokens
    }

    fn unlimited(&self) -> bool {
        self.rate == f64::INFINITY
    }
}

#[async_trait]
impl RateLimiter for TokenBucketRateLimiter {
    fn allow(&self, _ctx: &Context) -> bool {
        if self.unlimited() {
            return true;
        }
        let mut bucket = self.bucket.lock().expect("token bucket mutex poisoned");
        bucket.try_acquire(self.burst as f64, self.rate)
    }

    /// Blocks until a token is taken. Never resolves before the context ends
    /// when the bucket cannot refill (rate 0 or burst 0).
    async fn wait(&self, ctx: &Context) -> Result<(), ContextError> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        if self.unlimited() {
            return Ok(());
        }

        loop {
            let delay = {
                let mut bucket = self.bucket.lock().expect("token bucket mutex poisoned");
                if bucket.try_acquire(self.burst as f64, self.rate) {
                    return Ok(());
                }
                bucket.time_to_token(self.burst as f64, self.rate)
            };

            match delay {
                // Another waiter may take the token first; re-check after sleeping.
                Some(delay) => timeouts::sleep(ctx, delay.max(Duration::from_micros(100))).await?,
                None => return Err(ctx.done().await),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn burst_then_deny() {
        let ctx = Context::background();
        let limiter = TokenBucketRateLimiter::new(1.0, 3);

        for _ in 0..3 {
            assert!(limiter.allow(&ctx));
        }
        assert!(!limiter.allow(&ctx));
    }

    #[tokio::test]
    async fn refills_one_token_per_interval() {
        let ctx = Context::background();
        let limiter = TokenBucketRateLimiter::new(10.0, 1);

        assert!(limiter.allow(&ctx));
        assert!(!limiter.allow(&ctx));

        tokio::time::sleep(Duration::from_millis(110)).await;
        assert!(limiter.allow(&ctx));
        assert!(!limiter.allow(&ctx));
    }

    #[test]
    fn tokens_never_exceed_burst() {
        let limiter = TokenBucketRateLimiter::new(1_000_000.0, 4);
        std::thread::sleep(Duration::from_millis(5));
        assert!(limiter.available() <= 4.0);
    }

    #[test]
    fn zero_burst_denies() {
        let ctx = Context::background();
        let limiter = TokenBucketRateLimiter::new(100.0, 0);
        assert!(!limiter.allow(&ctx));
    }

    #[test]
    fn infinite_rate_never_limits() {
        let ctx = Context::background();
        let limiter = TokenBucketRateLimiter::new(f64::INFINITY, 0);
        for _ in 0..1000 {
            assert!(limiter.allow(&ctx));
        }
    }

    #[tokio::test]
    async fn wait_blocks_until_refill() {
        let ctx = Context::background();
        let limiter = TokenBucketRateLimiter::new(10.0, 1);

        limiter.wait(&ctx).await.unwrap();

        let start = std::time::Instant::now();
        limiter.wait(&ctx).await.unwrap();
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(80), "waited only {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(500), "waited too long: {:?}", elapsed);
    }

    #[tokio::test]
    async fn wait_honors_cancellation() {
        let limiter = TokenBucketRateLimiter::new(1.0, 1);
        let ctx = Context::background();
        limiter.wait(&ctx).await.unwrap();

        let short = ctx.with_timeout(Duration::from_millis(50));
        let start = std::time::Instant::now();
        let result = limiter.wait(&short).await;

        assert_eq!(result, Err(ContextError::DeadlineExceeded));
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn wait_with_zero_burst_returns_context_error() {
        let limiter = TokenBucketRateLimiter::new(10.0, 0);
        let ctx = Context::background().with_timeout(Duration::from_millis(30));
        assert_eq!(limiter.wait(&ctx).await, Err(ContextError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn wait_with_zero_rate_blocks_until_context_ends() {
        let limiter = TokenBucketRateLimiter::new(0.0, 1);
        let ctx = Context::background();
        limiter.wait(&ctx).await.unwrap();

        let background = tokio::time::timeout(Duration::from_millis(50), limiter.wait(&ctx)).await;
        assert!(background.is_err(), "background context keeps waiting");

        let (short, handle) = ctx.with_cancel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });
        assert_eq!(limiter.wait(&short).await, Err(ContextError::Canceled));
    }

    #[tokio::test]
    async fn wait_rejects_already_canceled_context() {
        let limiter = TokenBucketRateLimiter::new(10.0, 5);
        let (ctx, handle) = Context::background().with_cancel();
        handle.cancel();
        assert_eq!(limiter.wait(&ctx).await, Err(ContextError::Canceled));
    }

    #[tokio::test]
    async fn concurrent_allow_never_exceeds_burst() {
        let limiter = Arc::new(TokenBucketRateLimiter::new(0.001, 10));
        let admitted = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let limiter = limiter.clone();
            let admitted = admitted.clone();
            tasks.push(tokio::spawn(async move {
                if limiter.allow(&Context::background()) {
                    admitted.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 10);
    }
}
