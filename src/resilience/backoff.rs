//! Backoff strategies between retry attempts.
//!
//! A strategy maps `(min_wait, max_wait, attempt, last_response)` to a delay.
//! Strategies are pure apart from `ExponentialBackoff`'s jitter; clamping to
//! `max_wait` is the strategy's own choice, not the caller's.

use std::time::Duration;

use rand::Rng;
use reqwest::Response;

/// Computes the wait before the next attempt.
pub trait BackoffStrategy: Send + Sync {
    fn backoff(
        &self,
        min_wait: Duration,
        max_wait: Duration,
        attempt: u32,
        response: Option<&Response>,
    ) -> Duration;
}

impl<F> BackoffStrategy for F
where
    F: Fn(Duration, Duration, u32, Option<&Response>) -> Duration + Send + Sync,
{
    fn backoff(
        &self,
        min_wait: Duration,
        max_wait: Duration,
        attempt: u32,
        response: Option<&Response>,
    ) -> Duration {
        self(min_wait, max_wait, attempt, response)
    }
}

/// Always waits the same amount.
#[derive(Debug, Clone, Copy)]
pub struct ConstantBackoff {
    delay: Duration,
}

impl ConstantBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffStrategy for ConstantBackoff {
    fn backoff(&self, _: Duration, _: Duration, _: u32, _: Option<&Response>) -> Duration {
        self.delay
    }
}

/// Waits `min_wait + attempt * step`. Not bounded by `max_wait`.
#[derive(Debug, Clone, Copy)]
pub struct LinearBackoff {
    step: Duration,
}

impl LinearBackoff {
    pub fn new(step: Duration) -> Self {
        Self { step }
    }
}

impl BackoffStrategy for LinearBackoff {
    fn backoff(&self, min_wait: Duration, _: Duration, attempt: u32, _: Option<&Response>) -> Duration {
        min_wait.saturating_add(self.step.saturating_mul(attempt))
    }
}

/// Never waits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl BackoffStrategy for NoBackoff {
    fn backoff(&self, _: Duration, _: Duration, _: u32, _: Option<&Response>) -> Duration {
        Duration::ZERO
    }
}

/// Exponential backoff with jitter.
///
/// Waits `max(min_wait, base * 2^attempt)`, capped at `max_wait` when it is
/// non-zero, plus up to 10% random jitter on top of the capped value.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    base: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration) -> Self {
        Self { base }
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn backoff(
        &self,
        min_wait: Duration,
        max_wait: Duration,
        attempt: u32,
        _: Option<&Response>,
    ) -> Duration {
        let base_ms = self.base.as_millis().min(u64::MAX as u128) as u64;
        let exponential_base = 2u64.saturating_pow(attempt);
        let delay_ms = base_ms.saturating_mul(exponential_base);

        let mut delay = Duration::from_millis(delay_ms).max(min_wait);
        if !max_wait.is_zero() {
            delay = delay.min(max_wait);
        }

        // Apply jitter (0 to 10% of the delay)
        let jitter_range = delay.as_millis() as u64 / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };

        delay + Duration::from_millis(jitter)
    }
}
