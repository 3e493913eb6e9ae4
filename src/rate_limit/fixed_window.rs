//! Fixed window counter rate limiter.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::lifecycle::{Context, ContextError};
use crate::rate_limit::RateLimiter;
use crate::resilience::timeouts;

/// Smallest window accepted; shorter (or zero) windows are clamped to this.
const MIN_WINDOW: Duration = Duration::from_nanos(1);

#[derive(Debug)]
struct Window {
    start: Instant,
    count: u32,
}

impl Window {
    /// Reset the count if the window has expired.
    fn maybe_reset(&mut self, window: Duration) {
        let now = Instant::now();
        if now.saturating_duration_since(self.start) >= window {
            self.count = 0;
            self.start = now;
        }
    }

    fn remaining(&self, window: Duration) -> Duration {
        window.saturating_sub(self.start.elapsed())
    }
}

/// Admits at most `limit` requests per `window`.
///
/// A limit of 0 blocks all requests.
#[derive(Debug)]
pub struct FixedWindowRateLimiter {
    limit: u32,
    window: Duration,
    state: Mutex<Window>,
}

impl FixedWindowRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window: window.max(MIN_WINDOW),
            state: Mutex::new(Window {
                start: Instant::now(),
                count: 0,
            }),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[async_trait]
impl RateLimiter for FixedWindowRateLimiter {
    fn allow(&self, _ctx: &Context) -> bool {
        let mut state = self.state.lock().expect("fixed window mutex poisoned");
        state.maybe_reset(self.window);

        if state.count < self.limit {
            state.count += 1;
            true
        } else {
            false
        }
    }

    async fn wait(&self, ctx: &Context) -> Result<(), ContextError> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        loop {
            let wait_time = {
                let mut state = self.state.lock().expect("fixed window mutex poisoned");
                state.maybe_reset(self.window);

                if state.count < self.limit {
                    state.count += 1;
                    return Ok(());
                }
                state.remaining(self.window)
            };

            // The window may be reset by another caller while we sleep; loop to re-check.
            timeouts::sleep(ctx, wait_time).await?;
            tokio::task::yield_now().await;
        }
    }
}
