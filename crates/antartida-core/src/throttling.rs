use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Outbound request budget shared by every provider call of a fetcher.
#[derive(Clone)]
pub struct RequestThrottle {
    limiter: Arc<DirectRateLimiter>,
    per_minute: NonZeroU32,
}

impl RequestThrottle {
    /// Allow `per_minute` requests per rolling minute, with bursts up to the same size.
    pub fn per_minute(per_minute: NonZeroU32) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
            per_minute,
        }
    }

    pub fn limit(&self) -> NonZeroU32 {
        self.per_minute
    }

    /// Wait until one request fits in the budget.
    pub async fn acquire(&self) {
        if self.limiter.check().is_ok() {
            return;
        }
        tracing::debug!(per_minute = self.per_minute.get(), "provider request throttled");
        self.limiter.until_ready().await;
    }

    /// Take budget without waiting; `false` when the request would have to wait.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Spacing between requests once the burst is spent.
    pub fn replenish_interval(&self) -> Duration {
        Duration::from_secs(60) / self.per_minute.get()
    }
}

impl std::fmt::Debug for RequestThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestThrottle")
            .field("per_minute", &self.per_minute)
            .finish()
    }
}
