//! Fixed-window rate limiting for upstream service calls.
//!
//! Every adapter acquires from its own bucket before issuing a network
//! call. Buckets are keyed by service name, created lazily on first use,
//! and shared across all concurrent requests for the life of the process.

use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

use super::types::{RateLimit, ServiceError, ServiceKey};

/// Fixed-window counter for a single service.
///
/// The window resets in full once it elapses, so up to `2 * max_requests`
/// calls can land across a window boundary. That burst is an accepted
/// approximation of this scheme, not a sliding window.
#[derive(Debug)]
pub struct FixedWindowBucket {
    tokens: u32,
    window_start: Instant,
}

impl FixedWindowBucket {
    /// Create a bucket whose first request is already counted.
    fn new(limit: RateLimit) -> Self {
        Self {
            tokens: limit.max_requests.saturating_sub(1),
            window_start: Instant::now(),
        }
    }

    /// Try to take one request out of the current window.
    ///
    /// Returns `Err(wait)` with the time until the window resets when the
    /// window's budget is spent.
    pub fn try_acquire(&mut self, limit: RateLimit) -> Result<(), Duration> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.window_start);

        if elapsed >= limit.window {
            self.tokens = limit.max_requests.saturating_sub(1);
            self.window_start = now;
            return Ok(());
        }

        if self.tokens > 0 {
            self.tokens -= 1;
            Ok(())
        } else {
            Err(limit.window - elapsed)
        }
    }
}

/// Process-wide pool of per-service buckets.
///
/// The write lock is held across each read-modify-write, so concurrent
/// callers contending on the same key can never double-allow or
/// double-reject.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: RwLock<HashMap<String, FixedWindowBucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire one request for `key` under `limit`.
    ///
    /// The first use of a key creates its bucket and counts as the first
    /// request of the window.
    pub async fn allow(&self, key: &str, limit: RateLimit) -> Result<(), Duration> {
        let mut buckets = self.buckets.write().await;
        match buckets.get_mut(key) {
            Some(bucket) => bucket.try_acquire(limit),
            None => {
                buckets.insert(key.to_string(), FixedWindowBucket::new(limit));
                Ok(())
            }
        }
    }

    /// Adapter-facing acquire: uses the service's own key and limit, and
    /// maps rejection to [`ServiceError::RateLimited`].
    pub async fn try_acquire(&self, service: ServiceKey) -> Result<(), ServiceError> {
        self.allow(service.name(), service.rate_limit())
            .await
            .map_err(|wait| ServiceError::RateLimited {
                retry_after_secs: wait.as_secs().max(1),
            })
    }
}
