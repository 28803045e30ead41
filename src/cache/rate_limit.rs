//! Fixed-window rate limiting over a [`KeyValueStore`].

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::KeyValueStore;
use crate::error::CacheError;

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix timestamp (seconds) at which the current window ends.
    pub reset_at: u64,
    /// Seconds until the window resets. `0` when allowed.
    pub retry_after: u64,
}

impl RateLimitDecision {
    /// Turn a denial into [`CacheError::RateLimited`].
    pub fn into_result(self) -> Result<Self, CacheError> {
        if self.allowed {
            Ok(self)
        } else {
            Err(CacheError::RateLimited {
                retry_after_secs: self.retry_after,
            })
        }
    }
}

/// Allows `limit` requests per identifier in each `window`.
///
/// The window starts at the first request and is not sliding: the counter
/// key expires `window` after it was created.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    limit: u32,
    window: Duration,
    prefix: String,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, limit: u32, window: Duration) -> Self {
        Self {
            store,
            limit,
            window,
            prefix: "ratelimit".to_string(),
        }
    }

    /// Namespace keys under `prefix` so several limiters can share a store.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn key(&self, identifier: &str) -> String {
        format!("{}:{}", self.prefix, identifier)
    }

    /// Count one request for `identifier` and decide whether it may proceed.
    pub async fn check(&self, identifier: &str) -> Result<RateLimitDecision, CacheError> {
        let key = self.key(identifier);
        let count = self.store.incr(&key).await?;

        let ttl = match self.store.ttl(&key).await? {
            Some(ttl) => ttl,
            None => {
                // First hit of a window, or a counter that lost its TTL.
                self.store.expire(&key, self.window).await?;
                self.window
            }
        };

        let count = u32::try_from(count).unwrap_or(u32::MAX);
        let allowed = count <= self.limit;
        let ttl_secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
        let now = chrono::Utc::now().timestamp().max(0) as u64;

        if !allowed {
            tracing::debug!(
                identifier,
                limit = self.limit,
                retry_after = ttl_secs,
                "Rate limit exceeded"
            );
        }

        Ok(RateLimitDecision {
            allowed,
            limit: self.limit,
            remaining: self.limit.saturating_sub(count),
            reset_at: now + ttl_secs,
            retry_after: if allowed { 0 } else { ttl_secs },
        })
    }

    /// Forget the counter for `identifier`.
    pub async fn reset(&self, identifier: &str) -> Result<(), CacheError> {
        self.store.delete(&self.key(identifier)).await?;
        Ok(())
    }
}
