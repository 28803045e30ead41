//! Key-value cache abstraction and the rate limiter built on it.
//!
//! The [`KeyValueStore`] trait mirrors the subset of Redis commands the
//! service relies on. [`MemoryStore`] is the in-process implementation.

pub mod memory;
pub mod rate_limit;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheError;

pub use memory::MemoryStore;
pub use rate_limit::{RateLimitDecision, RateLimiter};

/// Redis-style key-value operations.
///
/// Each key holds one kind of value (string, list, hash or set); using a
/// key with an operation for another kind fails with
/// [`CacheError::WrongType`]. Expired keys behave as absent.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store a string, replacing any value and TTL at `key`.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Returns whether a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Increment the integer at `key` (missing counts as 0). Keeps the TTL.
    async fn incr(&self, key: &str) -> Result<i64, CacheError>;

    /// Set a TTL on an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Remaining TTL, or `None` when the key is absent or has no TTL.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    /// Prepend to a list. Returns the new length.
    async fn lpush(&self, key: &str, value: &str) -> Result<usize, CacheError>;

    /// Inclusive range; negative indices count from the end.
    async fn lrange(&self, key: &str, start: isize, stop: isize)
    -> Result<Vec<String>, CacheError>;

    /// Keep only the inclusive range; an empty range removes the key.
    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<(), CacheError>;

    /// Returns `true` if the field is new.
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool, CacheError>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CacheError>;

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, CacheError>;

    /// Returns `true` if the member was not already present.
    async fn sadd(&self, key: &str, member: &str) -> Result<bool, CacheError>;

    /// Members in ascending order.
    async fn smembers(&self, key: &str) -> Result<Vec<String>, CacheError>;
}
