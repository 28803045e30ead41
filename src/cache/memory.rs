//! In-process [`KeyValueStore`] with lazy TTL expiry.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::KeyValueStore;
use crate::error::CacheError;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    List(VecDeque<String>),
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Hash(_) => "hash",
            Self::Set(_) => "set",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

fn wrong_type(key: &str, expected: &'static str, actual: &'static str) -> CacheError {
    CacheError::WrongType {
        key: key.to_string(),
        expected,
        actual,
    }
}

/// Resolve Redis-style inclusive `start..=stop` against `len`.
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// Minimum time between full sweeps of expired keys.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// HashMap-backed store.
///
/// Expired keys read as absent immediately. They are removed when the key
/// is next written, or by the sweep that any write triggers once
/// a minute has passed since the previous one.
#[derive(Debug)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    next_purge: Mutex<Instant>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_purge: Mutex::new(Instant::now() + PURGE_INTERVAL),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sweep expired keys if the purge interval has elapsed.
    fn purge_if_due(&self, entries: &mut HashMap<String, Entry>, now: Instant) {
        {
            let mut next = self.next_purge.lock().unwrap_or_else(PoisonError::into_inner);
            if now < *next {
                return;
            }
            *next = now + PURGE_INTERVAL;
        }

        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before - entries.len();
        if purged > 0 {
            tracing::debug!(purged, remaining = entries.len(), "Purged expired cache keys");
        }
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Read a live entry through `f`.
    async fn read<T>(&self, key: &str, f: impl FnOnce(Option<&Entry>) -> T) -> T {
        let now = Instant::now();
        let entries = self.entries.read().await;
        f(entries.get(key).filter(|e| !e.is_expired(now)))
    }

    /// Mutate the live entry at `key`, creating it with `init` if absent.
    async fn upsert<T>(
        &self,
        key: &str,
        init: impl FnOnce() -> Value,
        f: impl FnOnce(&mut Entry) -> Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        self.purge_if_due(&mut entries, now);
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: init(),
            expires_at: None,
        });
        f(entry)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.read(key, |entry| match entry {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(other) => Err(wrong_type(key, "string", other.value.kind())),
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let now = Instant::now();
        let entry = Entry {
            value: Value::Str(value.to_string()),
            expires_at: ttl.map(|ttl| now + ttl),
        };
        let mut entries = self.entries.write().await;
        self.purge_if_due(&mut entries, now);
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .write()
            .await
            .remove(key)
            .is_some_and(|e| !e.is_expired(now)))
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        self.upsert(
            key,
            || Value::Str("0".to_string()),
            |entry| {
                let actual = entry.value.kind();
                let Value::Str(raw) = &mut entry.value else {
                    return Err(wrong_type(key, "string", actual));
                };
                let current: i64 = raw.parse().map_err(|_| CacheError::NotAnInteger {
                    key: key.to_string(),
                })?;
                let next = current.checked_add(1).ok_or_else(|| CacheError::NotAnInteger {
                    key: key.to_string(),
                })?;
                *raw = next.to_string();
                Ok(next)
            },
        )
        .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        self.purge_if_due(&mut entries, now);
        match entries.get_mut(key).filter(|e| !e.is_expired(now)) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let now = Instant::now();
        self.read(key, |entry| {
            Ok(entry
                .and_then(|e| e.expires_at)
                .map(|at| at.saturating_duration_since(now)))
        })
        .await
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<usize, CacheError> {
        self.upsert(
            key,
            || Value::List(VecDeque::new()),
            |entry| match &mut entry.value {
                Value::List(list) => {
                    list.push_front(value.to_string());
                    Ok(list.len())
                }
                other => Err(wrong_type(key, "list", other.kind())),
            },
        )
        .await
    }

    async fn lrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, CacheError> {
        self.read(key, |entry| match entry {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(match resolve_range(list.len(), start, stop) {
                Some((from, to)) => list.range(from..=to).cloned().collect(),
                None => Vec::new(),
            }),
            Some(other) => Err(wrong_type(key, "list", other.value.kind())),
        })
        .await
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        self.purge_if_due(&mut entries, now);

        let Some(entry) = entries.get_mut(key).filter(|e| !e.is_expired(now)) else {
            return Ok(());
        };
        let actual = entry.value.kind();
        let Value::List(list) = &mut entry.value else {
            return Err(wrong_type(key, "list", actual));
        };
        match resolve_range(list.len(), start, stop) {
            Some((from, to)) => {
                list.truncate(to + 1);
                list.drain(..from);
            }
            None => {
                entries.remove(key);
            }
        }
        Ok(())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool, CacheError> {
        self.upsert(
            key,
            || Value::Hash(HashMap::new()),
            |entry| match &mut entry.value {
                Value::Hash(hash) => Ok(hash.insert(field.to_string(), value.to_string()).is_none()),
                other => Err(wrong_type(key, "hash", other.kind())),
            },
        )
        .await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        self.read(key, |entry| match entry {
            None => Ok(None),
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => Ok(hash.get(field).cloned()),
            Some(other) => Err(wrong_type(key, "hash", other.value.kind())),
        })
        .await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, CacheError> {
        self.read(key, |entry| match entry {
            None => Ok(HashMap::new()),
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => Ok(hash.clone()),
            Some(other) => Err(wrong_type(key, "hash", other.value.kind())),
        })
        .await
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        self.upsert(
            key,
            || Value::Set(BTreeSet::new()),
            |entry| match &mut entry.value {
                Value::Set(set) => Ok(set.insert(member.to_string())),
                other => Err(wrong_type(key, "set", other.kind())),
            },
        )
        .await
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, CacheError> {
        self.read(key, |entry| match entry {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(set.iter().cloned().collect()),
            Some(other) => Err(wrong_type(key, "set", other.value.kind())),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn test_string_roundtrip_and_delete() {
        let store = MemoryStore::new();
        store.set("greeting", "hello", None).await.unwrap();
        assert_eq!(store.get("greeting").await.unwrap().as_deref(), Some("hello"));
        assert!(store.delete("greeting").await.unwrap());
        assert!(!store.delete("greeting").await.unwrap());
        assert_eq!(store.get("greeting").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expires_lazily() {
        let store = MemoryStore::new();
        store
            .set("session", "abc", Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(
            store.ttl("session").await.unwrap(),
            Some(Duration::from_secs(10))
        );

        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(store.get("session").await.unwrap(), None);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr_keeps_ttl_and_restarts_after_expiry() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("hits").await.unwrap(), 1);
        assert!(store.expire("hits", Duration::from_secs(5)).await.unwrap());
        assert_eq!(store.incr("hits").await.unwrap(), 2);
        assert!(store.ttl("hits").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.incr("hits").await.unwrap(), 1);
        assert_eq!(store.ttl("hits").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_rejects_non_integer() {
        let store = MemoryStore::new();
        store.set("name", "bob", None).await.unwrap();
        assert!(matches!(
            store.incr("name").await,
            Err(CacheError::NotAnInteger { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_push_and_range() {
        let store = MemoryStore::new();
        for v in ["a", "b", "c", "d"] {
            store.lpush("recent", v).await.unwrap();
        }
        assert_eq!(store.lrange("recent", 0, -1).await.unwrap(), vec!["d", "c", "b", "a"]);
        assert_eq!(store.lrange("recent", 0, 1).await.unwrap(), vec!["d", "c"]);
        assert_eq!(store.lrange("recent", -2, -1).await.unwrap(), vec!["b", "a"]);
        assert_eq!(store.lrange("recent", 2, 100).await.unwrap(), vec!["b", "a"]);
        assert!(store.lrange("recent", 5, 10).await.unwrap().is_empty());
        assert!(store.lrange("missing", 0, -1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ltrim_keeps_range() {
        let store = MemoryStore::new();
        for i in 0..20 {
            store.lpush("history", &i.to_string()).await.unwrap();
            store.ltrim("history", 0, 4).await.unwrap();
        }
        assert_eq!(
            store.lrange("history", 0, -1).await.unwrap(),
            vec!["19", "18", "17", "16", "15"]
        );

        store.ltrim("history", 1, 2).await.unwrap();
        assert_eq!(store.lrange("history", 0, -1).await.unwrap(), vec!["18", "17"]);

        store.ltrim("history", 5, 10).await.unwrap();
        assert_eq!(store.len().await, 0);
        store.ltrim("missing", 0, 1).await.unwrap();

        store.set("plain", "x", None).await.unwrap();
        assert!(store.ltrim("plain", 0, 1).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_sweep_expired_keys() {
        let store = MemoryStore::new();
        for i in 0..5000 {
            store
                .set(&format!("ratelimit:chat:ip:{i}"), "1", Some(Duration::from_secs(60)))
                .await
                .unwrap();
        }
        assert_eq!(store.entries.read().await.len(), 5000);

        tokio::time::advance(Duration::from_secs(3600)).await;
        store.set("unrelated", "v", None).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.entries.read().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_waits_for_interval() {
        let store = MemoryStore::new();
        store.set("short", "v", Some(Duration::from_secs(1))).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        store.set("other", "v", None).await.unwrap();
        // Expired but not yet swept.
        assert_eq!(store.entries.read().await.len(), 2);
        assert_eq!(store.len().await, 1);

        tokio::time::advance(PURGE_INTERVAL).await;
        store.incr("counter").await.unwrap();
        assert_eq!(store.entries.read().await.len(), 2);
        assert!(!store.entries.read().await.contains_key("short"));
    }

    #[tokio::test]
    async fn test_hash_operations() {
        let store = MemoryStore::new();
        assert!(store.hset("user:1", "login", "octocat").await.unwrap());
        assert!(!store.hset("user:1", "login", "hubot").await.unwrap());
        store.hset("user:1", "name", "Hubot").await.unwrap();

        assert_eq!(
            store.hget("user:1", "login").await.unwrap().as_deref(),
            Some("hubot")
        );
        let all = store.hgetall("user:1").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["name"], "Hubot");
    }

    #[tokio::test]
    async fn test_set_members_sorted_and_unique() {
        let store = MemoryStore::new();
        assert!(store.sadd("users", "zed").await.unwrap());
        assert!(store.sadd("users", "amy").await.unwrap());
        assert!(!store.sadd("users", "zed").await.unwrap());
        assert_eq!(store.smembers("users").await.unwrap(), vec!["amy", "zed"]);
    }

    #[tokio::test]
    async fn test_wrong_type_errors() {
        let store = MemoryStore::new();
        store.lpush("list", "x").await.unwrap();

        let err = store.get("list").await.unwrap_err();
        assert!(matches!(
            err,
            CacheError::WrongType {
                expected: "string",
                actual: "list",
                ..
            }
        ));
        assert!(store.hset("list", "f", "v").await.is_err());
        assert!(store.sadd("list", "m").await.is_err());
    }

    #[test]
    fn test_resolve_range() {
        assert_eq!(resolve_range(4, 0, -1), Some((0, 3)));
        assert_eq!(resolve_range(4, -10, 1), Some((0, 1)));
        assert_eq!(resolve_range(4, 3, 1), None);
        assert_eq!(resolve_range(0, 0, -1), None);
    }
}
