use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::CacheError;

/// Stores computed vitals data per organization.
///
/// The access discipline is last-writer-wins without locking: concurrent
/// misses for the same organization may each compute and store the value.
/// That is acceptable since results are idempotent and the time to live
/// bounds staleness.
#[async_trait]
pub trait VitalsCache: Send + Sync {
    /// Returns the value stored under `key`, if it has not expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores `value` under `key` for the given time to live.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
}

/// An in-process [`VitalsCache`] with per-entry expiry.
///
/// Expired entries are dropped on access, so memory use is bounded by the
/// number of distinct keys written within one time to live.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl VitalsCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.lock();
        match entries.entry(key.to_owned()) {
            Entry::Occupied(entry) => {
                let (value, expires) = entry.get();
                if *expires > Instant::now() {
                    Ok(Some(value.clone()))
                } else {
                    entry.remove();
                    Ok(None)
                }
            }
            Entry::Vacant(_) => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.lock().insert(key.to_owned(), (value, Instant::now() + ttl));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[tokio::test]
    async fn test_get_set_roundtrip() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);

        assert_eq!(cache.get("a").await.unwrap(), None);

        cache.set("a", "first".to_owned(), ttl).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("first"));

        cache.set("a", "second".to_owned(), ttl).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_expired_entries_are_dropped() {
        let cache = MemoryCache::new();

        cache
            .set("a", "value".to_owned(), Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(cache.get("a").await.unwrap(), None);
        assert!(cache.lock().is_empty());
    }
}
