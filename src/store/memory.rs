use crate::core::cache::{KeyValueCollection, MergeFn};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

struct CacheValue {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheValue {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expiry| expiry < Instant::now())
    }
}

/// In-memory collection using an ordered map behind a mutex
pub struct MemoryCollection {
    inner: Mutex<BTreeMap<Vec<u8>, CacheValue>>,
}

impl MemoryCollection {
    /// Creates an empty MemoryCollection
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryCollection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueCollection for MemoryCollection {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let mut cache = self.inner.lock().await;
        if let Some(entry) = cache.get(key) {
            if entry.is_expired() {
                debug!("Cache entry expired for key: {}", String::from_utf8_lossy(key));
                cache.remove(key);
                return None;
            }
            debug!("Cache HIT for key: {}", String::from_utf8_lossy(key));
            return Some(entry.value.clone());
        }
        debug!("Cache MISS for key: {}", String::from_utf8_lossy(key));
        None
    }

    async fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) {
        let expires_at = ttl.map(|duration| Instant::now() + duration);
        let cache_value = CacheValue {
            value: value.to_vec(),
            expires_at,
        };

        let mut cache = self.inner.lock().await;
        debug!("Cache PUT for key: {}", String::from_utf8_lossy(key));
        cache.insert(key.to_vec(), cache_value);
    }

    async fn merge(&self, key: &[u8], merge: MergeFn<'_>) -> Option<Vec<u8>> {
        let mut cache = self.inner.lock().await;
        let current = cache
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.as_slice());

        let merged = merge(current)?;
        debug!("Cache MERGE for key: {}", String::from_utf8_lossy(key));
        cache.insert(
            key.to_vec(),
            CacheValue {
                value: merged.clone(),
                expires_at: None,
            },
        );
        Some(merged)
    }

    async fn remove(&self, key: &[u8]) {
        let mut cache = self.inner.lock().await;
        cache.remove(key);
        debug!("Cache REMOVE for key: {}", String::from_utf8_lossy(key));
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let cache = self.inner.lock().await;
        cache
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_cache_get_put() {
        let cache = MemoryCollection::new();

        // Initially, cache is empty
        assert!(cache.get(b"key1").await.is_none());

        cache.put(b"key1", b"123", None).await;

        assert_eq!(cache.get(b"key1").await, Some(b"123".to_vec()));
        assert!(cache.get(b"key2").await.is_none());
    }

    #[tokio::test]
    async fn test_cache_ttl_expiration() {
        let cache = MemoryCollection::new();

        // Put value with 10ms TTL
        cache
            .put(b"key1", b"123", Some(Duration::from_millis(10)))
            .await;
        assert_eq!(cache.get(b"key1").await, Some(b"123".to_vec()));

        // Wait for TTL expiration
        sleep(Duration::from_millis(20)).await;
        assert!(cache.get(b"key1").await.is_none());
    }

    #[tokio::test]
    async fn test_cache_remove() {
        let cache = MemoryCollection::new();

        cache.put(b"key1", b"123", None).await;
        cache.remove(b"key1").await;
        assert!(cache.get(b"key1").await.is_none());
    }

    #[tokio::test]
    async fn test_merge_sees_current_value() {
        let cache = MemoryCollection::new();

        let append = |current: Option<&[u8]>| {
            let mut value = current.map(<[u8]>::to_vec).unwrap_or_default();
            value.push(b'x');
            Some(value)
        };
        cache.merge(b"key1", &append).await;
        let written = cache.merge(b"key1", &append).await;

        assert_eq!(written, Some(b"xx".to_vec()));
        assert_eq!(cache.get(b"key1").await, Some(b"xx".to_vec()));

        // A merge that declines leaves the value untouched
        assert!(cache.merge(b"key1", &|_| None).await.is_none());
        assert_eq!(cache.get(b"key1").await, Some(b"xx".to_vec()));
    }

    #[tokio::test]
    async fn test_scan_prefix() {
        let cache = MemoryCollection::new();
        cache.put(b"cars|1|10|2014|1", b"a", None).await;
        cache.put(b"cars|1|10|2015|1", b"b", None).await;
        cache.put(b"cars|1|11|2015|1", b"c", None).await;
        cache.put(b"trucks|1|10|2015|1", b"d", None).await;

        let family = cache.scan_prefix(b"cars|1|10|").await;
        let values: Vec<_> = family.into_iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec![b"a".to_vec(), b"b".to_vec()]);
    }
}
