use crate::core::cache::{KeyValueCollection, MergeFn};
use anyhow::Result;
use async_trait::async_trait;
use fjall::PartitionHandle;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tracing::debug;

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<SystemTime>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| SystemTime::now() > expires_at)
    }
}

/// Persistent collection stored in a fjall partition.
pub struct DiskCollection {
    partition: PartitionHandle,
    // Serialises merges so a read-modify-write is never interleaved with another writer.
    write_lock: Mutex<()>,
}

impl DiskCollection {
    pub fn new(partition: PartitionHandle) -> Self {
        Self {
            partition,
            write_lock: Mutex::new(()),
        }
    }

    fn read_entry(&self, key: &[u8]) -> Result<Option<CacheEntry>> {
        match self.partition.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn write_entry(&self, key: &[u8], entry: &CacheEntry) -> Result<()> {
        self.partition.insert(key, serde_json::to_vec(entry)?)?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let res: Result<Option<Vec<u8>>> = (|| {
            if let Some(entry) = self.read_entry(key)? {
                if entry.is_expired() {
                    debug!("Cache entry expired for key: {}", String::from_utf8_lossy(key));
                    self.partition.remove(key)?;
                    return Ok(None);
                }
                debug!("Cache HIT for key: {}", String::from_utf8_lossy(key));
                return Ok(Some(entry.value));
            }
            debug!("Cache MISS for key: {}", String::from_utf8_lossy(key));
            Ok(None)
        })();

        match res {
            Ok(val) => val,
            Err(e) => {
                debug!("DiskCollection get error: {}", e);
                None
            }
        }
    }

    async fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) {
        let entry = CacheEntry {
            value: value.to_vec(),
            expires_at: ttl.map(|d| SystemTime::now() + d),
        };
        match self.write_entry(key, &entry) {
            Ok(()) => debug!("Cache PUT for key: {}", String::from_utf8_lossy(key)),
            Err(e) => debug!("DiskCollection put error: {}", e),
        }
    }

    async fn merge(&self, key: &[u8], merge: MergeFn<'_>) -> Option<Vec<u8>> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let res: Result<Option<Vec<u8>>> = (|| {
            let current = self.read_entry(key)?.filter(|entry| !entry.is_expired());
            let Some(value) = merge(current.as_ref().map(|entry| entry.value.as_slice())) else {
                return Ok(None);
            };
            let entry = CacheEntry {
                value,
                expires_at: None,
            };
            self.write_entry(key, &entry)?;
            debug!("Cache MERGE for key: {}", String::from_utf8_lossy(key));
            Ok(Some(entry.value))
        })();

        match res {
            Ok(val) => val,
            Err(e) => {
                debug!("DiskCollection merge error: {}", e);
                None
            }
        }
    }

    async fn remove(&self, key: &[u8]) {
        if let Err(e) = self.partition.remove(key) {
            debug!("DiskCollection remove error: {}", e);
        }
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut entries = Vec::new();
        for item in self.partition.prefix(prefix) {
            let decoded: Result<(Vec<u8>, CacheEntry)> = item
                .map_err(anyhow::Error::from)
                .and_then(|(key, raw)| Ok((key.to_vec(), serde_json::from_slice(&raw)?)));
            match decoded {
                Ok((key, entry)) if !entry.is_expired() => entries.push((key, entry.value)),
                Ok(_) => {}
                Err(e) => debug!("DiskCollection scan error: {}", e),
            }
        }
        entries
    }
}
