//! Key-value collection abstractions backing the price cache.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Computes the new value of a key from its current value. Returning `None`
/// leaves the key untouched.
pub type MergeFn<'a> = &'a (dyn Fn(Option<&[u8]>) -> Option<Vec<u8>> + Send + Sync);

/// A named, byte-oriented key-value collection.
#[async_trait]
pub trait KeyValueCollection: Send + Sync {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    async fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>);

    /// Atomically replaces the value of `key` with the output of `merge`.
    ///
    /// Concurrent merges on the same collection are serialised, so the merge
    /// always sees the latest committed value. Returns the value written.
    async fn merge(&self, key: &[u8], merge: MergeFn<'_>) -> Option<Vec<u8>>;

    async fn remove(&self, key: &[u8]);

    /// Live entries whose key starts with `prefix`, in key order.
    async fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)>;
}

/// A store that hands out named collections.
pub trait Store: Send + Sync {
    /// Returns the collection `name`. Persistent collections survive restarts;
    /// `None` means the collection does not exist and was not created.
    fn get_collection(
        &self,
        name: &str,
        persist: bool,
        create_if_missing: bool,
    ) -> Option<Arc<dyn KeyValueCollection>>;
}
