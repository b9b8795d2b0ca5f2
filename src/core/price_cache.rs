//! Persistent price cache keyed by [`NormalizedKey`].

use crate::core::cache::KeyValueCollection;
use crate::core::model::{AssetCategory, NormalizedKey};
use crate::core::price::{CachedPrice, PriceMetadata};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

pub const PRICE_COLLECTION: &str = "fipe_prices";

pub struct PriceCacheStore {
    collection: Arc<dyn KeyValueCollection>,
}

impl PriceCacheStore {
    pub fn new(collection: Arc<dyn KeyValueCollection>) -> Self {
        Self { collection }
    }

    pub async fn get(&self, key: &NormalizedKey) -> Option<CachedPrice> {
        let raw = self.collection.get(key.storage_key().as_bytes()).await?;
        decode(&raw)
    }

    /// Inserts or overwrites the entry for `key`.
    ///
    /// The merge runs atomically inside the collection: an existing entry keeps
    /// its `created_at` and gets a fresh `updated_at`.
    pub async fn upsert(
        &self,
        key: &NormalizedKey,
        price: Decimal,
        metadata: PriceMetadata,
    ) -> Option<CachedPrice> {
        let storage_key = key.storage_key();
        let merge = |current: Option<&[u8]>| {
            let now = Utc::now();
            let created_at = current
                .and_then(decode)
                .map_or(now, |existing| existing.created_at);
            let entry = CachedPrice {
                key: key.clone(),
                price,
                metadata: metadata.clone(),
                created_at,
                updated_at: now,
            };
            serde_json::to_vec(&entry)
                .inspect_err(|e| warn!("Failed to encode price for {}: {}", key, e))
                .ok()
        };

        let written = self.collection.merge(storage_key.as_bytes(), &merge).await?;
        debug!("Upserted price {} for {}", price, key);
        decode(&written)
    }

    pub async fn remove(&self, key: &NormalizedKey) {
        self.collection.remove(key.storage_key().as_bytes()).await;
    }

    /// Most recently updated entry of the same category, brand and model,
    /// whatever the year or fuel.
    pub async fn find_most_recent_for_family(
        &self,
        category: AssetCategory,
        asset_class_code: &str,
        model_code: &str,
    ) -> Option<CachedPrice> {
        let prefix = NormalizedKey::family_prefix(category, asset_class_code, model_code);
        self.collection
            .scan_prefix(prefix.as_bytes())
            .await
            .iter()
            .filter_map(|(_, raw)| decode(raw))
            .max_by_key(|entry| entry.updated_at)
    }

    /// Every cached price, ordered by storage key.
    pub async fn entries(&self) -> Vec<CachedPrice> {
        self.collection
            .scan_prefix(b"")
            .await
            .iter()
            .filter_map(|(_, raw)| decode(raw))
            .collect()
    }
}

fn decode(raw: &[u8]) -> Option<CachedPrice> {
    serde_json::from_slice(raw)
        .inspect_err(|e| warn!("Discarding unreadable cache entry: {}", e))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::PriceLookupKey;
    use crate::store::memory::MemoryCollection;
    use futures::future::join_all;
    use rust_decimal_macros::dec;

    fn store() -> PriceCacheStore {
        PriceCacheStore::new(Arc::new(MemoryCollection::new()))
    }

    fn key(model: &str, year: &str) -> NormalizedKey {
        PriceLookupKey::new(AssetCategory::Cars, "25", model, year, None).normalized("1")
    }

    fn metadata(model_name: &str) -> PriceMetadata {
        PriceMetadata {
            brand_name: Some("Honda".to_string()),
            model_name: Some(model_name.to_string()),
            fuel_name: Some("Gasolina".to_string()),
            model_year: Some(2014),
            reference_month: Some("janeiro de 2025".to_string()),
        }
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        assert!(store().get(&key("5940", "2014")).await.is_none());
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = store();
        let key = key("5940", "2014");

        let first = store
            .upsert(&key, dec!(43807.00), metadata("Civic"))
            .await
            .unwrap();
        let second = store
            .upsert(&key, dec!(43807.00), metadata("Civic"))
            .await
            .unwrap();

        assert_eq!(store.entries().await.len(), 1);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(store.get(&key).await.unwrap().price, dec!(43807.00));
    }

    #[tokio::test]
    async fn test_upsert_overwrites_price_and_metadata() {
        let store = store();
        let key = key("5940", "2014");

        store.upsert(&key, dec!(40000), metadata("Civic")).await;
        store.upsert(&key, dec!(41000), metadata("Civic LXS")).await;

        let entry = store.get(&key).await.unwrap();
        assert_eq!(entry.price, dec!(41000));
        assert_eq!(entry.metadata.model_name.as_deref(), Some("Civic LXS"));
    }

    #[tokio::test]
    async fn test_concurrent_upserts_keep_one_entry() {
        let store = store();
        let key = key("5940", "2014");

        let writes = (0..20).map(|i| store.upsert(&key, Decimal::from(40000 + i), metadata("Civic")));
        join_all(writes).await;

        assert_eq!(store.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_find_most_recent_for_family() {
        let store = store();
        store.upsert(&key("5940", "2013"), dec!(39000), metadata("Civic")).await;
        store.upsert(&key("5940", "2015"), dec!(47000), metadata("Civic")).await;
        store.upsert(&key("5941", "2016"), dec!(52000), metadata("Fit")).await;

        let stale = store
            .find_most_recent_for_family(AssetCategory::Cars, "25", "5940")
            .await
            .unwrap();
        assert_eq!(stale.key.year_series_id, "2015");
        assert_eq!(stale.price, dec!(47000));

        assert!(
            store
                .find_most_recent_for_family(AssetCategory::Motorcycles, "25", "5940")
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_remove() {
        let store = store();
        let key = key("5940", "2014");
        store.upsert(&key, dec!(40000), metadata("Civic")).await;
        store.remove(&key).await;
        assert!(store.get(&key).await.is_none());
    }
}
