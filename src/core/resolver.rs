//! Tiered price resolution: cache, live source, stale family price, unpriced.

use crate::core::error::ValuationError;
use crate::core::model::{NormalizedKey, PriceLookupKey};
use crate::core::price::{PriceSource, Resolution, ResolutionSource};
use crate::core::price_cache::PriceCacheStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_FUEL_CODE: &str = "1";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct PriceResolver {
    cache: Arc<PriceCacheStore>,
    source: Arc<dyn PriceSource>,
    default_fuel_code: String,
    fetch_timeout: Duration,
}

impl PriceResolver {
    pub fn new(cache: Arc<PriceCacheStore>, source: Arc<dyn PriceSource>) -> Self {
        Self {
            cache,
            source,
            default_fuel_code: DEFAULT_FUEL_CODE.to_string(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_default_fuel_code(mut self, fuel_code: &str) -> Self {
        self.default_fuel_code = fuel_code.to_string();
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn normalize(&self, key: &PriceLookupKey) -> NormalizedKey {
        key.normalized(&self.default_fuel_code)
    }

    /// Resolves a price, trying the cache first.
    pub async fn resolve(&self, key: &PriceLookupKey) -> Resolution {
        let key = self.normalize(key);
        if let Some(resolution) = self.from_cache(&key).await {
            return resolution;
        }
        self.resolve_uncached(key).await
    }

    /// Resolves a price while ignoring any exact cache entry, so the live
    /// source is always consulted first.
    pub async fn resolve_fresh(&self, key: &PriceLookupKey) -> Resolution {
        self.resolve_uncached(self.normalize(key)).await
    }

    async fn resolve_uncached(&self, key: NormalizedKey) -> Resolution {
        if let Some(resolution) = self.from_live(&key).await {
            return resolution;
        }
        if let Some(resolution) = self.from_stale(&key).await {
            return resolution;
        }
        warn!("No price available for {}", key);
        Resolution::unpriced(key)
    }

    pub async fn from_cache(&self, key: &NormalizedKey) -> Option<Resolution> {
        let entry = self.cache.get(key).await?;
        debug!("Resolved {} from cache", key);
        Some(Resolution::from_entry(entry, ResolutionSource::Cached))
    }

    pub async fn from_live(&self, key: &NormalizedKey) -> Option<Resolution> {
        let fetched = tokio::time::timeout(self.fetch_timeout, self.source.fetch_price(key))
            .await
            .unwrap_or_else(|_| {
                Err(ValuationError::ExternalUnavailable(format!(
                    "timed out after {:?}",
                    self.fetch_timeout
                )))
            });

        let quote = match fetched {
            Ok(quote) => quote,
            Err(ValuationError::MalformedPriceData(reason)) => {
                warn!(key = %key, %reason, "Price source returned malformed data");
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Live price lookup failed");
                return None;
            }
        };

        info!("Fetched live price {} for {}", quote.price, key);
        let resolution = Resolution {
            key: key.clone(),
            price: quote.price,
            source: ResolutionSource::Live,
            metadata: quote.metadata.clone(),
        };
        if self
            .cache
            .upsert(key, quote.price, quote.metadata)
            .await
            .is_none()
        {
            warn!("Failed to cache live price for {}", key);
        }
        Some(resolution)
    }

    pub async fn from_stale(&self, key: &NormalizedKey) -> Option<Resolution> {
        let entry = self
            .cache
            .find_most_recent_for_family(key.category, &key.asset_class_code, &key.model_code)
            .await?;
        warn!(
            "Using stale price for {} from {} (updated {})",
            key, entry.key, entry.updated_at
        );
        Some(Resolution {
            key: key.clone(),
            ..Resolution::from_entry(entry, ResolutionSource::Stale)
        })
    }
}
