//! Sequential, throttled refresh of every asset price.
use crate::core::ledger::Ledger;
use crate::core::price::{Resolution, ResolutionSource};
use crate::core::resolver::PriceResolver;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(1500);

/// Result of refreshing one asset.
///
/// A failed live lookup never removes the cached entry. When the outcome is
/// `Stale` because the exact key was already cached, a later
/// [`PriceResolver::resolve`] still serves that old entry tagged `cached`;
/// its `updated_at` is the only sign of its age.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    pub asset_id: String,
    pub price: Decimal,
    pub source: ResolutionSource,
    pub updated: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshSummary {
    pub updated: usize,
    pub failed: usize,
    pub outcomes: Vec<RefreshOutcome>,
}

pub struct RefreshScheduler {
    ledger: Arc<Ledger>,
    resolver: Arc<PriceResolver>,
    min_delay: Duration,
}

impl RefreshScheduler {
    pub fn new(ledger: Arc<Ledger>, resolver: Arc<PriceResolver>, min_delay: Duration) -> Self {
        Self {
            ledger,
            resolver,
            min_delay,
        }
    }

    /// Re-resolves every asset against the live source, one at a time, waiting
    /// `min_delay` between assets. Failures are counted, never raised.
    pub async fn refresh_all(&self, on_progress: &(dyn Fn(&RefreshOutcome) + Send + Sync)) -> RefreshSummary {
        let assets = self.ledger.assets();
        info!(
            "Refreshing {} assets with {:?} between lookups",
            assets.len(),
            self.min_delay
        );

        let mut summary = RefreshSummary::default();
        for (i, asset) in assets.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.min_delay).await;
            }

            let resolution = self.resolver.resolve_fresh(&asset.key).await;
            let outcome = self.record(&asset.id, &resolution);
            if outcome.updated {
                summary.updated += 1;
            } else {
                summary.failed += 1;
                warn!(
                    "Refresh failed for {} ({}), no price available",
                    asset.id, resolution.key
                );
            }
            on_progress(&outcome);
            summary.outcomes.push(outcome);
        }

        info!(
            "Refresh finished: {} updated, {} failed",
            summary.updated, summary.failed
        );
        summary
    }

    fn record(&self, asset_id: &str, resolution: &Resolution) -> RefreshOutcome {
        let updated = matches!(
            resolution.source,
            ResolutionSource::Live | ResolutionSource::Stale
        ) && !resolution.price.is_zero();

        if resolution.source == ResolutionSource::Live
            && let Err(e) = self.ledger.enrich_asset(asset_id, &resolution.metadata)
        {
            debug!("Could not enrich asset {}: {}", asset_id, e);
        }

        RefreshOutcome {
            asset_id: asset_id.to_string(),
            price: resolution.price,
            source: resolution.source,
            updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ValuationError;
    use crate::core::model::{Asset, AssetCategory, PriceLookupKey};
    use crate::core::price::PriceMetadata;
    use crate::core::price_cache::PriceCacheStore;
    use crate::core::resolver::tests::MockPriceSource;
    use crate::store::memory::MemoryCollection;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use tokio::time::Instant;

    struct Fixture {
        ledger: Arc<Ledger>,
        cache: Arc<PriceCacheStore>,
        source: Arc<MockPriceSource>,
        resolver: Arc<PriceResolver>,
    }

    impl Fixture {
        fn new() -> Self {
            let cache = Arc::new(PriceCacheStore::new(Arc::new(MemoryCollection::new())));
            let source = Arc::new(MockPriceSource::new());
            let resolver = Arc::new(PriceResolver::new(Arc::clone(&cache), source.clone()));
            Self {
                ledger: Arc::new(Ledger::new()),
                cache,
                source,
                resolver,
            }
        }

        fn scheduler(&self, delay: Duration) -> RefreshScheduler {
            RefreshScheduler::new(Arc::clone(&self.ledger), Arc::clone(&self.resolver), delay)
        }

        fn asset(&self, id: &str, model: &str, year: &str) -> PriceLookupKey {
            let key = PriceLookupKey::new(AssetCategory::Cars, "25", model, year, None);
            self.ledger
                .register_asset(Asset::new(id, key.clone(), false))
                .unwrap();
            key
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_counts_live_stale_and_failures() {
        let f = Fixture::new();
        let live = f.asset("a", "1", "2020");
        let stale = f.asset("b", "2", "2020");
        f.asset("c", "3", "2020");

        f.source
            .set_price(&f.resolver.normalize(&live), dec!(50000), "One");
        f.source.set_error(
            &f.resolver.normalize(&stale),
            ValuationError::ExternalUnavailable("503".into()),
        );
        f.cache
            .upsert(
                &f.resolver.normalize(&PriceLookupKey::new(AssetCategory::Cars, "25", "2", "2019", None)),
                dec!(42000),
                PriceMetadata::default(),
            )
            .await;

        let summary = f.scheduler(Duration::from_millis(10)).refresh_all(&|_| {}).await;

        assert_eq!(summary.updated, 2);
        assert_eq!(summary.failed, 1);
        let sources: Vec<_> = summary.outcomes.iter().map(|o| o.source).collect();
        assert_eq!(
            sources,
            vec![ResolutionSource::Live, ResolutionSource::Stale, ResolutionSource::None]
        );
        assert_eq!(summary.outcomes[1].price, dec!(42000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_bypasses_cached_prices() {
        let f = Fixture::new();
        let key = f.asset("a", "1", "2020");
        let normalized = f.resolver.normalize(&key);
        f.cache
            .upsert(&normalized, dec!(40000), PriceMetadata::default())
            .await;
        f.source.set_price(&normalized, dec!(41000), "One");

        let summary = f.scheduler(Duration::from_millis(10)).refresh_all(&|_| {}).await;

        assert_eq!(f.source.calls(), 1);
        assert_eq!(summary.outcomes[0].source, ResolutionSource::Live);
        assert_eq!(f.cache.get(&normalized).await.unwrap().price, dec!(41000));
        assert_eq!(f.ledger.asset("a").unwrap().model_name.as_deref(), Some("One"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_exact_entry_as_cached() {
        let f = Fixture::new();
        let key = f.asset("a", "1", "2020");
        let normalized = f.resolver.normalize(&key);
        f.cache
            .upsert(&normalized, dec!(40000), PriceMetadata::default())
            .await;
        let cached_at = f.cache.get(&normalized).await.unwrap().updated_at;
        f.source
            .set_error(&normalized, ValuationError::ExternalUnavailable("503".into()));

        let summary = f.scheduler(Duration::from_millis(10)).refresh_all(&|_| {}).await;

        assert_eq!(summary.outcomes[0].source, ResolutionSource::Stale);
        assert!(summary.outcomes[0].updated);
        assert_eq!(summary.outcomes[0].price, dec!(40000));

        let resolution = f.resolver.resolve(&key).await;
        assert_eq!(resolution.source, ResolutionSource::Cached);
        assert_eq!(resolution.price, dec!(40000));
        assert_eq!(f.cache.get(&normalized).await.unwrap().updated_at, cached_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_waits_between_assets() {
        let f = Fixture::new();
        for (id, model) in [("a", "1"), ("b", "2"), ("c", "3")] {
            let key = f.asset(id, model, "2020");
            f.source
                .set_price(&f.resolver.normalize(&key), dec!(1000), "Any");
        }

        let started = Instant::now();
        let summary = f.scheduler(Duration::from_secs(2)).refresh_all(&|_| {}).await;

        assert_eq!(summary.updated, 3);
        assert!(started.elapsed() >= Duration::from_secs(4));
        assert!(started.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_reports_progress_per_asset() {
        let f = Fixture::new();
        f.asset("a", "1", "2020");
        f.asset("b", "2", "2020");

        let seen = Mutex::new(Vec::new());
        let summary = f
            .scheduler(Duration::from_millis(10))
            .refresh_all(&|outcome| seen.lock().unwrap().push(outcome.asset_id.clone()))
            .await;

        assert_eq!(summary.failed, 2);
        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_refresh_with_no_assets() {
        let f = Fixture::new();
        let summary = f.scheduler(DEFAULT_MIN_DELAY).refresh_all(&|_| {}).await;
        assert_eq!(summary.updated, 0);
        assert_eq!(summary.failed, 0);
    }
}
