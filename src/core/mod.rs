//! Valuation engine: cache, resolver, ledger, aggregator and refresh.

pub mod cache;
pub mod config;
pub mod error;
pub mod ledger;
pub mod log;
pub mod model;
pub mod patrimony;
pub mod price;
pub mod price_cache;
pub mod refresh;
pub mod resolver;

// Re-export main types for cleaner imports
pub use error::{ValuationError, ValuationResult};
pub use ledger::Ledger;
pub use model::{Asset, AssetCategory, OwnershipShare, PriceLookupKey, Role, Stakeholder};
pub use patrimony::PatrimonyAggregator;
pub use price::{CatalogSource, PriceSource, Resolution, ResolutionSource};
pub use price_cache::PriceCacheStore;
pub use refresh::RefreshScheduler;
pub use resolver::PriceResolver;
