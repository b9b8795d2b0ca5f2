pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::cache::{KeyValueCollection, Store};
use crate::core::config::AppConfig;
use crate::core::model::{AssetCategory, Role};
use crate::core::price::{CatalogSource, PriceSource};
use crate::core::price_cache::PRICE_COLLECTION;
use crate::core::{Ledger, PatrimonyAggregator, PriceCacheStore, PriceResolver, RefreshScheduler};
use crate::providers::FipeProvider;
use crate::store::KeyValueStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

const CATALOG_COLLECTION: &str = "fipe_catalog";

pub enum AppCommand {
    Report,
    Stakeholder(String),
    Group(Role),
    Collective,
    Refresh,
    Cache,
    Catalog {
        category: AssetCategory,
        brand: Option<String>,
        model: Option<String>,
    },
}

/// The wired valuation engine.
pub struct Engine {
    pub store: Arc<KeyValueStore>,
    pub cache: Arc<PriceCacheStore>,
    pub ledger: Arc<Ledger>,
    pub resolver: Arc<PriceResolver>,
    pub aggregator: PatrimonyAggregator,
    pub scheduler: RefreshScheduler,
    pub catalog: Arc<dyn CatalogSource>,
}

impl Engine {
    /// Opens the on-disk store under the configured data path and builds the
    /// engine against the configured FIPE endpoint.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let data_path = config.default_data_path()?;
        debug!("Using data path {}", data_path.display());
        Self::with_store(config, Arc::new(KeyValueStore::open(&data_path)))
    }

    pub fn with_store(config: &AppConfig, store: Arc<KeyValueStore>) -> Result<Self> {
        let catalog_collection = store
            .get_collection(CATALOG_COLLECTION, false, true)
            .context("Failed to create catalog collection")?;
        let provider = Arc::new(
            FipeProvider::new(
                &config.providers.fipe.base_url,
                config.fetch_timeout(),
                catalog_collection,
            )?
            .with_reference_period(config.providers.fipe.reference_period),
        );

        let ledger = Arc::new(Ledger::new());
        config.seed_ledger(&ledger)?;

        Self::assemble(config, store, ledger, provider.clone(), provider)
    }

    /// Builds the engine around explicit collaborators.
    pub fn assemble(
        config: &AppConfig,
        store: Arc<KeyValueStore>,
        ledger: Arc<Ledger>,
        source: Arc<dyn PriceSource>,
        catalog: Arc<dyn CatalogSource>,
    ) -> Result<Self> {
        let cache = Arc::new(PriceCacheStore::new(price_collection(&store)?));
        let resolver = Arc::new(
            PriceResolver::new(Arc::clone(&cache), source)
                .with_default_fuel_code(&config.default_fuel_code)
                .with_fetch_timeout(config.fetch_timeout()),
        );
        let aggregator = PatrimonyAggregator::new(Arc::clone(&ledger), Arc::clone(&resolver));
        let scheduler = RefreshScheduler::new(
            Arc::clone(&ledger),
            Arc::clone(&resolver),
            config.refresh_delay(),
        );

        Ok(Self {
            store,
            cache,
            ledger,
            resolver,
            aggregator,
            scheduler,
            catalog,
        })
    }
}

fn price_collection(store: &KeyValueStore) -> Result<Arc<dyn KeyValueCollection>> {
    if let Some(collection) = store.get_collection(PRICE_COLLECTION, true, true) {
        return Ok(collection);
    }
    warn!("Persistent price cache unavailable, falling back to memory");
    store
        .get_collection(PRICE_COLLECTION, false, true)
        .context("Failed to create price collection")
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("fipeval starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let engine = Engine::from_config(&config)?;
    let result = match command {
        AppCommand::Report => cli::report::run_full(&engine).await,
        AppCommand::Stakeholder(id) => cli::report::run_stakeholder(&engine, &id).await,
        AppCommand::Group(role) => cli::report::run_group(&engine, role).await,
        AppCommand::Collective => cli::report::run_collective(&engine).await,
        AppCommand::Refresh => cli::refresh::run(&engine).await,
        AppCommand::Cache => cli::cache::run(&engine).await,
        AppCommand::Catalog {
            category,
            brand,
            model,
        } => cli::catalog::run(&engine, category, brand.as_deref(), model.as_deref()).await,
    };

    if let Err(e) = engine.store.flush() {
        warn!("Failed to flush price cache: {}", e);
    }
    result
}
