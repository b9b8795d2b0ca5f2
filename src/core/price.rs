//! Pricing abstractions and core types

use crate::core::error::{ValuationError, ValuationResult};
use crate::core::model::{AssetCategory, NormalizedKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Which tier of the fallback chain produced a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionSource {
    Cached,
    Live,
    Stale,
    None,
}

impl ResolutionSource {
    /// `false` only for the unpriced tier, whose zero must never be reported
    /// as a real valuation.
    pub fn is_priced(&self) -> bool {
        !matches!(self, ResolutionSource::None)
    }
}

impl Display for ResolutionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ResolutionSource::Cached => "cached",
                ResolutionSource::Live => "live",
                ResolutionSource::Stale => "stale",
                ResolutionSource::None => "none",
            }
        )
    }
}

/// Display metadata that travels with a price.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceMetadata {
    pub brand_name: Option<String>,
    pub model_name: Option<String>,
    pub fuel_name: Option<String>,
    pub model_year: Option<u16>,
    pub reference_month: Option<String>,
}

/// A price as stored in the price cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPrice {
    pub key: NormalizedKey,
    pub price: Decimal,
    #[serde(flatten)]
    pub metadata: PriceMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A price freshly returned by the price source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    pub price: Decimal,
    pub metadata: PriceMetadata,
}

/// Outcome of resolving a lookup key through the fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub key: NormalizedKey,
    pub price: Decimal,
    pub source: ResolutionSource,
    pub metadata: PriceMetadata,
}

impl Resolution {
    pub fn from_entry(entry: CachedPrice, source: ResolutionSource) -> Self {
        Self {
            key: entry.key,
            price: entry.price,
            source,
            metadata: entry.metadata,
        }
    }

    pub fn unpriced(key: NormalizedKey) -> Self {
        Self {
            key,
            price: Decimal::ZERO,
            source: ResolutionSource::None,
            metadata: PriceMetadata::default(),
        }
    }

    /// Price usable in totals; `None` for unpriced resolutions.
    pub fn priced_value(&self) -> Option<Decimal> {
        self.source.is_priced().then_some(self.price)
    }
}

/// External reference-price service. Only the "value for year" lookup is on
/// the resolver path.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_price(&self, key: &NormalizedKey) -> ValuationResult<PriceQuote>;
}

/// One entry of a FIPE catalog listing (brand, model or year).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub code: String,
    pub name: String,
}

/// Catalog lookups used to find the codes that make up a lookup key.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn brands(&self, category: AssetCategory) -> anyhow::Result<Vec<CatalogItem>>;

    async fn models(&self, category: AssetCategory, brand: &str)
    -> anyhow::Result<Vec<CatalogItem>>;

    async fn years(
        &self,
        category: AssetCategory,
        brand: &str,
        model: &str,
    ) -> anyhow::Result<Vec<CatalogItem>>;
}

/// Parses a BRL formatted amount such as `R$ 43.807,00` or `45.000,00`.
///
/// Accepts an optional `R$` prefix, `.` as thousands separator (groups of
/// three digits) and `,` followed by exactly two decimals. Anything else is
/// rejected.
pub fn parse_brl_price(raw: &str) -> ValuationResult<Decimal> {
    let malformed = || ValuationError::MalformedPriceData(format!("unrecognised price '{raw}'"));

    let amount = raw.trim();
    let amount = amount.strip_prefix("R$").unwrap_or(amount).trim();
    if amount.is_empty() {
        return Err(malformed());
    }

    let (integer_part, fraction_part) = match amount.split_once(',') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (amount, None),
    };

    let groups: Vec<&str> = integer_part.split('.').collect();
    let well_grouped = groups.iter().enumerate().all(|(i, group)| {
        let digits_only = !group.is_empty() && group.bytes().all(|b| b.is_ascii_digit());
        let sized = if i == 0 {
            group.len() <= 3 || groups.len() == 1
        } else {
            group.len() == 3
        };
        digits_only && sized
    });
    if !well_grouped {
        return Err(malformed());
    }

    let mut normalized = groups.concat();
    if let Some(fraction) = fraction_part {
        if fraction.len() != 2 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        normalized.push('.');
        normalized.push_str(fraction);
    }

    normalized.parse::<Decimal>().map_err(|_| malformed())
}
