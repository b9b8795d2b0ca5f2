//! Value types shared by the ledger, the resolver and the aggregator.

use crate::core::price::PriceMetadata;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Vehicle family as understood by the FIPE table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetCategory {
    Cars,
    Motorcycles,
    Trucks,
}

impl AssetCategory {
    pub fn as_path(&self) -> &'static str {
        match self {
            AssetCategory::Cars => "cars",
            AssetCategory::Motorcycles => "motorcycles",
            AssetCategory::Trucks => "trucks",
        }
    }
}

impl Display for AssetCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_path())
    }
}

impl FromStr for AssetCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cars" | "carros" => Ok(AssetCategory::Cars),
            "motorcycles" | "motos" => Ok(AssetCategory::Motorcycles),
            "trucks" | "caminhoes" => Ok(AssetCategory::Trucks),
            _ => Err(anyhow::anyhow!("Invalid asset category: {}", s)),
        }
    }
}

/// Composite key used to look up and cache a reference price.
///
/// `fuel_code` is optional on input. Use [`PriceLookupKey::normalized`] before
/// touching the cache or the price source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceLookupKey {
    pub category: AssetCategory,
    /// FIPE brand code.
    pub asset_class_code: String,
    pub model_code: String,
    pub year_series_id: String,
    #[serde(default)]
    pub fuel_code: Option<String>,
}

impl PriceLookupKey {
    pub fn new(
        category: AssetCategory,
        asset_class_code: &str,
        model_code: &str,
        year_series_id: &str,
        fuel_code: Option<&str>,
    ) -> Self {
        Self {
            category,
            asset_class_code: asset_class_code.to_string(),
            model_code: model_code.to_string(),
            year_series_id: year_series_id.to_string(),
            fuel_code: fuel_code.map(str::to_string),
        }
    }

    /// Resolves the fuel code, substituting `default_fuel_code` when it is
    /// missing or blank.
    pub fn normalized(&self, default_fuel_code: &str) -> NormalizedKey {
        let fuel_code = self
            .fuel_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .unwrap_or(default_fuel_code)
            .to_string();

        NormalizedKey {
            category: self.category,
            asset_class_code: self.asset_class_code.trim().to_string(),
            model_code: self.model_code.trim().to_string(),
            year_series_id: self.year_series_id.trim().to_string(),
            fuel_code,
        }
    }
}

/// A [`PriceLookupKey`] whose fuel code has been resolved. The cache and the
/// price source only accept this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedKey {
    pub category: AssetCategory,
    pub asset_class_code: String,
    pub model_code: String,
    pub year_series_id: String,
    pub fuel_code: String,
}

impl NormalizedKey {
    /// Storage key, laid out so that every key of a vehicle family shares the
    /// prefix returned by [`NormalizedKey::family_prefix`].
    pub fn storage_key(&self) -> String {
        format!(
            "{}{}|{}",
            Self::family_prefix(self.category, &self.asset_class_code, &self.model_code),
            self.year_series_id,
            self.fuel_code
        )
    }

    pub fn family_prefix(category: AssetCategory, asset_class_code: &str, model_code: &str) -> String {
        format!("{category}|{asset_class_code}|{model_code}|")
    }

    /// Year segment as the FIPE API expects it, e.g. `2014-1`.
    pub fn year_path(&self) -> String {
        format!("{}-{}", self.year_series_id, self.fuel_code)
    }
}

impl Display for NormalizedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.category,
            self.asset_class_code,
            self.model_code,
            self.year_path()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub key: PriceLookupKey,
    #[serde(default)]
    pub collective: bool,
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub display_year: Option<u16>,
}

impl Asset {
    pub fn new(id: &str, key: PriceLookupKey, collective: bool) -> Self {
        Self {
            id: id.to_string(),
            key,
            collective,
            brand_name: None,
            model_name: None,
            display_year: None,
        }
    }

    /// Copies the display fields present in `metadata`.
    pub fn enrich(&mut self, metadata: &PriceMetadata) {
        if metadata.brand_name.is_some() {
            self.brand_name.clone_from(&metadata.brand_name);
        }
        if metadata.model_name.is_some() {
            self.model_name.clone_from(&metadata.model_name);
        }
        if metadata.model_year.is_some() {
            self.display_year = metadata.model_year;
        }
    }

    /// Human readable label, falling back to the asset id until the display
    /// fields have been enriched.
    pub fn label(&self) -> String {
        match (&self.brand_name, &self.model_name) {
            (Some(brand), Some(model)) => match self.display_year {
                Some(year) => format!("{brand} {model} ({year})"),
                None => format!("{brand} {model}"),
            },
            _ => self.id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Member of the equal-distribution group.
    Partner,
    /// Independent holder with explicit shares only.
    Investor,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Role::Partner => "partner",
                Role::Investor => "investor",
            }
        )
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "partner" => Ok(Role::Partner),
            "investor" => Ok(Role::Investor),
            _ => Err(anyhow::anyhow!("Invalid role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stakeholder {
    pub id: String,
    pub name: String,
    pub role: Role,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Stakeholder {
    pub fn new(id: &str, name: &str, role: Role) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            role,
            active: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipShare {
    pub asset_id: String,
    pub stakeholder_id: String,
    pub percentage: Decimal,
}
