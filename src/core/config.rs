use crate::core::ledger::Ledger;
use crate::core::model::{Asset, AssetCategory, PriceLookupKey, Stakeholder};
use crate::core::refresh::DEFAULT_MIN_DELAY;
use crate::core::resolver::{DEFAULT_FETCH_TIMEOUT, DEFAULT_FUEL_CODE};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_FIPE_BASE_URL: &str = "https://fipe.parallelum.com.br/api/v2";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FipeProviderConfig {
    pub base_url: String,
    /// FIPE reference table code; the latest table is used when absent.
    #[serde(default)]
    pub reference_period: Option<u32>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT.as_secs()
}

impl Default for FipeProviderConfig {
    fn default() -> Self {
        FipeProviderConfig {
            base_url: DEFAULT_FIPE_BASE_URL.to_string(),
            reference_period: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub fipe: FipeProviderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RefreshConfig {
    pub min_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            min_delay_ms: DEFAULT_MIN_DELAY.as_millis() as u64,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AssetConfig {
    pub id: String,
    pub category: AssetCategory,
    /// FIPE brand code
    pub brand: String,
    pub model: String,
    pub year: String,
    #[serde(default)]
    pub fuel: Option<String>,
    #[serde(default)]
    pub collective: bool,
}

impl AssetConfig {
    pub fn to_asset(&self) -> Asset {
        let key = PriceLookupKey::new(
            self.category,
            &self.brand,
            &self.model,
            &self.year,
            self.fuel.as_deref(),
        );
        Asset::new(&self.id, key, self.collective)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ShareConfig {
    pub asset: String,
    pub stakeholder: String,
    pub percentage: Decimal,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default = "default_fuel_code")]
    pub default_fuel_code: String,
    #[serde(default)]
    pub refresh: RefreshConfig,
    pub data_path: Option<String>,
    #[serde(default)]
    pub stakeholders: Vec<Stakeholder>,
    #[serde(default)]
    pub assets: Vec<AssetConfig>,
    #[serde(default)]
    pub shares: Vec<ShareConfig>,
}

fn default_fuel_code() -> String {
    DEFAULT_FUEL_CODE.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            providers: ProvidersConfig::default(),
            default_fuel_code: default_fuel_code(),
            refresh: RefreshConfig::default(),
            data_path: None,
            stakeholders: Vec::new(),
            assets: Vec::new(),
            shares: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("br", "fipeval", "fipeval")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("br", "fipeval", "fipeval")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config.apply_overrides(|name| std::env::var(name).ok());
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Applies `FIPEVAL_*` overrides. Values that fail to parse are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup("FIPEVAL_FIPE_BASE_URL") {
            self.providers.fipe.base_url = base_url;
        }
        if let Some(period) = parse_override(&lookup, "FIPEVAL_REFERENCE_PERIOD") {
            self.providers.fipe.reference_period = Some(period);
        }
        if let Some(timeout) = parse_override(&lookup, "FIPEVAL_FETCH_TIMEOUT_SECS") {
            self.providers.fipe.timeout_secs = timeout;
        }
        if let Some(fuel_code) = lookup("FIPEVAL_DEFAULT_FUEL_CODE")
            && !fuel_code.trim().is_empty()
        {
            self.default_fuel_code = fuel_code.trim().to_string();
        }
        if let Some(delay) = parse_override(&lookup, "FIPEVAL_REFRESH_DELAY_MS") {
            self.refresh.min_delay_ms = delay;
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.providers.fipe.timeout_secs)
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh.min_delay_ms)
    }

    /// Loads stakeholders, assets and explicit shares into `ledger`, in that
    /// order, through the ledger's checked operations.
    pub fn seed_ledger(&self, ledger: &Ledger) -> Result<()> {
        for stakeholder in &self.stakeholders {
            ledger
                .add_stakeholder(stakeholder.clone())
                .with_context(|| format!("Invalid stakeholder '{}'", stakeholder.id))?;
        }
        for asset in &self.assets {
            ledger
                .register_asset(asset.to_asset())
                .with_context(|| format!("Invalid asset '{}'", asset.id))?;
        }
        for share in &self.shares {
            ledger
                .add_share(&share.asset, &share.stakeholder, share.percentage)
                .with_context(|| {
                    format!(
                        "Invalid share of '{}' for '{}'",
                        share.asset, share.stakeholder
                    )
                })?;
        }
        debug!(
            "Seeded ledger with {} stakeholders, {} assets and {} shares",
            self.stakeholders.len(),
            self.assets.len(),
            self.shares.len()
        );
        Ok(())
    }
}

fn parse_override<F, T>(lookup: &F, name: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid value '{}' for {}", raw, name);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Role;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::io::Write;

    const YAML: &str = r#"
providers:
  fipe:
    base_url: "http://example.com/fipe"
    reference_period: 308
default_fuel_code: "3"
refresh:
  min_delay_ms: 200
stakeholders:
  - id: ana
    name: "Ana"
    role: partner
  - id: bruno
    name: "Bruno"
    role: partner
  - id: carla
    name: "Carla"
    role: investor
    active: false
assets:
  - id: civic
    category: cars
    brand: "25"
    model: "5940"
    year: "2014"
    collective: true
  - id: cg160
    category: motorcycles
    brand: "80"
    model: "7511"
    year: "2020"
    fuel: "1"
shares:
  - asset: cg160
    stakeholder: carla
    percentage: 60
  - asset: cg160
    stakeholder: ana
    percentage: 12.5
"#;

    #[test]
    fn test_config_deserialization() {
        let config: AppConfig = serde_yaml::from_str(YAML).expect("Failed to deserialize");

        assert_eq!(config.providers.fipe.base_url, "http://example.com/fipe");
        assert_eq!(config.providers.fipe.reference_period, Some(308));
        assert_eq!(config.fetch_timeout(), DEFAULT_FETCH_TIMEOUT);
        assert_eq!(config.default_fuel_code, "3");
        assert_eq!(config.refresh_delay(), Duration::from_millis(200));
        assert_eq!(config.stakeholders.len(), 3);
        assert!(config.stakeholders[0].active);
        assert!(!config.stakeholders[2].active);
        assert_eq!(config.stakeholders[2].role, Role::Investor);
        assert_eq!(config.assets[0].category, AssetCategory::Cars);
        assert!(config.assets[0].fuel.is_none());
        assert!(config.assets[0].collective);
        assert_eq!(config.assets[1].category, AssetCategory::Motorcycles);
        assert_eq!(config.shares[1].percentage, dec!(12.5));
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("data_path: /tmp/fipeval\n").unwrap();

        assert_eq!(config.providers.fipe, FipeProviderConfig::default());
        assert_eq!(config.default_fuel_code, DEFAULT_FUEL_CODE);
        assert_eq!(config.refresh_delay(), DEFAULT_MIN_DELAY);
        assert_eq!(
            config.default_data_path().unwrap(),
            PathBuf::from("/tmp/fipeval")
        );
        assert!(config.stakeholders.is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        let vars: HashMap<&str, &str> = HashMap::from([
            ("FIPEVAL_FIPE_BASE_URL", "http://localhost:9000"),
            ("FIPEVAL_REFERENCE_PERIOD", "310"),
            ("FIPEVAL_DEFAULT_FUEL_CODE", " 2 "),
            ("FIPEVAL_REFRESH_DELAY_MS", "not-a-number"),
            ("FIPEVAL_FETCH_TIMEOUT_SECS", "3"),
        ]);

        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.providers.fipe.base_url, "http://localhost:9000");
        assert_eq!(config.providers.fipe.reference_period, Some(310));
        assert_eq!(config.default_fuel_code, "2");
        assert_eq!(config.refresh_delay(), DEFAULT_MIN_DELAY);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.assets.len(), 2);

        assert!(AppConfig::load_from_path(file.path().with_extension("missing")).is_err());
    }

    #[test]
    fn test_seed_ledger() {
        let config: AppConfig = serde_yaml::from_str(YAML).unwrap();
        let ledger = Ledger::new();

        config.seed_ledger(&ledger).unwrap();

        assert_eq!(ledger.stakeholders().len(), 3);
        assert_eq!(ledger.assets().len(), 2);
        assert_eq!(ledger.allocated_percentage("civic"), dec!(100));
        assert_eq!(ledger.shares_for_asset("civic").len(), 2);
        assert_eq!(ledger.allocated_percentage("cg160"), dec!(72.5));
    }

    #[test]
    fn test_seed_ledger_rejects_overflow() {
        let mut config: AppConfig = serde_yaml::from_str(YAML).unwrap();
        config.shares.push(ShareConfig {
            asset: "cg160".to_string(),
            stakeholder: "bruno".to_string(),
            percentage: dec!(30),
        });

        let err = config.seed_ledger(&Ledger::new()).unwrap_err();
        assert!(err.to_string().contains("cg160"));
    }
}
