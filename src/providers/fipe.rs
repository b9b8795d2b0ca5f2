use super::util::with_retry;
use crate::core::cache::KeyValueCollection;
use crate::core::error::{ValuationError, ValuationResult};
use crate::core::model::{AssetCategory, NormalizedKey};
use crate::core::price::{
    CatalogItem, CatalogSource, PriceMetadata, PriceQuote, PriceSource, parse_brl_price,
};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

const CATALOG_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const RETRIES: usize = 2;
const RETRY_DELAY_MS: u64 = 500;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FipeValueResponse {
    brand: String,
    model: String,
    model_year: Option<u16>,
    fuel: Option<String>,
    #[serde(default)]
    code_fipe: Option<String>,
    price: String,
    reference_month: Option<String>,
}

/// Client for a FIPE table API (`/{category}/brands/...` layout).
pub struct FipeProvider {
    base_url: String,
    reference_period: Option<u32>,
    client: reqwest::Client,
    catalog_cache: Arc<dyn KeyValueCollection>,
}

impl FipeProvider {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        catalog_cache: Arc<dyn KeyValueCollection>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("fipeval/0.1")
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            reference_period: None,
            client,
            catalog_cache,
        })
    }

    /// Pins lookups to a FIPE reference table instead of the latest one.
    pub fn with_reference_period(mut self, reference_period: Option<u32>) -> Self {
        self.reference_period = reference_period;
        self
    }

    fn value_url(&self, key: &NormalizedKey) -> String {
        format!(
            "{}/{}/brands/{}/models/{}/years/{}",
            self.base_url,
            key.category.as_path(),
            key.asset_class_code,
            key.model_code,
            key.year_path()
        )
    }

    async fn get_text(&self, url: &str) -> std::result::Result<String, ValuationError> {
        let mut query = Vec::new();
        if let Some(period) = self.reference_period {
            query.push(("reference", period.to_string()));
        }
        let client = &self.client;
        let query = &query;

        let response = with_retry(
            || async move { client.get(url).query(query).send().await },
            RETRIES,
            RETRY_DELAY_MS,
        )
        .await
        .map_err(|e| ValuationError::ExternalUnavailable(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ValuationError::ExternalUnavailable(format!(
                "{url}: HTTP {status}"
            )));
        }

        response
            .text()
            .await
            .map_err(|e| ValuationError::ExternalUnavailable(format!("{url}: {e}")))
    }

    async fn fetch_catalog(&self, path: &str) -> Result<Vec<CatalogItem>> {
        if let Some(cached) = self.catalog_cache.get(path.as_bytes()).await
            && let Ok(items) = serde_json::from_slice(&cached)
        {
            return Ok(items);
        }

        let url = format!("{}/{}", self.base_url, path);
        debug!("Requesting catalog from {}", url);
        let body = self.get_text(&url).await?;
        let items: Vec<CatalogItem> = serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse catalog response from {url}"))?;

        self.catalog_cache
            .put(path.as_bytes(), &serde_json::to_vec(&items)?, Some(CATALOG_TTL))
            .await;
        Ok(items)
    }
}

#[async_trait]
impl PriceSource for FipeProvider {
    async fn fetch_price(&self, key: &NormalizedKey) -> ValuationResult<PriceQuote> {
        let url = self.value_url(key);
        debug!("Requesting price data from {}", url);

        let body = self.get_text(&url).await?;
        if body.trim().is_empty() {
            return Err(ValuationError::MalformedPriceData(format!(
                "empty response for {key}"
            )));
        }

        let value: FipeValueResponse = serde_json::from_str(&body).map_err(|e| {
            error!(error = ?e, response = %body, "Failed to parse FIPE response");
            ValuationError::MalformedPriceData(format!("{key}: {e}"))
        })?;
        let price = parse_brl_price(&value.price)?;

        debug!(
            "Fetched {} for {} (FIPE code {:?})",
            value.price, key, value.code_fipe
        );

        Ok(PriceQuote {
            price,
            metadata: PriceMetadata {
                brand_name: Some(value.brand),
                model_name: Some(value.model),
                fuel_name: value.fuel,
                model_year: value.model_year,
                reference_month: value.reference_month,
            },
        })
    }
}

#[async_trait]
impl CatalogSource for FipeProvider {
    async fn brands(&self, category: AssetCategory) -> Result<Vec<CatalogItem>> {
        self.fetch_catalog(&format!("{}/brands", category.as_path()))
            .await
    }

    async fn models(&self, category: AssetCategory, brand: &str) -> Result<Vec<CatalogItem>> {
        if brand.trim().is_empty() {
            return Err(anyhow!("Brand code is required to list models"));
        }
        self.fetch_catalog(&format!("{}/brands/{}/models", category.as_path(), brand))
            .await
    }

    async fn years(
        &self,
        category: AssetCategory,
        brand: &str,
        model: &str,
    ) -> Result<Vec<CatalogItem>> {
        self.fetch_catalog(&format!(
            "{}/brands/{}/models/{}/years",
            category.as_path(),
            brand,
            model
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::PriceLookupKey;
    use crate::store::memory::MemoryCollection;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALUE_PATH: &str = "/cars/brands/25/models/5940/years/2014-1";
    const MOCK_VALUE: &str = r#"{
        "brand": "Honda",
        "codeFipe": "014053-5",
        "fuel": "Gasolina",
        "fuelAcronym": "G",
        "model": "Civic Sedan LXS 1.8",
        "modelYear": 2014,
        "price": "R$ 43.807,00",
        "priceHistory": [],
        "referenceMonth": "janeiro de 2025",
        "vehicleType": 1
    }"#;

    async fn create_mock_server(request_path: &str, status: u16, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(request_path))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&mock_server)
            .await;
        mock_server
    }

    fn provider(base_url: &str) -> FipeProvider {
        FipeProvider::new(
            base_url,
            Duration::from_secs(5),
            Arc::new(MemoryCollection::new()),
        )
        .unwrap()
    }

    fn key() -> NormalizedKey {
        PriceLookupKey::new(AssetCategory::Cars, "25", "5940", "2014", None).normalized("1")
    }

    #[tokio::test]
    async fn test_fetch_price() {
        let server = create_mock_server(VALUE_PATH, 200, MOCK_VALUE).await;

        let quote = provider(&server.uri()).fetch_price(&key()).await.unwrap();

        assert_eq!(quote.price, dec!(43807.00));
        assert_eq!(quote.metadata.brand_name.as_deref(), Some("Honda"));
        assert_eq!(quote.metadata.model_name.as_deref(), Some("Civic Sedan LXS 1.8"));
        assert_eq!(quote.metadata.fuel_name.as_deref(), Some("Gasolina"));
        assert_eq!(quote.metadata.model_year, Some(2014));
        assert_eq!(
            quote.metadata.reference_month.as_deref(),
            Some("janeiro de 2025")
        );
    }

    #[tokio::test]
    async fn test_fetch_price_with_reference_period() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VALUE_PATH))
            .and(query_param("reference", "308"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MOCK_VALUE))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server.uri()).with_reference_period(Some(308));
        assert!(provider.fetch_price(&key()).await.is_ok());
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let server = create_mock_server(VALUE_PATH, 500, "Server Error").await;

        let err = provider(&server.uri()).fetch_price(&key()).await.unwrap_err();
        assert!(matches!(err, ValuationError::ExternalUnavailable(_)));
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let server = create_mock_server(VALUE_PATH, 200, r#"{ "not_price": "abc" }"#).await;

        let err = provider(&server.uri()).fetch_price(&key()).await.unwrap_err();
        assert!(matches!(err, ValuationError::MalformedPriceData(_)));
    }

    #[tokio::test]
    async fn test_unparsable_price_string() {
        let body = MOCK_VALUE.replace("R$ 43.807,00", "43,807.00 BRL");
        let server = create_mock_server(VALUE_PATH, 200, &body).await;

        let err = provider(&server.uri()).fetch_price(&key()).await.unwrap_err();
        assert!(matches!(err, ValuationError::MalformedPriceData(_)));
    }

    #[tokio::test]
    async fn test_empty_response() {
        let server = create_mock_server(VALUE_PATH, 200, "").await;

        let err = provider(&server.uri()).fetch_price(&key()).await.unwrap_err();
        assert!(matches!(err, ValuationError::MalformedPriceData(_)));
    }

    #[tokio::test]
    async fn test_brands_are_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cars/brands"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"code": "25", "name": "Honda"}, {"code": "59", "name": "VW - VolksWagen"}]"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server.uri());
        let brands = provider.brands(AssetCategory::Cars).await.unwrap();
        let again = provider.brands(AssetCategory::Cars).await.unwrap();

        assert_eq!(brands.len(), 2);
        assert_eq!(brands[0].code, "25");
        assert_eq!(brands[0].name, "Honda");
        assert_eq!(brands, again);
    }

    #[tokio::test]
    async fn test_years_listing() {
        let server = create_mock_server(
            "/cars/brands/25/models/5940/years",
            200,
            r#"[{"code": "2014-1", "name": "2014 Gasolina"}]"#,
        )
        .await;

        let years = provider(&server.uri())
            .years(AssetCategory::Cars, "25", "5940")
            .await
            .unwrap();
        assert_eq!(years[0].code, "2014-1");
    }

    #[tokio::test]
    async fn test_models_requires_brand() {
        let server = MockServer::start().await;
        assert!(
            provider(&server.uri())
                .models(AssetCategory::Cars, " ")
                .await
                .is_err()
        );
    }
}
