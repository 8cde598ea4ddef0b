use reqwest::{Client, ClientBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("price api returned http {0}")]
    Status(StatusCode),
    #[error("error decoding response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Currency and result count read from the selectors when a cycle is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuerySelection {
    pub currency: String,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CoinPriceRecord {
    pub name: String,
    pub symbol: String,
    pub price: f64,
    #[serde(default)]
    pub change_24h: Option<f64>,
    pub market_cap: f64,
}

/// Body of `GET /prices`. Only `data` and `warning` drive rendering; the rest
/// is what the backend reports about itself and only gets logged.
#[derive(Debug, Clone, Deserialize)]
pub struct PricesResponse {
    #[serde(default)]
    pub data: Option<Vec<CoinPriceRecord>>,
    #[serde(default)]
    pub warning: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default)]
    pub cached: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}

pub struct PriceClient {
    reqwest: Client,
    base_url: String,
}

impl PriceClient {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let reqwest = ClientBuilder::new()
            .user_agent(concat!("priceboard/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            reqwest,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn prices_url(&self) -> String {
        format!("{}/prices", self.base_url)
    }

    pub async fn fetch_prices(&self, selection: &QuerySelection) -> Result<PricesResponse, FetchError> {
        let limit = selection.limit.to_string();
        let response = self
            .reqwest
            .get(self.prices_url())
            .query(&[("currency", selection.currency.as_str()), ("limit", limit.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        // Decode from text so a malformed body surfaces as `Decode`, not as a
        // transport error.
        let body = response.text().await?;
        Ok(serde_json::from_str::<PricesResponse>(&body)?)
    }
}
