//! CoinMarketCap-style listings provider implementation

use crate::{
    config::ListingsConfig,
    constants::{LISTINGS_CONVERT, LISTINGS_LIMIT, LISTINGS_START, USER_AGENT},
    error::ProviderError,
    provider::ListingsProvider,
    types::PriceRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Listings response envelope
#[derive(Debug, Deserialize)]
struct ListingsResponse {
    status: ListingsStatus,
    #[serde(default)]
    data: Vec<ListingEntry>,
}

#[derive(Debug, Deserialize)]
struct ListingsStatus {
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    total_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ListingEntry {
    symbol: String,
    #[serde(default)]
    cmc_rank: Option<u32>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
    quote: ListingQuotes,
}

#[derive(Debug, Deserialize)]
struct ListingQuotes {
    #[serde(rename = "USD")]
    usd: Option<UsdQuote>,
}

/// Numeric fields come back as `null` for thinly traded coins
#[derive(Debug, Deserialize)]
struct UsdQuote {
    price: Option<f64>,
    volume_24h: Option<f64>,
    percent_change_1h: Option<f64>,
    percent_change_24h: Option<f64>,
    percent_change_7d: Option<f64>,
    percent_change_30d: Option<f64>,
    percent_change_60d: Option<f64>,
    percent_change_90d: Option<f64>,
    market_cap: Option<f64>,
    last_updated: Option<DateTime<Utc>>,
}

impl From<(UsdQuote, Option<DateTime<Utc>>)> for PriceRecord {
    fn from((quote, entry_updated): (UsdQuote, Option<DateTime<Utc>>)) -> Self {
        Self {
            price: quote.price.unwrap_or_default(),
            volume_24h: quote.volume_24h.unwrap_or_default(),
            percent_change_1h: quote.percent_change_1h.unwrap_or_default(),
            percent_change_24h: quote.percent_change_24h.unwrap_or_default(),
            percent_change_7d: quote.percent_change_7d.unwrap_or_default(),
            percent_change_30d: quote.percent_change_30d.unwrap_or_default(),
            percent_change_60d: quote.percent_change_60d.unwrap_or_default(),
            percent_change_90d: quote.percent_change_90d.unwrap_or_default(),
            market_cap: quote.market_cap.unwrap_or_default(),
            last_updated: quote.last_updated.or(entry_updated),
        }
    }
}

/// Decodes a listings body into per-symbol records
///
/// Several coins can share a ticker; listings arrive in rank order and the
/// highest-ranked one keeps the symbol. Entries without a USD quote are
/// skipped.
pub fn parse_listings(body: &str) -> Result<HashMap<String, PriceRecord>, ProviderError> {
    let response: ListingsResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::InvalidResponse(format!("Failed to parse listings response: {}", e))
    })?;

    if response.status.error_code != 0 {
        return Err(ProviderError::ApiError(format!(
            "error_code {}: {}",
            response.status.error_code,
            response.status.error_message.unwrap_or_default()
        )));
    }

    let mut entries = response.data;
    entries.sort_by_key(|e| e.cmc_rank.unwrap_or(u32::MAX));

    let mut result = HashMap::with_capacity(entries.len());
    for entry in entries {
        let Some(usd) = entry.quote.usd else {
            tracing::trace!(symbol = %entry.symbol, "Listing has no USD quote");
            continue;
        };
        result
            .entry(entry.symbol)
            .or_insert_with(|| PriceRecord::from((usd, entry.last_updated)));
    }

    tracing::trace!(
        total_count = response.status.total_count.unwrap_or_default(),
        symbols = result.len(),
        "Decoded listings"
    );

    Ok(result)
}

/// Listings provider for the `cryptocurrency/listings/latest` endpoint
pub struct CoinMarketCapProvider {
    client: Client,
}

impl CoinMarketCapProvider {
    /// Creates a new listings provider with a bounded request timeout
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ProviderError::NetworkError)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ListingsProvider for CoinMarketCapProvider {
    async fn fetch_listings(
        &self,
        config: &ListingsConfig,
    ) -> Result<HashMap<String, PriceRecord>, ProviderError> {
        tracing::debug!(url = %config.url, "Fetching listings");

        let response = self
            .client
            .get(&config.url)
            .query(&[
                ("start", LISTINGS_START.to_string()),
                ("limit", LISTINGS_LIMIT.to_string()),
                ("convert", LISTINGS_CONVERT.to_string()),
            ])
            .header(reqwest::header::ACCEPT, "application/json")
            .header(config.api_key_header.as_str(), config.api_key.as_str())
            .send()
            .await
            .map_err(ProviderError::from_request)?;

        if response.status().as_u16() == 429 {
            return Err(ProviderError::RateLimitExceeded);
        }

        if !response.status().is_success() {
            return Err(ProviderError::ApiError(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let body = response.text().await.map_err(ProviderError::from_request)?;
        let prices = parse_listings(&body)?;

        tracing::debug!(symbols = prices.len(), "Successfully fetched listings");

        Ok(prices)
    }

    fn provider_name(&self) -> &'static str {
        "coinmarketcap"
    }
}
