//! Ethplorer-style block explorer provider implementation

use crate::{
    config::ExplorerConfig,
    constants::{DEFAULT_TOKEN_DECIMALS, USER_AGENT},
    error::ProviderError,
    provider::ExplorerProvider,
    types::{ExplorerSnapshot, TokenHoldingRecord, TokenQuote},
};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{de::IgnoredAny, Deserialize, Deserializer};
use std::time::Duration;

/// `getAddressInfo` response
#[derive(Debug, Deserialize)]
struct AddressInfoResponse {
    #[serde(default)]
    address: String,
    #[serde(rename = "ETH", default)]
    eth: Option<NativeInfo>,
    #[serde(default)]
    tokens: Vec<TokenEntry>,
    #[serde(default)]
    error: Option<ExplorerErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ExplorerErrorBody {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct NativeInfo {
    #[serde(default)]
    price: MaybePrice,
}

#[derive(Debug, Deserialize)]
struct TokenEntry {
    #[serde(rename = "tokenInfo")]
    token_info: Option<TokenInfo>,
    #[serde(default, deserialize_with = "lenient_f64")]
    balance: f64,
    #[serde(rename = "rawBalance", default)]
    raw_balance: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenInfo {
    #[serde(default)]
    address: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    decimals: Option<Decimals>,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    price: MaybePrice,
}

/// The explorer sends `"price": false` for unpriced tokens
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum MaybePrice {
    Quote(ExplorerPrice),
    Flag(IgnoredAny),
    #[default]
    Missing,
}

impl MaybePrice {
    fn into_quote(self) -> Option<TokenQuote> {
        match self {
            MaybePrice::Quote(p) => Some(TokenQuote {
                rate: p.rate,
                diff: p.diff,
                diff_7d: p.diff7d,
                diff_30d: p.diff30d,
                market_cap_usd: p.market_cap_usd,
                volume_24h: p.volume24h,
            }),
            MaybePrice::Flag(_) | MaybePrice::Missing => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExplorerPrice {
    #[serde(default, deserialize_with = "lenient_f64")]
    rate: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    diff: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    diff7d: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    diff30d: f64,
    #[serde(rename = "marketCapUsd", default, deserialize_with = "lenient_f64")]
    market_cap_usd: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    volume24h: f64,
}

/// Decimals arrive as `"18"` or `18` depending on the token
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Decimals {
    Number(u32),
    Text(String),
}

impl Decimals {
    fn value(&self) -> Option<u32> {
        match self {
            Decimals::Number(n) => Some(*n),
            Decimals::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Accepts numbers, numeric strings and null
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Number(f64),
        Text(String),
        Other(IgnoredAny),
    }

    Ok(match Lenient::deserialize(deserializer)? {
        Lenient::Number(n) => n,
        Lenient::Text(s) => s.trim().parse().unwrap_or_default(),
        Lenient::Other(_) => 0.0,
    })
}

impl TokenEntry {
    fn into_record(self) -> Option<TokenHoldingRecord> {
        let info = self.token_info?;

        // rawBalance is exact; `balance` is a float that loses precision
        let raw_balance = self
            .raw_balance
            .as_deref()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(self.balance);

        let decimals = info
            .decimals
            .as_ref()
            .and_then(Decimals::value)
            .unwrap_or(DEFAULT_TOKEN_DECIMALS);

        Some(TokenHoldingRecord {
            address: info.address,
            name: info.name,
            symbol: info.symbol,
            raw_balance,
            decimals,
            website: info.website.unwrap_or_default(),
            image: info.image.unwrap_or_default(),
            quote: info.price.into_quote().unwrap_or_default(),
        })
    }
}

/// Decodes a `getAddressInfo` body
pub fn parse_address_info(body: &str) -> Result<ExplorerSnapshot, ProviderError> {
    let response: AddressInfoResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::InvalidResponse(format!("Failed to parse explorer response: {}", e))
    })?;

    if let Some(err) = response.error {
        return Err(ProviderError::ApiError(format!(
            "explorer error {}: {}",
            err.code, err.message
        )));
    }

    let tokens = response
        .tokens
        .into_iter()
        .filter_map(TokenEntry::into_record)
        .collect();

    Ok(ExplorerSnapshot {
        address: response.address,
        native_quote: response.eth.and_then(|eth| eth.price.into_quote()),
        tokens,
    })
}

/// Explorer provider for `getAddressInfo/{address}`
pub struct EthplorerProvider {
    client: Client,
    base_url: String,
    api_key: String,
    image_origin: String,
}

impl EthplorerProvider {
    /// Creates a new explorer provider with a bounded request timeout
    pub fn new(config: &ExplorerConfig, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ProviderError::NetworkError)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            image_origin: config.image_origin.trim_end_matches('/').to_string(),
        })
    }

    /// `address` is pushed as a single percent-encoded path segment
    fn build_url(&self, address: &str) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ProviderError::ApiError(format!("Invalid explorer URL: {}", e)))?;

        url.path_segments_mut()
            .map_err(|_| {
                ProviderError::ApiError(format!(
                    "Explorer URL cannot be a base: {}",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .push("getAddressInfo")
            .push(address);
        url.query_pairs_mut().append_pair("apiKey", &self.api_key);

        Ok(url)
    }
}

#[async_trait]
impl ExplorerProvider for EthplorerProvider {
    async fn fetch_address_info(&self, address: &str) -> Result<ExplorerSnapshot, ProviderError> {
        let url = self.build_url(address)?;
        tracing::debug!(address, "Fetching address info from explorer");

        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
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
        let snapshot = parse_address_info(&body)?;

        tracing::debug!(
            address,
            tokens = snapshot.tokens.len(),
            "Successfully fetched address info"
        );

        Ok(snapshot)
    }

    fn image_origin(&self) -> &str {
        &self.image_origin
    }

    fn provider_name(&self) -> &'static str {
        "ethplorer"
    }
}
