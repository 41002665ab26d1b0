//! Types for the price and holdings caches

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Compact per-symbol quote extracted from a listings payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    /// Price in USD
    pub price: f64,

    /// 24h traded volume in USD
    pub volume_24h: f64,

    pub percent_change_1h: f64,
    pub percent_change_24h: f64,
    pub percent_change_7d: f64,
    pub percent_change_30d: f64,
    pub percent_change_60d: f64,
    pub percent_change_90d: f64,

    /// Market capitalisation in USD
    pub market_cap: f64,

    /// When the provider last updated this quote
    pub last_updated: Option<DateTime<Utc>>,
}

/// Percentage changes of a quote over the standard windows
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PercentChanges {
    pub h1: f64,
    pub h24: f64,
    pub d7: f64,
    pub d30: f64,
    pub d60: f64,
    pub d90: f64,
}

impl PriceRecord {
    pub fn percent_changes(&self) -> PercentChanges {
        PercentChanges {
            h1: self.percent_change_1h,
            h24: self.percent_change_24h,
            d7: self.percent_change_7d,
            d30: self.percent_change_30d,
            d60: self.percent_change_60d,
            d90: self.percent_change_90d,
        }
    }
}

/// Explorer spot price attached to a token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenQuote {
    /// USD rate
    pub rate: f64,
    /// 24h change in percent
    pub diff: f64,
    pub diff_7d: f64,
    pub diff_30d: f64,
    pub market_cap_usd: f64,
    pub volume_24h: f64,
}

/// One token held by the most recently queried address
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenHoldingRecord {
    /// Token contract address, or the holder address for the native asset
    pub address: String,
    pub name: String,
    pub symbol: String,

    /// Balance in the token's smallest unit
    pub raw_balance: f64,

    /// Decimal places used to normalise `raw_balance`
    pub decimals: u32,

    pub website: String,

    /// Image path as reported by the explorer (relative for tokens)
    pub image: String,

    pub quote: TokenQuote,
}

impl TokenHoldingRecord {
    /// Balance in display units (`raw_balance / 10^decimals`)
    pub fn normalized_balance(&self) -> f64 {
        self.raw_balance / 10f64.powi(self.decimals as i32)
    }
}

/// Decoded explorer answer for one address, before filtering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExplorerSnapshot {
    pub address: String,

    /// Spot price of the native asset, if the explorer reported one
    pub native_quote: Option<TokenQuote>,

    /// Every token entry, including ones without a website
    pub tokens: Vec<TokenHoldingRecord>,
}

/// Events published when a cache is rebuilt or a refresh fails
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheEvent {
    /// Price cache was replaced
    PricesRefreshed {
        id: Uuid,
        symbols: usize,
        timestamp: DateTime<Utc>,
    },

    /// Holdings cache was rebuilt for an address
    HoldingsRefreshed {
        id: Uuid,
        address: String,
        tokens: usize,
        balance_usd: f64,
        timestamp: DateTime<Utc>,
    },

    /// A refresh was aborted and the previous contents kept
    RefreshFailed {
        id: Uuid,
        cache: CacheKind,
        error_kind: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl CacheEvent {
    pub fn prices_refreshed(symbols: usize) -> Self {
        Self::PricesRefreshed {
            id: Uuid::new_v4(),
            symbols,
            timestamp: Utc::now(),
        }
    }

    pub fn holdings_refreshed(address: &str, tokens: usize, balance_usd: f64) -> Self {
        Self::HoldingsRefreshed {
            id: Uuid::new_v4(),
            address: address.to_string(),
            tokens,
            balance_usd,
            timestamp: Utc::now(),
        }
    }

    pub fn refresh_failed(cache: CacheKind, error: &crate::error::CacheError) -> Self {
        Self::RefreshFailed {
            id: Uuid::new_v4(),
            cache,
            error_kind: error.kind().to_string(),
            error_message: error.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Get the event ID
    pub fn id(&self) -> Uuid {
        match self {
            CacheEvent::PricesRefreshed { id, .. } => *id,
            CacheEvent::HoldingsRefreshed { id, .. } => *id,
            CacheEvent::RefreshFailed { id, .. } => *id,
        }
    }

    /// Get the event type as string
    pub fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::PricesRefreshed { .. } => "PRICES_REFRESHED",
            CacheEvent::HoldingsRefreshed { .. } => "HOLDINGS_REFRESHED",
            CacheEvent::RefreshFailed { .. } => "REFRESH_FAILED",
        }
    }
}

impl std::fmt::Display for CacheEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheEvent::PricesRefreshed { symbols, .. } => {
                write!(f, "Prices refreshed: {} symbols", symbols)
            }
            CacheEvent::HoldingsRefreshed {
                address,
                tokens,
                balance_usd,
                ..
            } => write!(
                f,
                "Holdings refreshed for {}: {} tokens, ${:.2}",
                address, tokens, balance_usd
            ),
            CacheEvent::RefreshFailed {
                cache,
                error_message,
                ..
            } => write!(f, "{:?} refresh failed: {}", cache, error_message),
        }
    }
}

/// Which cache an event or metric refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Prices,
    Holdings,
}

/// Overall system health status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Fresh data and no recent failures
    Healthy,
    /// Data available but the last refresh failed
    Degraded,
    /// No price data at all
    Unhealthy,
}

/// Component health information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub details: std::collections::HashMap<String, serde_json::Value>,
    pub last_checked: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_balance_uses_decimals() {
        let mut record = TokenHoldingRecord {
            symbol: "USDC".into(),
            raw_balance: 2_500_000.0,
            decimals: 6,
            ..Default::default()
        };
        assert!((record.normalized_balance() - 2.5).abs() < 1e-12);

        record.raw_balance = 1e18;
        record.decimals = 18;
        assert_eq!(record.normalized_balance(), 1.0);
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = CacheEvent::prices_refreshed(3);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PRICES_REFRESHED");
        assert_eq!(json["symbols"], 3);
        assert_eq!(event.event_type(), "PRICES_REFRESHED");
    }
}
