//! Runtime configuration loaded from a TOML file
//!
//! ```toml
//! [api]
//! url = "https://pro-api.coinmarketcap.com/v1/cryptocurrency/listings/latest"
//! token_header = "X-CMC_PRO_API_KEY"
//! token = "..."
//! wallet_address = "0x..."
//! port = 8080
//!
//! [node]
//! rpc_url = "http://127.0.0.1:8545"
//! ```
//!
//! Every section except `[api]` is optional.

use crate::{
    constants::{
        DEFAULT_API_KEY_HEADER, EXPLORER_API_URL, EXPLORER_FREE_KEY, EXPLORER_IMAGE_ORIGIN,
        INITIAL_BACKOFF_MS, MAX_BACKOFF_MS, MAX_RETRY_ATTEMPTS, NODE_RPC_URL,
        REFRESH_INTERVAL_SECS, REQUEST_TIMEOUT_SECS,
    },
    error::CacheError,
};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub explorer: ExplorerConfig,
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Market-data API settings plus the wallet and port consumed by the
/// presentation layer
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub url: String,
    #[serde(default = "default_token_header")]
    pub token_header: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub wallet_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    pub base_url: String,
    pub api_key: String,
    pub image_origin: String,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            base_url: EXPLORER_API_URL.to_string(),
            api_key: EXPLORER_FREE_KEY.to_string(),
            image_origin: EXPLORER_IMAGE_ORIGIN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub rpc_url: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_url: NODE_RPC_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_secs: u64,
    pub request_timeout_secs: u64,
    pub max_retry_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: REFRESH_INTERVAL_SECS,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            max_retry_attempts: MAX_RETRY_ATTEMPTS,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retry_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// The part of the configuration a listings refresh needs
///
/// The price cache remembers the last one it was refreshed with so the
/// refresh loop can replay it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingsConfig {
    pub url: String,
    pub api_key: String,
    pub api_key_header: String,
}

impl ListingsConfig {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        api_key_header: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            api_key_header: api_key_header.into(),
        }
    }
}

/// Exponential backoff for listings fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RefreshConfig::default().retry_policy()
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }
}

impl Config {
    /// Reads and validates a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CacheError::config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml(&contents)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parses and validates configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self, CacheError> {
        let config: Config =
            toml::from_str(contents).map_err(|e| CacheError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.api.url.trim().is_empty() {
            return Err(CacheError::config("api.url is empty"));
        }
        if self.api.token_header.trim().is_empty() {
            return Err(CacheError::config("api.token_header is empty"));
        }
        if self.refresh.interval_secs == 0 {
            return Err(CacheError::config("refresh.interval_secs must be positive"));
        }
        if self.refresh.request_timeout_secs == 0 {
            return Err(CacheError::config(
                "refresh.request_timeout_secs must be positive",
            ));
        }
        Ok(())
    }

    pub fn listings(&self) -> ListingsConfig {
        ListingsConfig::new(&self.api.url, &self.api.token, &self.api.token_header)
    }
}

fn default_token_header() -> String {
    DEFAULT_API_KEY_HEADER.to_string()
}

fn default_port() -> u16 {
    8080
}
