//! # Market Holdings SDK
//!
//! Keeps two in-memory caches fed by public APIs:
//!
//! - a **price cache** built from a market-data listings endpoint
//!   (CoinMarketCap `listings/latest` format), keyed by ticker symbol;
//! - a **holdings cache** for one Ethereum address, built from a block
//!   explorer's token list (Ethplorer `getAddressInfo` format) plus the
//!   native balance read straight from a node over JSON-RPC.
//!
//! Getters never fail: an unknown symbol reads as zero or an empty string.
//! Refreshes report typed [`CacheError`]s and never leave a cache half
//! rebuilt.
//!
//! ## Usage
//!
//! ```no_run
//! use market_holdings_sdk::{Config, MarketTracker};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.toml")?;
//! let tracker = MarketTracker::from_config(&config)?;
//!
//! tracker.refresh_prices(&config.listings()).await?;
//! let _refresher = tracker.start_refresh_loop();
//!
//! println!("ETH: ${:.2}", tracker.prices().get_price("ETH").await);
//!
//! tracker.refresh_address(&config.api.wallet_address).await?;
//! for symbol in tracker.holdings().get_token_list().await {
//!     println!(
//!         "{}: {:.4}",
//!         symbol,
//!         tracker.holdings().get_token_balance(&symbol).await
//!     );
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Config (TOML)
//!     ↓
//! MarketTracker ── refresh loop (every 5 min, stoppable)
//!     ↓                      ↓
//! HoldingsCache ──reads──> PriceCache
//!     ↓        ↓               ↓
//! Explorer   Node RPC     Listings API
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod holdings;
pub mod logging;
pub mod metrics;
pub mod price_cache;
pub mod provider;
pub mod providers;
pub mod tracker;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ListingsConfig, RetryPolicy};
pub use error::{CacheError, ProviderError};
pub use holdings::HoldingsCache;
pub use metrics::RefreshStats;
pub use price_cache::PriceCache;
pub use tracker::{MarketTracker, RefreshHandle};
pub use types::{
    CacheEvent, CacheKind, ComponentHealth, HealthStatus, PriceRecord, TokenHoldingRecord,
    TokenQuote,
};
