//! Per-address token holdings cache
//!
//! Tracks a single address at a time: the one most recently passed to
//! [`HoldingsCache::refresh`]. Each refresh gathers the native balance from
//! the node and the token list from the explorer, and only if both succeed
//! replaces the holdings, the symbol list and the USD total together.

use crate::{
    constants::{
        EVENT_CHANNEL_CAPACITY, MAX_ADDRESS_LEN, MIN_ADDRESS_LEN, NATIVE_DECIMALS,
        NATIVE_IMAGE_URL, NATIVE_NAME, NATIVE_SYMBOL, NATIVE_WEBSITE,
    },
    error::CacheError,
    metrics::{RefreshMetrics, RefreshStats},
    price_cache::PriceCache,
    provider::{ExplorerProvider, NativeBalanceProvider},
    types::{CacheEvent, CacheKind, ExplorerSnapshot, TokenHoldingRecord},
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex, RwLock};

/// Everything a refresh replaces in one step
#[derive(Debug, Default, Clone)]
struct HoldingsState {
    address: Option<String>,
    tokens: HashMap<String, TokenHoldingRecord>,
    token_list: Vec<String>,
    balance_usd: f64,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Holdings of the most recently queried address
pub struct HoldingsCache {
    explorer: Arc<dyn ExplorerProvider>,
    node: Arc<dyn NativeBalanceProvider>,
    prices: Arc<PriceCache>,
    state: RwLock<HoldingsState>,
    refresh_lock: Mutex<()>,
    metrics: RefreshMetrics,
    events: broadcast::Sender<CacheEvent>,
}

/// Checks the coarse length bound applied before any request
pub fn validate_address(address: &str) -> Result<(), CacheError> {
    let len = address.len();
    if !(MIN_ADDRESS_LEN..=MAX_ADDRESS_LEN).contains(&len) {
        return Err(CacheError::validation(format!(
            "address length {} outside {}..={}",
            len, MIN_ADDRESS_LEN, MAX_ADDRESS_LEN
        )));
    }
    Ok(())
}

impl HoldingsCache {
    pub fn new(
        explorer: Arc<dyn ExplorerProvider>,
        node: Arc<dyn NativeBalanceProvider>,
        prices: Arc<PriceCache>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            explorer,
            node,
            prices,
            state: RwLock::new(HoldingsState::default()),
            refresh_lock: Mutex::new(()),
            metrics: RefreshMetrics::new(),
            events,
        }
    }

    /// Publishes events on a shared channel instead of a private one
    pub fn with_event_sender(mut self, events: broadcast::Sender<CacheEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Rebuilds the holdings for `address`
    ///
    /// Tokens without a website are dropped as likely spam. The USD total
    /// uses the price cache as it is right now and is not recomputed when
    /// prices change later.
    ///
    /// # Returns
    /// The number of tokens now cached (native asset included)
    ///
    /// # Errors
    /// `ValidationFailed` for an out-of-bounds address, `ConnectionFailed`
    /// or `BalanceFetchFailed` when the node call fails, `TransportFailed`
    /// or `DecodeFailed` when the explorer call fails. On any error the
    /// previous holdings stay untouched.
    pub async fn refresh(&self, address: &str) -> Result<usize, CacheError> {
        validate_address(address)?;

        let _guard = self.refresh_lock.lock().await;
        let start = Instant::now();

        match self.build_state(address).await {
            Ok(state) => {
                let count = state.tokens.len();
                let balance_usd = state.balance_usd;
                *self.state.write().await = state;

                self.metrics.record_success(start.elapsed()).await;
                let _ = self
                    .events
                    .send(CacheEvent::holdings_refreshed(address, count, balance_usd));

                tracing::info!(
                    address,
                    tokens = count,
                    balance_usd,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Holdings cache refreshed"
                );
                Ok(count)
            }
            Err(e) => {
                self.metrics.record_failure(&e.to_string()).await;
                let _ = self
                    .events
                    .send(CacheEvent::refresh_failed(CacheKind::Holdings, &e));

                tracing::warn!(
                    address,
                    error = %e,
                    "Holdings refresh failed, keeping previous data"
                );
                Err(e)
            }
        }
    }

    async fn build_state(&self, address: &str) -> Result<HoldingsState, CacheError> {
        let (native, snapshot) = futures::future::join(
            self.node.fetch_native_balance(address),
            self.explorer.fetch_address_info(address),
        )
        .await;

        let wei = native.map_err(CacheError::from_node)?;
        let snapshot = snapshot.map_err(CacheError::from)?;

        let tokens = merge_holdings(address, wei, snapshot);

        let mut token_list: Vec<String> = tokens.keys().cloned().collect();
        token_list.sort();

        let prices = self
            .prices
            .get_prices(token_list.iter().map(String::as_str))
            .await;
        let balance_usd: f64 = tokens
            .iter()
            .map(|(symbol, record)| {
                prices.get(symbol).copied().unwrap_or_default() * record.normalized_balance()
            })
            .sum();

        Ok(HoldingsState {
            address: Some(address.to_string()),
            tokens,
            token_list,
            balance_usd,
            refreshed_at: Some(Utc::now()),
        })
    }

    /// Token balance in display units, or 0.0 when unknown
    pub async fn get_token_balance(&self, symbol: &str) -> f64 {
        self.read(symbol, TokenHoldingRecord::normalized_balance).await
    }

    pub async fn get_token_name(&self, symbol: &str) -> String {
        self.read(symbol, |r| r.name.clone()).await
    }

    pub async fn get_token_url(&self, symbol: &str) -> String {
        self.read(symbol, |r| r.website.clone()).await
    }

    /// Explorer-reported 24h price change in percent
    pub async fn get_token_change(&self, symbol: &str) -> f64 {
        self.read(symbol, |r| r.quote.diff).await
    }

    /// Absolute image URL
    ///
    /// The native asset's image is already absolute; token images are paths
    /// on the explorer's origin.
    pub async fn get_token_image_url(&self, symbol: &str) -> String {
        let origin = self.explorer.image_origin();
        self.read(symbol, |r| {
            if r.symbol == NATIVE_SYMBOL || r.image.starts_with("http") {
                r.image.clone()
            } else if r.image.is_empty() {
                String::new()
            } else {
                format!("{}{}", origin, r.image)
            }
        })
        .await
    }

    /// USD value of the address as computed at the last refresh
    pub async fn get_address_balance(&self) -> f64 {
        self.state.read().await.balance_usd
    }

    /// Symbols held after the last successful refresh, sorted
    pub async fn get_token_list(&self) -> Vec<String> {
        self.state.read().await.token_list.clone()
    }

    pub async fn get_holding(&self, symbol: &str) -> Option<TokenHoldingRecord> {
        self.state.read().await.tokens.get(symbol).cloned()
    }

    /// Address the cached holdings belong to
    pub async fn current_address(&self) -> Option<String> {
        self.state.read().await.address.clone()
    }

    pub async fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.refreshed_at
    }

    pub async fn stats(&self) -> RefreshStats {
        self.metrics.snapshot().await
    }

    async fn read<T: Default>(
        &self,
        symbol: &str,
        f: impl FnOnce(&TokenHoldingRecord) -> T,
    ) -> T {
        self.state
            .read()
            .await
            .tokens
            .get(symbol)
            .map(f)
            .unwrap_or_default()
    }
}

/// Combines the native balance and the explorer's token list
///
/// The native entry is never replaced by an explorer token claiming the
/// same symbol.
fn merge_holdings(
    address: &str,
    wei: u128,
    snapshot: ExplorerSnapshot,
) -> HashMap<String, TokenHoldingRecord> {
    let mut tokens = HashMap::with_capacity(snapshot.tokens.len() + 1);

    tokens.insert(
        NATIVE_SYMBOL.to_string(),
        TokenHoldingRecord {
            address: address.to_string(),
            name: NATIVE_NAME.to_string(),
            symbol: NATIVE_SYMBOL.to_string(),
            raw_balance: wei as f64,
            decimals: NATIVE_DECIMALS,
            website: NATIVE_WEBSITE.to_string(),
            image: NATIVE_IMAGE_URL.to_string(),
            quote: snapshot.native_quote.unwrap_or_default(),
        },
    );

    for token in snapshot.tokens {
        if token.website.trim().is_empty() {
            tracing::trace!(symbol = %token.symbol, "Skipping token without website");
            continue;
        }
        if token.symbol.is_empty() || token.symbol == NATIVE_SYMBOL {
            tracing::debug!(symbol = %token.symbol, contract = %token.address, "Skipping token with reserved or empty symbol");
            continue;
        }
        tokens.insert(token.symbol.clone(), token);
    }

    tokens
}
