//! Market tracker service
//!
//! Ties the price cache, the holdings cache and the periodic price refresh
//! together behind one handle.

use crate::{
    config::{Config, ListingsConfig, RetryPolicy},
    constants::{EVENT_CHANNEL_CAPACITY, REFRESH_INTERVAL_SECS},
    error::CacheError,
    holdings::HoldingsCache,
    price_cache::PriceCache,
    provider::{ExplorerProvider, ListingsProvider, NativeBalanceProvider},
    providers::{CoinMarketCapProvider, EthplorerProvider, NodeRpcProvider},
    types::{CacheEvent, ComponentHealth, HealthStatus},
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Price and holdings caches with a shared event stream
///
/// # Example
/// ```no_run
/// use market_holdings_sdk::{Config, MarketTracker};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::load("config.toml")?;
/// let tracker = MarketTracker::from_config(&config)?;
///
/// tracker.refresh_prices(&config.listings()).await?;
/// let refresher = tracker.start_refresh_loop();
///
/// tracker.refresh_address(&config.api.wallet_address).await?;
/// println!("Wallet: ${:.2}", tracker.holdings().get_address_balance().await);
///
/// refresher.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct MarketTracker {
    prices: Arc<PriceCache>,
    holdings: Arc<HoldingsCache>,
    events: broadcast::Sender<CacheEvent>,
    refresh_interval: Duration,
}

impl MarketTracker {
    /// Builds the HTTP providers described by `config`
    pub fn from_config(config: &Config) -> Result<Self, CacheError> {
        let timeout = config.refresh.request_timeout();

        let listings = Arc::new(CoinMarketCapProvider::new(timeout)?);
        let explorer = Arc::new(EthplorerProvider::new(&config.explorer, timeout)?);
        let node = Arc::new(NodeRpcProvider::new(&config.node.rpc_url, timeout)?);

        tracing::info!(
            listings_url = %config.api.url,
            explorer_url = %config.explorer.base_url,
            node_url = %config.node.rpc_url,
            refresh_interval_secs = config.refresh.interval_secs,
            "Creating market tracker"
        );

        Ok(Self::with_providers(
            listings,
            explorer,
            node,
            config.refresh.retry_policy(),
            config.refresh.interval(),
        ))
    }

    /// Creates a tracker over arbitrary providers
    ///
    /// This is primarily for testing with mock providers.
    pub fn with_providers(
        listings: Arc<dyn ListingsProvider>,
        explorer: Arc<dyn ExplorerProvider>,
        node: Arc<dyn NativeBalanceProvider>,
        retry: RetryPolicy,
        refresh_interval: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let prices =
            Arc::new(PriceCache::new(listings, retry).with_event_sender(events.clone()));
        let holdings = Arc::new(
            HoldingsCache::new(explorer, node, prices.clone()).with_event_sender(events.clone()),
        );

        Self {
            prices,
            holdings,
            events,
            refresh_interval,
        }
    }

    pub fn prices(&self) -> &Arc<PriceCache> {
        &self.prices
    }

    pub fn holdings(&self) -> &Arc<HoldingsCache> {
        &self.holdings
    }

    /// Subscribes to refresh events from both caches
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Refreshes the price cache and remembers `config` for the refresh loop
    pub async fn refresh_prices(&self, config: &ListingsConfig) -> Result<usize, CacheError> {
        self.prices.refresh(config).await
    }

    /// Rebuilds the holdings cache for `address`
    pub async fn refresh_address(&self, address: &str) -> Result<usize, CacheError> {
        self.holdings.refresh(address).await
    }

    /// Starts re-running the last price refresh every interval
    ///
    /// The first run happens one full interval after the call. The holdings
    /// cache is never refreshed by the loop.
    pub fn start_refresh_loop(&self) -> RefreshHandle {
        spawn_refresh_loop(self.prices.clone(), self.refresh_interval)
    }

    /// Perform a health check on both caches
    ///
    /// # Returns
    /// `Unhealthy` without price data, `Degraded` when data is stale or the
    /// last refresh of either cache failed, `Healthy` otherwise
    pub async fn health_check(&self) -> ComponentHealth {
        let mut details = HashMap::new();

        let price_stats = self.prices.stats().await;
        let holdings_stats = self.holdings.stats().await;
        let symbols = self.prices.len().await;
        let age = self.prices.age().await;

        details.insert("cached_symbols".to_string(), serde_json::json!(symbols));
        details.insert(
            "price_provider".to_string(),
            serde_json::json!(self.prices.provider_name()),
        );
        details.insert(
            "price_age_secs".to_string(),
            serde_json::json!(age.map(|a| a.as_secs())),
        );
        details.insert(
            "price_refresh_failures".to_string(),
            serde_json::json!(price_stats.consecutive_failures),
        );
        details.insert(
            "tracked_address".to_string(),
            serde_json::json!(self.holdings.current_address().await),
        );
        details.insert(
            "held_tokens".to_string(),
            serde_json::json!(self.holdings.get_token_list().await.len()),
        );
        details.insert(
            "holdings_refresh_failures".to_string(),
            serde_json::json!(holdings_stats.consecutive_failures),
        );

        let stale = age.is_some_and(|a| a > self.refresh_interval * 2);

        let status = if symbols == 0 {
            HealthStatus::Unhealthy
        } else if stale
            || price_stats.consecutive_failures > 0
            || holdings_stats.consecutive_failures > 0
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        let message = match status {
            HealthStatus::Healthy => format!("{} symbols cached with fresh data", symbols),
            HealthStatus::Degraded if stale => "Price data is stale".to_string(),
            HealthStatus::Degraded => {
                // Caches whose latest refresh failed
                let failing: Vec<String> = [
                    ("prices", &price_stats),
                    ("holdings", &holdings_stats),
                ]
                .into_iter()
                .filter(|(_, stats)| stats.consecutive_failures > 0)
                .map(|(cache, stats)| {
                    format!("{}: {}", cache, stats.last_error.as_deref().unwrap_or_default())
                })
                .collect();
                format!("Last refresh failed: {}", failing.join("; "))
            }
            HealthStatus::Unhealthy => "No price data available".to_string(),
        };

        ComponentHealth {
            name: "market_tracker".to_string(),
            status,
            message: Some(message),
            details,
            last_checked: chrono::Utc::now(),
        }
    }
}

/// Handle to a running refresh loop
///
/// Dropping the handle also stops the loop.
pub struct RefreshHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Signals the loop to stop and waits for it to exit
    ///
    /// A refresh in flight is abandoned; the cache keeps whichever map was
    /// in place.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Refresh loop task ended abnormally");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Spawns the periodic price refresh on the current runtime
pub fn spawn_refresh_loop(prices: Arc<PriceCache>, interval: Duration) -> RefreshHandle {
    let interval = if interval.is_zero() {
        Duration::from_secs(REFRESH_INTERVAL_SECS)
    } else {
        interval
    };
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        tracing::info!(
            refresh_interval_secs = interval.as_secs(),
            "Starting price refresh loop"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop_rx.changed() => break,
            }

            tokio::select! {
                result = prices.refresh_last() => match result {
                    Ok(Some(count)) => tracing::debug!(symbols = count, "Scheduled price refresh done"),
                    Ok(None) => tracing::debug!("No listings configuration captured yet, skipping"),
                    Err(e) => tracing::warn!(error = %e, "Scheduled price refresh failed"),
                },
                _ = stop_rx.changed() => break,
            }
        }

        tracing::info!("Price refresh loop stopped");
    });

    RefreshHandle { stop_tx, task }
}
