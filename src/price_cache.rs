//! Listings price cache
//!
//! Holds one [`PriceRecord`] per ticker symbol. A refresh replaces the
//! whole map at once: symbols missing from the new payload disappear, and
//! a failed refresh leaves the previous map in place.

use crate::{
    config::{ListingsConfig, RetryPolicy},
    constants::EVENT_CHANNEL_CAPACITY,
    error::CacheError,
    metrics::{RefreshMetrics, RefreshStats},
    provider::ListingsProvider,
    types::{CacheEvent, CacheKind, PercentChanges, PriceRecord},
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::sleep;

/// Map and timestamp, replaced together
#[derive(Debug, Default)]
struct PriceState {
    prices: HashMap<String, PriceRecord>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Per-symbol price cache fed by a [`ListingsProvider`]
pub struct PriceCache {
    provider: Arc<dyn ListingsProvider>,
    retry: RetryPolicy,
    state: RwLock<PriceState>,
    last_config: RwLock<Option<ListingsConfig>>,
    /// Serialises refreshes; a second caller waits for the first
    refresh_lock: Mutex<()>,
    metrics: RefreshMetrics,
    events: broadcast::Sender<CacheEvent>,
}

impl PriceCache {
    pub fn new(provider: Arc<dyn ListingsProvider>, retry: RetryPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            provider,
            retry,
            state: RwLock::new(PriceState::default()),
            last_config: RwLock::new(None),
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

    /// Pulls the listings and replaces the cache with them
    ///
    /// `config` is remembered even when the fetch fails, so the refresh
    /// loop keeps using whatever the caller asked for last.
    ///
    /// # Returns
    /// The number of symbols now cached
    pub async fn refresh(&self, config: &ListingsConfig) -> Result<usize, CacheError> {
        *self.last_config.write().await = Some(config.clone());
        self.refresh_with(config).await
    }

    /// Re-runs the refresh with the last captured configuration
    ///
    /// # Returns
    /// `Ok(None)` when no refresh has been requested yet
    pub async fn refresh_last(&self) -> Result<Option<usize>, CacheError> {
        let config = self.last_config.read().await.clone();
        match config {
            Some(config) => self.refresh_with(&config).await.map(Some),
            None => Ok(None),
        }
    }

    async fn refresh_with(&self, config: &ListingsConfig) -> Result<usize, CacheError> {
        let _guard = self.refresh_lock.lock().await;
        let start = Instant::now();

        match self.fetch_with_retry(config).await {
            Ok(prices) => {
                let count = prices.len();
                // Readers see the old state or the new one, never a mix
                *self.state.write().await = PriceState {
                    prices,
                    refreshed_at: Some(Utc::now()),
                };

                self.metrics.record_success(start.elapsed()).await;
                let _ = self.events.send(CacheEvent::prices_refreshed(count));

                tracing::info!(
                    symbols = count,
                    provider = self.provider.provider_name(),
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Price cache refreshed"
                );
                Ok(count)
            }
            Err(e) => {
                self.metrics.record_failure(&e.to_string()).await;
                let _ = self
                    .events
                    .send(CacheEvent::refresh_failed(CacheKind::Prices, &e));

                tracing::warn!(error = %e, "Price cache refresh failed, keeping previous data");
                Err(e)
            }
        }
    }

    async fn fetch_with_retry(
        &self,
        config: &ListingsConfig,
    ) -> Result<HashMap<String, PriceRecord>, CacheError> {
        let mut backoff = self.retry.initial_backoff;

        for attempt in 1..=self.retry.max_attempts {
            let result = self
                .provider
                .fetch_listings(config)
                .await
                .map_err(CacheError::from)
                .and_then(|prices| {
                    if prices.is_empty() {
                        Err(CacheError::DecodeFailed(
                            "listings payload contained no quotes".to_string(),
                        ))
                    } else {
                        Ok(prices)
                    }
                });

            match result {
                Ok(prices) => return Ok(prices),
                Err(e) if attempt < self.retry.max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %e,
                        "Failed to fetch listings, retrying"
                    );
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(self.retry.max_backoff);
                }
                Err(e) => return Err(e),
            }
        }

        Err(CacheError::TransportFailed(
            "Max retries exceeded".to_string(),
        ))
    }

    /// USD price of `symbol`, or 0.0 when unknown
    pub async fn get_price(&self, symbol: &str) -> f64 {
        self.read(symbol, |r| r.price).await
    }

    /// 1 hour change in percent, or 0.0 when unknown
    pub async fn get_hour_change(&self, symbol: &str) -> f64 {
        self.read(symbol, |r| r.percent_change_1h).await
    }

    /// 24 hour change in percent, or 0.0 when unknown
    pub async fn get_24_hour_change(&self, symbol: &str) -> f64 {
        self.read(symbol, |r| r.percent_change_24h).await
    }

    pub async fn get_percent_changes(&self, symbol: &str) -> PercentChanges {
        self.read(symbol, PriceRecord::percent_changes).await
    }

    /// Full record for `symbol`
    pub async fn get_record(&self, symbol: &str) -> Option<PriceRecord> {
        self.state.read().await.prices.get(symbol).cloned()
    }

    /// Prices for several symbols taken from one consistent snapshot
    pub async fn get_prices<'a, I>(&self, symbols: I) -> HashMap<String, f64>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let state = self.state.read().await;
        symbols
            .into_iter()
            .map(|s| {
                let price = state.prices.get(s).map(|r| r.price).unwrap_or_default();
                (s.to_string(), price)
            })
            .collect()
    }

    /// Cached symbols, sorted
    pub async fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.state.read().await.prices.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.prices.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.prices.is_empty()
    }

    pub async fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.refreshed_at
    }

    /// Time since the last successful refresh
    pub async fn age(&self) -> Option<Duration> {
        self.last_refreshed()
            .await
            .map(|t| (Utc::now() - t).to_std().unwrap_or_default())
    }

    pub async fn last_config(&self) -> Option<ListingsConfig> {
        self.last_config.read().await.clone()
    }

    pub async fn stats(&self) -> RefreshStats {
        self.metrics.snapshot().await
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    async fn read<T: Default>(&self, symbol: &str, f: impl FnOnce(&PriceRecord) -> T) -> T {
        self.state
            .read()
            .await
            .prices
            .get(symbol)
            .map(f)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::{Failure, MockListings};

    fn config() -> ListingsConfig {
        ListingsConfig::new("https://listings.test/latest", "key", "X-CMC_PRO_API_KEY")
    }

    fn cache(mock: &Arc<MockListings>) -> PriceCache {
        PriceCache::new(mock.clone(), RetryPolicy::none())
    }

    #[tokio::test]
    async fn test_refresh_and_lookup() {
        let mock = MockListings::new();
        mock.push_prices(&[("A", 10.5), ("B", 0.25)]);
        let cache = cache(&mock);

        assert_eq!(cache.refresh(&config()).await.unwrap(), 2);
        assert_eq!(cache.get_price("A").await, 10.5);
        assert_eq!(cache.get_price("B").await, 0.25);
        assert_eq!(cache.get_price("C").await, 0.0);
        assert_eq!(cache.get_hour_change("A").await, 0.5);
        assert_eq!(cache.get_24_hour_change("A").await, -1.25);
        assert_eq!(cache.get_hour_change("C").await, 0.0);
        assert!(cache.get_record("C").await.is_none());
        assert!(cache.last_refreshed().await.is_some());
    }

    #[tokio::test]
    async fn test_refresh_drops_symbols_missing_from_new_payload() {
        let mock = MockListings::new();
        mock.push_prices(&[("A", 1.0), ("B", 2.0)]);
        mock.push_prices(&[("A", 1.5)]);
        let cache = cache(&mock);

        cache.refresh(&config()).await.unwrap();
        cache.refresh(&config()).await.unwrap();

        assert_eq!(cache.symbols().await, vec!["A".to_string()]);
        assert_eq!(cache.get_price("A").await, 1.5);
        assert_eq!(cache.get_price("B").await, 0.0);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_data() {
        let mock = MockListings::new();
        mock.push_prices(&[("A", 1.0), ("B", 2.0)]);
        mock.push_failure(Failure::Decode);
        mock.push_failure(Failure::Timeout);
        let cache = cache(&mock);
        let mut events = cache.subscribe();

        cache.refresh(&config()).await.unwrap();
        let refreshed_at = cache.last_refreshed().await;

        let err = cache.refresh(&config()).await.unwrap_err();
        assert!(matches!(err, CacheError::DecodeFailed(_)));
        let err = cache.refresh(&config()).await.unwrap_err();
        assert!(matches!(err, CacheError::TransportFailed(_)));

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get_price("B").await, 2.0);
        assert_eq!(cache.last_refreshed().await, refreshed_at);

        assert_eq!(events.recv().await.unwrap().event_type(), "PRICES_REFRESHED");
        assert_eq!(events.recv().await.unwrap().event_type(), "REFRESH_FAILED");

        let stats = cache.stats().await;
        assert_eq!(stats.failed_refreshes, 2);
        assert_eq!(stats.consecutive_failures, 2);
    }

    #[tokio::test]
    async fn test_empty_payload_is_rejected() {
        let mock = MockListings::new();
        mock.push_prices(&[("A", 1.0)]);
        mock.push_prices(&[]);
        let cache = cache(&mock);

        cache.refresh(&config()).await.unwrap();
        assert!(matches!(
            cache.refresh(&config()).await,
            Err(CacheError::DecodeFailed(_))
        ));
        assert_eq!(cache.get_price("A").await, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_backoff() {
        let mock = MockListings::new();
        mock.push_failure(Failure::Api);
        mock.push_failure(Failure::Timeout);
        mock.push_prices(&[("A", 3.0)]);

        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(150),
        };
        let cache = PriceCache::new(mock.clone(), policy);

        assert_eq!(cache.refresh(&config()).await.unwrap(), 1);
        assert_eq!(mock.call_count(), 3);
        assert_eq!(cache.get_price("A").await, 3.0);
    }

    #[tokio::test]
    async fn test_refresh_last_replays_captured_config() {
        let mock = MockListings::new();
        mock.push_failure(Failure::Api);
        mock.push_prices(&[("A", 1.0)]);
        let cache = cache(&mock);

        assert_eq!(cache.refresh_last().await.unwrap(), None);
        assert_eq!(mock.call_count(), 0);

        let custom = ListingsConfig::new("https://other.test", "k2", "X-Api-Key");
        assert!(cache.refresh(&custom).await.is_err());
        // Captured even though the call failed
        assert_eq!(cache.last_config().await, Some(custom.clone()));

        assert_eq!(cache.refresh_last().await.unwrap(), Some(1));
        assert_eq!(mock.last_config(), Some(custom));
    }

    #[tokio::test]
    async fn test_get_prices_snapshot() {
        let mock = MockListings::new();
        mock.push_prices(&[("ETH", 3000.0), ("DAI", 1.0)]);
        let cache = cache(&mock);
        cache.refresh(&config()).await.unwrap();

        let prices = cache.get_prices(["ETH", "DAI", "NOPE"]).await;
        assert_eq!(prices["ETH"], 3000.0);
        assert_eq!(prices["DAI"], 1.0);
        assert_eq!(prices["NOPE"], 0.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_simultaneous_refreshes_run_one_at_a_time() {
        let mock = MockListings::new();
        mock.push_prices(&[("A", 1.0)]);
        mock.push_prices(&[("A", 2.0)]);
        mock.push_prices(&[("A", 3.0)]);
        mock.set_delay(Duration::from_millis(50));
        let cache = Arc::new(cache(&mock));

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.refresh(&config()).await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 1);
        }

        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.max_in_flight(), 1);
        assert_eq!(cache.get_price("A").await, 3.0);
    }

    #[tokio::test]
    async fn test_cancelled_refresh_keeps_data_and_timestamp_together() {
        let mock = MockListings::new();
        mock.push_prices(&[("A", 1.0)]);
        mock.push_prices(&[("A", 2.0)]);
        let cache = cache(&mock);

        cache.refresh(&config()).await.unwrap();
        let first = cache.last_refreshed().await;

        mock.set_delay(Duration::from_millis(200));
        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), cache.refresh_last()).await;
        assert!(cancelled.is_err());
        assert_eq!(cache.get_price("A").await, 1.0);
        assert_eq!(cache.last_refreshed().await, first);

        mock.set_delay(Duration::from_millis(1));
        cache.refresh_last().await.unwrap();
        assert_eq!(cache.get_price("A").await, 2.0);
        assert!(cache.last_refreshed().await > first);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_never_exposes_partial_map() {
        let mock = MockListings::new();
        let full: Vec<(String, f64)> = (0..200).map(|i| (format!("S{}", i), 1.0)).collect();
        let half: Vec<(String, f64)> = (0..100).map(|i| (format!("S{}", i), 2.0)).collect();
        for round in 0..20 {
            let payload = if round % 2 == 0 { &full } else { &half };
            let refs: Vec<(&str, f64)> = payload.iter().map(|(s, p)| (s.as_str(), *p)).collect();
            mock.push_prices(&refs);
        }
        mock.set_delay(Duration::from_millis(1));

        let cache = Arc::new(cache(&mock));
        cache.refresh(&config()).await.unwrap();

        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for _ in 0..19 {
                    cache.refresh(&config()).await.unwrap();
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..200 {
                    let symbols = cache.symbols().await;
                    assert!(symbols.len() == 200 || symbols.len() == 100);

                    let prices = cache.get_prices(["S0", "S150"]).await;
                    // S150 only exists in the full payload, priced 1.0 alongside S0
                    if prices["S150"] != 0.0 {
                        assert_eq!(prices["S0"], 1.0);
                    } else {
                        assert_eq!(prices["S0"], 2.0);
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }
}
