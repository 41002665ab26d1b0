//! Provider abstractions for the three outbound calls
//!
//! The caches only talk to these traits, so tests drive them with the
//! mocks in [`mock`] and production wires in the HTTP implementations
//! from [`crate::providers`].

use crate::{
    config::ListingsConfig,
    error::ProviderError,
    types::{ExplorerSnapshot, PriceRecord},
};
use async_trait::async_trait;
use std::collections::HashMap;

/// Market-data source returning the full listings payload
#[async_trait]
pub trait ListingsProvider: Send + Sync {
    /// Fetches every listed coin, keyed by ticker symbol
    ///
    /// # Arguments
    /// * `config` - Endpoint, API key and key header to use for this call
    async fn fetch_listings(
        &self,
        config: &ListingsConfig,
    ) -> Result<HashMap<String, PriceRecord>, ProviderError>;

    /// Returns the name of this provider
    fn provider_name(&self) -> &'static str;
}

/// Block explorer returning per-address token balances
#[async_trait]
pub trait ExplorerProvider: Send + Sync {
    /// Fetches the token listing for an address
    async fn fetch_address_info(&self, address: &str) -> Result<ExplorerSnapshot, ProviderError>;

    /// Origin prepended to relative token image paths
    fn image_origin(&self) -> &str;

    fn provider_name(&self) -> &'static str;
}

/// Blockchain node answering native-asset balance queries
#[async_trait]
pub trait NativeBalanceProvider: Send + Sync {
    /// Balance in the smallest native unit at the latest block
    async fn fetch_native_balance(&self, address: &str) -> Result<u128, ProviderError>;

    fn provider_name(&self) -> &'static str;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::types::{TokenHoldingRecord, TokenQuote};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Failure a mock should produce
    ///
    /// `ProviderError` is not `Clone`, so mocks store this instead and
    /// build a fresh error on every call.
    #[derive(Debug, Clone, Copy)]
    pub enum Failure {
        Timeout,
        Decode,
        Api,
        Rpc,
    }

    impl Failure {
        fn to_error(self) -> ProviderError {
            match self {
                Failure::Timeout => ProviderError::Timeout,
                Failure::Decode => ProviderError::InvalidResponse("mock decode failure".into()),
                Failure::Api => ProviderError::ApiError("HTTP 500: mock".into()),
                Failure::Rpc => ProviderError::Rpc {
                    code: -32000,
                    message: "mock rpc failure".into(),
                },
            }
        }
    }

    pub fn price(value: f64) -> PriceRecord {
        PriceRecord {
            price: value,
            percent_change_1h: 0.5,
            percent_change_24h: -1.25,
            ..Default::default()
        }
    }

    /// Counts overlapping calls and remembers the highest overlap seen
    #[derive(Default)]
    pub struct InFlight {
        current: AtomicUsize,
        max: AtomicUsize,
    }

    impl InFlight {
        async fn track(&self, delay: Option<Duration>) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.current.fetch_sub(1, Ordering::SeqCst);
        }

        pub fn max(&self) -> usize {
            self.max.load(Ordering::SeqCst)
        }
    }

    pub fn token(symbol: &str, raw_balance: f64, website: &str) -> TokenHoldingRecord {
        TokenHoldingRecord {
            address: format!("0x{:0>40}", symbol.to_lowercase()),
            name: format!("{} Token", symbol),
            symbol: symbol.to_string(),
            raw_balance,
            decimals: 18,
            website: website.to_string(),
            image: format!("/images/{}.png", symbol.to_lowercase()),
            quote: TokenQuote {
                rate: 1.0,
                diff: 2.0,
                ..Default::default()
            },
        }
    }

    /// Listings mock that replays queued payloads, then repeats the last one
    #[derive(Default)]
    pub struct MockListings {
        responses: Mutex<VecDeque<Result<HashMap<String, PriceRecord>, Failure>>>,
        last: Mutex<Option<Result<HashMap<String, PriceRecord>, Failure>>>,
        calls: Mutex<Vec<ListingsConfig>>,
        delay: Mutex<Option<Duration>>,
        in_flight: InFlight,
    }

    impl MockListings {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn push_prices(&self, prices: &[(&str, f64)]) {
            let map = prices
                .iter()
                .map(|(sym, p)| (sym.to_string(), price(*p)))
                .collect();
            self.responses.lock().unwrap().push_back(Ok(map));
        }

        pub fn push_failure(&self, failure: Failure) {
            self.responses.lock().unwrap().push_back(Err(failure));
        }

        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock().unwrap() = Some(delay);
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn last_config(&self) -> Option<ListingsConfig> {
            self.calls.lock().unwrap().last().cloned()
        }

        pub fn max_in_flight(&self) -> usize {
            self.in_flight.max()
        }
    }

    #[async_trait]
    impl ListingsProvider for MockListings {
        async fn fetch_listings(
            &self,
            config: &ListingsConfig,
        ) -> Result<HashMap<String, PriceRecord>, ProviderError> {
            self.calls.lock().unwrap().push(config.clone());
            let delay = *self.delay.lock().unwrap();
            self.in_flight.track(delay).await;

            let next = {
                let mut responses = self.responses.lock().unwrap();
                let mut last = self.last.lock().unwrap();
                match responses.pop_front() {
                    Some(r) => {
                        *last = Some(r.clone());
                        Some(r)
                    }
                    None => last.clone(),
                }
            };

            match next {
                Some(Ok(prices)) => Ok(prices),
                Some(Err(failure)) => Err(failure.to_error()),
                None => Err(ProviderError::InvalidResponse("no mock listings".into())),
            }
        }

        fn provider_name(&self) -> &'static str {
            "mock-listings"
        }
    }

    /// Explorer mock returning a fixed token list
    #[derive(Default)]
    pub struct MockExplorer {
        tokens: Mutex<Vec<TokenHoldingRecord>>,
        native_quote: Mutex<Option<TokenQuote>>,
        failure: Mutex<Option<Failure>>,
        calls: Mutex<usize>,
        delay: Mutex<Option<Duration>>,
        in_flight: InFlight,
    }

    impl MockExplorer {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn set_tokens(&self, tokens: Vec<TokenHoldingRecord>) {
            *self.tokens.lock().unwrap() = tokens;
        }

        pub fn set_native_quote(&self, quote: TokenQuote) {
            *self.native_quote.lock().unwrap() = Some(quote);
        }

        pub fn set_failure(&self, failure: Option<Failure>) {
            *self.failure.lock().unwrap() = failure;
        }

        pub fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }

        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock().unwrap() = Some(delay);
        }

        pub fn max_in_flight(&self) -> usize {
            self.in_flight.max()
        }
    }

    #[async_trait]
    impl ExplorerProvider for MockExplorer {
        async fn fetch_address_info(
            &self,
            address: &str,
        ) -> Result<ExplorerSnapshot, ProviderError> {
            *self.calls.lock().unwrap() += 1;
            let delay = *self.delay.lock().unwrap();
            self.in_flight.track(delay).await;

            if let Some(failure) = *self.failure.lock().unwrap() {
                return Err(failure.to_error());
            }
            Ok(ExplorerSnapshot {
                address: address.to_string(),
                native_quote: self.native_quote.lock().unwrap().clone(),
                tokens: self.tokens.lock().unwrap().clone(),
            })
        }

        fn image_origin(&self) -> &str {
            "https://ethplorer.io"
        }

        fn provider_name(&self) -> &'static str {
            "mock-explorer"
        }
    }

    /// Node mock returning a fixed wei balance
    #[derive(Default)]
    pub struct MockNode {
        balance: Mutex<u128>,
        failure: Mutex<Option<Failure>>,
    }

    impl MockNode {
        pub fn new(balance: u128) -> Arc<Self> {
            let node = Self::default();
            *node.balance.lock().unwrap() = balance;
            Arc::new(node)
        }

        pub fn set_balance(&self, balance: u128) {
            *self.balance.lock().unwrap() = balance;
        }

        pub fn set_failure(&self, failure: Option<Failure>) {
            *self.failure.lock().unwrap() = failure;
        }
    }

    #[async_trait]
    impl NativeBalanceProvider for MockNode {
        async fn fetch_native_balance(&self, _address: &str) -> Result<u128, ProviderError> {
            if let Some(failure) = *self.failure.lock().unwrap() {
                return Err(failure.to_error());
            }
            Ok(*self.balance.lock().unwrap())
        }

        fn provider_name(&self) -> &'static str {
            "mock-node"
        }
    }
}
