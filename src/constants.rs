//! Constants for the price and holdings caches
//!
//! Compile-time defaults. Anything an operator may want to change is
//! mirrored by a field in [`crate::config::Config`] that falls back to
//! the value here.

/// How often the refresh loop re-pulls listings (in seconds)
pub const REFRESH_INTERVAL_SECS: u64 = 300;

/// HTTP/RPC request timeout (in seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Maximum number of attempts for a listings fetch
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Initial backoff delay for retries (in milliseconds)
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum backoff delay for retries (in milliseconds)
pub const MAX_BACKOFF_MS: u64 = 30000;

/// Listings query: first rank to return
pub const LISTINGS_START: u32 = 1;

/// Listings query: number of coins to return
pub const LISTINGS_LIMIT: u32 = 5000;

/// Listings query: quote currency
pub const LISTINGS_CONVERT: &str = "USD";

/// Default header carrying the market-data API key
pub const DEFAULT_API_KEY_HEADER: &str = "X-CMC_PRO_API_KEY";

/// Explorer API base URL
pub const EXPLORER_API_URL: &str = "https://api.ethplorer.io";

/// Origin prepended to relative token image paths
pub const EXPLORER_IMAGE_ORIGIN: &str = "https://ethplorer.io";

/// Public explorer key used when none is configured
pub const EXPLORER_FREE_KEY: &str = "freekey";

/// Ethereum node JSON-RPC endpoint
pub const NODE_RPC_URL: &str = "http://127.0.0.1:8545";

/// Shortest address accepted by the holdings refresh
pub const MIN_ADDRESS_LEN: usize = 20;

/// Longest address accepted by the holdings refresh
pub const MAX_ADDRESS_LEN: usize = 42;

/// Native asset ticker
pub const NATIVE_SYMBOL: &str = "ETH";

/// Native asset display name
pub const NATIVE_NAME: &str = "Ethereum";

/// Native asset website
pub const NATIVE_WEBSITE: &str = "https://ethereum.org/";

/// Native asset image (absolute, served as-is)
pub const NATIVE_IMAGE_URL: &str = "https://ethplorer.io/images/eth.png";

/// Decimal places of the native asset (wei per ether)
pub const NATIVE_DECIMALS: u32 = 18;

/// Decimal places assumed when token metadata does not report any
pub const DEFAULT_TOKEN_DECIMALS: u32 = 18;

/// Capacity of the cache event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// User agent for HTTP requests
pub const USER_AGENT: &str = "market-holdings-sdk/0.1.0";
