//! Error types for the price and holdings caches

use thiserror::Error;

/// Errors that can occur during a single outbound call
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network request failed
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Invalid response from provider
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Provider API error
    #[error("Provider API error: {0}")]
    ApiError(String),

    /// Node returned a JSON-RPC error object
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Timeout waiting for response
    #[error("Request timeout")]
    Timeout,
}

impl ProviderError {
    /// Classifies a reqwest failure, pulling timeouts out of the generic case
    pub fn from_request(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::NetworkError(err)
        }
    }

    /// True when the failure happened before any response was received
    pub fn is_transport(&self) -> bool {
        match self {
            ProviderError::NetworkError(e) => !e.is_decode(),
            ProviderError::Timeout => true,
            _ => false,
        }
    }
}

/// Errors reported at the boundary of a public refresh operation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CacheError {
    /// Configuration file missing, unreadable or malformed
    #[error("Failed to load configuration: {0}")]
    ConfigLoadFailed(String),

    /// HTTP endpoint unreachable, timed out or answered with an error status
    #[error("Transport failed: {0}")]
    TransportFailed(String),

    /// Response body could not be decoded
    #[error("Failed to decode response: {0}")]
    DecodeFailed(String),

    /// Input rejected before any request was made
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Blockchain node could not be reached
    #[error("Node connection failed: {0}")]
    ConnectionFailed(String),

    /// Node answered but the balance could not be read
    #[error("Balance fetch failed: {0}")]
    BalanceFetchFailed(String),
}

impl CacheError {
    /// Creates a ValidationFailed error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationFailed(msg.into())
    }

    /// Creates a ConfigLoadFailed error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigLoadFailed(msg.into())
    }

    /// Maps a failed node call onto the native-balance error kinds
    pub fn from_node(err: ProviderError) -> Self {
        if err.is_transport() {
            Self::ConnectionFailed(err.to_string())
        } else {
            Self::BalanceFetchFailed(err.to_string())
        }
    }

    /// Short name of the error kind, used in events and logs
    pub fn kind(&self) -> &'static str {
        match self {
            CacheError::ConfigLoadFailed(_) => "config_load_failed",
            CacheError::TransportFailed(_) => "transport_failed",
            CacheError::DecodeFailed(_) => "decode_failed",
            CacheError::ValidationFailed(_) => "validation_failed",
            CacheError::ConnectionFailed(_) => "connection_failed",
            CacheError::BalanceFetchFailed(_) => "balance_fetch_failed",
        }
    }
}

impl From<ProviderError> for CacheError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidResponse(_) => Self::DecodeFailed(err.to_string()),
            ProviderError::NetworkError(ref e) if e.is_decode() => {
                Self::DecodeFailed(err.to_string())
            }
            _ => Self::TransportFailed(err.to_string()),
        }
    }
}
