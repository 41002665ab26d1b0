//! Ethereum JSON-RPC node provider for native balances

use crate::{
    constants::USER_AGENT, error::ProviderError, provider::NativeBalanceProvider,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    #[serde(default)]
    message: String,
}

/// Parses an `eth_getBalance` quantity (`0x`-prefixed hex, no leading zeros)
pub fn parse_quantity(quantity: &str) -> Result<u128, ProviderError> {
    let digits = quantity
        .strip_prefix("0x")
        .or_else(|| quantity.strip_prefix("0X"))
        .ok_or_else(|| ProviderError::InvalidResponse(format!("not a hex quantity: {}", quantity)))?;

    if digits.is_empty() {
        return Err(ProviderError::InvalidResponse("empty hex quantity".to_string()));
    }

    u128::from_str_radix(digits, 16)
        .map_err(|e| ProviderError::InvalidResponse(format!("bad quantity {}: {}", quantity, e)))
}

/// Decodes a JSON-RPC response body into a wei balance
pub fn parse_balance_response(body: &str) -> Result<u128, ProviderError> {
    let response: RpcResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::InvalidResponse(format!("Failed to parse RPC response: {}", e))
    })?;

    if let Some(err) = response.error {
        return Err(ProviderError::Rpc {
            code: err.code,
            message: err.message,
        });
    }

    let result = response
        .result
        .ok_or_else(|| ProviderError::InvalidResponse("RPC response has no result".to_string()))?;

    parse_quantity(&result)
}

/// Reads native balances with `eth_getBalance` at the latest block
pub struct NodeRpcProvider {
    client: Client,
    rpc_url: String,
}

impl NodeRpcProvider {
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ProviderError::NetworkError)?;

        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
        })
    }
}

#[async_trait]
impl NativeBalanceProvider for NodeRpcProvider {
    async fn fetch_native_balance(&self, address: &str) -> Result<u128, ProviderError> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getBalance",
            "params": [address, "latest"]
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(ProviderError::from_request)?;

        if !response.status().is_success() {
            return Err(ProviderError::ApiError(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let body = response.text().await.map_err(ProviderError::from_request)?;
        let balance = parse_balance_response(&body)?;

        tracing::debug!(address, wei = %balance, "Fetched native balance");
        Ok(balance)
    }

    fn provider_name(&self) -> &'static str {
        "node-rpc"
    }
}
