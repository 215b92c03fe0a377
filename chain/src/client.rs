//! JSON-RPC access to an EVM node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::U64;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tally_types::TxHash;

use crate::error::ChainError;
use crate::receipt::{Receipt, RpcReceipt};

/// Default timeout for a single JSON-RPC request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Read-only view of the chain needed to verify a deposit.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Receipt of a mined transaction, or `None` when the node does not know
    /// it (not yet mined, dropped, or never existed).
    async fn get_receipt(&self, tx_hash: &TxHash) -> Result<Option<Receipt>, ChainError>;

    /// Number of the latest block.
    async fn block_height(&self) -> Result<u64, ChainError>;
}

/// [`ChainClient`] over HTTP JSON-RPC.
///
/// Construct once and share; the inner `reqwest::Client` keeps a connection
/// pool.
pub struct JsonRpcChainClient {
    endpoint: String,
    http_client: reqwest::Client,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

impl JsonRpcChainClient {
    /// Create a client for `endpoint` with the default request timeout.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ChainError> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom per-request timeout.
    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ChainError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(|e| ChainError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            http_client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Perform one JSON-RPC call. A `null` result is `Ok(None)`.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ChainError::Unavailable(format!("request timed out: {e}"))
                } else if e.is_connect() {
                    ChainError::Unavailable(format!("connection failed: {e}"))
                } else {
                    ChainError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ChainError::RateLimited);
        }
        if !status.is_success() {
            return Err(ChainError::Http(status.as_u16()));
        }

        let payload: JsonRpcResponse<T> = response.json().await.map_err(|e| {
            ChainError::InvalidResponse(format!("failed to parse {method} response: {e}"))
        })?;

        if let Some(err) = payload.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(payload.result)
    }
}

#[async_trait]
impl ChainClient for JsonRpcChainClient {
    async fn get_receipt(&self, tx_hash: &TxHash) -> Result<Option<Receipt>, ChainError> {
        let raw: Option<RpcReceipt> = self
            .call("eth_getTransactionReceipt", json!([tx_hash.to_hex()]))
            .await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        if raw.transaction_hash.0 != *tx_hash.as_bytes() {
            return Err(ChainError::InvalidResponse(format!(
                "receipt for {} returned for {tx_hash}",
                TxHash::new(raw.transaction_hash.0)
            )));
        }
        Ok(raw.into_receipt())
    }

    async fn block_height(&self) -> Result<u64, ChainError> {
        let height: Option<U64> = self.call("eth_blockNumber", json!([])).await?;
        height
            .map(|h| h.to::<u64>())
            .ok_or_else(|| ChainError::InvalidResponse("eth_blockNumber returned null".into()))
    }
}
