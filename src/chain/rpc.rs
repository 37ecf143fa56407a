//! JSON-RPC Client Module
//!
//! Thin client for the `eth_*` JSON-RPC methods the SDK needs. One
//! [`RpcClient`] talks to one provider URL; rotation across providers lives in
//! [`super::ChainAccess`].

use std::time::Duration;

use ethereum_types::{Address, H256, U256, U64};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::abi::{decode_hex, encode_hex};
use crate::error::{Error, Result};

// ============================================================================
// API RESPONSE STRUCTURES
// ============================================================================

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Vec<serde_json::Value>,
    id: u64,
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

/// Event log entry of a receipt.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    /// Contract that emitted the event
    pub address: Address,
    /// topics[0] is the event signature hash, the rest are indexed arguments
    pub topics: Vec<H256>,
    /// ABI encoded non-indexed arguments (hex)
    pub data: String,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub transaction_hash: Option<H256>,
}

impl Log {
    pub fn data_bytes(&self) -> Result<Vec<u8>> {
        decode_hex(&self.data)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: H256,
    #[serde(default)]
    pub block_number: Option<U64>,
    /// 1 = success, 0 = reverted
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub logs: Vec<Log>,
}

impl TransactionReceipt {
    pub fn is_success(&self) -> bool {
        self.status.map_or(true, |status| !status.is_zero())
    }
}

/// Transaction details from `eth_getTransactionByHash`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: H256,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    pub nonce: U256,
    /// None while pending
    #[serde(default)]
    pub block_number: Option<U64>,
    pub input: String,
}

// ============================================================================
// RPC CLIENT IMPLEMENTATION
// ============================================================================

/// Client for one EVM JSON-RPC provider.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: Client,
    url: Url,
}

impl RpcClient {
    /// Creates a client for `url` with a 30 second request timeout.
    pub fn new(url: Url) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::http(url.as_str(), e))?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Sends one JSON-RPC request. A `null` result is returned as `None`.
    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<Option<T>> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };

        let response: JsonRpcResponse<T> = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::http(self.url.as_str(), e))?
            .json()
            .await
            .map_err(|e| Error::http(self.url.as_str(), e))?;

        if let Some(error) = response.error {
            return Err(Error::Rpc {
                url: self.url.to_string(),
                code: error.code,
                message: error.message,
            });
        }

        Ok(response.result)
    }

    async fn request_required<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<T> {
        self.request(method, params).await?.ok_or_else(|| Error::Rpc {
            url: self.url.to_string(),
            code: 0,
            message: format!("{} returned no result", method),
        })
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let id: U64 = self.request_required("eth_chainId", vec![]).await?;
        Ok(id.as_u64())
    }

    /// Executes a read-only call against the latest block.
    ///
    /// # Arguments
    ///
    /// * `from` - Optional caller address
    /// * `to` - Contract address
    /// * `data` - ABI encoded call data
    pub async fn call(&self, from: Option<Address>, to: Address, data: &[u8]) -> Result<Vec<u8>> {
        let mut call = serde_json::json!({ "to": to, "data": encode_hex(data) });
        if let Some(from) = from {
            call["from"] = serde_json::json!(from);
        }

        let result: String = self
            .request_required("eth_call", vec![call, serde_json::json!("latest")])
            .await?;
        decode_hex(&result)
    }

    /// Pending transaction count of `address`, used as the next nonce.
    pub async fn transaction_count(&self, address: Address) -> Result<U256> {
        self.request_required(
            "eth_getTransactionCount",
            vec![serde_json::json!(address), serde_json::json!("pending")],
        )
        .await
    }

    pub async fn gas_price(&self) -> Result<U256> {
        self.request_required("eth_gasPrice", vec![]).await
    }

    pub async fn estimate_gas(&self, from: Address, to: Address, data: &[u8]) -> Result<U256> {
        let call = serde_json::json!({ "from": from, "to": to, "data": encode_hex(data) });
        self.request_required("eth_estimateGas", vec![call]).await
    }

    /// Broadcasts a signed transaction and returns its hash.
    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<H256> {
        self.request_required("eth_sendRawTransaction", vec![serde_json::json!(encode_hex(raw))])
            .await
    }

    /// Returns `None` when the node does not know the transaction.
    pub async fn transaction(&self, hash: H256) -> Result<Option<Transaction>> {
        self.request("eth_getTransactionByHash", vec![serde_json::json!(hash)])
            .await
    }

    /// Returns `None` while the transaction is pending.
    pub async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>> {
        self.request("eth_getTransactionReceipt", vec![serde_json::json!(hash)])
            .await
    }
}
