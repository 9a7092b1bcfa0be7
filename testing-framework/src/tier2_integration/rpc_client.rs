//! JSON-RPC 2.0 client for a node's local HTTP endpoint.
//!
//! Quantities come back either as JSON numbers or as `0x` hex strings
//! depending on the method; [`parse_quantity`] accepts both.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use dagnet_common::{H160, H256, U256};
use log::trace;
use serde_json::{json, Value};
use thiserror::Error;

use super::{BlockSummary, EpochTag, NodeRpc, PeerInfo, TransactionReceipt};

/// Largest block the node is asked to pack in `generateoneblock`
pub const BLOCK_SIZE_LIMIT: u64 = 300_000;

/// Per-request HTTP timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Failures of a single RPC exchange
#[derive(Error, Debug)]
pub enum RpcError {
    /// The node answered with a JSON-RPC error object
    #[error("RPC error from {method}: {error}")]
    Remote {
        /// Method that failed
        method: String,
        /// Error object returned by the node
        error: Value,
    },
    /// The response had neither `result` nor `error`
    #[error("no result in response to {0}")]
    MissingResult(String),
    /// A field of the result could not be interpreted
    #[error("unexpected value for {field}: {value}")]
    UnexpectedValue {
        /// Field being decoded
        field: String,
        /// Value found there
        value: Value,
    },
}

/// Parse a quantity given as a JSON number or `0x` hex string
pub fn parse_quantity(field: &str, value: &Value) -> Result<U256, RpcError> {
    let unexpected = || RpcError::UnexpectedValue {
        field: field.to_string(),
        value: value.clone(),
    };
    match value {
        Value::Number(n) => n.as_u64().map(U256::from).ok_or_else(unexpected),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex) if !hex.is_empty() => U256::from_str_radix(hex, 16).map_err(|_| unexpected()),
            Some(_) => Err(unexpected()),
            None => U256::from_dec_str(s).map_err(|_| unexpected()),
        },
        _ => Err(unexpected()),
    }
}

fn parse_u64(field: &str, value: &Value) -> Result<u64, RpcError> {
    let quantity = parse_quantity(field, value)?;
    if quantity > U256::from(u64::MAX) {
        return Err(RpcError::UnexpectedValue {
            field: field.to_string(),
            value: value.clone(),
        });
    }
    Ok(quantity.low_u64())
}

fn parse_hash(field: &str, value: &Value) -> Result<H256, RpcError> {
    serde_json::from_value(value.clone()).map_err(|_| RpcError::UnexpectedValue {
        field: field.to_string(),
        value: value.clone(),
    })
}

fn parse_block_summary(value: &Value) -> Result<BlockSummary, RpcError> {
    let field = |name: &str| value.get(name).cloned().unwrap_or(Value::Null);
    let epoch_number = match field("epochNumber") {
        Value::Null => None,
        epoch => Some(parse_u64("epochNumber", &epoch)?),
    };
    Ok(BlockSummary {
        hash: parse_hash("hash", &field("hash"))?,
        parent_hash: parse_hash("parentHash", &field("parentHash"))?,
        height: parse_u64("height", &field("height"))?,
        epoch_number,
    })
}

fn parse_receipt(value: &Value) -> Result<TransactionReceipt, RpcError> {
    let field = |name: &str| value.get(name).cloned().unwrap_or(Value::Null);
    let epoch_number = match field("epochNumber") {
        Value::Null => None,
        epoch => Some(parse_u64("epochNumber", &epoch)?),
    };
    Ok(TransactionReceipt {
        transaction_hash: parse_hash("transactionHash", &field("transactionHash"))?,
        block_hash: parse_hash("blockHash", &field("blockHash"))?,
        epoch_number,
        outcome_status: parse_u64("outcomeStatus", &field("outcomeStatus"))?,
    })
}

/// HTTP JSON-RPC client bound to one node
pub struct JsonRpcClient {
    client: reqwest::Client,
    url: String,
    request_id: AtomicU64,
}

impl JsonRpcClient {
    /// Client for `url`, e.g. `http://127.0.0.1:12539`
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
            request_id: AtomicU64::new(1),
        })
    }

    /// Endpoint this client talks to
    pub fn url(&self) -> &str {
        &self.url
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Send one request and return its `result`
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": self.next_id(),
            "method": method,
            "params": params,
        });
        trace!("-> {} {}", self.url, request);

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request to {}", method, self.url))?;

        let body: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;
        trace!("<- {} {}", self.url, body);

        if let Some(error) = body.get("error") {
            if !error.is_null() {
                return Err(RpcError::Remote {
                    method: method.to_string(),
                    error: error.clone(),
                }
                .into());
            }
        }

        body.get("result")
            .cloned()
            .ok_or_else(|| RpcError::MissingResult(method.to_string()).into())
    }

    /// Ask the node to shut down gracefully
    pub async fn stop_node(&self) -> Result<()> {
        self.call("stop", json!([])).await.map(|_| ())
    }
}

#[async_trait]
impl NodeRpc for JsonRpcClient {
    async fn generate_empty_blocks(&self, count: u64) -> Result<Vec<H256>> {
        let result = self.call("generate_empty_blocks", json!([count])).await?;
        let hashes = result
            .as_array()
            .ok_or_else(|| RpcError::UnexpectedValue {
                field: "generate_empty_blocks".to_string(),
                value: result.clone(),
            })?;
        Ok(hashes
            .iter()
            .map(|h| parse_hash("block hash", h))
            .collect::<Result<Vec<H256>, RpcError>>()?)
    }

    async fn generate_block(&self, num_txs: u64) -> Result<H256> {
        let result = self
            .call("generateoneblock", json!([num_txs, BLOCK_SIZE_LIMIT]))
            .await?;
        Ok(parse_hash("block hash", &result)?)
    }

    async fn get_balance(&self, address: &H160) -> Result<U256> {
        let result = self
            .call(
                "cfx_getBalance",
                json!([format!("{:#x}", address), EpochTag::LatestState.to_string()]),
            )
            .await?;
        Ok(parse_quantity("balance", &result)?)
    }

    async fn get_block_by_epoch(&self, epoch: EpochTag) -> Result<BlockSummary> {
        let result = self
            .call("cfx_getBlockByEpochNumber", json!([epoch.to_string(), false]))
            .await?;
        if result.is_null() {
            anyhow::bail!("No block at epoch {}", epoch);
        }
        Ok(parse_block_summary(&result)?)
    }

    async fn get_peer_info(&self) -> Result<Vec<PeerInfo>> {
        let result = self.call("getpeerinfo", json!([])).await?;
        let peers = result.as_array().cloned().unwrap_or_default();
        Ok(peers
            .iter()
            .map(|peer| PeerInfo {
                id: peer.get("id").and_then(Value::as_str).map(str::to_string),
                addr: peer.get("addr").and_then(Value::as_str).map(str::to_string),
            })
            .collect())
    }

    async fn get_transaction_receipt(&self, tx_hash: &H256) -> Result<Option<TransactionReceipt>> {
        let result = self
            .call("cfx_getTransactionReceipt", json!([format!("{:#x}", tx_hash)]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(parse_receipt(&result)?))
    }

    async fn get_block_count(&self) -> Result<u64> {
        let result = self.call("getblockcount", json!([])).await?;
        Ok(parse_u64("block count", &result)?)
    }

    async fn get_best_block_hash(&self) -> Result<H256> {
        let result = self.call("cfx_getBestBlockHash", json!([])).await?;
        Ok(parse_hash("best block hash", &result)?)
    }
}
