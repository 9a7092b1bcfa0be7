// File: testing-framework/src/tier2_integration/mod.rs
//
// Tier 2 Integration Testing Components
//
// The RPC view of a single node: the trait the rest of the framework talks
// through, a JSON-RPC client implementing it, assertion helpers and the
// polling waiters built on top.

/// Assertion helpers over `NodeRpc`
pub mod rpc_helpers;
/// JSON-RPC over HTTP implementation of `NodeRpc`
pub mod rpc_client;
/// Waiter primitives for waiting on node state changes
pub mod waiters;

pub use rpc_client::{JsonRpcClient, RpcError};
pub use waiters::{WaitError, Waiter};

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use dagnet_common::{H160, H256, U256};
use serde::{Deserialize, Serialize};

/// Epoch selector for block lookups
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpochTag {
    /// Epoch at a given number; `Number(0)` is genesis
    Number(u64),
    /// Latest epoch the node has mined
    LatestMined,
    /// Latest epoch with executed state
    LatestState,
}

impl fmt::Display for EpochTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpochTag::Number(n) => write!(f, "{:#x}", n),
            EpochTag::LatestMined => f.write_str("latest_mined"),
            EpochTag::LatestState => f.write_str("latest_state"),
        }
    }
}

/// Part of a block the harness reads back over RPC
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    /// Block hash
    pub hash: H256,
    /// Parent block hash
    pub parent_hash: H256,
    /// Height in the DAG
    pub height: u64,
    /// Epoch the block was ordered into, if any
    pub epoch_number: Option<u64>,
}

/// One entry of `getpeerinfo`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Peer node id, if reported
    pub id: Option<String>,
    /// Peer socket address, if reported
    pub addr: Option<String>,
}

/// Receipt of a packaged transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    /// Transaction the receipt belongs to
    pub transaction_hash: H256,
    /// Block the transaction was packaged in
    pub block_hash: H256,
    /// Epoch of that block
    pub epoch_number: Option<u64>,
    /// Execution outcome, 0 for success
    pub outcome_status: u64,
}

/// RPC operations the harness needs from a node.
///
/// Implemented over HTTP by [`JsonRpcClient`] and by in-memory nodes in
/// tests.
#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// Mine `count` empty blocks; returns their hashes.
    async fn generate_empty_blocks(&self, count: u64) -> Result<Vec<H256>>;

    /// Mine one block packing up to `num_txs` pool transactions.
    async fn generate_block(&self, num_txs: u64) -> Result<H256>;

    /// Balance of `address` at the latest executed state.
    async fn get_balance(&self, address: &H160) -> Result<U256>;

    /// Pivot block of an epoch.
    async fn get_block_by_epoch(&self, epoch: EpochTag) -> Result<BlockSummary>;

    /// Currently connected peers.
    async fn get_peer_info(&self) -> Result<Vec<PeerInfo>>;

    /// Receipt of `tx_hash`, `None` until the transaction is executed.
    async fn get_transaction_receipt(&self, tx_hash: &H256) -> Result<Option<TransactionReceipt>>;

    /// Number of blocks the node knows, genesis included.
    async fn get_block_count(&self) -> Result<u64>;

    /// Hash of the node's best block.
    async fn get_best_block_hash(&self) -> Result<H256>;
}

#[async_trait]
impl<T: NodeRpc + ?Sized> NodeRpc for &T {
    async fn generate_empty_blocks(&self, count: u64) -> Result<Vec<H256>> {
        (**self).generate_empty_blocks(count).await
    }

    async fn generate_block(&self, num_txs: u64) -> Result<H256> {
        (**self).generate_block(num_txs).await
    }

    async fn get_balance(&self, address: &H160) -> Result<U256> {
        (**self).get_balance(address).await
    }

    async fn get_block_by_epoch(&self, epoch: EpochTag) -> Result<BlockSummary> {
        (**self).get_block_by_epoch(epoch).await
    }

    async fn get_peer_info(&self) -> Result<Vec<PeerInfo>> {
        (**self).get_peer_info().await
    }

    async fn get_transaction_receipt(&self, tx_hash: &H256) -> Result<Option<TransactionReceipt>> {
        (**self).get_transaction_receipt(tx_hash).await
    }

    async fn get_block_count(&self) -> Result<u64> {
        (**self).get_block_count().await
    }

    async fn get_best_block_hash(&self) -> Result<H256> {
        (**self).get_best_block_hash().await
    }
}

#[async_trait]
impl<T: NodeRpc + ?Sized> NodeRpc for Arc<T> {
    async fn generate_empty_blocks(&self, count: u64) -> Result<Vec<H256>> {
        (**self).generate_empty_blocks(count).await
    }

    async fn generate_block(&self, num_txs: u64) -> Result<H256> {
        (**self).generate_block(num_txs).await
    }

    async fn get_balance(&self, address: &H160) -> Result<U256> {
        (**self).get_balance(address).await
    }

    async fn get_block_by_epoch(&self, epoch: EpochTag) -> Result<BlockSummary> {
        (**self).get_block_by_epoch(epoch).await
    }

    async fn get_peer_info(&self) -> Result<Vec<PeerInfo>> {
        (**self).get_peer_info().await
    }

    async fn get_transaction_receipt(&self, tx_hash: &H256) -> Result<Option<TransactionReceipt>> {
        (**self).get_transaction_receipt(tx_hash).await
    }

    async fn get_block_count(&self) -> Result<u64> {
        (**self).get_block_count().await
    }

    async fn get_best_block_hash(&self) -> Result<H256> {
        (**self).get_best_block_hash().await
    }
}
