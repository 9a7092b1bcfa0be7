//! RPC assertion helpers for integration testing
//!
//! One-shot checks over `NodeRpc`. For values that converge over time use
//! the waiters instead.

use crate::tier2_integration::NodeRpc;
use anyhow::{Context, Result};
use dagnet_common::{H160, H256, U256};

/// Assert that account has expected balance
///
/// # Errors
///
/// Returns an error if:
/// - RPC call fails
/// - Actual balance doesn't match expected
///
/// # Example
///
/// ```rust,ignore
/// assert_balance(&node, &receiver, U256::one()).await?;
/// ```
pub async fn assert_balance<N: NodeRpc + ?Sized>(
    node: &N,
    address: &H160,
    expected_balance: U256,
) -> Result<()> {
    let actual = node
        .get_balance(address)
        .await
        .with_context(|| format!("Failed to get balance for address {:#x}", address))?;

    if actual != expected_balance {
        anyhow::bail!(
            "Balance mismatch for address {:#x}: expected {}, got {}",
            address,
            expected_balance,
            actual
        );
    }

    Ok(())
}

/// Assert that node knows exactly `expected` blocks, genesis included
pub async fn assert_block_count<N: NodeRpc + ?Sized>(node: &N, expected: u64) -> Result<()> {
    let actual = node
        .get_block_count()
        .await
        .context("Failed to get block count")?;

    if actual != expected {
        anyhow::bail!("Block count mismatch: expected {}, got {}", expected, actual);
    }

    Ok(())
}

/// Assert that a transaction has been executed.
///
/// Returns the hash of the block that packaged it.
pub async fn assert_transaction_packaged<N: NodeRpc + ?Sized>(
    node: &N,
    tx_hash: &H256,
) -> Result<H256> {
    let receipt = node
        .get_transaction_receipt(tx_hash)
        .await
        .with_context(|| format!("Failed to get receipt for {:#x}", tx_hash))?;

    match receipt {
        Some(receipt) => Ok(receipt.block_hash),
        None => anyhow::bail!("Transaction {:#x} has not been packaged", tx_hash),
    }
}

/// Whether a transaction has a receipt yet
pub async fn is_transaction_packaged<N: NodeRpc + ?Sized>(node: &N, tx_hash: &H256) -> Result<bool> {
    Ok(node.get_transaction_receipt(tx_hash).await?.is_some())
}

/// Assert that node has at least `min_peers` peers
pub async fn assert_min_peers<N: NodeRpc + ?Sized>(node: &N, min_peers: usize) -> Result<()> {
    let peers = node
        .get_peer_info()
        .await
        .context("Failed to get peer info")?;

    if peers.len() < min_peers {
        anyhow::bail!(
            "Too few peers: expected at least {}, got {}",
            min_peers,
            peers.len()
        );
    }

    Ok(())
}
