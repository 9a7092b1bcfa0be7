// File: testing-framework/src/tier3_e2e/waiters.rs
//
// Cluster-wide waiters
//
// Convergence conditions spanning several nodes, built on the single-node
// polling primitive.

use dagnet_common::H256;
use futures::future::try_join_all;
use log::info;

use crate::tier2_integration::waiters::{wait_for_peer_count, WaitError, Waiter};
use crate::tier2_integration::NodeRpc;

/// Wait until every node reports the same best block hash and the same
/// block count. Nodes are probed concurrently.
///
/// Returns the agreed `(best hash, block count)`. An empty node list is
/// trivially in sync and returns `None`.
pub async fn sync_blocks<N: NodeRpc>(
    waiter: &Waiter,
    nodes: &[N],
) -> Result<Option<(H256, u64)>, WaitError> {
    if nodes.is_empty() {
        return Ok(None);
    }

    let views = waiter
        .until(
            &format!("{} nodes to agree on best block and block count", nodes.len()),
            || {
                try_join_all(nodes.iter().map(|node| async move {
                    let best = node.get_best_block_hash().await?;
                    let count = node.get_block_count().await?;
                    Ok::<_, anyhow::Error>((best, count))
                }))
            },
            |views| views.windows(2).all(|pair| pair[0] == pair[1]),
        )
        .await?;

    let agreed = views.first().copied();
    if let Some((best, count)) = agreed {
        info!("{} nodes in sync at {:#x} ({} blocks)", nodes.len(), best, count);
    }
    Ok(agreed)
}

/// Wait until every node has at least `min_peers` peers, one node at a time.
///
/// Each node gets the waiter's full budget.
pub async fn wait_all_peer_counts<N: NodeRpc>(
    waiter: &Waiter,
    nodes: &[N],
    min_peers: usize,
) -> Result<(), WaitError> {
    for node in nodes {
        wait_for_peer_count(waiter, node, min_peers).await?;
    }
    Ok(())
}

/// Wait until every node knows at least `count` blocks
pub async fn wait_all_block_counts<N: NodeRpc>(
    waiter: &Waiter,
    nodes: &[N],
    count: u64,
) -> Result<(), WaitError> {
    for node in nodes {
        crate::tier2_integration::waiters::wait_for_block_count(waiter, node, count).await?;
    }
    Ok(())
}
