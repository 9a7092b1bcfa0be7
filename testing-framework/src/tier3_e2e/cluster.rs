//! Cluster controller.
//!
//! Owns the nodes of one test network and sequences their lifecycle. The
//! bootnode (node 0) is always started first; every other node learns its
//! address through `--bootnodes`. The controller only orders process starts:
//! it never blocks on peer discovery, callers wait for that explicitly.

use std::ops::Range;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{info, warn};
use thiserror::Error;

use super::node::{ClusterNode, NodeArgs, NodeState, StopMode};
use super::peer::PeerLink;
use super::process::{LaunchConfig, ProcessNode};
use crate::orchestrator::TestRng;
use crate::tier2_integration::NodeRpc;
use crate::utilities::TempDataDir;
use dagnet_common::{crypto::KeyPair, message::StatusMessage};

/// Index of the bootnode
pub const BOOTNODE_INDEX: usize = 0;

/// Misuse of the cluster's node indices
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ClusterError {
    /// A cluster needs at least one node
    #[error("cluster has no nodes")]
    Empty,
    /// No node at that index
    #[error("node index {index} out of range for a cluster of {len}")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Cluster size
        len: usize,
    },
    /// A node range whose start lies past its end
    #[error("node range {start}..{end} is inverted")]
    InvertedRange {
        /// Range start
        start: usize,
        /// Range end
        end: usize,
    },
}

/// An ordered set of nodes with node 0 as the bootnode.
pub struct Cluster {
    nodes: Vec<Box<dyn ClusterNode>>,
    // Arguments each node was last started with
    last_args: Vec<Option<NodeArgs>>,
    // Keeps node data alive while the cluster exists
    data_dir: Option<TempDataDir>,
}

impl Cluster {
    /// Cluster over already constructed nodes, all stopped.
    pub fn new(nodes: Vec<Box<dyn ClusterNode>>) -> Result<Self, ClusterError> {
        if nodes.is_empty() {
            return Err(ClusterError::Empty);
        }
        let last_args = vec![None; nodes.len()];
        Ok(Self {
            nodes,
            last_args,
            data_dir: None,
        })
    }

    /// Tie a data directory's lifetime to the cluster
    pub fn with_data_dir(mut self, data_dir: TempDataDir) -> Self {
        self.data_dir = Some(data_dir);
        self
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; a cluster has at least one node
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn check_index(&self, index: usize) -> Result<(), ClusterError> {
        if index >= self.nodes.len() {
            return Err(ClusterError::IndexOutOfRange {
                index,
                len: self.nodes.len(),
            });
        }
        Ok(())
    }

    /// Node at `index`
    pub fn node(&self, index: usize) -> Result<&dyn ClusterNode, ClusterError> {
        self.check_index(index)?;
        Ok(self.nodes[index].as_ref())
    }

    /// RPC view of node `index`
    pub fn rpc(&self, index: usize) -> Result<&dyn NodeRpc, ClusterError> {
        Ok(self.node(index)?.rpc())
    }

    /// RPC views of the nodes in `range`, in index order
    pub fn rpcs(&self, range: Range<usize>) -> Result<Vec<&dyn NodeRpc>, ClusterError> {
        if range.start > range.end {
            return Err(ClusterError::InvertedRange {
                start: range.start,
                end: range.end,
            });
        }
        if range.end > self.nodes.len() {
            return Err(ClusterError::IndexOutOfRange {
                index: range.end.saturating_sub(1),
                len: self.nodes.len(),
            });
        }
        Ok(self.nodes[range].iter().map(|node| node.rpc()).collect())
    }

    /// RPC views of every node
    pub fn all_rpcs(&self) -> Vec<&dyn NodeRpc> {
        self.nodes.iter().map(|node| node.rpc()).collect()
    }

    /// Indices of running nodes
    pub fn running(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .filter(|node| node.state() == NodeState::Running)
            .map(|node| node.index())
            .collect()
    }

    /// Advertised URL of the bootnode
    pub fn bootnode_url(&self) -> String {
        self.nodes[BOOTNODE_INDEX].identity().node_url()
    }

    /// Arguments node `index` was last started with
    pub fn last_args(&self, index: usize) -> Option<&NodeArgs> {
        self.last_args.get(index).and_then(Option::as_ref)
    }

    /// Start the bootnode with `extra_args`, then every other node with
    /// `--bootnodes <bootnode url>` followed by the same `extra_args`.
    ///
    /// Returns once each process answers RPC; peer discovery is not awaited.
    pub async fn bootstrap(&mut self, extra_args: &NodeArgs) -> Result<()> {
        self.start_node(BOOTNODE_INDEX, Some(extra_args))
            .await
            .context("Failed to start bootnode")?;

        let bootnode = self.bootnode_url();
        info!("bootnode up at {}", bootnode);
        let follower_args = NodeArgs::new().flag("--bootnodes", bootnode).extend(extra_args);

        for index in 1..self.nodes.len() {
            self.start_node(index, Some(&follower_args))
                .await
                .with_context(|| format!("Failed to start node {}", index))?;
        }
        Ok(())
    }

    /// Start node `index`.
    ///
    /// Without `args` the node restarts with whatever it was last started
    /// with, or with no extra arguments on its first start.
    pub async fn start_node(&mut self, index: usize, args: Option<&NodeArgs>) -> Result<()> {
        self.check_index(index)?;
        let args = match args {
            Some(args) => args.clone(),
            None => self.last_args[index].clone().unwrap_or_default(),
        };
        self.nodes[index].start(&args).await?;
        self.last_args[index] = Some(args);
        Ok(())
    }

    /// Graceful stop of node `index`
    pub async fn stop_node(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.nodes[index].stop(StopMode::Graceful).await?;
        Ok(())
    }

    /// Kill node `index` without shutdown; simulates a crash
    pub async fn kill_node(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.nodes[index].stop(StopMode::Kill).await?;
        Ok(())
    }

    /// Open a raw peer link to node `index`, announcing `status`
    pub async fn connect_peer(
        &self,
        index: usize,
        status: StatusMessage,
    ) -> Result<Box<dyn PeerLink>> {
        self.check_index(index)?;
        self.nodes[index]
            .connect_peer(status)
            .await
            .with_context(|| format!("Failed to connect a peer to node {}", index))
    }

    /// Keep node data on disk after the cluster is dropped.
    ///
    /// Returns the data root, or `None` when the cluster does not own one.
    pub fn keep_data(&mut self) -> Option<PathBuf> {
        self.data_dir.take().map(TempDataDir::keep)
    }

    /// Kill every running node. Safe to call more than once.
    pub async fn teardown(&mut self) -> Result<()> {
        let mut first_error = None;
        for node in self.nodes.iter_mut() {
            if node.state() == NodeState::Running {
                if let Err(e) = node.stop(StopMode::Kill).await {
                    warn!("teardown of node {} failed: {}", node.index(), e);
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

/// Builds a cluster of local node processes.
///
/// # Example
///
/// ```rust,ignore
/// let mut cluster = ClusterBuilder::new(launch)
///     .with_nodes(8)
///     .build(&env.rng)?;
/// cluster.bootstrap(&extra_args).await?;
/// ```
pub struct ClusterBuilder {
    launch: LaunchConfig,
    node_count: usize,
}

impl ClusterBuilder {
    /// Builder launching nodes per `launch`, one node by default
    pub fn new(launch: LaunchConfig) -> Self {
        Self {
            launch,
            node_count: 1,
        }
    }

    /// Number of nodes
    pub fn with_nodes(mut self, node_count: usize) -> Self {
        self.node_count = node_count;
        self
    }

    /// Create node identities from `rng` and data directories under a fresh
    /// temporary root. No process is started.
    pub fn build(self, rng: &TestRng) -> Result<Cluster> {
        let data_dir = TempDataDir::new()?;
        let mut nodes: Vec<Box<dyn ClusterNode>> = Vec::with_capacity(self.node_count);
        for index in 0..self.node_count {
            let key = rng.with_rng(|r| KeyPair::random(r));
            let node = ProcessNode::new(index, key, self.launch.clone(), data_dir.node_dir(index)?)?;
            nodes.push(Box::new(node));
        }
        Ok(Cluster::new(nodes)?.with_data_dir(data_dir))
    }
}
