// File: testing-framework/src/tier3_e2e/mod.rs
//
// Tier 3 E2E Testing Components
//
// Multi-node clusters: node processes and their lifecycle, the controller
// sequencing them, raw peer links, cluster-wide waiters and the
// crash-recovery scenario built from all of them.

/// Cluster controller and process cluster builder
pub mod cluster;
/// Crash-recovery scenario driver
pub mod crash_recovery;
/// Cluster member trait, identities and launch arguments
pub mod node;
/// Raw peer-protocol link
pub mod peer;
/// Nodes backed by local OS processes
pub mod process;
/// Waiters spanning several nodes
pub mod waiters;

pub use cluster::{Cluster, ClusterBuilder, ClusterError, BOOTNODE_INDEX};
pub use crash_recovery::{
    discovery_args, CrashRecoveryConfig, CrashRecoveryScenario, ScenarioReport, Step,
};
pub use node::{ClusterNode, NodeArgs, NodeError, NodeIdentity, NodeState, StopMode};
pub use peer::{PeerError, PeerLink, TcpPeerLink};
pub use process::{LaunchConfig, ProcessNode};
pub use waiters::{sync_blocks, wait_all_block_counts, wait_all_peer_counts};
