// File: testing-framework/src/prelude.rs
//
// Everything a scenario usually needs in one import.

pub use crate::orchestrator::{Clock, DeterministicTestEnv, PausedClock, SystemClock, TestRng};
pub use crate::tier2_integration::rpc_helpers::{
    assert_balance, assert_block_count, assert_min_peers, assert_transaction_packaged,
};
pub use crate::tier2_integration::waiters::{
    wait_for_balance, wait_for_block_count, wait_for_peer_count, wait_for_receipt,
};
pub use crate::tier2_integration::{
    BlockSummary, EpochTag, JsonRpcClient, NodeRpc, PeerInfo, TransactionReceipt, WaitError,
    Waiter,
};
pub use crate::tier3_e2e::{
    discovery_args, sync_blocks, Cluster, ClusterBuilder, ClusterNode, CrashRecoveryConfig,
    CrashRecoveryScenario, LaunchConfig, NodeArgs, NodeIdentity, NodeState, PeerLink,
    ScenarioReport, StopMode,
};
pub use crate::utilities::TempDataDir;

pub use dagnet_common::config::GenesisConfig;
pub use dagnet_common::{H160, H256, U256};
