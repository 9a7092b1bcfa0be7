//! Crash-recovery scenario.
//!
//! Drives a cluster through an ungraceful kill of the bootnode, injects a
//! transfer straight into its peer-message path and checks that the
//! committed balances survive both cache eviction and a second kill.
//!
//! Steps:
//!
//! 1. bootstrap the cluster and wait for peer discovery
//! 2. mine the initial blocks from random nodes and sync
//! 3. kill node 0
//! 4. mine one block elsewhere and sync the survivors
//! 5. restart node 0 and sync everyone
//! 6. stop every other node and attach a raw peer to node 0
//! 7. inject a signed transfer over the peer link
//! 8. mine until the transfer is packaged
//! 9. mine past the cache eviction window
//! 10. check both balances
//! 11. kill and restart node 0, wait for the same balances

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use dagnet_common::{
    config::{GenesisConfig, CACHE_INDEX_STRIDE, TRANSFER_GAS},
    crypto::KeyPair,
    message::{ProtocolMessage, StatusMessage},
    transaction::create_transaction,
    H160, H256, U256,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::cluster::{Cluster, BOOTNODE_INDEX};
use super::node::NodeArgs;
use super::peer::PeerLink;
use super::process::{duration_secs, LaunchConfig};
use super::waiters::{sync_blocks, wait_all_peer_counts};
use crate::orchestrator::DeterministicTestEnv;
use crate::tier2_integration::rpc_helpers::{assert_balance, is_transaction_packaged};
use crate::tier2_integration::waiters::{wait_for_balance, wait_for_block_count, Waiter};
use crate::tier2_integration::{EpochTag, NodeRpc};

/// Largest number of blocks requested in one RPC call while advancing the
/// chain past the eviction window
pub const GENERATE_BATCH_SIZE: u64 = 100;

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Parameters of one crash-recovery run.
///
/// Every field has a default, so a YAML file only needs to name what it
/// changes:
///
/// ```yaml
/// node_count: 4
/// min_peers: 2
/// wait_timeout: 60
/// launch:
///   binary: /opt/dagnet/bin/node
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashRecoveryConfig {
    /// Cluster size
    pub node_count: usize,
    /// Peers each node must see before mining starts
    pub min_peers: usize,
    /// Block count, genesis included, reached before the first kill
    pub initial_blocks: u64,
    /// Blocks mined after the transfer to force cache eviction
    pub eviction_blocks: u64,
    /// Amount moved by the transfer
    pub transfer_value: u64,
    /// Gas price of the transfer
    pub gas_price: u64,
    /// Budget of every convergence wait, in seconds
    #[serde(with = "duration_secs")]
    pub wait_timeout: Duration,
    /// Pause between probes, in milliseconds
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
    /// RNG seed; drawn at random and logged when absent
    pub seed: Option<u64>,
    /// How node processes are launched
    pub launch: LaunchConfig,
}

impl Default for CrashRecoveryConfig {
    fn default() -> Self {
        Self {
            node_count: 8,
            min_peers: 4,
            initial_blocks: 10,
            eviction_blocks: 2 * CACHE_INDEX_STRIDE,
            transfer_value: 1,
            gas_price: 1,
            wait_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(50),
            seed: None,
            launch: LaunchConfig::default(),
        }
    }
}

impl CrashRecoveryConfig {
    /// Load a config from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject parameter combinations the scenario cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.node_count < 2 {
            bail!("node_count must be at least 2, got {}", self.node_count);
        }
        if self.min_peers >= self.node_count {
            bail!(
                "min_peers ({}) must be smaller than node_count ({})",
                self.min_peers,
                self.node_count
            );
        }
        if self.initial_blocks < 2 {
            bail!("initial_blocks must include genesis and at least one mined block");
        }
        if self.wait_timeout.is_zero() {
            bail!("wait_timeout must be positive");
        }
        let last = self.node_count - 1;
        self.launch.p2p_port(last)?;
        self.launch.rpc_port(last)?;
        Ok(())
    }

    /// Sender balance once the transfer is executed
    pub fn expected_sender_balance(&self, genesis: &GenesisConfig) -> U256 {
        genesis.total_coin
            - U256::from(self.transfer_value)
            - U256::from(self.gas_price) * U256::from(TRANSFER_GAS)
    }
}

/// Arguments the bootnode starts with; followers get them after their
/// `--bootnodes` entry.
pub fn discovery_args() -> NodeArgs {
    NodeArgs::new()
        .flag("--enable-discovery", "true")
        .flag("--node-table-timeout-s", "1")
        .flag("--node-table-promotion-timeout-s", "1")
        .switch("--archive")
}

/// The eleven steps of the scenario, in order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Start the cluster and wait for peers
    Bootstrap,
    /// Mine the initial blocks and sync
    InitialBlocks,
    /// Kill the bootnode
    CrashBootnode,
    /// Mine without the bootnode and sync the rest
    LivenessWithoutBootnode,
    /// Restart the bootnode and sync
    RestartBootnode,
    /// Leave node 0 alone and attach a raw peer
    IsolateBootnode,
    /// Send the transfer over the peer link
    InjectTransaction,
    /// Mine until the transfer has a receipt
    PackageTransaction,
    /// Mine past the cache eviction window
    AdvancePastEviction,
    /// Check sender and receiver balances
    VerifyBalances,
    /// Kill, restart and check the balances again
    CrashAndRecover,
}

impl Step {
    /// 1-based position in the scenario
    pub fn number(self) -> usize {
        self as usize + 1
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Bootstrap => "bootstrap",
            Step::InitialBlocks => "initial blocks",
            Step::CrashBootnode => "crash bootnode",
            Step::LivenessWithoutBootnode => "liveness without bootnode",
            Step::RestartBootnode => "restart bootnode",
            Step::IsolateBootnode => "isolate bootnode",
            Step::InjectTransaction => "inject transaction",
            Step::PackageTransaction => "package transaction",
            Step::AdvancePastEviction => "advance past eviction",
            Step::VerifyBalances => "verify balances",
            Step::CrashAndRecover => "crash and recover",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of a successful run
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    /// Completed steps, in order
    pub steps: Vec<Step>,
    /// Seed of the run's RNG
    pub seed: u64,
    /// Hash of the injected transfer
    pub transaction_hash: H256,
    /// Genesis-funded sender
    pub sender: H160,
    /// Freshly generated receiver
    pub receiver: H160,
    /// Verified sender balance
    pub sender_balance: U256,
    /// Verified receiver balance
    pub receiver_balance: U256,
    /// Block count of node 0 before the final crash
    pub final_block_count: u64,
}

/// State carried from the transfer steps to the report
struct Transfer {
    hash: H256,
    sender: H160,
    receiver: H160,
}

/// Runs the scenario against a cluster.
///
/// # Example
///
/// ```rust,ignore
/// let scenario = CrashRecoveryScenario::new(config, GenesisConfig::default());
/// let report = scenario.run(&mut cluster, &env).await?;
/// ```
pub struct CrashRecoveryScenario {
    config: CrashRecoveryConfig,
    genesis: GenesisConfig,
}

impl CrashRecoveryScenario {
    /// Scenario with `config` against a chain started from `genesis`
    pub fn new(config: CrashRecoveryConfig, genesis: GenesisConfig) -> Self {
        Self { config, genesis }
    }

    /// Scenario parameters
    pub fn config(&self) -> &CrashRecoveryConfig {
        &self.config
    }

    fn waiter(&self, env: &DeterministicTestEnv) -> Waiter {
        Waiter::new(env.clock.clone())
            .with_timeout(self.config.wait_timeout)
            .with_poll_interval(self.config.poll_interval)
    }

    /// Run every step. The cluster must have been built but not started.
    ///
    /// Nodes are left running; tearing the cluster down is up to the caller.
    pub async fn run(
        &self,
        cluster: &mut Cluster,
        env: &DeterministicTestEnv,
    ) -> Result<ScenarioReport> {
        self.config.validate()?;
        if cluster.len() != self.config.node_count {
            bail!(
                "cluster has {} nodes, scenario expects {}",
                cluster.len(),
                self.config.node_count
            );
        }

        let waiter = self.waiter(env);
        let mut steps = Vec::new();

        begin(Step::Bootstrap);
        self.bootstrap(cluster, &waiter)
            .await
            .with_context(|| failed(Step::Bootstrap))?;
        complete(&mut steps, Step::Bootstrap);

        begin(Step::InitialBlocks);
        self.mine_initial_blocks(cluster, &waiter, env)
            .await
            .with_context(|| failed(Step::InitialBlocks))?;
        complete(&mut steps, Step::InitialBlocks);

        begin(Step::CrashBootnode);
        cluster
            .kill_node(BOOTNODE_INDEX)
            .await
            .with_context(|| failed(Step::CrashBootnode))?;
        complete(&mut steps, Step::CrashBootnode);

        begin(Step::LivenessWithoutBootnode);
        self.mine_without_bootnode(cluster, &waiter)
            .await
            .with_context(|| failed(Step::LivenessWithoutBootnode))?;
        complete(&mut steps, Step::LivenessWithoutBootnode);

        begin(Step::RestartBootnode);
        self.restart_bootnode(cluster, &waiter)
            .await
            .with_context(|| failed(Step::RestartBootnode))?;
        complete(&mut steps, Step::RestartBootnode);

        begin(Step::IsolateBootnode);
        let mut link = self
            .isolate_bootnode(cluster)
            .await
            .with_context(|| failed(Step::IsolateBootnode))?;
        complete(&mut steps, Step::IsolateBootnode);

        let transfer = self
            .transfer_over_link(cluster, link.as_mut(), &waiter, env, &mut steps)
            .await;
        // the link goes away whether or not the transfer steps succeeded
        if let Err(e) = link.close().await {
            warn!("closing peer link failed: {}", e);
        }
        let transfer = transfer?;

        let final_block_count = cluster
            .rpc(BOOTNODE_INDEX)?
            .get_block_count()
            .await
            .context("Failed to read final block count")?;

        begin(Step::CrashAndRecover);
        let (sender_balance, receiver_balance) = self
            .crash_and_recover(cluster, &waiter, &transfer)
            .await
            .with_context(|| failed(Step::CrashAndRecover))?;
        complete(&mut steps, Step::CrashAndRecover);

        Ok(ScenarioReport {
            steps,
            seed: env.seed(),
            transaction_hash: transfer.hash,
            sender: transfer.sender,
            receiver: transfer.receiver,
            sender_balance,
            receiver_balance,
            final_block_count,
        })
    }

    async fn bootstrap(&self, cluster: &mut Cluster, waiter: &Waiter) -> Result<()> {
        cluster.bootstrap(&discovery_args()).await?;
        wait_all_peer_counts(waiter, &cluster.all_rpcs(), self.config.min_peers).await?;
        Ok(())
    }

    async fn mine_initial_blocks(
        &self,
        cluster: &Cluster,
        waiter: &Waiter,
        env: &DeterministicTestEnv,
    ) -> Result<()> {
        // genesis already counts as one block
        for _ in 1..self.config.initial_blocks {
            let miner = env.rng.gen_range(0..cluster.len());
            let hashes = cluster
                .rpc(miner)?
                .generate_empty_blocks(1)
                .await
                .with_context(|| format!("Node {} failed to generate a block", miner))?;
            debug!("node {} generated {:?}", miner, hashes);
        }
        wait_for_block_count(
            waiter,
            cluster.rpc(BOOTNODE_INDEX)?,
            self.config.initial_blocks,
        )
        .await?;
        sync_blocks(waiter, &cluster.all_rpcs()).await?;
        Ok(())
    }

    async fn mine_without_bootnode(&self, cluster: &Cluster, waiter: &Waiter) -> Result<()> {
        let last = cluster.len() - 1;
        cluster
            .rpc(last)?
            .generate_empty_blocks(1)
            .await
            .with_context(|| format!("Node {} failed to generate a block", last))?;
        wait_for_block_count(waiter, cluster.rpc(1)?, self.config.initial_blocks + 1).await?;
        sync_blocks(waiter, &cluster.rpcs(1..cluster.len())?).await?;
        Ok(())
    }

    async fn restart_bootnode(&self, cluster: &mut Cluster, waiter: &Waiter) -> Result<()> {
        cluster.start_node(BOOTNODE_INDEX, None).await?;
        sync_blocks(waiter, &cluster.all_rpcs()).await?;
        Ok(())
    }

    async fn isolate_bootnode(&self, cluster: &mut Cluster) -> Result<Box<dyn PeerLink>> {
        for index in 1..cluster.len() {
            cluster.stop_node(index).await?;
        }

        let genesis = cluster
            .rpc(BOOTNODE_INDEX)?
            .get_block_by_epoch(EpochTag::Number(0))
            .await
            .context("Failed to read the genesis block")?;
        info!("genesis of node 0: {:#x}", genesis.hash);

        let status = StatusMessage::at_genesis(self.genesis.chain_id, genesis.hash);
        let mut link = cluster.connect_peer(BOOTNODE_INDEX, status).await?;
        if let Err(e) = link.wait_for_status(self.config.wait_timeout).await {
            if let Err(close_err) = link.close().await {
                warn!("closing peer link failed: {}", close_err);
            }
            return Err(e).context("Node 0 never completed the status exchange");
        }
        Ok(link)
    }

    // Steps 7 to 10, all of which need the peer link open
    async fn transfer_over_link(
        &self,
        cluster: &Cluster,
        link: &mut dyn PeerLink,
        waiter: &Waiter,
        env: &DeterministicTestEnv,
        steps: &mut Vec<Step>,
    ) -> Result<Transfer> {
        let node = cluster.rpc(BOOTNODE_INDEX)?;

        begin(Step::InjectTransaction);
        let sender_key = self.genesis.genesis_key()?;
        let receiver_key = env.rng.with_rng(|r| KeyPair::random(r));
        let tx = create_transaction(
            &self.genesis,
            &sender_key,
            U256::zero(),
            U256::from(self.config.gas_price),
            receiver_key.address(),
            U256::from(self.config.transfer_value),
        );
        let transfer = Transfer {
            hash: tx.hash(),
            sender: sender_key.address(),
            receiver: receiver_key.address(),
        };
        info!("injecting {}", tx);
        link.send_protocol_msg(&ProtocolMessage::Transactions(vec![tx]))
            .await
            .with_context(|| failed(Step::InjectTransaction))?;
        complete(steps, Step::InjectTransaction);

        begin(Step::PackageTransaction);
        let tx_hash = transfer.hash;
        waiter
            .until_true(&format!("{:#x} to be packaged", tx_hash), move || async move {
                node.generate_block(1).await?;
                is_transaction_packaged(node, &tx_hash).await
            })
            .await
            .with_context(|| failed(Step::PackageTransaction))?;
        complete(steps, Step::PackageTransaction);

        begin(Step::AdvancePastEviction);
        let mut remaining = self.config.eviction_blocks;
        while remaining > 0 {
            let batch = remaining.min(GENERATE_BATCH_SIZE);
            node.generate_empty_blocks(batch)
                .await
                .with_context(|| failed(Step::AdvancePastEviction))?;
            remaining -= batch;
        }
        complete(steps, Step::AdvancePastEviction);

        begin(Step::VerifyBalances);
        self.check_balances(node, &transfer)
            .await
            .with_context(|| failed(Step::VerifyBalances))?;
        complete(steps, Step::VerifyBalances);

        Ok(transfer)
    }

    async fn check_balances(&self, node: &dyn NodeRpc, transfer: &Transfer) -> Result<()> {
        assert_balance(
            node,
            &transfer.sender,
            self.config.expected_sender_balance(&self.genesis),
        )
        .await?;
        assert_balance(
            node,
            &transfer.receiver,
            U256::from(self.config.transfer_value),
        )
        .await
    }

    async fn crash_and_recover(
        &self,
        cluster: &mut Cluster,
        waiter: &Waiter,
        transfer: &Transfer,
    ) -> Result<(U256, U256)> {
        cluster.kill_node(BOOTNODE_INDEX).await?;
        cluster.start_node(BOOTNODE_INDEX, None).await?;

        let node = cluster.rpc(BOOTNODE_INDEX)?;
        let sender_balance = wait_for_balance(
            waiter,
            node,
            &transfer.sender,
            self.config.expected_sender_balance(&self.genesis),
        )
        .await?;
        let receiver_balance = wait_for_balance(
            waiter,
            node,
            &transfer.receiver,
            U256::from(self.config.transfer_value),
        )
        .await?;
        Ok((sender_balance, receiver_balance))
    }
}

fn begin(step: Step) {
    info!("step {}: {}", step.number(), step);
}

fn complete(steps: &mut Vec<Step>, step: Step) {
    info!("step {} done: {}", step.number(), step);
    steps.push(step);
}

fn failed(step: Step) -> String {
    format!("Step {} ({}) failed", step.number(), step)
}
