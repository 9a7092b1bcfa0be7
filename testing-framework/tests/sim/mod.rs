// In-memory cluster used by the integration tests
//
// Every simulated node reads and writes one shared ledger, so block sets are
// always in sync between running nodes and committed state survives kills.
// Lifecycle calls are recorded as events for ordering assertions.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

use dagnet_common::block::make_genesis;
use dagnet_common::config::{GenesisConfig, TRANSFER_GAS};
use dagnet_common::crypto::{keccak, KeyPair};
use dagnet_common::message::{ProtocolMessage, StatusMessage};
use dagnet_common::transaction::{Action, SignedTransaction};
use dagnet_common::{H160, H256, U256};
use dagnet_testing_framework::tier2_integration::{
    BlockSummary, EpochTag, NodeRpc, PeerInfo, TransactionReceipt,
};
use dagnet_testing_framework::tier3_e2e::{
    ClusterNode, NodeArgs, NodeError, NodeIdentity, NodeState, PeerError, PeerLink, StopMode,
};

/// Lifecycle call observed by the network
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Start { index: usize, args: Vec<String> },
    Stop { index: usize, mode: StopMode },
    LinkOpened(usize),
    LinkClosed(usize),
    PeerTransactions { index: usize, count: usize },
}

struct NetState {
    genesis: H256,
    chain_id: u64,
    blocks: Vec<H256>,
    balances: HashMap<H160, U256>,
    pending: Vec<SignedTransaction>,
    receipts: HashMap<H256, TransactionReceipt>,
    running: Vec<bool>,
    events: Vec<Event>,
    accept_peer_transactions: bool,
}

impl NetState {
    fn mine(&mut self) -> H256 {
        let parent = self.blocks[self.blocks.len() - 1];
        let mut preimage = parent.as_bytes().to_vec();
        preimage.extend_from_slice(&(self.blocks.len() as u64).to_be_bytes());
        let hash = keccak(&preimage);
        self.blocks.push(hash);
        hash
    }

    fn execute(&mut self, tx: &SignedTransaction, block_hash: H256) -> Result<()> {
        let unsigned = tx.get_unsigned();
        let sender = tx.sender()?;
        let receiver = match unsigned.action {
            Action::Call(address) => address,
            Action::Create => bail!("contract creation is not simulated"),
        };
        let cost = unsigned.value + unsigned.gas_price * U256::from(TRANSFER_GAS);
        let sender_balance = self.balances.get(&sender).copied().unwrap_or_default();
        if sender_balance < cost {
            bail!("insufficient balance");
        }
        self.balances.insert(sender, sender_balance - cost);
        *self.balances.entry(receiver).or_default() += unsigned.value;
        self.receipts.insert(
            tx.hash(),
            TransactionReceipt {
                transaction_hash: tx.hash(),
                block_hash,
                epoch_number: Some(self.blocks.len() as u64 - 1),
                outcome_status: 0,
            },
        );
        Ok(())
    }
}

/// Shared state of a simulated cluster
pub struct SimNetwork {
    state: Mutex<NetState>,
}

impl SimNetwork {
    /// Network of `node_count` stopped nodes over a fresh genesis
    pub fn new(node_count: usize, config: &GenesisConfig) -> Arc<Self> {
        let genesis = make_genesis(config).hash();
        let funded = config
            .genesis_key()
            .map(|key| key.address())
            .unwrap_or_default();
        let mut balances = HashMap::new();
        balances.insert(funded, config.total_coin);
        Arc::new(Self {
            state: Mutex::new(NetState {
                genesis,
                chain_id: config.chain_id,
                blocks: vec![genesis],
                balances,
                pending: Vec::new(),
                receipts: HashMap::new(),
                running: vec![false; node_count],
                events: Vec::new(),
                accept_peer_transactions: true,
            }),
        })
    }

    /// Cluster members, one per node, identified by keys from `seed`
    pub fn nodes(self: &Arc<Self>, seed: u64) -> Vec<Box<dyn ClusterNode>> {
        use rand::{rngs::StdRng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(seed);
        let node_count = self.state.lock().running.len();
        (0..node_count)
            .map(|index| {
                let identity = NodeIdentity::new(
                    KeyPair::random(&mut rng),
                    IpAddr::V4(Ipv4Addr::LOCALHOST),
                    13000 + index as u16,
                );
                Box::new(SimNode {
                    identity,
                    rpc: SimRpc {
                        index,
                        net: self.clone(),
                    },
                }) as Box<dyn ClusterNode>
            })
            .collect()
    }

    /// Drop every transaction arriving over peer links from now on
    pub fn ignore_peer_transactions(&self) {
        self.state.lock().accept_peer_transactions = false;
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().events.clone()
    }

    pub fn genesis(&self) -> H256 {
        self.state.lock().genesis
    }

    pub fn block_count(&self) -> u64 {
        self.state.lock().blocks.len() as u64
    }

    pub fn balance(&self, address: &H160) -> U256 {
        self.state
            .lock()
            .balances
            .get(address)
            .copied()
            .unwrap_or_default()
    }

    pub fn is_running(&self, index: usize) -> bool {
        self.state.lock().running[index]
    }
}

/// RPC face of one simulated node
pub struct SimRpc {
    index: usize,
    net: Arc<SimNetwork>,
}

impl SimRpc {
    fn check_running(&self) -> Result<()> {
        if !self.net.state.lock().running[self.index] {
            bail!("connection refused: node {} is down", self.index);
        }
        Ok(())
    }
}

#[async_trait]
impl NodeRpc for SimRpc {
    async fn generate_empty_blocks(&self, count: u64) -> Result<Vec<H256>> {
        self.check_running()?;
        let mut state = self.net.state.lock();
        Ok((0..count).map(|_| state.mine()).collect())
    }

    async fn generate_block(&self, num_txs: u64) -> Result<H256> {
        self.check_running()?;
        let mut state = self.net.state.lock();
        let hash = state.mine();
        let take = (num_txs as usize).min(state.pending.len());
        let packed: Vec<SignedTransaction> = state.pending.drain(..take).collect();
        for tx in &packed {
            state.execute(tx, hash)?;
        }
        Ok(hash)
    }

    async fn get_balance(&self, address: &H160) -> Result<U256> {
        self.check_running()?;
        Ok(self.net.balance(address))
    }

    async fn get_block_by_epoch(&self, epoch: EpochTag) -> Result<BlockSummary> {
        self.check_running()?;
        let state = self.net.state.lock();
        let height = match epoch {
            EpochTag::Number(n) => n as usize,
            EpochTag::LatestMined | EpochTag::LatestState => state.blocks.len() - 1,
        };
        let Some(hash) = state.blocks.get(height).copied() else {
            bail!("epoch {} not found", epoch);
        };
        let parent_hash = if height == 0 {
            H256::zero()
        } else {
            state.blocks[height - 1]
        };
        Ok(BlockSummary {
            hash,
            parent_hash,
            height: height as u64,
            epoch_number: Some(height as u64),
        })
    }

    async fn get_peer_info(&self) -> Result<Vec<PeerInfo>> {
        self.check_running()?;
        let state = self.net.state.lock();
        Ok(state
            .running
            .iter()
            .enumerate()
            .filter(|(i, running)| **running && *i != self.index)
            .map(|(i, _)| PeerInfo {
                id: Some(format!("node{}", i)),
                addr: Some(format!("127.0.0.1:{}", 13000 + i)),
            })
            .collect())
    }

    async fn get_transaction_receipt(&self, tx_hash: &H256) -> Result<Option<TransactionReceipt>> {
        self.check_running()?;
        Ok(self.net.state.lock().receipts.get(tx_hash).cloned())
    }

    async fn get_block_count(&self) -> Result<u64> {
        self.check_running()?;
        Ok(self.net.block_count())
    }

    async fn get_best_block_hash(&self) -> Result<H256> {
        self.check_running()?;
        let state = self.net.state.lock();
        Ok(state.blocks[state.blocks.len() - 1])
    }
}

/// One simulated cluster member
pub struct SimNode {
    identity: NodeIdentity,
    rpc: SimRpc,
}

#[async_trait]
impl ClusterNode for SimNode {
    fn index(&self) -> usize {
        self.rpc.index
    }

    fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    fn state(&self) -> NodeState {
        if self.rpc.net.is_running(self.rpc.index) {
            NodeState::Running
        } else {
            NodeState::Stopped
        }
    }

    fn rpc(&self) -> &dyn NodeRpc {
        &self.rpc
    }

    async fn start(&mut self, args: &NodeArgs) -> Result<(), NodeError> {
        let index = self.rpc.index;
        let mut state = self.rpc.net.state.lock();
        if state.running[index] {
            return Err(NodeError::AlreadyRunning(index));
        }
        state.running[index] = true;
        state.events.push(Event::Start {
            index,
            args: args.to_args(),
        });
        Ok(())
    }

    async fn stop(&mut self, mode: StopMode) -> Result<(), NodeError> {
        let index = self.rpc.index;
        let mut state = self.rpc.net.state.lock();
        if !state.running[index] {
            return Err(NodeError::NotRunning(index));
        }
        state.running[index] = false;
        state.events.push(Event::Stop { index, mode });
        Ok(())
    }

    async fn connect_peer(&self, status: StatusMessage) -> Result<Box<dyn PeerLink>> {
        let index = self.rpc.index;
        let mut state = self.rpc.net.state.lock();
        if !state.running[index] {
            return Err(NodeError::NotRunning(index).into());
        }
        state.events.push(Event::LinkOpened(index));
        Ok(Box::new(SimPeerLink {
            index,
            net: self.rpc.net.clone(),
            local_status: status,
            ready: false,
            open: true,
        }))
    }
}

/// Peer link straight into the shared transaction pool
pub struct SimPeerLink {
    index: usize,
    net: Arc<SimNetwork>,
    local_status: StatusMessage,
    ready: bool,
    open: bool,
}

#[async_trait]
impl PeerLink for SimPeerLink {
    async fn wait_for_status(&mut self, _timeout: Duration) -> Result<StatusMessage, PeerError> {
        if !self.open {
            return Err(PeerError::Closed);
        }
        let state = self.net.state.lock();
        if state.genesis != self.local_status.genesis_hash {
            return Err(PeerError::GenesisMismatch {
                expected: self.local_status.genesis_hash,
                announced: state.genesis,
            });
        }
        let mut status = StatusMessage::at_genesis(state.chain_id, state.genesis);
        status.best_epoch = state.blocks.len() as u64 - 1;
        self.ready = true;
        Ok(status)
    }

    async fn send_protocol_msg(&mut self, message: &ProtocolMessage) -> Result<(), PeerError> {
        if !self.open {
            return Err(PeerError::Closed);
        }
        match message {
            ProtocolMessage::Status(_) => Ok(()),
            ProtocolMessage::Transactions(_) if !self.ready => Err(PeerError::HandshakeIncomplete),
            ProtocolMessage::Transactions(txs) => {
                let mut state = self.net.state.lock();
                state.events.push(Event::PeerTransactions {
                    index: self.index,
                    count: txs.len(),
                });
                if state.accept_peer_transactions {
                    let chain_id = state.chain_id;
                    state.pending.extend(
                        txs.iter()
                            .filter(|tx| tx.get_unsigned().chain_id == chain_id)
                            .cloned(),
                    );
                }
                Ok(())
            }
        }
    }

    async fn close(&mut self) -> Result<(), PeerError> {
        if self.open {
            self.open = false;
            self.net.state.lock().events.push(Event::LinkClosed(self.index));
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn is_ready(&self) -> bool {
        self.open && self.ready
    }
}
