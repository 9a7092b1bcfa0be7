// Synthetic block assembly
//
// Every field left unset on a builder falls back to the genesis fixture it
// borrows. Builders own their containers, so no two blocks ever share a
// default list.

use log::debug;
use primitive_types::{H160, H256, U256};

use super::{find_nonce, transactions_root, Block, BlockError, BlockHeader};
use crate::{
    config::GenesisConfig,
    crypto::{keccak_null_rlp, Hashable},
    time::{get_current_time_in_seconds, TimestampSeconds},
    transaction::SignedTransaction,
};

pub struct BlockBuilder<'a> {
    config: &'a GenesisConfig,
    parent_hash: Option<H256>,
    height: u64,
    timestamp: Option<TimestampSeconds>,
    difficulty: Option<U256>,
    gas_limit: Option<U256>,
    referee_hashes: Vec<H256>,
    author: Option<H160>,
    deferred_state_root: Option<H256>,
    deferred_receipts_root: Option<H256>,
    deferred_logs_bloom_hash: Option<H256>,
    adaptive: bool,
    transactions_root: Option<H256>,
    transactions: Vec<SignedTransaction>,
    pos_reference: Option<Vec<H256>>,
}

impl<'a> BlockBuilder<'a> {
    pub fn new(config: &'a GenesisConfig) -> Self {
        Self {
            config,
            parent_hash: None,
            height: 0,
            timestamp: None,
            difficulty: None,
            gas_limit: None,
            referee_hashes: Vec::new(),
            author: None,
            deferred_state_root: None,
            deferred_receipts_root: None,
            deferred_logs_bloom_hash: None,
            adaptive: false,
            transactions_root: None,
            transactions: Vec::new(),
            pos_reference: None,
        }
    }

    pub fn with_parent(mut self, parent_hash: H256, height: u64) -> Self {
        self.parent_hash = Some(parent_hash);
        self.height = height;
        self
    }

    pub fn with_height(mut self, height: u64) -> Self {
        self.height = height;
        self
    }

    pub fn with_timestamp(mut self, timestamp: TimestampSeconds) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_difficulty(mut self, difficulty: U256) -> Self {
        self.difficulty = Some(difficulty);
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: U256) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn with_referees(mut self, referee_hashes: Vec<H256>) -> Self {
        self.referee_hashes = referee_hashes;
        self
    }

    pub fn with_author(mut self, author: H160) -> Self {
        self.author = Some(author);
        self
    }

    pub fn with_deferred_state_root(mut self, root: H256) -> Self {
        self.deferred_state_root = Some(root);
        self
    }

    pub fn with_deferred_receipts_root(mut self, root: H256) -> Self {
        self.deferred_receipts_root = Some(root);
        self
    }

    pub fn with_deferred_logs_bloom_hash(mut self, hash: H256) -> Self {
        self.deferred_logs_bloom_hash = Some(hash);
        self
    }

    pub fn with_adaptive(mut self, adaptive: bool) -> Self {
        self.adaptive = adaptive;
        self
    }

    pub fn with_transactions_root(mut self, root: H256) -> Self {
        self.transactions_root = Some(root);
        self
    }

    pub fn with_transactions(mut self, transactions: Vec<SignedTransaction>) -> Self {
        self.transactions = transactions;
        self
    }

    pub fn with_pos_reference(mut self, pos_reference: Vec<H256>) -> Self {
        self.pos_reference = Some(pos_reference);
        self
    }

    fn template(&self, transactions_root: H256, pos_reference: Vec<H256>) -> BlockHeader {
        let config = self.config;
        BlockHeader {
            parent_hash: self.parent_hash.unwrap_or(config.prev_hash),
            height: self.height,
            timestamp: self.timestamp.unwrap_or_else(get_current_time_in_seconds),
            author: self.author.unwrap_or(config.coinbase),
            transactions_root,
            deferred_state_root: self.deferred_state_root.unwrap_or(config.state_root),
            deferred_receipts_root: self
                .deferred_receipts_root
                .unwrap_or(config.empty_epoch_receipts_root),
            deferred_logs_bloom_hash: self
                .deferred_logs_bloom_hash
                .unwrap_or(config.logs_bloom_hash),
            difficulty: self.difficulty.unwrap_or(config.test_difficulty),
            adaptive: self.adaptive,
            gas_limit: self.gas_limit.unwrap_or(config.gas_limit),
            referee_hashes: self.referee_hashes.clone(),
            nonce: U256::zero(),
            pos_reference,
        }
    }

    /// Assemble the block and search for a nonce that satisfies its
    /// difficulty.
    ///
    /// Without an explicit transactions root the block must be empty: the
    /// root then defaults to the empty trie root. A non-empty list without a
    /// root is refused rather than guessed.
    pub fn build(self) -> Result<Block, BlockError> {
        let transactions_root = match self.transactions_root {
            Some(root) => root,
            None if !self.transactions.is_empty() => {
                return Err(BlockError::MissingTransactionsRoot {
                    count: self.transactions.len(),
                });
            }
            None => keccak_null_rlp(),
        };
        let pos_reference = self
            .pos_reference
            .clone()
            .unwrap_or_else(|| self.config.default_pos_reference());

        let template = self.template(transactions_root, pos_reference);
        let difficulty = template.difficulty;
        let (_, header) = find_nonce(&template, &difficulty);
        debug!(
            "built block {:#x} at height {} with {} transactions",
            header.hash(),
            header.height,
            self.transactions.len()
        );
        Ok(Block::new(header, self.transactions))
    }

    /// Assemble the block with `nonce` taken verbatim, valid work or not.
    ///
    /// The transactions root is always derived from the transaction list
    /// and the position reference is left empty unless one was given.
    pub fn build_with_nonce(self, nonce: U256) -> Block {
        let root = transactions_root(&self.transactions);
        let pos_reference = self.pos_reference.clone().unwrap_or_default();
        let header = self.template(root, pos_reference).with_nonce(nonce);
        Block::new(header, self.transactions)
    }
}

/// Genesis block of `config`: no work, no transactions, empty position
/// reference.
pub fn make_genesis(config: &GenesisConfig) -> Block {
    let template = BlockHeader {
        parent_hash: config.prev_hash,
        height: 0,
        timestamp: 0,
        author: config.author,
        transactions_root: config.transactions_root,
        deferred_state_root: config.state_root,
        deferred_receipts_root: config.receipts_root,
        deferred_logs_bloom_hash: config.logs_bloom_hash,
        difficulty: U256::zero(),
        adaptive: false,
        gas_limit: config.gas_limit,
        referee_hashes: Vec::new(),
        nonce: U256::zero(),
        pos_reference: Vec::new(),
    };
    let (_, header) = find_nonce(&template, &U256::zero());
    Block::new(header, Vec::new())
}

/// Produces a run of empty blocks, each extending the previous one.
pub struct ChainBuilder<'a> {
    config: &'a GenesisConfig,
    timestamp: Option<TimestampSeconds>,
}

impl<'a> ChainBuilder<'a> {
    pub fn new(config: &'a GenesisConfig) -> Self {
        Self {
            config,
            timestamp: None,
        }
    }

    // Pin every block to one timestamp for reproducible hashes
    pub fn with_timestamp(mut self, timestamp: TimestampSeconds) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// `count` blocks on top of `parent_hash`, oldest first. Block `i`
    /// (1-based) sits at `parent_height + i`.
    pub fn build(
        &self,
        parent_hash: H256,
        parent_height: u64,
        count: usize,
    ) -> Result<Vec<Block>, BlockError> {
        let mut chain = Vec::with_capacity(count);
        let mut parent_hash = parent_hash;
        let mut height = parent_height;
        for _ in 0..count {
            height += 1;
            let mut builder = BlockBuilder::new(self.config).with_parent(parent_hash, height);
            if let Some(timestamp) = self.timestamp {
                builder = builder.with_timestamp(timestamp);
            }
            let block = builder.build()?;
            parent_hash = block.hash();
            chain.push(block);
        }
        Ok(chain)
    }
}

pub fn create_chain_of_blocks(
    config: &GenesisConfig,
    parent_hash: H256,
    parent_height: u64,
    count: usize,
) -> Result<Vec<Block>, BlockError> {
    ChainBuilder::new(config).build(parent_hash, parent_height, count)
}
