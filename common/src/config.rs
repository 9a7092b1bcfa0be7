use primitive_types::{H160, H256, U256};
use serde::{Deserialize, Serialize};

use crate::crypto::{keccak, keccak_empty_list_rlp, keccak_null_rlp, CryptoError, KeyPair};

// Difficulty used for synthetic test blocks. Small enough that the nonce
// search finishes after a handful of hashes.
pub const TEST_DIFFICULTY: u64 = 4;

// Intrinsic gas charged for a plain value transfer
pub const TRANSFER_GAS: u64 = 21_000;

// Stride of the node's anticone cache index. Growing the chain by twice this
// many blocks forces the node to start evicting cached anticone entries.
pub const CACHE_INDEX_STRIDE: u64 = 1_000;

// Size in bytes of an epoch logs bloom
pub const LOGS_BLOOM_SIZE: usize = 256;

// Chain id of the local test network
pub const DEFAULT_TEST_CHAIN_ID: u64 = 10;

// 1 coin = 10^18 drips
pub const COIN_DECIMALS: usize = 18;

// 5 billion coins minted to the genesis account
pub const TOTAL_COIN_UNITS: u64 = 5_000_000_000;

// Funded key of the local test network genesis account
pub const GENESIS_SECRET_HEX: &str =
    "46b9e861b63d3509c88b7817275a30d22d62c8cd8fa6486ddee35ef0d8e0495f";

/// Genesis-derived defaults for synthetic blocks and transactions.
///
/// This is passed explicitly to every constructor so alternate fixtures and
/// parallel runs never share ambient state. `Default` gives the local test
/// network; other fixtures deserialize from JSON or YAML.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GenesisConfig {
    pub prev_hash: H256,
    pub coinbase: H160,
    pub author: H160,
    pub gas_limit: U256,
    pub state_root: H256,
    pub receipts_root: H256,
    pub logs_bloom_hash: H256,
    pub transactions_root: H256,
    pub empty_epoch_receipts_root: H256,
    pub pos_genesis_block: H256,
    pub genesis_secret: String,
    pub total_coin: U256,
    pub chain_id: u64,
    pub test_difficulty: U256,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        let mut coinbase = H160::zero();
        coinbase.as_bytes_mut()[0] = 0x10;

        let mut author = coinbase;
        author.as_bytes_mut()[19] = 0x60;

        Self {
            prev_hash: H256::zero(),
            coinbase,
            author,
            gas_limit: U256::from(30_000_000u64),
            state_root: keccak_null_rlp(),
            receipts_root: keccak_empty_list_rlp(),
            logs_bloom_hash: keccak(&[0u8; LOGS_BLOOM_SIZE]),
            transactions_root: keccak_empty_list_rlp(),
            empty_epoch_receipts_root: keccak_empty_list_rlp(),
            pos_genesis_block: H256::zero(),
            genesis_secret: GENESIS_SECRET_HEX.to_string(),
            total_coin: U256::from(TOTAL_COIN_UNITS) * U256::exp10(COIN_DECIMALS),
            chain_id: DEFAULT_TEST_CHAIN_ID,
            test_difficulty: U256::from(TEST_DIFFICULTY),
        }
    }
}

impl GenesisConfig {
    /// Key pair of the genesis-funded account
    pub fn genesis_key(&self) -> Result<KeyPair, CryptoError> {
        KeyPair::from_hex(&self.genesis_secret)
    }

    /// Default position-reference list for non-genesis blocks
    pub fn default_pos_reference(&self) -> Vec<H256> {
        vec![self.pos_genesis_block]
    }
}
