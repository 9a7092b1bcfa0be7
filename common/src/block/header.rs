// Candidate block header for the DAG chain
//
// Field order below is the canonical RLP order. `problem_hash` covers every
// field except the nonce; the block hash covers all of them.

use primitive_types::{H160, H256, U256};
use rlp::{Encodable, RlpStream};
use serde::{Deserialize, Serialize};

use super::pow::compute_pow_digest;
use crate::{
    crypto::{keccak, Hashable},
    time::TimestampSeconds,
};

const HEADER_FIELDS_WITHOUT_NONCE: usize = 13;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub parent_hash: H256,
    pub height: u64,
    pub timestamp: TimestampSeconds,
    pub author: H160,
    // keccak of the RLP encoded transaction list
    pub transactions_root: H256,

    // Deferred execution results: these describe an earlier epoch, not this block
    pub deferred_state_root: H256,
    pub deferred_receipts_root: H256,
    pub deferred_logs_bloom_hash: H256,

    pub difficulty: U256,
    pub adaptive: bool,
    pub gas_limit: U256,
    // Sibling blocks acknowledged without being the parent
    pub referee_hashes: Vec<H256>,
    pub nonce: U256,
    // References into the auxiliary finality chain, empty for genesis
    pub pos_reference: Vec<H256>,
}

impl BlockHeader {
    pub fn get_height(&self) -> u64 {
        self.height
    }

    pub fn get_parent_hash(&self) -> &H256 {
        &self.parent_hash
    }

    pub fn get_nonce(&self) -> &U256 {
        &self.nonce
    }

    // Same header with another nonce
    pub fn with_nonce(&self, nonce: U256) -> Self {
        let mut header = self.clone();
        header.nonce = nonce;
        header
    }

    /// keccak of the header encoding without the nonce.
    ///
    /// This is the part of the work input that stays fixed while the nonce
    /// search iterates.
    pub fn problem_hash(&self) -> H256 {
        let mut stream = RlpStream::new_list(HEADER_FIELDS_WITHOUT_NONCE);
        self.append_fields(&mut stream, false);
        keccak(&stream.out())
    }

    /// Proof-of-work digest of this header with its current nonce
    pub fn pow_digest(&self) -> U256 {
        compute_pow_digest(&self.problem_hash(), &self.nonce)
    }

    fn append_fields(&self, stream: &mut RlpStream, with_nonce: bool) {
        stream
            .append(&self.parent_hash)
            .append(&self.height)
            .append(&self.timestamp)
            .append(&self.author)
            .append(&self.transactions_root)
            .append(&self.deferred_state_root)
            .append(&self.deferred_receipts_root)
            .append(&self.deferred_logs_bloom_hash)
            .append(&self.difficulty)
            .append(&self.adaptive)
            .append(&self.gas_limit)
            .append_list::<H256, H256>(&self.referee_hashes);
        if with_nonce {
            stream.append(&self.nonce);
        }
        stream.append_list::<H256, H256>(&self.pos_reference);
    }
}

impl Encodable for BlockHeader {
    fn rlp_append(&self, stream: &mut RlpStream) {
        stream.begin_list(HEADER_FIELDS_WITHOUT_NONCE + 1);
        self.append_fields(stream, true);
    }
}

impl Hashable for BlockHeader {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> BlockHeader {
        BlockHeader {
            parent_hash: H256::repeat_byte(0x11),
            height: 7,
            timestamp: 1_700_000_000,
            author: H160::repeat_byte(0x10),
            transactions_root: H256::repeat_byte(0x22),
            deferred_state_root: H256::repeat_byte(0x33),
            deferred_receipts_root: H256::repeat_byte(0x44),
            deferred_logs_bloom_hash: H256::repeat_byte(0x55),
            difficulty: U256::from(4u64),
            adaptive: false,
            gas_limit: U256::from(30_000_000u64),
            referee_hashes: vec![H256::repeat_byte(0x66)],
            nonce: U256::zero(),
            pos_reference: vec![H256::zero()],
        }
    }

    #[test]
    fn test_problem_hash_ignores_nonce() {
        let header = sample_header();
        let other = header.with_nonce(U256::from(99u64));
        assert_eq!(header.problem_hash(), other.problem_hash());
        assert_ne!(header.hash(), other.hash());
        assert_ne!(header.pow_digest(), other.pow_digest());
    }

    #[test]
    fn test_every_field_feeds_the_problem_hash() {
        let base = sample_header();
        let base_hash = base.problem_hash();

        let mut changed = base.clone();
        changed.adaptive = true;
        assert_ne!(changed.problem_hash(), base_hash);

        let mut changed = base.clone();
        changed.referee_hashes.clear();
        assert_ne!(changed.problem_hash(), base_hash);

        let mut changed = base.clone();
        changed.pos_reference.clear();
        assert_ne!(changed.problem_hash(), base_hash);

        let mut changed = base;
        changed.timestamp += 1;
        assert_ne!(changed.problem_hash(), base_hash);
    }

    #[test]
    fn test_encoding_is_a_fourteen_item_list() {
        let encoded = rlp::encode(&sample_header());
        let decoded = rlp::Rlp::new(&encoded);
        assert!(decoded.is_list());
        assert_eq!(decoded.item_count().unwrap(), 14);
        assert_eq!(decoded.val_at::<u64>(1).unwrap(), 7);
        assert_eq!(decoded.list_at::<H256>(11).unwrap().len(), 1);
    }

    #[test]
    fn test_digest_is_reproducible() {
        let header = sample_header();
        assert_eq!(header.pow_digest(), header.clone().pow_digest());
        assert_eq!(header.hash(), keccak(&rlp::encode(&header)));
    }
}
