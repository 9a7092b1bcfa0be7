use primitive_types::{H256, U256};
use rlp::Encodable;
use sha3::{Digest, Keccak256};

pub const HASH_SIZE: usize = 32; // 32 bytes / 256 bits

// Hash a byte array using keccak-256, the node's canonical hash function
#[inline(always)]
pub fn keccak(value: &[u8]) -> H256 {
    H256::from_slice(&Keccak256::digest(value))
}

/// keccak-256 of the RLP empty string (`0x80`), the root of an empty trie
pub fn keccak_null_rlp() -> H256 {
    keccak(&rlp::NULL_RLP)
}

/// keccak-256 of the RLP empty list (`0xc0`)
pub fn keccak_empty_list_rlp() -> H256 {
    keccak(&rlp::EMPTY_LIST_RLP)
}

/// Anything with a canonical RLP encoding is addressed by the keccak of it
pub trait Hashable: Encodable + Sized {
    #[inline]
    fn hash(&self) -> H256 {
        keccak(&rlp::encode(self))
    }
}

// Fixed-width 32 byte renderings of a U256.
// Built from `U256::byte` so the layout never depends on the uint crate's
// slice/array conversion helpers.
pub fn u256_to_be_bytes(value: &U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = value.byte(31 - i);
    }
    out
}

pub fn u256_to_le_bytes(value: &U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = value.byte(i);
    }
    out
}
