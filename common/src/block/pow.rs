use log::{debug, trace};
use primitive_types::{H256, U256};

use super::BlockHeader;
use crate::crypto::{keccak, u256_to_le_bytes, HASH_SIZE};

/// Mix a nonce into a problem hash and hash the result.
///
/// The 64 byte input is the problem hash followed by the nonce as a little
/// endian 256 bit word. The keccak of that is folded back onto the problem
/// hash with XOR and hashed again; the final digest is read as big endian.
pub fn compute_pow_digest(problem_hash: &H256, nonce: &U256) -> U256 {
    let mut buf = [0u8; HASH_SIZE * 2];
    buf[..HASH_SIZE].copy_from_slice(problem_hash.as_bytes());
    buf[HASH_SIZE..].copy_from_slice(&u256_to_le_bytes(nonce));

    let mid = keccak(&buf);
    let mut folded = [0u8; HASH_SIZE];
    for (i, byte) in folded.iter_mut().enumerate() {
        *byte = mid.as_bytes()[i] ^ problem_hash.as_bytes()[i];
    }

    U256::from_big_endian(keccak(&folded).as_bytes())
}

/// `digest * difficulty < 2^256`
///
/// Any product that does not overflow 256 bits is below the bound.
#[inline]
pub fn satisfies_work(digest: &U256, difficulty: &U256) -> bool {
    !digest.overflowing_mul(*difficulty).1
}

/// Linear nonce search starting at zero.
///
/// Returns the first nonce whose digest satisfies `difficulty`, together with
/// the template carrying that nonce. A zero difficulty short-circuits to nonce
/// zero. The search is not bounded: callers keep the difficulty small.
pub fn find_nonce(template: &BlockHeader, difficulty: &U256) -> (U256, BlockHeader) {
    if difficulty.is_zero() {
        return (U256::zero(), template.with_nonce(U256::zero()));
    }

    let problem_hash = template.problem_hash();
    let mut nonce = U256::zero();
    loop {
        let digest = compute_pow_digest(&problem_hash, &nonce);
        if satisfies_work(&digest, difficulty) {
            debug!(
                "found nonce {} for height {} at difficulty {}",
                nonce, template.height, difficulty
            );
            return (nonce, template.with_nonce(nonce));
        }
        trace!("nonce {} rejected", nonce);
        nonce += U256::one();
    }
}
