use std::fmt::{Debug, Formatter, Result as FmtResult};

use libsecp256k1::{Message, PublicKey, RecoveryId, SecretKey, Signature};
use primitive_types::{H160, H256, U256};
use rand::RngCore;

use super::{keccak, u256_to_be_bytes, CryptoError};

pub const SECRET_KEY_SIZE: usize = 32;
// Uncompressed secp256k1 point without the 0x04 prefix
pub const PUBLIC_KEY_SIZE: usize = 64;

// User accounts live in the 0x1 address space: the high nibble of the
// first address byte is forced to 1 after hashing the public key.
const USER_ADDRESS_TYPE_BITS: u8 = 0x10;

/// A secp256k1 key pair used both for account keys and node identities.
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Draw a fresh key from `rng`, retrying the rare out-of-range scalars.
    pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        loop {
            let mut bytes = [0u8; SECRET_KEY_SIZE];
            rng.fill_bytes(&mut bytes);
            if let Ok(pair) = Self::from_secret(&bytes) {
                return pair;
            }
        }
    }

    pub fn from_secret(bytes: &[u8; SECRET_KEY_SIZE]) -> Result<Self, CryptoError> {
        let secret = SecretKey::parse(bytes)
            .map_err(|e| CryptoError::InvalidSecretKey(format!("{:?}", e)))?;
        let public = PublicKey::from_secret_key(&secret);
        Ok(Self { secret, public })
    }

    /// Parse a hex secret, with or without the `0x` prefix.
    pub fn from_hex(value: &str) -> Result<Self, CryptoError> {
        let stripped = value.strip_prefix("0x").unwrap_or(value);
        let decoded = hex::decode(stripped).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
        let bytes: [u8; SECRET_KEY_SIZE] = decoded.try_into().map_err(|v: Vec<u8>| {
            CryptoError::InvalidSecretKey(format!(
                "expected {} bytes, got {}",
                SECRET_KEY_SIZE,
                v.len()
            ))
        })?;
        Self::from_secret(&bytes)
    }

    pub fn secret_bytes(&self) -> [u8; SECRET_KEY_SIZE] {
        self.secret.serialize()
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret_bytes())
    }

    /// Uncompressed public key without its SEC1 prefix byte
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        let full = self.public.serialize();
        let mut out = [0u8; PUBLIC_KEY_SIZE];
        out.copy_from_slice(&full[1..]);
        out
    }

    /// Hex form used in node URLs (`scheme://<public-key-hex>@ip:port`)
    pub fn public_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    pub fn address(&self) -> H160 {
        public_to_address(&self.public_key_bytes())
    }

    /// Sign a 32-byte digest. RFC 6979 nonces make this deterministic.
    pub fn sign(&self, digest: &H256) -> RecoverableSignature {
        let message = Message::parse(digest.as_fixed_bytes());
        let (signature, recovery_id) = libsecp256k1::sign(&message, &self.secret);
        let raw = signature.serialize();
        RecoverableSignature {
            v: recovery_id.serialize(),
            r: U256::from_big_endian(&raw[..32]),
            s: U256::from_big_endian(&raw[32..]),
        }
    }
}

impl Debug for KeyPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        // never print the secret
        f.debug_struct("KeyPair")
            .field("address", &self.address())
            .finish()
    }
}

/// Derive the account address of an uncompressed public key
pub fn public_to_address(public: &[u8; PUBLIC_KEY_SIZE]) -> H160 {
    let hash = keccak(public);
    let mut address = H160::from_slice(&hash.as_bytes()[12..]);
    let first = &mut address.as_bytes_mut()[0];
    *first = (*first & 0x0f) | USER_ADDRESS_TYPE_BITS;
    address
}

/// `(v, r, s)` signature from which the signer's public key can be recovered
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub v: u8,
    pub r: U256,
    pub s: U256,
}

impl RecoverableSignature {
    fn to_parts(self) -> Result<(Signature, RecoveryId), CryptoError> {
        let mut raw = [0u8; 64];
        raw[..32].copy_from_slice(&u256_to_be_bytes(&self.r));
        raw[32..].copy_from_slice(&u256_to_be_bytes(&self.s));
        let signature = Signature::parse_standard(&raw)
            .map_err(|e| CryptoError::InvalidSignature(format!("{:?}", e)))?;
        let recovery_id = RecoveryId::parse(self.v)
            .map_err(|e| CryptoError::InvalidSignature(format!("{:?}", e)))?;
        Ok((signature, recovery_id))
    }

    /// Recover the uncompressed public key that produced this signature
    pub fn recover_public(&self, digest: &H256) -> Result<[u8; PUBLIC_KEY_SIZE], CryptoError> {
        let (signature, recovery_id) = self.to_parts()?;
        let message = Message::parse(digest.as_fixed_bytes());
        let public = libsecp256k1::recover(&message, &signature, &recovery_id)
            .map_err(|e| CryptoError::RecoveryFailed(format!("{:?}", e)))?;
        let full = public.serialize();
        let mut out = [0u8; PUBLIC_KEY_SIZE];
        out.copy_from_slice(&full[1..]);
        Ok(out)
    }

    pub fn recover_address(&self, digest: &H256) -> Result<H160, CryptoError> {
        self.recover_public(digest).map(|public| public_to_address(&public))
    }
}
