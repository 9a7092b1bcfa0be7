use std::fmt::{Display, Error, Formatter};

use log::trace;
use primitive_types::{H160, H256, U256};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::{Deserialize, Serialize};

use crate::{
    config::{GenesisConfig, TRANSFER_GAS},
    crypto::{keccak, CryptoError, KeyPair, RecoverableSignature},
};

#[cfg(test)]
mod tests;

const UNSIGNED_FIELDS: usize = 9;
const SIGNED_FIELDS: usize = 4;

/// Destination of a transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    // Deploy a contract; encoded as empty data
    Create,
    Call(H160),
}

// Written as a single value; the enclosing `append` does the item counting
impl Encodable for Action {
    fn rlp_append(&self, stream: &mut RlpStream) {
        match self {
            Action::Create => {
                stream.encoder().encode_value(&[]);
            }
            Action::Call(address) => {
                stream.append_internal(address);
            }
        }
    }
}

impl Decodable for Action {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.is_empty() {
            Ok(Action::Create)
        } else {
            Ok(Action::Call(rlp.as_val()?))
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub nonce: U256,
    pub gas_price: U256,
    pub gas: U256,
    pub action: Action,
    pub value: U256,
    pub storage_limit: u64,
    // Upper bound on the epoch in which the transaction may be packed
    pub epoch_height: u64,
    pub chain_id: u64,
    pub data: Vec<u8>,
}

impl UnsignedTransaction {
    /// Plain value transfer with the genesis fixture's chain id and the
    /// intrinsic transfer gas.
    pub fn transfer(config: &GenesisConfig, nonce: U256, receiver: H160, value: U256) -> Self {
        Self {
            nonce,
            gas_price: U256::one(),
            gas: U256::from(TRANSFER_GAS),
            action: Action::Call(receiver),
            value,
            storage_limit: 0,
            epoch_height: 0,
            chain_id: config.chain_id,
            data: Vec::new(),
        }
    }

    pub fn with_gas_price(mut self, gas_price: U256) -> Self {
        self.gas_price = gas_price;
        self
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn with_epoch_height(mut self, epoch_height: u64) -> Self {
        self.epoch_height = epoch_height;
        self
    }

    // Digest that gets signed
    pub fn signing_hash(&self) -> H256 {
        keccak(&rlp::encode(self))
    }

    /// Sign with `key`. Deterministic for a given key and payload.
    pub fn sign(self, key: &KeyPair) -> SignedTransaction {
        let signature = key.sign(&self.signing_hash());
        SignedTransaction::new(self, signature)
    }

    fn append_fields(&self, stream: &mut RlpStream) {
        stream
            .append(&self.nonce)
            .append(&self.gas_price)
            .append(&self.gas)
            .append(&self.action)
            .append(&self.value)
            .append(&self.storage_limit)
            .append(&self.epoch_height)
            .append(&self.chain_id)
            .append(&self.data);
    }
}

impl Encodable for UnsignedTransaction {
    fn rlp_append(&self, stream: &mut RlpStream) {
        stream.begin_list(UNSIGNED_FIELDS);
        self.append_fields(stream);
    }
}

impl Decodable for UnsignedTransaction {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != UNSIGNED_FIELDS {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            nonce: rlp.val_at(0)?,
            gas_price: rlp.val_at(1)?,
            gas: rlp.val_at(2)?,
            action: rlp.val_at(3)?,
            value: rlp.val_at(4)?,
            storage_limit: rlp.val_at(5)?,
            epoch_height: rlp.val_at(6)?,
            chain_id: rlp.val_at(7)?,
            data: rlp.val_at(8)?,
        })
    }
}

/// A signed transaction. Its hash is fixed when it is created and never
/// recomputed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    unsigned: UnsignedTransaction,
    signature: RecoverableSignature,
    hash: H256,
}

impl SignedTransaction {
    fn new(unsigned: UnsignedTransaction, signature: RecoverableSignature) -> Self {
        let mut tx = Self {
            unsigned,
            signature,
            hash: H256::zero(),
        };
        tx.hash = keccak(&rlp::encode(&tx));
        trace!("signed transaction {:#x}", tx.hash);
        tx
    }

    pub fn get_unsigned(&self) -> &UnsignedTransaction {
        &self.unsigned
    }

    pub fn get_signature(&self) -> &RecoverableSignature {
        &self.signature
    }

    pub fn hash(&self) -> H256 {
        self.hash
    }

    // 0x-prefixed, as the node's RPC expects
    pub fn hash_hex(&self) -> String {
        format!("{:#x}", self.hash)
    }

    /// Recover the sender address from the signature
    pub fn sender(&self) -> Result<H160, CryptoError> {
        self.signature
            .recover_address(&self.unsigned.signing_hash())
    }
}

impl Encodable for SignedTransaction {
    fn rlp_append(&self, stream: &mut RlpStream) {
        stream.begin_list(SIGNED_FIELDS);
        stream.append(&self.unsigned);
        stream
            .append(&self.signature.v)
            .append(&self.signature.r)
            .append(&self.signature.s);
    }
}

impl Decodable for SignedTransaction {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != SIGNED_FIELDS {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            unsigned: rlp.val_at(0)?,
            signature: RecoverableSignature {
                v: rlp.val_at(1)?,
                r: rlp.val_at(2)?,
                s: rlp.val_at(3)?,
            },
            hash: keccak(rlp.as_raw()),
        })
    }
}

impl Display for SignedTransaction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "Transaction[hash: {:#x}, nonce: {}, value: {}]",
            self.hash, self.unsigned.nonce, self.unsigned.value
        )
    }
}

/// Sign a plain transfer from `sender` to `receiver`.
pub fn create_transaction(
    config: &GenesisConfig,
    sender: &KeyPair,
    nonce: U256,
    gas_price: U256,
    receiver: H160,
    value: U256,
) -> SignedTransaction {
    UnsignedTransaction::transfer(config, nonce, receiver, value)
        .with_gas_price(gas_price)
        .sign(sender)
}
