// Peer protocol messages the harness sends straight to a node.
//
// A message travels as a one byte id followed by its RLP payload. Framing
// on the socket is the peer link's concern.

use primitive_types::H256;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use thiserror::Error;

use crate::transaction::SignedTransaction;

pub const STATUS: u8 = 0x22;
pub const TRANSACTIONS: u8 = 0x02;

pub const PROTOCOL_VERSION: u64 = 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("unknown message id {0:#04x}")]
    UnknownId(u8),
    #[error("malformed payload for message {id:#04x}: {reason}")]
    Malformed { id: u8, reason: String },
}

/// Handshake payload, keyed by the genesis hash
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusMessage {
    pub protocol_version: u64,
    pub chain_id: u64,
    pub genesis_hash: H256,
    pub best_epoch: u64,
    pub terminal_hashes: Vec<H256>,
}

impl StatusMessage {
    // Status of a client that has nothing beyond genesis
    pub fn at_genesis(chain_id: u64, genesis_hash: H256) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            chain_id,
            genesis_hash,
            best_epoch: 0,
            terminal_hashes: vec![genesis_hash],
        }
    }
}

impl Encodable for StatusMessage {
    fn rlp_append(&self, stream: &mut RlpStream) {
        stream
            .begin_list(5)
            .append(&self.protocol_version)
            .append(&self.chain_id)
            .append(&self.genesis_hash)
            .append(&self.best_epoch)
            .append_list::<H256, H256>(&self.terminal_hashes);
    }
}

impl Decodable for StatusMessage {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 5 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            protocol_version: rlp.val_at(0)?,
            chain_id: rlp.val_at(1)?,
            genesis_hash: rlp.val_at(2)?,
            best_epoch: rlp.val_at(3)?,
            terminal_hashes: rlp.list_at(4)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolMessage {
    Status(StatusMessage),
    Transactions(Vec<SignedTransaction>),
}

impl ProtocolMessage {
    pub fn id(&self) -> u8 {
        match self {
            ProtocolMessage::Status(_) => STATUS,
            ProtocolMessage::Transactions(_) => TRANSACTIONS,
        }
    }

    pub fn encode_payload(&self) -> Vec<u8> {
        match self {
            ProtocolMessage::Status(status) => rlp::encode(status).to_vec(),
            ProtocolMessage::Transactions(txs) => {
                rlp::encode_list::<SignedTransaction, SignedTransaction>(txs).to_vec()
            }
        }
    }

    pub fn decode(id: u8, payload: &[u8]) -> Result<Self, MessageError> {
        let malformed = |e: DecoderError| MessageError::Malformed {
            id,
            reason: e.to_string(),
        };
        match id {
            STATUS => rlp::decode(payload)
                .map(ProtocolMessage::Status)
                .map_err(malformed),
            TRANSACTIONS => Rlp::new(payload)
                .as_list()
                .map(ProtocolMessage::Transactions)
                .map_err(malformed),
            other => Err(MessageError::UnknownId(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::GenesisConfig, transaction::UnsignedTransaction};
    use primitive_types::{H160, U256};

    #[test]
    fn test_status_roundtrip() {
        let status = StatusMessage::at_genesis(10, H256::repeat_byte(7));
        let message = ProtocolMessage::Status(status.clone());
        assert_eq!(message.id(), STATUS);
        let decoded = ProtocolMessage::decode(STATUS, &message.encode_payload()).unwrap();
        assert_eq!(decoded, ProtocolMessage::Status(status));
    }

    #[test]
    fn test_transactions_keep_their_hashes() {
        let config = GenesisConfig::default();
        let key = config.genesis_key().unwrap();
        let tx = UnsignedTransaction::transfer(&config, U256::zero(), H160::repeat_byte(1), U256::one())
            .sign(&key);
        let message = ProtocolMessage::Transactions(vec![tx.clone()]);
        match ProtocolMessage::decode(TRANSACTIONS, &message.encode_payload()).unwrap() {
            ProtocolMessage::Transactions(txs) => {
                assert_eq!(txs.len(), 1);
                assert_eq!(txs[0].hash(), tx.hash());
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            ProtocolMessage::decode(0x7f, &[]),
            Err(MessageError::UnknownId(0x7f))
        );
        assert!(matches!(
            ProtocolMessage::decode(STATUS, &[0xc1, 0x01]),
            Err(MessageError::Malformed { id: STATUS, .. })
        ));
    }
}
