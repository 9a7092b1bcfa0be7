use primitive_types::{H160, U256};
use rand::{rngs::StdRng, SeedableRng};

use super::*;
use crate::block::transactions_root;

fn genesis_key() -> KeyPair {
    GenesisConfig::default().genesis_key().unwrap()
}

fn sample_transfer() -> UnsignedTransaction {
    let config = GenesisConfig::default();
    let receiver = KeyPair::random(&mut StdRng::seed_from_u64(5)).address();
    UnsignedTransaction::transfer(&config, U256::zero(), receiver, U256::one())
}

#[test]
fn test_signing_is_idempotent() {
    let key = genesis_key();
    let first = sample_transfer().sign(&key);
    let second = sample_transfer().sign(&key);

    assert_eq!(first.hash(), second.hash());
    assert_eq!(first.hash_hex(), second.hash_hex());
    assert_eq!(first.sender().unwrap(), second.sender().unwrap());
    assert_eq!(first.sender().unwrap(), key.address());
}

#[test]
fn test_hash_hex_is_prefixed() {
    let tx = sample_transfer().sign(&genesis_key());
    let hex = tx.hash_hex();
    assert!(hex.starts_with("0x"));
    assert_eq!(hex.len(), 66);
}

#[test]
fn test_different_payloads_differ() {
    let key = genesis_key();
    let a = sample_transfer().sign(&key);
    let b = sample_transfer().with_data(vec![1, 2, 3]).sign(&key);
    assert_ne!(a.hash(), b.hash());
}

#[test]
fn test_decode_recomputes_hash() {
    let tx = sample_transfer().sign(&genesis_key());
    let encoded = rlp::encode(&tx);
    let decoded: SignedTransaction = rlp::decode(&encoded).unwrap();
    assert_eq!(decoded, tx);
    assert_eq!(decoded.hash(), tx.hash());
}

#[test]
fn test_create_action_encodes_as_empty_data() {
    let mut unsigned = sample_transfer();
    unsigned.action = Action::Create;
    let encoded = rlp::encode(&unsigned);
    let view = Rlp::new(&encoded);
    assert!(view.at(3).unwrap().is_empty());
    let decoded: UnsignedTransaction = rlp::decode(&encoded).unwrap();
    assert_eq!(decoded.action, Action::Create);
}

#[test]
fn test_rejects_short_list() {
    let mut stream = RlpStream::new_list(2);
    stream.append(&1u64).append(&2u64);
    let result: Result<UnsignedTransaction, _> = rlp::decode(&stream.out());
    assert!(result.is_err());
}

#[test]
fn test_transfer_defaults() {
    let config = GenesisConfig::default();
    let receiver = H160::repeat_byte(0x1a);
    let tx = create_transaction(
        &config,
        &genesis_key(),
        U256::zero(),
        U256::one(),
        receiver,
        U256::from(7u64),
    );
    let unsigned = tx.get_unsigned();
    assert_eq!(unsigned.gas, U256::from(TRANSFER_GAS));
    assert_eq!(unsigned.chain_id, config.chain_id);
    assert_eq!(unsigned.action, Action::Call(receiver));
    assert!(unsigned.data.is_empty());
}

#[test]
fn test_transactions_root_of_list() {
    let key = genesis_key();
    let txs = vec![
        sample_transfer().sign(&key),
        sample_transfer().with_epoch_height(3).sign(&key),
    ];
    let expected = keccak(&rlp::encode_list::<SignedTransaction, SignedTransaction>(&txs));
    assert_eq!(transactions_root(&txs), expected);
    assert_eq!(transactions_root(&[]), crate::crypto::keccak_empty_list_rlp());
}

#[test]
fn test_unsigned_transfer_bytes() {
    let unsigned = UnsignedTransaction {
        nonce: U256::zero(),
        gas_price: U256::one(),
        gas: U256::from(TRANSFER_GAS),
        action: Action::Call(H160::repeat_byte(0x01)),
        value: U256::one(),
        storage_limit: 0,
        epoch_height: 0,
        chain_id: 10,
        data: vec![0xaa, 0xbb],
    };
    // nonce, gas price, gas, receiver, value, storage limit, epoch, chain id, data
    let expected = format!("e1800182520894{}0180800a82aabb", "01".repeat(20));
    let encoded = rlp::encode(&unsigned);
    assert_eq!(hex::encode(&encoded), expected);
    assert_eq!(Rlp::new(&encoded).item_count().unwrap(), 9);

    let decoded: UnsignedTransaction = rlp::decode(&encoded).unwrap();
    assert_eq!(decoded, unsigned);
}

#[test]
fn test_signed_transaction_has_four_items() {
    let tx = sample_transfer().with_data(vec![0xaa]).sign(&genesis_key());
    let encoded = rlp::encode(&tx);
    let view = Rlp::new(&encoded);
    assert_eq!(view.item_count().unwrap(), 4);
    assert_eq!(view.at(0).unwrap().item_count().unwrap(), 9);
    assert_eq!(view.at(0).unwrap().at(8).unwrap().data().unwrap(), &[0xaa]);
}
