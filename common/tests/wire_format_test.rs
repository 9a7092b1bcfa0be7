// Wire format checks against well-known constants and tampered encodings

use dagnet_common::block::{make_genesis, satisfies_work, BlockBuilder};
use dagnet_common::config::GenesisConfig;
use dagnet_common::crypto::{keccak, keccak_empty_list_rlp, keccak_null_rlp};
use dagnet_common::transaction::{create_transaction, SignedTransaction};
use dagnet_common::{H160, H256, U256};
use rlp::{Rlp, RlpStream};

fn h256(hex_str: &str) -> H256 {
    H256::from_slice(&hex::decode(hex_str).unwrap())
}

#[test]
fn test_empty_root_constants() {
    assert_eq!(
        keccak_null_rlp(),
        h256("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421")
    );
    assert_eq!(
        keccak_empty_list_rlp(),
        h256("1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347")
    );
    assert_eq!(
        keccak(b""),
        h256("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470")
    );
}

#[test]
fn test_block_layout() {
    let config = GenesisConfig::default();
    let genesis = make_genesis(&config);
    let block = BlockBuilder::new(&config)
        .with_parent(genesis.hash(), 0)
        .with_timestamp(1_700_000_000)
        .build()
        .unwrap();

    let encoded = rlp::encode(&block);
    let rlp = Rlp::new(&encoded);
    assert_eq!(rlp.item_count().unwrap(), 2);
    // header fields including the nonce
    assert_eq!(rlp.at(0).unwrap().item_count().unwrap(), 14);
    assert_eq!(rlp.at(1).unwrap().item_count().unwrap(), 0);

    let header = block.get_header();
    assert!(satisfies_work(&header.pow_digest(), &config.test_difficulty));
    assert_eq!(header.transactions_root, keccak_null_rlp());
}

#[test]
fn test_tampered_value_changes_recovered_sender() {
    let config = GenesisConfig::default();
    let sender = config.genesis_key().unwrap();
    let tx = create_transaction(
        &config,
        &sender,
        U256::zero(),
        U256::one(),
        H160::from_low_u64_be(0x42),
        U256::one(),
    );
    assert_eq!(tx.sender().unwrap(), sender.address());

    let mut unsigned = tx.get_unsigned().clone();
    unsigned.value = U256::from(1_000_000u64);
    let signature = tx.get_signature();
    let mut stream = RlpStream::new_list(4);
    stream
        .append(&unsigned)
        .append(&signature.v)
        .append(&signature.r)
        .append(&signature.s);
    let forged: SignedTransaction = rlp::decode(&stream.out()).unwrap();

    assert_ne!(forged.hash(), tx.hash());
    // either recovery fails or it yields someone else
    if let Ok(recovered) = forged.sender() {
        assert_ne!(recovered, sender.address());
    }
}

#[test]
fn test_invalid_recovery_id_is_rejected() {
    let config = GenesisConfig::default();
    let sender = config.genesis_key().unwrap();
    let tx = create_transaction(
        &config,
        &sender,
        U256::zero(),
        U256::one(),
        H160::from_low_u64_be(0x42),
        U256::one(),
    );

    let signature = tx.get_signature();
    let mut stream = RlpStream::new_list(4);
    stream
        .append(tx.get_unsigned())
        .append(&9u8)
        .append(&signature.r)
        .append(&signature.s);
    let forged: SignedTransaction = rlp::decode(&stream.out()).unwrap();
    assert!(forged.sender().is_err());
}
