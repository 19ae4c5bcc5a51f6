use std::convert::TryFrom;
use std::sync::Arc;

use super::*;
use crate::amount::Amount;
use crate::parameters::{genesis_block, Network};
use crate::serialization::{CashDeserialize, CashSerialize};
use crate::transaction::{LockTime, Transaction};
use crate::transparent::{CoinbaseData, Input, Output, Script, SEQUENCE_FINAL};

fn coinbase_with_data(data: Vec<u8>) -> Arc<Transaction> {
    Arc::new(Transaction::new(
        1,
        vec![Input::Coinbase {
            data: CoinbaseData::new(data),
            sequence: SEQUENCE_FINAL,
        }],
        vec![Output {
            value: Amount::try_from(50 * crate::amount::COIN).unwrap(),
            lock_script: Script(vec![0x51]),
        }],
        LockTime::unlocked(),
    ))
}

#[test]
fn genesis_roundtrips() {
    bch_test::init();

    for network in &[Network::Mainnet, Network::Testnet, Network::Regtest] {
        let block = genesis_block(*network);
        let bytes = block.cash_serialize_to_vec().unwrap();
        assert_eq!(bytes.len(), block.serialized_size());

        let parsed = Block::cash_deserialize(&bytes[..]).unwrap();
        assert_eq!(parsed, block);
        assert_eq!(parsed.hash(), block.hash());
        assert_eq!(parsed.cash_serialize_to_vec().unwrap(), bytes);
    }
}

#[test]
fn mainnet_genesis_bytes_are_canonical() {
    bch_test::init();

    // The first 80 bytes are the header; check the stable prefix fields.
    let bytes = genesis_block(Network::Mainnet)
        .cash_serialize_to_vec()
        .unwrap();
    assert_eq!(&bytes[0..4], &[1, 0, 0, 0]);
    assert_eq!(&bytes[4..36], &[0u8; 32][..]);
    // One transaction.
    assert_eq!(bytes[80], 1);
    assert_eq!(bytes.len(), 285);
}

#[test]
fn coinbase_height_parses_bip34_pushes() {
    bch_test::init();

    let cases: Vec<(Vec<u8>, Option<Height>)> = vec![
        // OP_1: height 1.
        (vec![0x51, 0x00], Some(Height(1))),
        // Push of one byte.
        (vec![0x01, 0x64], Some(Height(100))),
        // Push of three bytes, little-endian.
        (vec![0x03, 0x40, 0x4b, 0x4c], Some(Height(0x4c4b40))),
        // Sign bit set: not a height.
        (vec![0x01, 0x80], None),
        // Not a push at all.
        (vec![0xff, 0xff], None),
    ];

    for (data, expected) in cases {
        let block = Block {
            header: genesis_block(Network::Regtest).header,
            transactions: vec![coinbase_with_data(data.clone())],
        };
        assert_eq!(block.coinbase_height(), expected, "data {:?}", data);
    }
}

#[test]
fn transaction_hashes_match_merkle_leaves() {
    bch_test::init();

    let block = genesis_block(Network::Mainnet);
    let hashes = block.transaction_hashes();
    assert_eq!(hashes.len(), 1);
    let (root, mutated) = merkle::root_and_mutation(&hashes);
    assert_eq!(root, block.header.merkle_root);
    assert!(!mutated);
}

#[test]
fn oversized_transaction_count_is_rejected() {
    bch_test::init();

    let mut bytes = genesis_block(Network::Mainnet)
        .cash_serialize_to_vec()
        .unwrap();
    // Replace the transaction count varint with a 64-bit maximum.
    bytes.truncate(80);
    bytes.extend_from_slice(&[0xff; 9]);
    assert!(Block::cash_deserialize(&bytes[..]).is_err());
}
