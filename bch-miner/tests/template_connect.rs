//! The full mining loop: fund an address, put a dependent transaction pair
//! in the pool, assemble under canonical ordering, and connect the result.

use std::convert::TryFrom;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

use bch_chain::amount::{Amount, NonNegative, COIN};
use bch_chain::block::{merkle, Block, Header, Height};
use bch_chain::parameters::Network;
use bch_chain::transaction::{LockTime, Transaction};
use bch_chain::transparent::{
    Address, CoinbaseData, Input, OutPoint, Output, Script, ToAddressWithNetwork, SEQUENCE_FINAL,
};
use bch_consensus::{BoxError, UtxoEntry, UtxoReader};
use bch_miner::{assemble, assembler::assemble_verified, AssemblerOptions, MempoolEntry, MempoolSnapshot};
use bch_script::sighash::{SigHashCache, SigHashType};
use bch_script::standard;
use bch_state::entry::ChainEntry;
use bch_state::{ChainState, MemoryStore, Store};

const NETWORK: Network = Network::Regtest;

fn now_for_tests() -> DateTime<Utc> {
    bch_chain::serialization::datetime_from_wire(1_296_688_602 + 90 * 24 * 3600)
}

fn one_key() -> (SecretKey, PublicKey) {
    let secp = Secp256k1::new();
    let mut sk_bytes = [0u8; 32];
    sk_bytes[31] = 1;
    let sk = SecretKey::from_slice(&sk_bytes).unwrap();
    let pk = PublicKey::from_secret_key(&secp, &sk);
    (sk, pk)
}

/// Mine a block with a single coinbase paying `lock_script`.
fn mine_simple_block(parent: &ChainEntry, lock_script: Script, extra: u8) -> Arc<Block> {
    let height = Height(parent.height.0 + 1);
    let mut data = Vec::new();
    standard::push_number(&mut data, i64::from(height.0));
    data.extend_from_slice(&[extra, 0, 0, 0]);

    let subsidy = bch_consensus::block::block_subsidy(height, NETWORK.halving_interval());
    let coinbase = Arc::new(Transaction::new(
        1,
        vec![Input::Coinbase {
            data: CoinbaseData::new(data),
            sequence: SEQUENCE_FINAL,
        }],
        vec![Output {
            value: subsidy,
            lock_script,
        }],
        LockTime::unlocked(),
    ));

    let hashes = vec![coinbase.hash()];
    let merkle_root = merkle::root_and_mutation(&hashes).0;
    let time = parent.time + Duration::seconds(600);
    solve(Header::new(1, parent.hash, merkle_root, time, parent.bits, 0), vec![coinbase])
}

fn solve(header: Header, transactions: Vec<Arc<Transaction>>) -> Arc<Block> {
    let target = header.bits.to_expanded().expect("test bits are valid");
    let mut nonce = 0u32;
    loop {
        let candidate = Header::new(
            header.version,
            header.previous_block_hash,
            header.merkle_root,
            header.time,
            header.bits,
            nonce,
        );
        if target.is_met_by(&candidate.hash()) {
            return Arc::new(Block {
                header: candidate,
                transactions,
            });
        }
        nonce += 1;
    }
}

/// Reads the chain's committed UTXO set for snapshot building.
struct ChainUtxos<'a, S: Store>(&'a ChainState<S>);

impl<'a, S: Store> UtxoReader for ChainUtxos<'a, S> {
    fn utxo(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, BoxError> {
        self.0.utxo(outpoint).map_err(|e| Box::new(e) as BoxError)
    }
}

/// Sign input 0 of `tx` spending `coin_value` locked by `lock_script`.
fn sign_input(
    tx: &mut Transaction,
    lock_script: &Script,
    coin_value: Amount<NonNegative>,
    sk: &SecretKey,
    pk: &PublicKey,
) {
    let flags = bch_script::VerifyFlags::SIGHASH_FORKID;
    let hash_type = SigHashType(SigHashType::ALL | SigHashType::FORKID);
    let digest =
        SigHashCache::new(tx).signature_hash(0, &lock_script.0, coin_value, hash_type, flags);

    let secp = Secp256k1::new();
    let mut sig = secp
        .sign_ecdsa(&Message::from_digest(digest), sk)
        .serialize_der()
        .to_vec();
    sig.push(0x41);

    let mut unlock = Vec::new();
    standard::push_data(&mut unlock, &sig);
    standard::push_data(&mut unlock, &pk.serialize());

    let (outpoint, sequence) = match &tx.inputs[0] {
        Input::PrevOut {
            outpoint, sequence, ..
        } => (*outpoint, *sequence),
        _ => unreachable!("test inputs are prevouts"),
    };
    tx.inputs[0] = Input::PrevOut {
        outpoint,
        unlock_script: Script(unlock),
        sequence,
    };
}

/// A funded regtest chain: the coin at height 1 pays `address` and is
/// mature at the returned tip.
fn funded_chain() -> (ChainState<Arc<MemoryStore>>, Address, OutPoint) {
    let (_, pk) = one_key();
    let address = pk.to_address(NETWORK);

    let store = Arc::new(MemoryStore::new());
    let mut chain = ChainState::open(store, NETWORK).unwrap();

    let funding = mine_simple_block(&chain.tip(), address.lock_script(), 0xfa);
    let funding_outpoint = OutPoint {
        hash: funding.transactions[0].hash(),
        index: 0,
    };
    chain.accept_block(funding, now_for_tests()).unwrap();

    for i in 0..100u32 {
        let block = mine_simple_block(&chain.tip(), Script(vec![0x51]), (i % 250) as u8);
        chain.accept_block(block, now_for_tests()).unwrap();
    }
    assert_eq!(chain.height(), Height(101));

    (chain, address, funding_outpoint)
}

/// Build the dependent pair: `tx1` spends the funding coin, `tx2` spends
/// `tx1`, and `txid(tx2) < txid(tx1)` so canonical order inverts the
/// dependency order.
fn dependent_pair(
    address: &Address,
    funding: OutPoint,
) -> (Arc<Transaction>, Arc<Transaction>, i64, i64) {
    let (sk, pk) = one_key();
    let lock_script = address.lock_script();
    let funding_value = Amount::try_from(50 * COIN).unwrap();

    let tx1_fee = 10_000i64;
    let tx1_out = 50 * COIN - tx1_fee;
    let mut tx1 = Transaction::new(
        1,
        vec![Input::PrevOut {
            outpoint: funding,
            unlock_script: Script(vec![]),
            sequence: SEQUENCE_FINAL,
        }],
        vec![Output {
            value: Amount::try_from(tx1_out).unwrap(),
            lock_script: lock_script.clone(),
        }],
        LockTime::unlocked(),
    );
    sign_input(&mut tx1, &lock_script, funding_value, &sk, &pk);
    let tx1 = Arc::new(tx1);

    // Vary the second transaction's fee until its id sorts below tx1's.
    let mut tx2_fee = 5_000i64;
    let tx2 = loop {
        let mut tx2 = Transaction::new(
            1,
            vec![Input::PrevOut {
                outpoint: OutPoint {
                    hash: tx1.hash(),
                    index: 0,
                },
                unlock_script: Script(vec![]),
                sequence: SEQUENCE_FINAL,
            }],
            vec![Output {
                value: Amount::try_from(tx1_out - tx2_fee).unwrap(),
                lock_script: lock_script.clone(),
            }],
            LockTime::unlocked(),
        );
        sign_input(
            &mut tx2,
            &lock_script,
            Amount::try_from(tx1_out).unwrap(),
            &sk,
            &pk,
        );
        if tx2.hash().txid_cmp(&tx1.hash()) == std::cmp::Ordering::Less {
            break Arc::new(tx2);
        }
        tx2_fee += 1;
    };

    (tx1, tx2, tx1_fee, tx2_fee)
}

fn snapshot_with(
    chain: &ChainState<Arc<MemoryStore>>,
    order: &[&Arc<Transaction>],
    tx1: &Arc<Transaction>,
) -> MempoolSnapshot {
    let tip = chain.tip();
    let flags = chain.script_flags(&tip);
    let height = Height(tip.height.0 + 1);

    let reader = ChainUtxos(chain);
    let mut view = bch_consensus::CoinView::new(&reader);

    // Entries must be resolved parent-first so the child sees the parent's
    // outputs; insertion order into the snapshot is the caller's choice.
    let entry1 = MempoolEntry::new(tx1.clone(), &mut view, height, flags, vec![]).unwrap();
    let mut entries = vec![entry1];
    for tx in order {
        if tx.hash() != tx1.hash() {
            let entry =
                MempoolEntry::new((*tx).clone(), &mut view, height, flags, vec![tx1.hash()])
                    .unwrap();
            entries.push(entry);
        }
    }

    let mut snapshot = MempoolSnapshot::new(tip.hash);
    for wanted in order {
        let position = entries
            .iter()
            .position(|entry| entry.hash == wanted.hash())
            .expect("entry was built");
        snapshot.insert(entries[position].clone());
    }
    snapshot
}

#[test]
fn canonical_template_connects_regardless_of_pool_order() {
    bch_test::init();

    for flipped in &[false, true] {
        let (mut chain, address, funding) = funded_chain();
        let (tx1, tx2, tx1_fee, tx2_fee) = dependent_pair(&address, funding);
        assert_eq!(
            tx2.hash().txid_cmp(&tx1.hash()),
            std::cmp::Ordering::Less,
            "the pair must invert dependency order under canonical sorting"
        );

        let order: Vec<&Arc<Transaction>> = if *flipped {
            vec![&tx2, &tx1]
        } else {
            vec![&tx1, &tx2]
        };
        let snapshot = snapshot_with(&chain, &order, &tx1);

        let options = AssemblerOptions::new(address);
        let template =
            assemble_verified(&mut chain, &snapshot, &options, now_for_tests()).unwrap();

        // Canonical order puts tx2 first even though it spends tx1.
        assert!(template.canonical_order);
        let ids: Vec<_> = template.entries.iter().map(|e| e.hash).collect();
        assert_eq!(ids, vec![tx2.hash(), tx1.hash()]);
        assert_eq!(template.fees.value(), tx1_fee + tx2_fee);

        // The coinbase claims subsidy plus fees.
        let subsidy =
            bch_consensus::block::block_subsidy(template.height, NETWORK.halving_interval());
        assert_eq!(
            template.coinbase.outputs[0].value.value(),
            subsidy.value() + tx1_fee + tx2_fee
        );

        // Solve and connect: the chain accepts its own template.
        let unsolved = template.to_block(0);
        let block = solve(unsolved.header, unsolved.transactions.clone());
        let entry = chain.accept_block(block, now_for_tests()).unwrap();
        assert_eq!(entry.height, Height(102));
        assert_eq!(chain.tip().hash, entry.hash, "flipped={}", flipped);
    }
}

#[test]
fn stale_snapshot_is_rejected() {
    bch_test::init();

    let (mut chain, address, _funding) = funded_chain();
    let snapshot = MempoolSnapshot::new(bch_chain::block::Hash([0x99; 32]));
    let options = AssemblerOptions::new(address);
    match assemble(&mut chain, &snapshot, &options, now_for_tests()) {
        Err(bch_miner::AssemblerError::StaleSnapshot { .. }) => {}
        other => panic!(
            "expected stale snapshot, got {:?}",
            other.map(|t| t.height)
        ),
    }
}

#[test]
fn empty_pool_template_still_connects() {
    bch_test::init();

    let (mut chain, address, _funding) = funded_chain();
    let snapshot = MempoolSnapshot::new(chain.tip().hash);
    let options = AssemblerOptions::new(address);
    let template = assemble_verified(&mut chain, &snapshot, &options, now_for_tests()).unwrap();
    assert!(template.entries.is_empty());

    let unsolved = template.to_block(0);
    let block = solve(unsolved.header, unsolved.transactions.clone());
    chain.accept_block(block, now_for_tests()).unwrap();
    assert_eq!(chain.height(), Height(102));
}
