//! The in-flight block under construction.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use primitive_types::U256;

use bch_chain::amount::{Amount, NonNegative};
use bch_chain::block::{self, merkle, Block, Header, Height};
use bch_chain::transaction::{self, Transaction};
use bch_chain::work::difficulty::CompactDifficulty;
use bch_script::VerifyFlags;

/// One selected mempool transaction inside a template.
#[derive(Debug, Clone)]
pub struct TemplateEntry {
    pub tx: Arc<Transaction>,
    pub hash: transaction::Hash,
    pub fee: Amount<NonNegative>,
    pub size: usize,
    pub sigops: usize,
}

/// Everything a miner needs to start hashing a candidate block.
#[derive(Clone)]
pub struct BlockTemplate {
    /// The height the block will occupy.
    pub height: Height,
    /// The tip the block builds on.
    pub prev_hash: block::Hash,
    /// The version field, including version-bits signalling.
    pub version: i32,
    /// The header timestamp.
    pub time: DateTime<Utc>,
    /// The required target, in compact form.
    pub bits: CompactDifficulty,
    /// Median-time-past of the parent, the lock-time cutoff.
    pub median_time_past: DateTime<Utc>,
    /// The script rules the block will be validated under.
    pub flags: VerifyFlags,
    /// Whether the transaction list is canonically sorted.
    pub canonical_order: bool,
    /// The assembled coinbase.
    pub coinbase: Arc<Transaction>,
    /// Selected transactions, in final block order (after the coinbase).
    pub entries: Vec<TemplateEntry>,
    /// Total fees collected by the coinbase.
    pub fees: Amount<NonNegative>,
    /// Running sigop count, including the coinbase.
    pub sigops: usize,
    /// Running serialized size.
    pub size: usize,
}

impl BlockTemplate {
    /// Materialize the template into a block with the given nonce,
    /// refreshing the merkle root.
    pub fn to_block(&self, nonce: u32) -> Block {
        let mut transactions = Vec::with_capacity(1 + self.entries.len());
        transactions.push(self.coinbase.clone());
        transactions.extend(self.entries.iter().map(|entry| entry.tx.clone()));

        let hashes: Vec<_> = transactions.iter().map(|tx| tx.hash()).collect();
        let merkle_root = merkle::root_and_mutation(&hashes).0;

        Block {
            header: Header::new(
                self.version,
                self.prev_hash,
                merkle_root,
                self.time,
                self.bits,
                nonce,
            ),
            transactions,
        }
    }

    /// The nominal difficulty of the target: how many times harder than
    /// difficulty one.
    pub fn difficulty(&self) -> f64 {
        let target = match self.bits.to_expanded() {
            Some(target) => target.to_u256(),
            None => return 0.0,
        };
        let diff1 = U256::from(0xffffu64) << 208;
        u256_to_f64(diff1) / u256_to_f64(target)
    }
}

fn u256_to_f64(value: U256) -> f64 {
    let bits = value.bits();
    if bits <= 128 {
        value.as_u128() as f64
    } else {
        let shift = bits - 128;
        (value >> shift).as_u128() as f64 * 2f64.powi(shift as i32)
    }
}
