//! The assembler's view of the mempool.
//!
//! The mempool proper (admission, eviction, replacement) lives outside the
//! core; the assembler consumes a snapshot of entries pinned to a specific
//! tip, with fees, sizes, sigops, and in-pool dependency edges precomputed.

use std::collections::HashMap;
use std::sync::Arc;

use bch_chain::amount::{Amount, NonNegative};
use bch_chain::block::{self, Height};
use bch_chain::transaction::{self, Transaction};
use bch_consensus::transaction::{check_inputs, transaction_sigops, InputError};
use bch_consensus::CoinView;
use bch_script::VerifyFlags;

/// One mempool transaction with the metadata selection needs.
#[derive(Debug, Clone)]
pub struct MempoolEntry {
    pub tx: Arc<Transaction>,
    pub hash: transaction::Hash,
    pub fee: Amount<NonNegative>,
    pub size: usize,
    pub sigops: usize,
    /// The chain height when the entry was admitted, for priority aging.
    pub height: Height,
    /// Total value of the spent coins, weighted by their age at admission.
    coin_age_value: u128,
    /// Unweighted total value of the spent coins.
    input_value: u128,
    /// Fee plus the fees of every in-pool descendant.
    desc_fee: Amount<NonNegative>,
    /// Size plus the sizes of every in-pool descendant.
    desc_size: usize,
    /// In-pool parents this entry spends.
    pub depends: Vec<transaction::Hash>,
}

impl MempoolEntry {
    /// Build an entry by resolving the transaction against `view` at the
    /// current `height`.
    ///
    /// `depends` must name the in-pool parents; their outputs must already
    /// be visible in `view` (the snapshot builder applies pool
    /// transactions to its view as it admits them).
    pub fn new(
        tx: Arc<Transaction>,
        view: &mut CoinView<'_>,
        height: Height,
        flags: VerifyFlags,
        depends: Vec<transaction::Hash>,
    ) -> Result<MempoolEntry, InputError> {
        let hash = tx.hash();
        let size = tx.serialized_size();
        let sigops = transaction_sigops(&tx, view, flags)?;

        // Sum input value weighted by confirmations before spending them.
        let mut coin_age_value: u128 = 0;
        let mut input_value: u128 = 0;
        for input in &tx.inputs {
            if let Some(outpoint) = input.outpoint() {
                if let Some(coin) = view.get(&outpoint).map_err(InputError::Store)? {
                    let age = u128::from(height.0.saturating_sub(coin.height.0));
                    coin_age_value += age * coin.output.value.value() as u128;
                    input_value += coin.output.value.value() as u128;
                }
            }
        }

        let fee = check_inputs(&tx, view, height)?;
        view.apply_transaction(&tx, height);

        Ok(MempoolEntry {
            tx,
            hash,
            fee,
            size,
            sigops,
            height,
            coin_age_value,
            input_value,
            desc_fee: fee,
            desc_size: size,
            depends,
        })
    }

    /// Coin-age-weighted priority at `height`, the legacy free-transaction
    /// metric: sum of input value times confirmations, over size.
    pub fn priority(&self, height: Height) -> f64 {
        let aged = u128::from(height.0.saturating_sub(self.height.0));
        let value = self.coin_age_value + self.input_value * aged;
        value as f64 / self.size.max(1) as f64
    }

    /// Fee rate in smallest units per kilobyte.
    pub fn rate(&self) -> u64 {
        fee_rate(self.fee, self.size)
    }

    /// Fee rate including in-pool descendants.
    pub fn desc_rate(&self) -> u64 {
        fee_rate(self.desc_fee, self.desc_size)
    }
}

fn fee_rate(fee: Amount<NonNegative>, size: usize) -> u64 {
    if size == 0 {
        return 0;
    }
    (fee.value() as u64).saturating_mul(1000) / size as u64
}

/// A mempool snapshot pinned to a tip.
///
/// Entries keep their insertion order, which is also a valid topological
/// order: a parent is always admitted before its spenders.
pub struct MempoolSnapshot {
    /// The tip this snapshot is consistent with.
    pub tip: block::Hash,
    entries: Vec<MempoolEntry>,
    index: HashMap<transaction::Hash, usize>,
}

impl MempoolSnapshot {
    pub fn new(tip: block::Hash) -> MempoolSnapshot {
        MempoolSnapshot {
            tip,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Admit an entry, propagating its fee and size into every in-pool
    /// ancestor's descendant totals.
    pub fn insert(&mut self, entry: MempoolEntry) {
        // Collect the transitive ancestor set first to avoid double
        // counting diamond dependencies.
        let mut ancestors = Vec::new();
        let mut stack: Vec<transaction::Hash> = entry.depends.clone();
        while let Some(hash) = stack.pop() {
            if let Some(&i) = self.index.get(&hash) {
                if !ancestors.contains(&i) {
                    ancestors.push(i);
                    stack.extend(self.entries[i].depends.iter().cloned());
                }
            }
        }
        for i in ancestors {
            let ancestor = &mut self.entries[i];
            ancestor.desc_fee = (ancestor.desc_fee + entry.fee)
                .unwrap_or(ancestor.desc_fee);
            ancestor.desc_size += entry.size;
        }

        self.index.insert(entry.hash, self.entries.len());
        self.entries.push(entry);
    }

    pub fn get(&self, hash: &transaction::Hash) -> Option<&MempoolEntry> {
        self.index.get(hash).map(|&i| &self.entries[i])
    }

    pub fn position(&self, hash: &transaction::Hash) -> Option<usize> {
        self.index.get(hash).copied()
    }

    pub fn contains(&self, hash: &transaction::Hash) -> bool {
        self.index.contains_key(hash)
    }

    pub fn entries(&self) -> &[MempoolEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
impl MempoolEntry {
    /// A hand-built entry for selection tests, bypassing UTXO resolution.
    pub(crate) fn fake(
        tx: Arc<Transaction>,
        fee: i64,
        size: usize,
        sigops: usize,
        coin_age_value: u128,
        depends: Vec<transaction::Hash>,
    ) -> MempoolEntry {
        use std::convert::TryFrom;

        let hash = tx.hash();
        let fee = Amount::try_from(fee).expect("test fees are in range");
        MempoolEntry {
            tx,
            hash,
            fee,
            size,
            sigops,
            height: Height(0),
            coin_age_value,
            input_value: 0,
            desc_fee: fee,
            desc_size: size,
            depends,
        }
    }
}
