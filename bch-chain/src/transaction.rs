//! Transactions and transaction-related structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cash_serde_derive::CashSerialize;

use crate::serialization::CashSerialize;
use crate::{block, cached::Cached, compactint::CompactInt, transparent};

mod hash;
mod lock_time;
mod serialize;


pub use hash::Hash;
pub use lock_time::LockTime;
pub use serialize::MAX_TX_SIZE;

/// A transaction transferring value between transparent outputs.
///
/// A transaction is an encoded data structure that facilitates the transfer
/// of value between two public key addresses. Everything is designed to
/// ensure that transactions can be created, propagated on the network,
/// validated, and finally added to the global ledger of transactions (the
/// blockchain).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, CashSerialize)]
pub struct Transaction {
    /// The transaction version.
    pub version: u32,
    /// The transaction inputs.
    pub inputs: Vec<transparent::Input>,
    /// The transaction outputs.
    pub outputs: Vec<transparent::Output>,
    /// The earliest time or block height this transaction can be added to
    /// the chain.
    pub locktime: LockTime,
    hash: Cached<Hash>,
}

impl Transaction {
    pub fn new(
        version: u32,
        inputs: Vec<transparent::Input>,
        outputs: Vec<transparent::Output>,
        locktime: LockTime,
    ) -> Transaction {
        Transaction {
            version,
            inputs,
            outputs,
            locktime,
            hash: Cached::new(),
        }
    }

    /// Get the hash of this transaction.
    ///
    /// Deserialization populates the cache, so parsed transactions never
    /// reserialize to compute their id; locally constructed transactions
    /// hash on demand.
    pub fn hash(&self) -> Hash {
        if let Some(hash) = self.hash.value() {
            return hash;
        }
        Hash::from(self)
    }

    /// Returns `true` if this transaction is a coinbase transaction.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && matches!(
                self.inputs.get(0),
                Some(transparent::Input::Coinbase { .. })
            )
    }

    pub fn contains_coinbase_input(&self) -> bool {
        self.inputs
            .iter()
            .any(|input| matches!(input, transparent::Input::Coinbase { .. }))
    }

    /// Returns the serialized length (in bytes) of this transaction.
    pub fn serialized_size(&self) -> usize {
        let mut size = 4 + CompactInt::size(self.inputs.len());
        for input in self.inputs.iter() {
            size += input.serialized_size();
        }
        size += CompactInt::size(self.outputs.len());
        for output in self.outputs.iter() {
            size += output.serialized_size();
        }
        size + 4
    }

    /// Returns true if this transaction is final at the given height and
    /// median-time-past, and may therefore be included in a block there.
    pub fn is_final(&self, height: block::Height, median_time_past: DateTime<Utc>) -> bool {
        let satisfied = match self.locktime {
            LockTime::Height(h) if h.0 == 0 => true,
            LockTime::Height(h) => h < height,
            LockTime::Time(t) => t < median_time_past,
        };
        if satisfied {
            return true;
        }
        // A locked transaction is still final once every input opts out of
        // the locktime by using the final sequence number.
        self.inputs
            .iter()
            .all(|input| input.sequence() == transparent::SEQUENCE_FINAL)
    }
}
