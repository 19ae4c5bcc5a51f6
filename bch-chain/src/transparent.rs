//! Transparent value transfer: outpoints, inputs, outputs, scripts,
//! addresses.
#![allow(clippy::unit_arg)]

mod address;
mod script;
mod serialize;

pub mod cashaddr;

pub use address::{Address, ToAddressWithNetwork};
pub use script::Script;

use serde::{Deserialize, Serialize};

use cash_serde_derive::{CashDeserialize, CashSerialize};

use crate::compactint::CompactInt;
use crate::serialization::{CashDeserialize, CashSerialize, SerializationError};

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

use crate::{
    amount::{Amount, NonNegative},
    transaction,
};

/// The sequence number that opts an input out of lock-time semantics.
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

/// Arbitrary data inserted by miners into a coinbase transaction.
///
/// Consensus restricts this field (together with the BIP 34 height push) to
/// 2-100 bytes; the bound is enforced by transaction sanity checks rather
/// than at construction.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CoinbaseData(Vec<u8>);

impl CoinbaseData {
    pub fn new(data: Vec<u8>) -> CoinbaseData {
        CoinbaseData(data)
    }

    pub fn serialized_size(&self) -> usize {
        CompactInt::size(self.0.len()) + self.0.len()
    }
}

impl AsRef<[u8]> for CoinbaseData {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl std::fmt::Debug for CoinbaseData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let escaped = String::from_utf8(
            self.0
                .iter()
                .cloned()
                .flat_map(std::ascii::escape_default)
                .collect(),
        )
        .expect("ascii::escape_default produces utf8");
        f.debug_tuple("CoinbaseData").field(&escaped).finish()
    }
}

/// OutPoint
///
/// A particular transaction output reference.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, CashSerialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct OutPoint {
    /// References the transaction that contains the UTXO being spent.
    pub hash: transaction::Hash,

    /// Identifies which UTXO from that transaction is referenced; the first
    /// output is 0, etc.
    pub index: u32,
}

impl OutPoint {
    /// The index used by the null outpoint of a coinbase input.
    pub const NULL_INDEX: u32 = 0xFFFF_FFFF;

    #[inline]
    pub const fn len() -> usize {
        36
    }

    /// The null outpoint, identifying a coinbase input.
    pub fn null() -> OutPoint {
        OutPoint {
            hash: transaction::Hash([0; 32]),
            index: OutPoint::NULL_INDEX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.index == OutPoint::NULL_INDEX && self.hash.0 == [0; 32]
    }
}

/// A transparent input to a transaction.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Input {
    /// A reference to an output of a previous transaction.
    PrevOut {
        /// The previous output transaction reference.
        outpoint: OutPoint,
        /// The script that authorizes spending `outpoint`.
        unlock_script: Script,
        /// The sequence number for the input.
        sequence: u32,
    },
    /// New coins created by the block reward.
    Coinbase {
        /// Free data inserted by miners, beginning with the BIP 34 height
        /// push after activation.
        data: CoinbaseData,
        /// The sequence number for the input.
        sequence: u32,
    },
}

impl Input {
    pub fn sequence(&self) -> u32 {
        match self {
            Input::PrevOut { sequence, .. } => *sequence,
            Input::Coinbase { sequence, .. } => *sequence,
        }
    }

    /// The outpoint spent by this input, if it is not a coinbase input.
    pub fn outpoint(&self) -> Option<OutPoint> {
        match self {
            Input::PrevOut { outpoint, .. } => Some(*outpoint),
            Input::Coinbase { .. } => None,
        }
    }

    pub fn serialized_size(&self) -> usize {
        match self {
            Input::PrevOut { unlock_script, .. } => {
                OutPoint::len() + unlock_script.serialized_size() + 4
            }
            Input::Coinbase { data, .. } => OutPoint::len() + data.serialized_size() + 4,
        }
    }
}

/// A transparent output from a transaction.
///
/// The most fundamental building block of a transaction is a transaction
/// output -- the coins you own are in fact a subset of the unspent
/// transaction outputs (or "UTXO"s) of the global UTXO set.
///
/// UTXOs are indivisible, discrete units of value which can only be consumed
/// in their entirety.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, CashSerialize, CashDeserialize)]
pub struct Output {
    /// Transaction value.
    pub value: Amount<NonNegative>,

    /// The lock script defines the conditions under which this output can be
    /// spent.
    pub lock_script: Script,
}

impl Output {
    /// Returns the serialized length (in bytes) of this Output.
    pub fn serialized_size(&self) -> usize {
        8 + self.lock_script.serialized_size()
    }
}
