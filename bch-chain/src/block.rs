//! Blocks and block-related structures (heights, headers, etc.)
#![allow(clippy::unit_arg)]

mod hash;
mod header;
mod height;
mod serialize;

pub mod merkle;

#[cfg(test)]
mod tests;

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use cash_serde_derive::CashSerialize;

use crate::compactint::CompactInt;
use crate::serialization::CashSerialize;
use crate::{transaction, transparent};

pub use hash::Hash;
pub use header::{BlockTimeError, Header};
pub use height::Height;
pub use serialize::MAX_FORK_BLOCK_SIZE;

/// A block, containing a header and a list of transactions.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, CashSerialize)]
pub struct Block {
    /// The block header, containing block metadata.
    pub header: Header,
    /// The block transactions.
    pub transactions: Vec<Arc<transaction::Transaction>>,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fmter = f.debug_struct("Block");
        if let Some(height) = self.coinbase_height() {
            fmter.field("height", &height);
        }
        fmter.field("hash", &self.hash()).finish()
    }
}

impl Block {
    /// Compute the hash of this block.
    pub fn hash(&self) -> Hash {
        Hash::from(&self.header)
    }

    /// Return the block height reported in the coinbase transaction, if any.
    ///
    /// After BIP 34 activation the coinbase data must begin with a push of
    /// the block height; earlier blocks carry arbitrary miner data here.
    pub fn coinbase_height(&self) -> Option<Height> {
        let data = self
            .transactions
            .get(0)
            .and_then(|tx| tx.inputs.get(0))
            .and_then(|input| match input {
                transparent::Input::Coinbase { ref data, .. } => Some(data.as_ref()),
                _ => None,
            })?;
        parse_coinbase_height(data)
    }

    /// The hashes of every transaction, in block order.
    pub fn transaction_hashes(&self) -> Vec<transaction::Hash> {
        self.transactions.iter().map(|tx| tx.hash()).collect()
    }

    /// Returns the serialized length (in bytes) of this block.
    pub fn serialized_size(&self) -> usize {
        let mut size = Header::len() + CompactInt::size(self.transactions.len());
        for tx in self.transactions.iter() {
            size += tx.serialized_size();
        }
        size
    }
}

/// Parse a BIP 34 height push from the front of the coinbase data.
fn parse_coinbase_height(data: &[u8]) -> Option<Height> {
    let first = *data.get(0)?;
    match first {
        // OP_0: the genesis convention.
        0x00 => Some(Height(0)),
        // OP_1 through OP_16.
        0x51..=0x60 => Some(Height(u32::from(first) - 0x50)),
        // A direct push of 1-5 little-endian bytes.
        0x01..=0x05 => {
            let len = first as usize;
            let bytes = data.get(1..1 + len)?;
            // The sign byte of a script number must be clear for a height.
            if bytes[len - 1] & 0x80 != 0 {
                return None;
            }
            let mut value = 0u64;
            for (i, b) in bytes.iter().enumerate() {
                value |= u64::from(*b) << (8 * i);
            }
            if value <= u64::from(Height::MAX.0) {
                Some(Height(value as u32))
            } else {
                None
            }
        }
        _ => None,
    }
}

impl<'a> From<&'a Block> for Hash {
    fn from(block: &'a Block) -> Hash {
        (&block.header).into()
    }
}
