use std::io;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cash_serde_derive::CashSerialize;

use crate::cached::Cached;
use crate::serialization::{sha256d, CashDeserialize, CashSerialize, SerializationError};
use crate::work::difficulty::CompactDifficulty;

use super::{merkle, Hash};

/// A block header, containing metadata about a block.
///
/// Blocks are chained together via the backwards reference (previous header
/// hash) present in the block header. Each block points backwards to its
/// parent, all the way back to the genesis block.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, CashSerialize)]
pub struct Header {
    /// The block's version field.
    pub version: i32,

    /// The hash of the previous block, used to create a chain of blocks back
    /// to the genesis block.
    pub previous_block_hash: Hash,

    /// The root of the transaction Merkle tree, binding the block header to
    /// the transactions in the block.
    pub merkle_root: merkle::Root,

    /// The block timestamp is a Unix epoch time (UTC) when the miner started
    /// hashing the header (according to the miner).
    pub time: DateTime<Utc>,

    /// An encoded version of the target threshold this block's header hash
    /// must be less than or equal to, in compact form.
    pub bits: CompactDifficulty,

    /// An arbitrary field that miners change to produce a hash less than or
    /// equal to the target threshold.
    pub nonce: u32,

    /// For efficiency, we cache the hash of this header after computing it
    /// the first time. This field is not part of the consensus
    /// serialization.
    hash: Cached<Hash>,
}

/// The header time failed the non-deterministic future bound.
#[derive(Error, Debug)]
pub enum BlockTimeError {
    #[error("block time {0:?} is more than two hours after the local clock bound {1:?}")]
    TooFarInFuture(DateTime<Utc>, DateTime<Utc>),
}

impl Header {
    /// Length of a serialized header in bytes.
    pub const fn len() -> usize {
        80
    }

    pub fn new(
        version: i32,
        previous_block_hash: Hash,
        merkle_root: merkle::Root,
        time: DateTime<Utc>,
        bits: CompactDifficulty,
        nonce: u32,
    ) -> Header {
        Header {
            version,
            previous_block_hash,
            merkle_root,
            time,
            bits,
            nonce,
            hash: Cached::new(),
        }
    }

    /// The hash of this header, reusing the cache populated at
    /// deserialization when present.
    pub fn hash(&self) -> Hash {
        if let Some(hash) = self.hash.value() {
            return hash;
        }
        Hash::from(self)
    }

    /// Checks that the header time is at most two hours after `now`.
    ///
    /// This is a non-deterministic rule, as clocks vary over time and
    /// between nodes. The deterministic lower bound (time strictly greater
    /// than the parent's median-time-past) is checked during contextual
    /// validation.
    pub fn time_is_valid_at(&self, now: DateTime<Utc>) -> Result<(), BlockTimeError> {
        let two_hours_in_the_future = now
            .checked_add_signed(Duration::hours(2))
            .expect("calculating 2 hours in the future does not overflow");
        if self.time <= two_hours_in_the_future {
            Ok(())
        } else {
            Err(BlockTimeError::TooFarInFuture(
                self.time,
                two_hours_in_the_future,
            ))
        }
    }
}

impl CashDeserialize for Header {
    fn cash_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        // Hash the raw 80 bytes up front so the hash cache is populated
        // without reserializing later.
        let mut raw = [0u8; 80];
        reader.read_exact(&mut raw)?;
        let own_hash = Hash(sha256d::hash(&raw));

        let mut src = io::Cursor::new(&raw[..]);
        Ok(Header {
            version: i32::cash_deserialize(&mut src)?,
            previous_block_hash: Hash::cash_deserialize(&mut src)?,
            merkle_root: merkle::Root::cash_deserialize(&mut src)?,
            time: <DateTime<Utc>>::cash_deserialize(&mut src)?,
            bits: CompactDifficulty::cash_deserialize(&mut src)?,
            nonce: u32::cash_deserialize(&mut src)?,
            hash: Cached::from(own_hash),
        })
    }
}
