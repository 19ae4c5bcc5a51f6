//! Immutable records of accepted headers.

use std::io;

use chrono::{DateTime, Utc};

use bch_chain::block::{self, Header, Height};
use bch_chain::serialization::{CashDeserialize, CashSerialize, SerializationError};
use bch_chain::work::difficulty::{CompactDifficulty, PartialCumulativeWork};

/// A validated header plus the derived fields the chain needs constantly:
/// height, cumulative work, and median-time-past.
///
/// Entries are created when a header is accepted and never mutated. The
/// chain is represented as a table of entries keyed by hash plus a
/// height-indexed table for the best chain; `prev` is a hash-valued
/// reference, so there are no pointer cycles to manage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEntry {
    pub hash: block::Hash,
    pub height: Height,
    pub version: i32,
    pub prev: block::Hash,
    pub merkle_root: block::merkle::Root,
    pub time: DateTime<Utc>,
    pub bits: CompactDifficulty,
    pub nonce: u32,
    /// Total work from genesis up to and including this entry.
    pub chainwork: PartialCumulativeWork,
    /// Median of this entry's time and its ten ancestors' times.
    pub median_time_past: DateTime<Utc>,
}

impl ChainEntry {
    /// Build an entry from a header, its parent, and the median-time-past
    /// computed over the new window.
    pub fn from_header(
        header: &Header,
        parent: Option<&ChainEntry>,
        median_time_past: DateTime<Utc>,
    ) -> ChainEntry {
        let work = header
            .bits
            .to_work()
            .expect("headers are checked for valid bits before entry creation");
        let (height, chainwork) = match parent {
            Some(parent) => (
                Height(parent.height.0 + 1),
                parent.chainwork + work,
            ),
            None => (Height(0), PartialCumulativeWork::default() + work),
        };
        ChainEntry {
            hash: header.hash(),
            height,
            version: header.version,
            prev: header.previous_block_hash,
            merkle_root: header.merkle_root,
            time: header.time,
            bits: header.bits,
            nonce: header.nonce,
            chainwork,
            median_time_past,
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.height == Height(0)
    }

    /// Reconstruct the header this entry was created from.
    pub fn to_header(&self) -> Header {
        Header::new(
            self.version,
            self.prev,
            self.merkle_root,
            self.time,
            self.bits,
            self.nonce,
        )
    }
}

impl CashSerialize for ChainEntry {
    fn cash_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        self.hash.cash_serialize(&mut target)?;
        self.height.0.cash_serialize(&mut target)?;
        self.version.cash_serialize(&mut target)?;
        self.prev.cash_serialize(&mut target)?;
        self.merkle_root.cash_serialize(&mut target)?;
        self.time.cash_serialize(&mut target)?;
        self.bits.cash_serialize(&mut target)?;
        self.nonce.cash_serialize(&mut target)?;
        self.chainwork.to_be_bytes().cash_serialize(&mut target)?;
        self.median_time_past.cash_serialize(&mut target)?;
        Ok(())
    }
}

impl CashDeserialize for ChainEntry {
    fn cash_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(ChainEntry {
            hash: block::Hash::cash_deserialize(&mut reader)?,
            height: Height(u32::cash_deserialize(&mut reader)?),
            version: i32::cash_deserialize(&mut reader)?,
            prev: block::Hash::cash_deserialize(&mut reader)?,
            merkle_root: block::merkle::Root::cash_deserialize(&mut reader)?,
            time: <DateTime<Utc>>::cash_deserialize(&mut reader)?,
            bits: CompactDifficulty::cash_deserialize(&mut reader)?,
            nonce: u32::cash_deserialize(&mut reader)?,
            chainwork: PartialCumulativeWork::from_be_bytes(<[u8; 32]>::cash_deserialize(
                &mut reader,
            )?),
            median_time_past: <DateTime<Utc>>::cash_deserialize(&mut reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use bch_chain::parameters::{genesis_block, Network};

    use super::*;

    #[test]
    fn genesis_entry_roundtrips() {
        bch_test::init();

        let block = genesis_block(Network::Mainnet);
        let entry = ChainEntry::from_header(&block.header, None, block.header.time);

        assert!(entry.is_genesis());
        assert_eq!(entry.hash, block.hash());
        assert_eq!(entry.to_header().hash(), block.hash());

        let bytes = entry.cash_serialize_to_vec().unwrap();
        assert_eq!(ChainEntry::cash_deserialize(&bytes[..]).unwrap(), entry);
    }

    #[test]
    fn chainwork_accumulates() {
        bch_test::init();

        let block = genesis_block(Network::Regtest);
        let genesis = ChainEntry::from_header(&block.header, None, block.header.time);
        let child_header = Header::new(
            1,
            genesis.hash,
            block.header.merkle_root,
            block.header.time + chrono::Duration::seconds(600),
            block.header.bits,
            7,
        );
        let child = ChainEntry::from_header(&child_header, Some(&genesis), child_header.time);

        assert_eq!(child.height, Height(1));
        assert!(child.chainwork > genesis.chainwork);
        assert_eq!(
            child.chainwork.to_u256(),
            genesis.chainwork.to_u256() * 2u64
        );
    }
}
