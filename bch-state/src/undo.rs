//! Per-block undo data.
//!
//! Connecting a block destroys the UTXOs its inputs spend; the undo record
//! preserves them, in block input order (skipping the coinbase), so a
//! single disconnect can restore the set byte-for-byte.

use std::io;

use bch_chain::compactint::CompactInt;
use bch_chain::serialization::{CashDeserialize, CashSerialize, SerializationError};
use bch_consensus::UtxoEntry;

/// The spent coins of one connected block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockUndo {
    /// One entry per non-coinbase input, in block order.
    pub spent: Vec<UtxoEntry>,
}

impl CashSerialize for BlockUndo {
    fn cash_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        CompactInt::from(self.spent.len()).cash_serialize(&mut target)?;
        for entry in &self.spent {
            entry.cash_serialize(&mut target)?;
        }
        Ok(())
    }
}

impl CashDeserialize for BlockUndo {
    fn cash_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let count = CompactInt::cash_deserialize(&mut reader)?.value() as usize;
        let mut spent = Vec::with_capacity(std::cmp::min(count, 1024));
        for _ in 0..count {
            spent.push(UtxoEntry::cash_deserialize(&mut reader)?);
        }
        Ok(BlockUndo { spent })
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use bch_chain::amount::Amount;
    use bch_chain::block::Height;
    use bch_chain::transparent::{Output, Script};

    use super::*;

    #[test]
    fn roundtrip() {
        bch_test::init();

        let undo = BlockUndo {
            spent: vec![
                UtxoEntry {
                    output: Output {
                        value: Amount::try_from(1_000i64).unwrap(),
                        lock_script: Script(vec![0x51]),
                    },
                    height: Height(5),
                    coinbase: false,
                },
                UtxoEntry {
                    output: Output {
                        value: Amount::try_from(2_000i64).unwrap(),
                        lock_script: Script(vec![0x52]),
                    },
                    height: Height(1),
                    coinbase: true,
                },
            ],
        };
        let bytes = undo.cash_serialize_to_vec().unwrap();
        assert_eq!(BlockUndo::cash_deserialize(&bytes[..]).unwrap(), undo);
    }
}
