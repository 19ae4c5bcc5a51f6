//! Unspent outputs and the per-block overlay view.

use std::collections::HashMap;
use std::io;

use bch_chain::block::Height;
use bch_chain::serialization::{CashDeserialize, CashSerialize, SerializationError};
use bch_chain::transaction::Transaction;
use bch_chain::transparent::{OutPoint, Output};

/// Errors from the storage backend behind a view. The chain treats these as
/// fatal, so they stay opaque here.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// One unspent transaction output with the metadata validation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoEntry {
    /// The output itself.
    pub output: Output,
    /// The height of the block that created the output.
    pub height: Height,
    /// Whether the creating transaction was a coinbase, for the maturity
    /// rule.
    pub coinbase: bool,
}

impl CashSerialize for UtxoEntry {
    fn cash_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        self.height.0.cash_serialize(&mut target)?;
        self.coinbase.cash_serialize(&mut target)?;
        self.output.cash_serialize(&mut target)?;
        Ok(())
    }
}

impl CashDeserialize for UtxoEntry {
    fn cash_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(UtxoEntry {
            height: Height(u32::cash_deserialize(&mut reader)?),
            coinbase: bool::cash_deserialize(&mut reader)?,
            output: Output::cash_deserialize(&mut reader)?,
        })
    }
}

/// Read access to the committed UTXO set.
pub trait UtxoReader {
    fn utxo(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, BoxError>;
}

/// A reader with no UTXOs, for tests and detached validation.
pub struct NoUtxos;

impl UtxoReader for NoUtxos {
    fn utxo(&self, _outpoint: &OutPoint) -> Result<Option<UtxoEntry>, BoxError> {
        Ok(None)
    }
}

/// The state of one outpoint inside a view.
#[derive(Debug, Clone)]
enum Slot {
    Unspent(UtxoEntry),
    Spent(UtxoEntry),
}

/// An in-memory overlay over the committed UTXO set, scoped to the
/// validation of a single block (or mempool transaction).
///
/// Spends and additions land in the overlay first, so intra-block chains of
/// transactions see each other; nothing is written through until the caller
/// collects [`CoinView::changes`] and commits them.
pub struct CoinView<'a> {
    backend: &'a dyn UtxoReader,
    slots: HashMap<OutPoint, Slot>,
}

impl<'a> CoinView<'a> {
    pub fn new(backend: &'a dyn UtxoReader) -> CoinView<'a> {
        CoinView {
            backend,
            slots: HashMap::new(),
        }
    }

    /// Resolve an outpoint: overlay first, then the backend. Spent slots
    /// resolve to `None`.
    pub fn get(&mut self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, BoxError> {
        if let Some(slot) = self.slots.get(outpoint) {
            return Ok(match slot {
                Slot::Unspent(entry) => Some(entry.clone()),
                Slot::Spent(_) => None,
            });
        }
        match self.backend.utxo(outpoint)? {
            Some(entry) => {
                self.slots
                    .insert(*outpoint, Slot::Unspent(entry.clone()));
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// Mark an outpoint spent, returning the entry it held.
    pub fn spend(&mut self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, BoxError> {
        let entry = match self.get(outpoint)? {
            Some(entry) => entry,
            None => return Ok(None),
        };
        self.slots.insert(*outpoint, Slot::Spent(entry.clone()));
        Ok(Some(entry))
    }

    /// Add a fresh output to the overlay.
    pub fn add(&mut self, outpoint: OutPoint, entry: UtxoEntry) {
        self.slots.insert(outpoint, Slot::Unspent(entry));
    }

    /// Add every output of `tx` at `height`.
    pub fn apply_transaction(&mut self, tx: &Transaction, height: Height) {
        let hash = tx.hash();
        let coinbase = tx.is_coinbase();
        for (index, output) in tx.outputs.iter().enumerate() {
            self.add(
                OutPoint {
                    hash,
                    index: index as u32,
                },
                UtxoEntry {
                    output: output.clone(),
                    height,
                    coinbase,
                },
            );
        }
    }

    /// The overlay as a list of writes: `Some` to insert an entry, `None`
    /// to delete one.
    ///
    /// Entries that were only read through (never spent or added) are
    /// written back unchanged, which is harmless; callers that care filter
    /// on the spent/added distinction instead.
    pub fn changes(&self) -> Vec<(OutPoint, Option<UtxoEntry>)> {
        self.slots
            .iter()
            .map(|(outpoint, slot)| match slot {
                Slot::Unspent(entry) => (*outpoint, Some(entry.clone())),
                Slot::Spent(_) => (*outpoint, None),
            })
            .collect()
    }

    /// Iterate the spent entries, for indexers receiving chain events.
    pub fn spent(&self) -> impl Iterator<Item = (&OutPoint, &UtxoEntry)> {
        self.slots.iter().filter_map(|(outpoint, slot)| match slot {
            Slot::Spent(entry) => Some((outpoint, entry)),
            Slot::Unspent(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use bch_chain::amount::Amount;
    use bch_chain::transaction::Hash as TxHash;
    use bch_chain::transparent::Script;

    use super::*;

    fn entry(value: i64) -> UtxoEntry {
        UtxoEntry {
            output: Output {
                value: Amount::try_from(value).unwrap(),
                lock_script: Script(vec![0x51]),
            },
            height: Height(7),
            coinbase: false,
        }
    }

    fn outpoint(byte: u8, index: u32) -> OutPoint {
        OutPoint {
            hash: TxHash([byte; 32]),
            index,
        }
    }

    struct OneUtxo(OutPoint, UtxoEntry);

    impl UtxoReader for OneUtxo {
        fn utxo(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, BoxError> {
            Ok(if *outpoint == self.0 {
                Some(self.1.clone())
            } else {
                None
            })
        }
    }

    #[test]
    fn spend_hides_the_entry_from_later_reads() {
        bch_test::init();

        let backend = OneUtxo(outpoint(1, 0), entry(5_000));
        let mut view = CoinView::new(&backend);

        assert_eq!(view.get(&outpoint(1, 0)).unwrap(), Some(entry(5_000)));
        assert_eq!(view.spend(&outpoint(1, 0)).unwrap(), Some(entry(5_000)));
        assert_eq!(view.get(&outpoint(1, 0)).unwrap(), None);
        // Double spends resolve to None.
        assert_eq!(view.spend(&outpoint(1, 0)).unwrap(), None);
    }

    #[test]
    fn overlay_additions_are_visible_before_commit() {
        bch_test::init();

        let backend = NoUtxos;
        let mut view = CoinView::new(&backend);

        view.add(outpoint(2, 1), entry(123));
        assert_eq!(view.get(&outpoint(2, 1)).unwrap(), Some(entry(123)));

        let changes = view.changes();
        assert_eq!(changes, vec![(outpoint(2, 1), Some(entry(123)))]);
    }

    #[test]
    fn roundtrip_serialization() {
        bch_test::init();

        let entry = UtxoEntry {
            output: Output {
                value: Amount::try_from(42i64).unwrap(),
                lock_script: Script(vec![0xaa, 0xbb]),
            },
            height: Height(1000),
            coinbase: true,
        };
        let bytes = entry.cash_serialize_to_vec().unwrap();
        assert_eq!(UtxoEntry::cash_deserialize(&bytes[..]).unwrap(), entry);
    }
}
