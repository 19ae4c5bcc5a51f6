//! Wire format for inputs. Coinbase inputs share the encoding of regular
//! inputs, with the null outpoint marking the coinbase case.

use std::io;

use crate::serialization::{CashDeserialize, CashSerialize, SerializationError};

use super::{CoinbaseData, Input, OutPoint, Script};

impl CashSerialize for CoinbaseData {
    fn cash_serialize<W: io::Write>(&self, target: W) -> Result<(), io::Error> {
        self.0.cash_serialize(target)
    }
}

impl CashDeserialize for OutPoint {
    fn cash_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(OutPoint {
            hash: crate::transaction::Hash::cash_deserialize(&mut reader)?,
            index: u32::cash_deserialize(&mut reader)?,
        })
    }
}

impl CashSerialize for Input {
    fn cash_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        match self {
            Input::PrevOut {
                outpoint,
                unlock_script,
                sequence,
            } => {
                outpoint.cash_serialize(&mut target)?;
                unlock_script.cash_serialize(&mut target)?;
                sequence.cash_serialize(&mut target)?;
            }
            Input::Coinbase { data, sequence } => {
                OutPoint::null().cash_serialize(&mut target)?;
                data.cash_serialize(&mut target)?;
                sequence.cash_serialize(&mut target)?;
            }
        }
        Ok(())
    }
}

impl CashDeserialize for Input {
    fn cash_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let outpoint = OutPoint::cash_deserialize(&mut reader)?;
        let script = Script::cash_deserialize(&mut reader)?;
        let sequence = u32::cash_deserialize(&mut reader)?;

        if outpoint.is_null() {
            Ok(Input::Coinbase {
                data: CoinbaseData(script.0),
                sequence,
            })
        } else {
            Ok(Input::PrevOut {
                outpoint,
                unlock_script: script,
                sequence,
            })
        }
    }
}
