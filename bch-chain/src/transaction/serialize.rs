//! Transaction deserialization, including the hash cache fill.

use crate::serialization::{CashDeserialize, SerializationError};
use crate::transparent;

use super::*;

/// The maximum size of a serialized transaction in bytes.
pub const MAX_TX_SIZE: u64 = 1_000_000;

/// Deserializes a transaction, calculating and caching its id.
impl CashDeserialize for Transaction {
    fn cash_deserialize<R: std::io::Read>(src: R) -> Result<Self, SerializationError> {
        // Limit reads to the consensus maximum to protect against runaway
        // allocation from a hostile stream.
        let mut src = src.take(MAX_TX_SIZE);
        let version = u32::cash_deserialize(&mut src)?;
        let inputs = <Vec<transparent::Input>>::cash_deserialize(&mut src)?;
        let outputs = <Vec<transparent::Output>>::cash_deserialize(&mut src)?;
        let locktime = LockTime::cash_deserialize(&mut src)?;
        let mut tx = Transaction {
            version,
            inputs,
            outputs,
            locktime,
            hash: Cached::new(),
        };
        // Calculate and cache the id, so callers never reserialize.
        let own_hash = tx.hash();
        tx.hash = Cached::from(own_hash);
        Ok(tx)
    }
}
