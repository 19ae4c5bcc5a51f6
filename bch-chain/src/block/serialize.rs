use std::io::Read;
use std::sync::Arc;

use crate::compactint::CompactInt;
use crate::serialization::{CashDeserialize, SerializationError};
use crate::transaction::Transaction;

use super::{Block, Header};

/// The maximum size of a block after the size upgrade, in bytes.
pub const MAX_FORK_BLOCK_SIZE: u64 = 32_000_000;

/// The smallest possible serialized transaction: version, one empty-script
/// input, one empty-script output, locktime.
const MIN_TRANSACTION_SIZE: u64 = 60;

impl CashDeserialize for Block {
    fn cash_deserialize<R: Read>(reader: R) -> Result<Self, SerializationError> {
        // If the size limit is reached mid-transaction, we get an
        // UnexpectedEof error from the limited reader.
        let mut reader = reader.take(MAX_FORK_BLOCK_SIZE);

        let header = Header::cash_deserialize(&mut reader)?;

        let tx_count = CompactInt::cash_deserialize(&mut reader)?.value();
        // Sanity check the claimed count before allocating for it.
        if tx_count > MAX_FORK_BLOCK_SIZE / MIN_TRANSACTION_SIZE {
            return Err(SerializationError::Parse(
                "block claims more transactions than could fit",
            ));
        }

        let mut transactions = Vec::with_capacity(std::cmp::min(tx_count as usize, 1024));
        for _ in 0..tx_count {
            transactions.push(<Arc<Transaction>>::cash_deserialize(&mut reader)?);
        }

        Ok(Block {
            header,
            transactions,
        })
    }
}
