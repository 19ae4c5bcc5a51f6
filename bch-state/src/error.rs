//! Chain state machine failures.

use thiserror::Error;

use bch_chain::block;
use bch_consensus::VerifyError;

use crate::store::StoreError;

/// Why the chain refused (or failed) to process a block.
#[derive(Error, Debug)]
pub enum ChainError {
    /// The block failed a consensus rule; carries a stable reason tag and a
    /// ban score.
    #[error(transparent)]
    Verify(#[from] VerifyError),
    /// The block's parent is unknown; it cannot be evaluated yet.
    #[error("orphan block {0:?}")]
    Orphan(block::Hash),
    /// The block (or an ancestor) was already rejected.
    #[error("block {0:?} extends an invalid chain")]
    KnownInvalid(block::Hash),
    /// The block is already part of the entry table.
    #[error("duplicate block {0:?}")]
    Duplicate(block::Hash),
    /// The persistence layer failed. Fatal: the chain refuses further
    /// writes until reopened.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A previous store failure put the chain into the fatal state.
    #[error("chain is read-only after a store failure")]
    Fatal,
}

impl ChainError {
    /// The consensus rejection tag, when this error is a rejection.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            ChainError::Verify(e) => Some(e.reason()),
            _ => None,
        }
    }
}
