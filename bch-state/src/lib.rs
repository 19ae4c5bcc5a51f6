//! The chain state machine.
//!
//! This crate owns the header tree (`ChainEntry` records), best-chain
//! selection by cumulative work, difficulty retargeting, deployment
//! activation, the UTXO set with per-block undo records, and the block
//! connection / disconnection / reorganisation pipeline. Persistence goes
//! through the abstract [`store::Store`]; validation rules come from
//! `bch-consensus`.

pub mod chain;
pub mod difficulty;
pub mod entry;
pub mod error;
pub mod store;
pub mod undo;
pub mod versionbits;

pub use chain::{Chain, ChainListener, ChainState};
pub use difficulty::EntryProvider;
pub use entry::ChainEntry;
pub use error::ChainError;
pub use store::{Batch, MemoryStore, SledStore, Store, StoreError};
