//! Block assembly.
//!
//! The assembler turns a mempool snapshot pinned to the current tip into a
//! [`template::BlockTemplate`]: a dependency-respecting, fee-ordered
//! selection of transactions under the size and sigop budgets, an assembled
//! coinbase, and everything a miner needs to start hashing.

pub mod assembler;
pub mod mempool;
pub mod template;

pub use assembler::{assemble, assemble_verified, AssemblerError, AssemblerOptions};
pub use mempool::{MempoolEntry, MempoolSnapshot};
pub use template::{BlockTemplate, TemplateEntry};
