//! Consensus and policy constants that belong to validation rather than to
//! the data model.

/// Signature operations allowed per megabyte of block.
pub const MAX_BLOCK_SIGOPS_PER_MB: usize = 20_000;

/// The standardness size limit for a relayed transaction.
pub const MAX_STANDARD_TX_SIZE: usize = 100_000;

/// The standardness size limit for an unlock script.
pub const MAX_STANDARD_UNLOCK_SIZE: usize = 1_650;

/// Outputs below this value (in smallest units) are non-standard dust for
/// the common templates.
pub const DUST_THRESHOLD: i64 = 546;

/// The per-block signature operation cap: 20k per started megabyte.
pub fn max_block_sigops(block_size: usize) -> usize {
    let megabytes = block_size.saturating_sub(1) / 1_000_000 + 1;
    megabytes * MAX_BLOCK_SIGOPS_PER_MB
}
