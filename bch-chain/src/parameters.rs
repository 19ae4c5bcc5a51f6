//! Consensus parameters: networks, upgrade schedules, genesis blocks.

mod genesis;
mod network;
mod network_upgrade;

pub use genesis::{genesis_block, genesis_hash, GENESIS_PREVIOUS_BLOCK_HASH};
pub use network::{
    Network, DAA_WINDOW, POW_RETARGET_INTERVAL, POW_TARGET_SPACING, POW_TARGET_TIMESPAN,
};
pub use network_upgrade::NetworkUpgrade;

/// The number of confirmations a coinbase output needs before it can be
/// spent.
pub const COINBASE_MATURITY: u32 = 100;

/// The minimum size of the coinbase data field, in bytes.
pub const MIN_COINBASE_SCRIPT_SIZE: usize = 2;

/// The maximum size of the coinbase data field, in bytes.
pub const MAX_COINBASE_SCRIPT_SIZE: usize = 100;
