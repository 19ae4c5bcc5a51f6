//! Difficulty retargeting: the legacy two-week algorithm and the cash
//! 144-block sliding-window algorithm.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use primitive_types::U256;

use bch_chain::block::Height;
use bch_chain::parameters::{
    Network, NetworkUpgrade, DAA_WINDOW, POW_RETARGET_INTERVAL, POW_TARGET_SPACING,
    POW_TARGET_TIMESPAN,
};
use bch_chain::work::difficulty::{CompactDifficulty, ExpandedDifficulty};
use bch_chain::block;

use crate::entry::ChainEntry;

/// Read access to the entry table, for ancestor walks.
pub trait EntryProvider {
    fn entry(&self, hash: &block::Hash) -> Option<Arc<ChainEntry>>;

    /// The ancestor of `entry` at `height`, following `prev` references.
    fn ancestor(&self, entry: &ChainEntry, height: Height) -> Option<Arc<ChainEntry>> {
        if height > entry.height {
            return None;
        }
        let mut current = self.entry(&entry.hash)?;
        while current.height > height {
            current = self.entry(&current.prev)?;
        }
        Some(current)
    }
}

/// The target for the block following `parent`, with `time` as the new
/// block's timestamp (used only by the testnet min-difficulty rule).
pub fn next_target(
    provider: &dyn EntryProvider,
    network: Network,
    parent: &ChainEntry,
    time: DateTime<Utc>,
) -> CompactDifficulty {
    if network.no_retargeting() {
        return parent.bits;
    }

    let next_height = Height(parent.height.0 + 1);
    if NetworkUpgrade::CashDaa.is_active(network, next_height, parent.median_time_past) {
        return daa_target(provider, network, parent);
    }

    if next_height.0 % POW_RETARGET_INTERVAL != 0 {
        if network.allow_min_difficulty_blocks() {
            // After twice the target spacing without a block, a
            // minimum-difficulty block is allowed.
            if time > parent.time + Duration::seconds(2 * POW_TARGET_SPACING) {
                return network.pow_limit_bits();
            }
            // Otherwise return the last non-minimum difficulty.
            let mut current = parent.clone();
            while current.height.0 % POW_RETARGET_INTERVAL != 0
                && current.bits == network.pow_limit_bits()
            {
                current = match provider.entry(&current.prev) {
                    Some(prev) => (*prev).clone(),
                    None => break,
                };
            }
            return current.bits;
        }
        return parent.bits;
    }

    // A retarget boundary: sample the window's first block.
    let first_height = Height(parent.height.0 + 1 - POW_RETARGET_INTERVAL);
    let first = match provider.ancestor(parent, first_height) {
        Some(first) => first,
        None => return parent.bits,
    };
    legacy_retarget(network, parent.bits, first.time, parent.time)
}

/// The legacy retarget: scale the old target by the window's actual
/// duration, clamped to a factor of four either way.
pub fn legacy_retarget(
    network: Network,
    prev_bits: CompactDifficulty,
    first_time: DateTime<Utc>,
    last_time: DateTime<Utc>,
) -> CompactDifficulty {
    let mut actual_timespan = (last_time - first_time).num_seconds();
    if actual_timespan < POW_TARGET_TIMESPAN / 4 {
        actual_timespan = POW_TARGET_TIMESPAN / 4;
    }
    if actual_timespan > POW_TARGET_TIMESPAN * 4 {
        actual_timespan = POW_TARGET_TIMESPAN * 4;
    }

    let prev_target = match prev_bits.to_expanded() {
        Some(target) => target,
        None => return network.pow_limit_bits(),
    };

    let mut target = prev_target.to_u256();
    target = target * U256::from(actual_timespan as u64);
    target = target / U256::from(POW_TARGET_TIMESPAN as u64);

    let limit = network.pow_limit().to_u256();
    if target > limit {
        target = limit;
    }
    ExpandedDifficulty::from(target).to_compact()
}

/// The cash difficulty-adjustment algorithm.
///
/// Work gained and time elapsed are measured between two "suitable" blocks:
/// the median-by-time of the three blocks ending each side of a 144-block
/// window. Sampling medians damps single-block timestamp manipulation; the
/// timespan is clamped to [0.5, 2] times the nominal window duration.
pub fn daa_target(
    provider: &dyn EntryProvider,
    network: Network,
    parent: &ChainEntry,
) -> CompactDifficulty {
    // The window needs 144 ancestors plus two more for the suitable-block
    // median on the far side.
    if parent.height.0 < DAA_WINDOW + 2 {
        return network.pow_limit_bits();
    }

    let last = match suitable_block(provider, parent) {
        Some(entry) => entry,
        None => return network.pow_limit_bits(),
    };
    let anchor = match provider.ancestor(parent, Height(parent.height.0 - DAA_WINDOW)) {
        Some(entry) => entry,
        None => return network.pow_limit_bits(),
    };
    let first = match suitable_block(provider, &anchor) {
        Some(entry) => entry,
        None => return network.pow_limit_bits(),
    };

    let work = (last.chainwork - first.chainwork).to_u256();
    let work_scaled = work * U256::from(POW_TARGET_SPACING as u64);

    let mut timespan = (last.time - first.time).num_seconds();
    let min_timespan = 72 * POW_TARGET_SPACING;
    let max_timespan = 288 * POW_TARGET_SPACING;
    if timespan < min_timespan {
        timespan = min_timespan;
    }
    if timespan > max_timespan {
        timespan = max_timespan;
    }

    let work_per_spacing = work_scaled / U256::from(timespan as u64);
    if work_per_spacing.is_zero() {
        return network.pow_limit_bits();
    }

    // target = 2^256 / W - 1, computed without overflowing 256 bits.
    let mut target = (U256::MAX - work_per_spacing + U256::one()) / work_per_spacing;

    let limit = network.pow_limit().to_u256();
    if target > limit {
        target = limit;
    }
    ExpandedDifficulty::from(target).to_compact()
}

/// The median-by-time of `entry` and its two predecessors.
fn suitable_block(
    provider: &dyn EntryProvider,
    entry: &ChainEntry,
) -> Option<Arc<ChainEntry>> {
    let c = provider.entry(&entry.hash)?;
    let b = provider.entry(&c.prev)?;
    let a = provider.entry(&b.prev)?;

    let mut blocks = [a, b, c];
    if blocks[0].time > blocks[2].time {
        blocks.swap(0, 2);
    }
    if blocks[0].time > blocks[1].time {
        blocks.swap(0, 1);
    }
    if blocks[1].time > blocks[2].time {
        blocks.swap(1, 2);
    }
    Some(blocks[1].clone())
}

/// The median of the last eleven entry times, ending at `entry`.
pub fn median_time_past(provider: &dyn EntryProvider, entry: &ChainEntry) -> DateTime<Utc> {
    let mut times = Vec::with_capacity(11);
    let mut current = provider.entry(&entry.hash);
    while let Some(entry) = current {
        times.push(entry.time);
        if times.len() == 11 || entry.is_genesis() {
            break;
        }
        current = provider.entry(&entry.prev);
    }
    times.sort();
    times[times.len() / 2]
}
