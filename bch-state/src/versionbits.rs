//! BIP 9 version-bits deployment tracking.
//!
//! Deployments move `Defined -> Started -> LockedIn -> Active` (or
//! `-> Failed`) at retarget-window boundaries, driven by the median time
//! past and by miners signalling in the block version field. The chain
//! keeps a per-(bit, boundary-hash) cache, persisted under the `v`
//! namespace.

use std::collections::HashMap;

use bch_chain::block::{self, Height};
use bch_chain::parameters::Network;
use chrono::{DateTime, Utc};

use crate::difficulty::EntryProvider;
use crate::entry::ChainEntry;

/// The version field prefix that activates version-bits semantics.
pub const VERSION_TOP_BITS: u32 = 0x2000_0000;
const VERSION_TOP_MASK: u32 = 0xe000_0000;

/// A miner-signalled soft deployment.
#[derive(Debug, Clone, Copy)]
pub struct Deployment {
    pub name: &'static str,
    /// The version bit miners set to signal readiness.
    pub bit: u8,
    /// Median-time-past at which signalling may begin.
    pub start_time: u32,
    /// Median-time-past after which an unlocked deployment fails.
    pub timeout: u32,
}

/// Deployments known to this implementation.
///
/// The cash chain's own forks activate by height or flag time, so this
/// table only carries the testing deployment, but the machinery is wired
/// for any future bit.
pub const DEPLOYMENTS: &[Deployment] = &[Deployment {
    name: "testdummy",
    bit: 28,
    start_time: 0,
    timeout: u32::MAX,
}];

/// The BIP 9 threshold states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdState {
    Defined,
    Started,
    LockedIn,
    Active,
    Failed,
}

impl ThresholdState {
    pub fn to_byte(self) -> u8 {
        match self {
            ThresholdState::Defined => 0,
            ThresholdState::Started => 1,
            ThresholdState::LockedIn => 2,
            ThresholdState::Active => 3,
            ThresholdState::Failed => 4,
        }
    }

    pub fn from_byte(byte: u8) -> Option<ThresholdState> {
        Some(match byte {
            0 => ThresholdState::Defined,
            1 => ThresholdState::Started,
            2 => ThresholdState::LockedIn,
            3 => ThresholdState::Active,
            4 => ThresholdState::Failed,
            _ => return None,
        })
    }
}

/// The signalling window length for `network`.
pub fn window(network: Network) -> u32 {
    match network {
        Network::Mainnet | Network::Testnet => 2016,
        Network::Regtest => 144,
    }
}

/// The number of signalling blocks per window required to lock in.
pub fn threshold(network: Network) -> u32 {
    match network {
        Network::Mainnet => 1916,
        Network::Testnet => 1512,
        Network::Regtest => 108,
    }
}

fn signals(version: i32, bit: u8) -> bool {
    let version = version as u32;
    (version & VERSION_TOP_MASK) == VERSION_TOP_BITS && (version >> bit) & 1 == 1
}

fn mtp_at_or_after(time: DateTime<Utc>, threshold_secs: u32) -> bool {
    time.timestamp() >= i64::from(threshold_secs)
}

/// The threshold state of `deployment` for a block whose parent is
/// `parent`, caching per window-boundary entry.
pub fn threshold_state(
    provider: &dyn EntryProvider,
    network: Network,
    parent: Option<&ChainEntry>,
    deployment: &Deployment,
    cache: &mut HashMap<(u8, block::Hash), ThresholdState>,
) -> ThresholdState {
    let window = window(network);
    let threshold = threshold(network);

    // Walk back to the last window boundary before the block.
    let mut boundary = parent.and_then(|parent| {
        let offset = (parent.height.0 + 1) % window;
        let boundary_height = parent.height.0.checked_sub(offset)?;
        provider.ancestor(parent, Height(boundary_height))
    });

    // Collect boundaries until a cached or terminal state.
    let mut to_compute = Vec::new();
    let mut state = loop {
        let entry = match &boundary {
            None => break ThresholdState::Defined,
            Some(entry) => entry.clone(),
        };
        if let Some(state) = cache.get(&(deployment.bit, entry.hash)) {
            break *state;
        }
        if !mtp_at_or_after(entry.median_time_past, deployment.start_time) {
            cache.insert((deployment.bit, entry.hash), ThresholdState::Defined);
            break ThresholdState::Defined;
        }
        to_compute.push(entry.clone());
        boundary = if entry.height.0 < window {
            None
        } else {
            provider.ancestor(&entry, Height(entry.height.0 - window))
        };
    };

    // Unwind, applying one window transition per boundary.
    while let Some(entry) = to_compute.pop() {
        state = match state {
            ThresholdState::Defined => {
                if mtp_at_or_after(entry.median_time_past, deployment.timeout) {
                    ThresholdState::Failed
                } else if mtp_at_or_after(entry.median_time_past, deployment.start_time) {
                    ThresholdState::Started
                } else {
                    ThresholdState::Defined
                }
            }
            ThresholdState::Started => {
                if mtp_at_or_after(entry.median_time_past, deployment.timeout) {
                    ThresholdState::Failed
                } else {
                    // Count signalling blocks across the closing window.
                    let mut count = 0;
                    let mut current = Some(entry.clone());
                    for _ in 0..window {
                        let block = match current {
                            Some(block) => block,
                            None => break,
                        };
                        if signals(block.version, deployment.bit) {
                            count += 1;
                        }
                        current = provider.entry(&block.prev);
                    }
                    if count >= threshold {
                        ThresholdState::LockedIn
                    } else {
                        ThresholdState::Started
                    }
                }
            }
            ThresholdState::LockedIn => ThresholdState::Active,
            ThresholdState::Active => ThresholdState::Active,
            ThresholdState::Failed => ThresholdState::Failed,
        };
        cache.insert((deployment.bit, entry.hash), state);
    }

    state
}

/// The version a new block should carry: top bits plus every deployment
/// this node is willing to signal for.
pub fn compute_block_version(
    provider: &dyn EntryProvider,
    network: Network,
    parent: &ChainEntry,
    cache: &mut HashMap<(u8, block::Hash), ThresholdState>,
) -> i32 {
    let mut version = VERSION_TOP_BITS;
    for deployment in DEPLOYMENTS {
        let state = threshold_state(provider, network, Some(parent), deployment, cache);
        if matches!(state, ThresholdState::Started | ThresholdState::LockedIn) {
            version |= 1 << deployment.bit;
        }
    }
    version as i32
}
