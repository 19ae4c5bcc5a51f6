use serde::{Deserialize, Serialize};

use crate::block::Height;
use crate::work::difficulty::{CompactDifficulty, ExpandedDifficulty};

/// The production and test networks.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Network {
    /// The production network.
    Mainnet,
    /// The public test network.
    Testnet,
    /// The local regression-test network.
    Regtest,
}

impl Default for Network {
    fn default() -> Self {
        Network::Mainnet
    }
}

/// The expected time between blocks, in seconds.
pub const POW_TARGET_SPACING: i64 = 10 * 60;

/// The legacy retarget window duration, in seconds: two weeks.
pub const POW_TARGET_TIMESPAN: i64 = 14 * 24 * 60 * 60;

/// The number of blocks per legacy retarget window.
pub const POW_RETARGET_INTERVAL: u32 = (POW_TARGET_TIMESPAN / POW_TARGET_SPACING) as u32;

/// The number of blocks in the cash difficulty-adjustment window.
pub const DAA_WINDOW: u32 = 144;

impl Network {
    /// The cashaddr human-readable prefix for this network.
    pub fn cashaddr_prefix(&self) -> &'static str {
        match self {
            Network::Mainnet => "bitcoincash",
            Network::Testnet => "bchtest",
            Network::Regtest => "bchreg",
        }
    }

    /// The easiest valid target, in compact form.
    pub fn pow_limit_bits(&self) -> CompactDifficulty {
        match self {
            Network::Mainnet | Network::Testnet => CompactDifficulty(0x1d00ffff),
            Network::Regtest => CompactDifficulty(0x207fffff),
        }
    }

    /// The easiest valid target, expanded.
    pub fn pow_limit(&self) -> ExpandedDifficulty {
        self.pow_limit_bits()
            .to_expanded()
            .expect("hard-coded pow limits are valid")
    }

    /// Whether off-interval blocks may drop to the minimum difficulty after
    /// a long gap (the testnet "20 minute" rule).
    pub fn allow_min_difficulty_blocks(&self) -> bool {
        matches!(self, Network::Testnet | Network::Regtest)
    }

    /// Whether difficulty retargeting is disabled entirely.
    pub fn no_retargeting(&self) -> bool {
        matches!(self, Network::Regtest)
    }

    /// The number of blocks between halvings of the block reward.
    pub fn halving_interval(&self) -> u32 {
        match self {
            Network::Mainnet | Network::Testnet => 210_000,
            Network::Regtest => 150,
        }
    }

    /// The height from which the coinbase must push the block height
    /// (BIP 34).
    pub fn bip34_height(&self) -> Height {
        match self {
            Network::Mainnet => Height(227_931),
            Network::Testnet => Height(21_111),
            Network::Regtest => Height(0),
        }
    }
}
