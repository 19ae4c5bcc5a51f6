//! The block subsidy schedule.

use std::convert::TryFrom;

use bch_chain::amount::{Amount, NonNegative, COIN};
use bch_chain::block::Height;

/// The subsidy of the genesis era, in smallest units.
pub const BASE_REWARD: i64 = 50 * COIN;

/// The subsidy after the first halving.
pub const HALF_REWARD: i64 = BASE_REWARD / 2;

/// The block subsidy at `height` with the given halving interval.
///
/// The subsidy starts at 50 coins and halves every interval; after the 33rd
/// halving the shifted value reaches zero, so the schedule is cut off there
/// and the total issuance stays just under 21 million coins.
pub fn block_subsidy(height: Height, halving_interval: u32) -> Amount<NonNegative> {
    let halvings = height.0 / halving_interval;
    let value = if halvings >= 33 {
        0
    } else if halvings == 0 {
        BASE_REWARD
    } else {
        HALF_REWARD >> (halvings - 1)
    };
    Amount::try_from(value).expect("subsidies are always in range")
}

#[cfg(test)]
mod tests {
    use bch_chain::amount::MAX_MONEY;

    use super::*;

    const INTERVAL: u32 = 210_000;

    #[test]
    fn era_boundaries() {
        bch_test::init();

        assert_eq!(block_subsidy(Height(0), INTERVAL).value(), BASE_REWARD);
        assert_eq!(
            block_subsidy(Height(INTERVAL - 1), INTERVAL).value(),
            BASE_REWARD
        );
        assert_eq!(block_subsidy(Height(INTERVAL), INTERVAL).value(), HALF_REWARD);
        assert_eq!(
            block_subsidy(Height(INTERVAL * 2), INTERVAL).value(),
            HALF_REWARD / 2
        );
        // The last era paying a single unit.
        assert_eq!(block_subsidy(Height(INTERVAL * 32), INTERVAL).value(), 1);
        // The schedule terminates.
        assert_eq!(block_subsidy(Height(INTERVAL * 33), INTERVAL).value(), 0);
        assert_eq!(block_subsidy(Height(INTERVAL * 40), INTERVAL).value(), 0);
    }

    #[test]
    fn total_issuance_stays_under_the_money_cap() {
        bch_test::init();

        // Sum one block per height across all paying eras.
        let mut total: i64 = 0;
        for era in 0..33u32 {
            let per_block = block_subsidy(Height(era * INTERVAL), INTERVAL).value();
            total += per_block * i64::from(INTERVAL);
        }

        // The geometric schedule of integer halvings lands a whisker under
        // the nominal 21 million coin cap.
        assert_eq!(total, 2_099_999_997_690_000);
        assert!(total <= MAX_MONEY);
        assert!(MAX_MONEY - total < COIN);
    }
}
