use serde::{Deserialize, Serialize};

/// The height of a block is the length of the chain back to the genesis
/// block.
///
/// Heights are kept strictly below the lock-time threshold so that a height
/// can never be confused with a wire timestamp.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct Height(pub u32);

impl Height {
    /// The minimum Height: the genesis block.
    pub const MIN: Height = Height(0);

    /// The maximum representable Height.
    pub const MAX: Height = Height(499_999_999);

    pub fn checked_add(self, rhs: u32) -> Option<Height> {
        let result = self.0.checked_add(rhs)?;
        if result <= Height::MAX.0 {
            Some(Height(result))
        } else {
            None
        }
    }

    pub fn checked_sub(self, rhs: u32) -> Option<Height> {
        self.0.checked_sub(rhs).map(Height)
    }
}
