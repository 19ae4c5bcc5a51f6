//! Block difficulty data structures and calculations.
//!
//! The block difficulty "target threshold" is stored in the block header as a
//! 32-bit `CompactDifficulty`. The `block::Hash` must be less than or equal
//! to the `ExpandedDifficulty` threshold, when both are represented as
//! 256-bit integers in little-endian byte order.

use std::fmt;

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::block;
use crate::{CashDeserialize, CashSerialize, SerializationError};

/// A 32-bit "compact bits" value, as used in the `bits` header field.
///
/// The format is a base-256 floating point encoding: one byte of exponent
/// and three bytes of mantissa, with a sign bit at `0x00800000` that is
/// never valid in a difficulty threshold.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CompactDifficulty(pub u32);

/// A 256-bit target threshold in integer form.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub struct ExpandedDifficulty(U256);

/// The work of a single block: `floor(2^256 / (target + 1))`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct Work(U256);

/// Cumulative work from genesis up to some chain entry.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct PartialCumulativeWork(U256);

impl fmt::Debug for CompactDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("CompactDifficulty")
            .field(&format_args!("{:#010x}", self.0))
            .finish()
    }
}

impl fmt::Debug for ExpandedDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut bytes = [0u8; 32];
        self.0.to_big_endian(&mut bytes);
        f.debug_tuple("ExpandedDifficulty")
            .field(&hex::encode(bytes))
            .finish()
    }
}

impl CompactDifficulty {
    /// Exponent bits in a compact value.
    const EXPONENT_SHIFT: u32 = 24;
    /// The mantissa sign bit, invalid in a target.
    const SIGN_BIT: u32 = 0x0080_0000;
    /// Mantissa mask.
    const MANTISSA_MASK: u32 = 0x007f_ffff;

    /// Expand to the 256-bit target this compact value encodes.
    ///
    /// Returns `None` for zero, negative, and overflowing encodings, which
    /// are invalid in a block header.
    pub fn to_expanded(&self) -> Option<ExpandedDifficulty> {
        let exponent = self.0 >> Self::EXPONENT_SHIFT;
        let mantissa = self.0 & Self::MANTISSA_MASK;

        if self.0 & Self::SIGN_BIT != 0 || mantissa == 0 {
            return None;
        }

        // The overflow conditions from Bitcoin's SetCompact.
        if exponent > 34
            || (mantissa > 0xff && exponent > 33)
            || (mantissa > 0xffff && exponent > 32)
        {
            return None;
        }

        let result = if exponent <= 3 {
            U256::from(mantissa >> (8 * (3 - exponent)))
        } else {
            U256::from(mantissa) << (8 * (exponent - 3))
        };

        if result.is_zero() {
            None
        } else {
            Some(ExpandedDifficulty(result))
        }
    }

    /// The work this target represents, if the target is valid.
    pub fn to_work(&self) -> Option<Work> {
        self.to_expanded().map(|e| e.to_work())
    }
}

impl ExpandedDifficulty {
    /// Compress to the canonical compact encoding.
    pub fn to_compact(&self) -> CompactDifficulty {
        if self.0.is_zero() {
            return CompactDifficulty(0);
        }

        let mut size = (self.0.bits() + 7) / 8;
        let mut compact: u32 = if size <= 3 {
            (self.0.low_u64() as u32) << (8 * (3 - size))
        } else {
            ((self.0 >> (8 * (size - 3))).low_u64() as u32) & 0x00ff_ffff
        };

        // The mantissa sign bit must stay clear; borrow a byte of exponent.
        if compact & CompactDifficulty::SIGN_BIT != 0 {
            compact >>= 8;
            size += 1;
        }

        CompactDifficulty(compact | ((size as u32) << CompactDifficulty::EXPONENT_SHIFT))
    }

    /// The work needed to find a hash under this target:
    /// `floor(2^256 / (target + 1))`, computed as `~t / (t + 1) + 1`.
    pub fn to_work(&self) -> Work {
        Work((!self.0 / (self.0 + 1)) + 1)
    }

    /// Returns true iff `hash`, interpreted as a little-endian 256-bit
    /// integer, does not exceed this target.
    pub fn is_met_by(&self, hash: &block::Hash) -> bool {
        U256::from_little_endian(&hash.0) <= self.0
    }

    pub fn to_u256(&self) -> U256 {
        self.0
    }
}

impl From<U256> for ExpandedDifficulty {
    fn from(value: U256) -> Self {
        ExpandedDifficulty(value)
    }
}

impl Work {
    pub fn to_u256(&self) -> U256 {
        self.0
    }
}

impl From<U256> for Work {
    fn from(value: U256) -> Self {
        Work(value)
    }
}

impl PartialCumulativeWork {
    pub fn to_u256(&self) -> U256 {
        self.0
    }

    /// Big-endian fixed-width form, used for store keys and values.
    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        self.0.to_big_endian(&mut bytes);
        bytes
    }

    pub fn from_be_bytes(bytes: [u8; 32]) -> PartialCumulativeWork {
        PartialCumulativeWork(U256::from_big_endian(&bytes))
    }
}

impl From<Work> for PartialCumulativeWork {
    fn from(work: Work) -> Self {
        PartialCumulativeWork(work.0)
    }
}

impl std::ops::Add<Work> for PartialCumulativeWork {
    type Output = PartialCumulativeWork;

    fn add(self, rhs: Work) -> Self::Output {
        PartialCumulativeWork(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign<Work> for PartialCumulativeWork {
    fn add_assign(&mut self, rhs: Work) {
        self.0 = self.0 + rhs.0;
    }
}

impl std::ops::Sub<PartialCumulativeWork> for PartialCumulativeWork {
    type Output = Work;

    fn sub(self, rhs: PartialCumulativeWork) -> Work {
        Work(self.0 - rhs.0)
    }
}

impl CashSerialize for CompactDifficulty {
    fn cash_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.cash_serialize(target)
    }
}

impl CashDeserialize for CompactDifficulty {
    fn cash_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(CompactDifficulty(u32::cash_deserialize(reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_mainnet_limit() {
        let limit = CompactDifficulty(0x1d00ffff).to_expanded().unwrap();
        let expected = U256::from(0xffffu64) << 208;
        assert_eq!(limit.to_u256(), expected);
        assert_eq!(limit.to_compact(), CompactDifficulty(0x1d00ffff));
    }

    #[test]
    fn invalid_encodings() {
        // Zero mantissa.
        assert!(CompactDifficulty(0x1d000000).to_expanded().is_none());
        // Sign bit set.
        assert!(CompactDifficulty(0x1d800000).to_expanded().is_none());
        // Overflow.
        assert!(CompactDifficulty(0x23ffffff).to_expanded().is_none());
    }

    #[test]
    fn compact_roundtrip() {
        for bits in &[
            0x1d00ffffu32,
            0x1c0fffff,
            0x1c0fe7b1,
            0x1c2f13b9,
            0x207fffff,
            0x1b04864c,
            0x0300ffff,
        ] {
            let expanded = CompactDifficulty(*bits).to_expanded().unwrap();
            assert_eq!(expanded.to_compact().0, *bits, "bits {:#010x}", bits);
        }
    }

    #[test]
    fn work_is_inverse_of_target() {
        // For the regtest limit (2^255 - ish), work is ~1; for the mainnet
        // limit, work is 2^32 / (0xffff+1)-ish. Spot check the latter.
        let limit = CompactDifficulty(0x1d00ffff).to_expanded().unwrap();
        let work = limit.to_work().to_u256();
        // floor(2^256 / (0xffff * 2^208 + 1)) == 2^32 + 2^16 + 1
        assert_eq!(work, U256::from(0x0001_0001_0001u64));
    }

    #[test]
    fn hash_meets_target() {
        let target = CompactDifficulty(0x1d00ffff).to_expanded().unwrap();
        let low = block::Hash([0; 32]);
        assert!(target.is_met_by(&low));

        let mut high_bytes = [0u8; 32];
        high_bytes[31] = 0x80;
        let high = block::Hash(high_bytes);
        assert!(!target.is_met_by(&high));
    }
}
