//! Strongly-typed chain value amounts.
//!
//! Amounts are signed 64-bit counts of the smallest currency unit, with a
//! typestate constraint so that code handling UTXO values cannot silently
//! accept negative or out-of-range numbers.

use std::convert::TryFrom;
use std::marker::PhantomData;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CashDeserialize, CashSerialize, SerializationError};

/// Smallest currency units per whole coin.
pub const COIN: i64 = 100_000_000;

/// The maximum amount of money that can ever exist, in smallest units.
pub const MAX_MONEY: i64 = 21_000_000 * COIN;

/// An amount of currency, constrained to `C::valid_range()`.
#[derive(Serialize, Deserialize)]
#[serde(bound = "C: Constraint", try_from = "i64", into = "i64")]
pub struct Amount<C = NonNegative>(i64, PhantomData<C>);

impl<C> Clone for Amount<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Amount<C> {}

impl<C> Eq for Amount<C> {}

impl<C> PartialEq for Amount<C> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<C> Ord for Amount<C> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl<C> PartialOrd for Amount<C> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<C> std::hash::Hash for Amount<C> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl<C> std::fmt::Debug for Amount<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Amount").field(&self.0).finish()
    }
}

impl<C: Constraint> Amount<C> {
    /// The zero amount.
    pub fn zero() -> Amount<C> {
        Amount(0, PhantomData)
    }

    /// The raw value in smallest units.
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Re-check this amount against another constraint.
    pub fn constrain<C2: Constraint>(self) -> Result<Amount<C2>, Error> {
        Amount::<C2>::try_from(self.0)
    }
}

impl<C> From<Amount<C>> for i64 {
    fn from(amount: Amount<C>) -> i64 {
        amount.0
    }
}

impl<C: Constraint> TryFrom<i64> for Amount<C> {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if C::valid_range().contains(&value) {
            Ok(Amount(value, PhantomData))
        } else {
            Err(Error::OutOfRange { value })
        }
    }
}

impl<C: Constraint> TryFrom<u64> for Amount<C> {
    type Error = Error;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        let signed = i64::try_from(value).map_err(|_| Error::OutOfRange { value: i64::MAX })?;
        Amount::try_from(signed)
    }
}

impl<C: Constraint> std::ops::Add<Amount<C>> for Amount<C> {
    type Output = Result<Amount<C>, Error>;

    fn add(self, rhs: Amount<C>) -> Self::Output {
        let value = self
            .0
            .checked_add(rhs.0)
            .ok_or(Error::Overflow)?;
        Amount::try_from(value)
    }
}

impl<C: Constraint> std::ops::Sub<Amount<C>> for Amount<C> {
    type Output = Result<Amount<C>, Error>;

    fn sub(self, rhs: Amount<C>) -> Self::Output {
        let value = self
            .0
            .checked_sub(rhs.0)
            .ok_or(Error::Overflow)?;
        Amount::try_from(value)
    }
}

impl<C: Constraint> std::iter::Sum<Amount<C>> for Result<Amount<C>, Error> {
    fn sum<I: Iterator<Item = Amount<C>>>(iter: I) -> Self {
        let mut total = Amount::<C>::zero();
        for amount in iter {
            total = (total + amount)?;
        }
        Ok(total)
    }
}

/// Errors that can be returned when validating `Amount`s
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// amount {value} is outside the valid amount range
    #[error("amount {value} is outside the valid amount range")]
    OutOfRange { value: i64 },
    /// amount arithmetic overflowed i64
    #[error("amount arithmetic overflowed i64")]
    Overflow,
}

/// Marker type for `Amount`s that cannot be negative.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NonNegative;

/// Marker type for `Amount`s that can be negative, e.g. fee deltas.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NegativeAllowed;

/// The range of values an `Amount` marker type permits.
pub trait Constraint {
    fn valid_range() -> RangeInclusive<i64>;
}

impl Constraint for NonNegative {
    fn valid_range() -> RangeInclusive<i64> {
        0..=MAX_MONEY
    }
}

impl Constraint for NegativeAllowed {
    fn valid_range() -> RangeInclusive<i64> {
        -MAX_MONEY..=MAX_MONEY
    }
}

impl<C> CashSerialize for Amount<C> {
    fn cash_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.cash_serialize(target)
    }
}

impl<C: Constraint> CashDeserialize for Amount<C> {
    fn cash_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let value = i64::cash_deserialize(&mut reader)?;
        Amount::try_from(value).map_err(|_| SerializationError::Parse("amount out of range"))
    }
}
