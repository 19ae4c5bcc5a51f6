use std::convert::TryFrom;
use std::io;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::block;
use crate::serialization::{self, CashDeserialize, CashSerialize, SerializationError};

/// A transaction lock time.
///
/// Wire values below [`LockTime::MIN_TIMESTAMP`] are block heights; values
/// at or above it are Unix timestamps compared against median-time-past.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum LockTime {
    Height(block::Height),
    Time(DateTime<Utc>),
}

impl LockTime {
    /// The smallest wire value interpreted as a timestamp.
    pub const MIN_TIMESTAMP: u32 = 500_000_000;

    /// A lock time that never locks anything.
    pub fn unlocked() -> LockTime {
        LockTime::Height(block::Height(0))
    }

    /// The raw wire value.
    pub fn raw(&self) -> u32 {
        match self {
            LockTime::Height(h) => h.0,
            LockTime::Time(t) => {
                u32::try_from(t.timestamp()).expect("lock times fit in u32 by construction")
            }
        }
    }
}

impl CashSerialize for LockTime {
    fn cash_serialize<W: io::Write>(&self, target: W) -> Result<(), io::Error> {
        self.raw().cash_serialize(target)
    }
}

impl CashDeserialize for LockTime {
    fn cash_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        let raw = u32::cash_deserialize(reader)?;
        if raw < LockTime::MIN_TIMESTAMP {
            Ok(LockTime::Height(block::Height(raw)))
        } else {
            Ok(LockTime::Time(serialization::datetime_from_wire(raw)))
        }
    }
}
