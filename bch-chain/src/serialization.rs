//! Consensus-critical serialization.
//!
//! This module contains the `CashSerialize` and `CashDeserialize` traits,
//! analogs of the Serde `Serialize` and `Deserialize` traits but intended for
//! the consensus-critical wire format: little-endian integers, the Bitcoin
//! variable-integer format, and length-prefixed byte strings. Hashing is
//! defined as double-SHA-256 over these canonical bytes, so every type that
//! can be hashed must serialize identically on every node.

mod deserialize;
mod error;

pub mod sha256d;

pub use deserialize::{CashDeserialize, CashDeserializeInto};
pub use error::SerializationError;

use std::convert::TryFrom;

use chrono::{DateTime, TimeZone, Utc};

use crate::compactint::CompactInt;
use byteorder::{LittleEndian, WriteBytesExt};

/// Converts a wire timestamp into a `DateTime<Utc>`.
pub fn datetime_from_wire(timestamp: u32) -> DateTime<Utc> {
    Utc.timestamp_opt(i64::from(timestamp), 0)
        .single()
        .expect("all u32 timestamps are representable")
}

pub trait CashSerialize {
    fn cash_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error>;

    fn cash_serialize_to_vec(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut data = Vec::new();
        self.cash_serialize(&mut data)?;
        Ok(data)
    }
}

impl CashSerialize for bool {
    fn cash_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(&[*self as u8])
    }
}

impl CashSerialize for u16 {
    fn cash_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u16::<LittleEndian>(*self)
    }
}

impl CashSerialize for u32 {
    fn cash_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u32::<LittleEndian>(*self)
    }
}

impl CashSerialize for u64 {
    fn cash_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u64::<LittleEndian>(*self)
    }
}

impl CashSerialize for i32 {
    fn cash_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_i32::<LittleEndian>(*self)
    }
}

impl CashSerialize for i64 {
    fn cash_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_i64::<LittleEndian>(*self)
    }
}

impl CashSerialize for DateTime<Utc> {
    fn cash_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        // Header times are unsigned 32-bit seconds on the wire; saturate
        // rather than wrap for out-of-range times, which validation rejects.
        let time_u32 = u32::try_from(self.timestamp()).unwrap_or(u32::MAX);
        target.write_u32::<LittleEndian>(time_u32)
    }
}

impl CashSerialize for &[u8] {
    fn cash_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl CashSerialize for [u8; 4] {
    fn cash_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl CashSerialize for [u8; 20] {
    fn cash_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl CashSerialize for [u8; 32] {
    fn cash_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

/// Byte vectors serialize with a `CompactInt` length prefix.
impl CashSerialize for Vec<u8> {
    fn cash_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        CompactInt::from(self.len()).cash_serialize(&mut target)?;
        target.write_all(self)?;
        Ok(())
    }
}

impl<T> CashSerialize for Vec<T>
where
    T: CashSerialize,
{
    fn cash_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        CompactInt::from(self.len()).cash_serialize(&mut target)?;
        for item in self.iter() {
            item.cash_serialize(&mut target)?
        }
        Ok(())
    }
}

impl<T, U> CashSerialize for (T, U)
where
    T: CashSerialize,
    U: CashSerialize,
{
    fn cash_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        self.0.cash_serialize(&mut target)?;
        self.1.cash_serialize(&mut target)?;
        Ok(())
    }
}

impl<T> CashSerialize for std::sync::Arc<T>
where
    T: CashSerialize,
{
    fn cash_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        T::cash_serialize(self, target)
    }
}
