use crate::{CashDeserialize, CashSerialize, SerializationError};
use byteorder::{LittleEndian, WriteBytesExt};

/// The Bitcoin variable-length integer.
///
/// Values below `0xFD` are a single byte; larger values carry a one-byte
/// marker followed by a little-endian u16, u32, or u64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactInt(u64);

impl CompactInt {
    pub fn from(value: usize) -> CompactInt {
        CompactInt(value as u64)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns the number of bytes `value` occupies on the wire.
    pub fn size(value: usize) -> usize {
        if value < 0xFD {
            1
        } else if value <= 0xFFFF {
            3
        } else if value <= 0xFFFF_FFFF {
            5
        } else {
            9
        }
    }
}

impl CashSerialize for CompactInt {
    fn cash_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        if self.value() < 0xFD {
            target.write_all(&[self.value() as u8])
        } else if self.value() <= 0xFFFF {
            target.write_all(&[0xFD])?;
            target.write_u16::<LittleEndian>(self.value() as u16)
        } else if self.value() <= 0xFFFF_FFFF {
            target.write_all(&[0xFE])?;
            target.write_u32::<LittleEndian>(self.value() as u32)
        } else {
            target.write_all(&[0xFF])?;
            target.write_u64::<LittleEndian>(self.value())
        }
    }
}

impl CashDeserialize for CompactInt {
    fn cash_deserialize<R: std::io::Read>(mut target: R) -> Result<CompactInt, SerializationError> {
        let first = u8::cash_deserialize(&mut target)?;
        if first < 0xFD {
            Ok(CompactInt(u64::from(first)))
        } else if first == 0xFD {
            Ok(CompactInt(u64::from(u16::cash_deserialize(&mut target)?)))
        } else if first == 0xFE {
            Ok(CompactInt(u64::from(u32::cash_deserialize(&mut target)?)))
        } else {
            Ok(CompactInt(u64::cash_deserialize(&mut target)?))
        }
    }
}
