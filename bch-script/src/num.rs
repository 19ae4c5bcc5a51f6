//! Minimally-encoded script numbers.
//!
//! Numbers on the stack are little-endian, sign-and-magnitude: the top bit
//! of the final byte is the sign. The empty string is zero. Operands are
//! limited to 4 encoded bytes; arithmetic results may briefly occupy 5
//! bytes, and are re-checked when consumed again.

use crate::error::ScriptError;

/// A decoded script number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScriptNum(pub i64);

impl ScriptNum {
    /// The default bound on operand encodings, in bytes.
    pub const DEFAULT_MAX_SIZE: usize = 4;

    /// Decode a stack element.
    ///
    /// `max_size` is 4 for ordinary operands and 5 for the lock-time
    /// checks; `require_minimal` corresponds to the `MINIMALDATA` flag.
    pub fn decode(
        bytes: &[u8],
        require_minimal: bool,
        max_size: usize,
    ) -> Result<ScriptNum, ScriptError> {
        if bytes.len() > max_size {
            return Err(ScriptError::InvalidNumberRange);
        }
        if require_minimal && !ScriptNum::is_minimal(bytes) {
            return Err(ScriptError::UnknownError);
        }
        if bytes.is_empty() {
            return Ok(ScriptNum(0));
        }

        let mut value: i64 = 0;
        for (i, &byte) in bytes.iter().enumerate() {
            if i == bytes.len() - 1 {
                // The top bit of the last byte is the sign.
                value |= i64::from(byte & 0x7f) << (8 * i);
                if byte & 0x80 != 0 {
                    value = -value;
                }
            } else {
                value |= i64::from(byte) << (8 * i);
            }
        }
        Ok(ScriptNum(value))
    }

    /// Encode in the canonical minimal form.
    pub fn encode(&self) -> Vec<u8> {
        let mut result = Vec::new();
        if self.0 == 0 {
            return result;
        }

        let negative = self.0 < 0;
        let mut abs = self.0.unsigned_abs();
        while abs > 0 {
            result.push((abs & 0xff) as u8);
            abs >>= 8;
        }

        let last = *result.last().expect("non-zero numbers have bytes");
        if last & 0x80 != 0 {
            // The magnitude occupies the sign bit; the sign needs its own
            // byte.
            result.push(if negative { 0x80 } else { 0x00 });
        } else if negative {
            *result.last_mut().expect("non-zero numbers have bytes") |= 0x80;
        }
        result
    }

    /// Whether `bytes` is the canonical encoding of its value.
    pub fn is_minimal(bytes: &[u8]) -> bool {
        match bytes.last() {
            None => true,
            Some(&last) => {
                if last & 0x7f != 0 {
                    return true;
                }
                // The final byte is only a sign (or zero); it is needed only
                // when the previous byte's top bit is occupied by magnitude.
                bytes.len() > 1 && bytes[bytes.len() - 2] & 0x80 != 0
            }
        }
    }

    /// Reduce `bytes` to the canonical encoding of the same value, the
    /// `OP_BIN2NUM` operation.
    ///
    /// Stripping never touches a sign byte that is still needed: `ff80`
    /// (negative 255) and `ff00` (positive 255) are already minimal and are
    /// returned unchanged.
    pub fn to_minimal(bytes: &[u8]) -> Vec<u8> {
        let mut data = bytes.to_vec();
        if data.is_empty() {
            return data;
        }
        let last = data[data.len() - 1];
        if last & 0x7f != 0 {
            return data;
        }
        if data.len() == 1 {
            // A lone sign byte is zero.
            return Vec::new();
        }
        if data[data.len() - 2] & 0x80 != 0 {
            return data;
        }

        // Drop the sign byte and any zero bytes below it, reattaching the
        // sign to the highest remaining byte.
        for i in (1..data.len()).rev() {
            if data[i - 1] != 0 {
                if data[i - 1] & 0x80 != 0 {
                    // The top bit is occupied; keep a dedicated sign byte.
                    data[i] = last;
                    data.truncate(i + 1);
                } else {
                    data[i - 1] |= last;
                    data.truncate(i);
                }
                return data;
            }
        }

        // All zero bytes below the sign: the value is zero.
        Vec::new()
    }
}

impl From<i64> for ScriptNum {
    fn from(value: i64) -> ScriptNum {
        ScriptNum(value)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn encode_decode_edge_values() {
        let cases: Vec<(i64, Vec<u8>)> = vec![
            (0, vec![]),
            (1, vec![0x01]),
            (-1, vec![0x81]),
            (127, vec![0x7f]),
            (-127, vec![0xff]),
            (128, vec![0x80, 0x00]),
            (-128, vec![0x80, 0x80]),
            (255, vec![0xff, 0x00]),
            (-255, vec![0xff, 0x80]),
            (256, vec![0x00, 0x01]),
            (0x7fffffff, vec![0xff, 0xff, 0xff, 0x7f]),
            (-0x7fffffff, vec![0xff, 0xff, 0xff, 0xff]),
        ];
        for (value, bytes) in cases {
            assert_eq!(ScriptNum(value).encode(), bytes, "encoding {}", value);
            assert_eq!(
                ScriptNum::decode(&bytes, true, 4).unwrap(),
                ScriptNum(value),
                "decoding {}",
                value
            );
        }
    }

    #[test]
    fn non_minimal_rejected_when_required() {
        // 1 encoded in two bytes.
        let padded = [0x01, 0x00];
        assert!(ScriptNum::decode(&padded, true, 4).is_err());
        assert_eq!(ScriptNum::decode(&padded, false, 4).unwrap(), ScriptNum(1));
    }

    #[test]
    fn oversize_rejected() {
        let five = [0x01, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(
            ScriptNum::decode(&five, false, 4).unwrap_err(),
            ScriptError::InvalidNumberRange
        );
        // 5 bytes are fine for the lock-time operands.
        assert!(ScriptNum::decode(&five, false, 5).is_ok());
    }

    #[test]
    fn minimal_reduction_preserves_needed_sign_bytes() {
        // A lone sign byte reduces to empty.
        assert_eq!(ScriptNum::to_minimal(&[0x80]), Vec::<u8>::new());
        assert_eq!(ScriptNum::to_minimal(&[0x00]), Vec::<u8>::new());
        // Trailing zeros collapse into the sign.
        assert_eq!(ScriptNum::to_minimal(&[0x01, 0x00]), vec![0x01]);
        assert_eq!(ScriptNum::to_minimal(&[0x01, 0x80]), vec![0x81]);
        assert_eq!(ScriptNum::to_minimal(&[0x01, 0x00, 0x00, 0x00]), vec![0x01]);
        // ff00 and ff80 must not be over-minimised.
        assert_eq!(ScriptNum::to_minimal(&[0xff, 0x00]), vec![0xff, 0x00]);
        assert_eq!(ScriptNum::to_minimal(&[0xff, 0x80]), vec![0xff, 0x80]);
        // Zeros between magnitude and sign collapse correctly.
        assert_eq!(ScriptNum::to_minimal(&[0x01, 0x00, 0x80]), vec![0x81]);
        assert_eq!(
            ScriptNum::to_minimal(&[0xff, 0x00, 0x80]),
            vec![0xff, 0x80]
        );
    }

    proptest! {
        #[test]
        fn minimality_law(bytes in proptest::collection::vec(any::<u8>(), 0..=4)) {
            bch_test::init();

            let minimal = ScriptNum::to_minimal(&bytes);
            if ScriptNum::is_minimal(&bytes) {
                prop_assert_eq!(&minimal, &bytes);
            } else {
                prop_assert!(minimal.len() < bytes.len());
                prop_assert_eq!(
                    ScriptNum::decode(&minimal, true, 4).unwrap(),
                    ScriptNum::decode(&bytes, false, 4).unwrap()
                );
            }

            let reencoded = ScriptNum::decode(&minimal, true, 4).unwrap().encode();
            prop_assert_eq!(reencoded, minimal);
        }

        #[test]
        fn encode_roundtrip(value in -0x7fffffffi64..=0x7fffffff) {
            bch_test::init();

            let bytes = ScriptNum(value).encode();
            prop_assert!(ScriptNum::is_minimal(&bytes));
            prop_assert_eq!(ScriptNum::decode(&bytes, true, 4).unwrap(), ScriptNum(value));
        }
    }
}
