#![allow(clippy::unit_arg)]
use crate::{
    compactint::CompactInt,
    serialization::{CashDeserialize, CashSerialize, SerializationError},
};
use serde::{Deserialize, Serialize};
use std::{fmt, io};

/// An encoding of a script.
///
/// This is the raw byte form carried on the wire; opcode-level structure is
/// the script engine's concern.
#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct Script(pub Vec<u8>);

impl Script {
    pub fn serialized_size(&self) -> usize {
        CompactInt::size(self.0.len()) + self.0.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Script")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

impl CashSerialize for Script {
    fn cash_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        CompactInt::from(self.0.len()).cash_serialize(&mut writer)?;
        writer.write_all(&self.0[..])?;
        Ok(())
    }
}

impl CashDeserialize for Script {
    fn cash_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let len = CompactInt::cash_deserialize(&mut reader)?.value();
        // Scripts are already inside size-limited containers; this cap only
        // guards the allocation below against a hostile length prefix.
        if len > crate::block::MAX_FORK_BLOCK_SIZE {
            return Err(SerializationError::Parse("script length out of range"));
        }
        let mut bytes = vec![0; len as usize];
        reader.read_exact(&mut bytes)?;
        Ok(Script(bytes))
    }
}

#[cfg(test)]
mod proptests {
    use std::io::Cursor;

    use proptest::prelude::*;

    use super::*;
    use crate::serialization::{CashDeserialize, CashSerialize};

    proptest! {
        #[test]
        fn script_roundtrip(script in any::<Script>()) {
            bch_test::init();

            let mut bytes = Cursor::new(Vec::new());
            script.cash_serialize(&mut bytes)?;

            bytes.set_position(0);
            let other_script = Script::cash_deserialize(&mut bytes)?;

            prop_assert_eq![script, other_script];
        }
    }
}
