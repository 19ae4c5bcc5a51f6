//! The Bitcoin-inherited transaction Merkle tree.

use std::fmt;
use std::io;
use std::iter::FromIterator;

use serde::{Deserialize, Serialize};

use crate::serialization::{sha256d, CashDeserialize, CashSerialize, SerializationError};
use crate::transaction;

/// The root of the transaction Merkle tree, binding the block header to the
/// transactions in the block.
///
/// The tree is a binary tree of double-SHA-256 hashes with the odd leaf of
/// each level duplicated. Because of that duplication the root does not
/// always precisely bind the contents of the block (CVE-2012-2459): an
/// attacker can repeat the final transactions of a block without changing
/// the root. [`root_and_mutation`] detects that case.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Root(pub [u8; 32]);

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut reversed_bytes = self.0;
        reversed_bytes.reverse();
        f.write_str(&hex::encode(reversed_bytes))
    }
}

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut reversed_bytes = self.0;
        reversed_bytes.reverse();
        f.debug_tuple("merkle::Root")
            .field(&hex::encode(reversed_bytes))
            .finish()
    }
}

impl std::str::FromStr for Root {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0; 32];
        if hex::decode_to_slice(s, &mut bytes[..]).is_err() {
            Err(SerializationError::Parse("hex decoding error"))
        } else {
            bytes.reverse();
            Ok(Root(bytes))
        }
    }
}

impl CashSerialize for Root {
    fn cash_serialize<W: io::Write>(&self, target: W) -> Result<(), io::Error> {
        self.0.cash_serialize(target)
    }
}

impl CashDeserialize for Root {
    fn cash_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Root(<[u8; 32]>::cash_deserialize(&mut reader)?))
    }
}

/// Compute the Merkle root of a list of transaction hashes, together with a
/// flag reporting whether the tree is in the CVE-2012-2459 mutated form.
///
/// The mutation flag is set when two *distinct* sibling positions hold the
/// same hash; the legitimate duplication of an odd trailing leaf does not
/// set it.
pub fn root_and_mutation(hashes: &[transaction::Hash]) -> (Root, bool) {
    if hashes.is_empty() {
        return (Root([0; 32]), false);
    }

    let mut level: Vec<[u8; 32]> = hashes.iter().map(|h| h.0).collect();
    let mut mutated = false;

    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for pair in 0..(level.len() + 1) / 2 {
            let left = level[pair * 2];
            let right = if pair * 2 + 1 < level.len() {
                let right = level[pair * 2 + 1];
                if right == left {
                    mutated = true;
                }
                right
            } else {
                left
            };
            let mut concat = [0u8; 64];
            concat[..32].copy_from_slice(&left);
            concat[32..].copy_from_slice(&right);
            next.push(sha256d::hash(&concat));
        }
        level = next;
    }

    (Root(level[0]), mutated)
}

impl FromIterator<transaction::Hash> for Root {
    fn from_iter<I: IntoIterator<Item = transaction::Hash>>(iter: I) -> Root {
        let hashes: Vec<transaction::Hash> = iter.into_iter().collect();
        root_and_mutation(&hashes).0
    }
}
