//! Transaction signature hashing.
//!
//! Two algorithms are selected per-signature by the hash type byte: the
//! legacy quadratic serialization, and the linear FORKID algorithm that
//! binds the spent output's value into the preimage. The FORKID algorithm
//! caches its three component hashes, so verifying every input of a
//! transaction does linear work in total.

use std::io::Write;

use bch_chain::amount::{Amount, NonNegative};
use bch_chain::compactint::CompactInt;
use bch_chain::serialization::{sha256d, CashSerialize};
use bch_chain::transaction::Transaction;
use bch_chain::transparent::OutPoint;

use crate::flags::VerifyFlags;
use crate::opcode;

/// A signature hash type, as carried in the byte appended to every
/// transaction signature.
///
/// The low bits select the base algorithm, `0x40` is the FORKID bit, and
/// `0x80` is `ANYONECANPAY`. The upper 24 bits are the fork value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigHashType(pub u32);

impl SigHashType {
    pub const ALL: u32 = 0x01;
    pub const NONE: u32 = 0x02;
    pub const SINGLE: u32 = 0x03;
    pub const FORKID: u32 = 0x40;
    pub const ANYONECANPAY: u32 = 0x80;

    pub fn from_byte(byte: u8) -> SigHashType {
        SigHashType(u32::from(byte))
    }

    /// The base algorithm bits.
    pub fn base(&self) -> u32 {
        self.0 & 0x1f
    }

    pub fn has_forkid(&self) -> bool {
        self.0 & Self::FORKID != 0
    }

    pub fn has_anyone_can_pay(&self) -> bool {
        self.0 & Self::ANYONECANPAY != 0
    }

    /// Whether this is a defined combination under strict encoding.
    pub fn is_defined(&self) -> bool {
        let base = self.0 & !(Self::FORKID | Self::ANYONECANPAY);
        (Self::ALL..=Self::SINGLE).contains(&base)
    }

    /// Apply the replay-protection transform to the fork value.
    fn with_replay_protection(self) -> SigHashType {
        let fork_value = self.0 >> 8;
        let new_fork_value = 0xff0000 | (fork_value ^ 0xdead);
        SigHashType((new_fork_value << 8) | (self.0 & 0xff))
    }
}

/// Per-transaction signature hashing state.
///
/// The transaction is borrowed immutably, so the cached component hashes can
/// never go stale; build a fresh cache to sign or verify a different
/// transaction.
pub struct SigHashCache<'a> {
    tx: &'a Transaction,
    hash_prevouts: Option<[u8; 32]>,
    hash_sequence: Option<[u8; 32]>,
    hash_outputs: Option<[u8; 32]>,
}

impl<'a> SigHashCache<'a> {
    pub fn new(tx: &'a Transaction) -> SigHashCache<'a> {
        SigHashCache {
            tx,
            hash_prevouts: None,
            hash_sequence: None,
            hash_outputs: None,
        }
    }

    /// Compute the signature hash for one input.
    ///
    /// `script_code` is the lock script (or redeem script) being satisfied,
    /// from the most recent `OP_CODESEPARATOR`; `value` is the amount of the
    /// spent output, bound into FORKID preimages.
    pub fn signature_hash(
        &mut self,
        index: usize,
        script_code: &[u8],
        value: Amount<NonNegative>,
        hash_type: SigHashType,
        flags: VerifyFlags,
    ) -> [u8; 32] {
        let hash_type = if flags.contains(VerifyFlags::REPLAY_PROTECTION) {
            hash_type.with_replay_protection()
        } else {
            hash_type
        };

        if hash_type.has_forkid() && flags.contains(VerifyFlags::SIGHASH_FORKID) {
            self.signature_hash_v1(index, script_code, value, hash_type)
        } else {
            self.signature_hash_v0(index, script_code, hash_type)
        }
    }

    /// The legacy signature hash: serialize a modified copy of the whole
    /// transaction and hash it.
    fn signature_hash_v0(
        &mut self,
        index: usize,
        script_code: &[u8],
        hash_type: SigHashType,
    ) -> [u8; 32] {
        let base = hash_type.base();
        let anyone_can_pay = hash_type.has_anyone_can_pay();

        // The infamous SIGHASH_SINGLE bug: signing a missing output yields
        // the constant hash 1.
        if base == SigHashType::SINGLE && index >= self.tx.outputs.len() {
            let mut one = [0u8; 32];
            one[0] = 0x01;
            return one;
        }

        let script_code = opcode::strip_code_separators(script_code);

        let mut writer = sha256d::Writer::default();
        self.tx
            .version
            .cash_serialize(&mut writer)
            .expect("hash writers never fail");

        // Inputs.
        if anyone_can_pay {
            CompactInt::from(1)
                .cash_serialize(&mut writer)
                .expect("hash writers never fail");
            self.serialize_modified_input(&mut writer, index, index, &script_code, base);
        } else {
            CompactInt::from(self.tx.inputs.len())
                .cash_serialize(&mut writer)
                .expect("hash writers never fail");
            for i in 0..self.tx.inputs.len() {
                self.serialize_modified_input(&mut writer, i, index, &script_code, base);
            }
        }

        // Outputs.
        match base {
            SigHashType::NONE => {
                CompactInt::from(0)
                    .cash_serialize(&mut writer)
                    .expect("hash writers never fail");
            }
            SigHashType::SINGLE => {
                CompactInt::from(index + 1)
                    .cash_serialize(&mut writer)
                    .expect("hash writers never fail");
                for _ in 0..index {
                    // A "null" output: value -1, empty script.
                    (-1i64)
                        .cash_serialize(&mut writer)
                        .expect("hash writers never fail");
                    CompactInt::from(0)
                        .cash_serialize(&mut writer)
                        .expect("hash writers never fail");
                }
                self.tx.outputs[index]
                    .cash_serialize(&mut writer)
                    .expect("hash writers never fail");
            }
            _ => {
                self.tx
                    .outputs
                    .cash_serialize(&mut writer)
                    .expect("hash writers never fail");
            }
        }

        self.tx
            .locktime
            .cash_serialize(&mut writer)
            .expect("hash writers never fail");
        hash_type
            .0
            .cash_serialize(&mut writer)
            .expect("hash writers never fail");
        writer.finish()
    }

    fn serialize_modified_input<W: Write>(
        &self,
        mut writer: W,
        i: usize,
        signing_index: usize,
        script_code: &[u8],
        base: u32,
    ) {
        let input = &self.tx.inputs[i];
        input
            .outpoint()
            .unwrap_or_else(OutPoint::null)
            .cash_serialize(&mut writer)
            .expect("hash writers never fail");

        if i == signing_index {
            script_code
                .to_vec()
                .cash_serialize(&mut writer)
                .expect("hash writers never fail");
        } else {
            CompactInt::from(0)
                .cash_serialize(&mut writer)
                .expect("hash writers never fail");
        }

        let sequence = if i != signing_index
            && (base == SigHashType::NONE || base == SigHashType::SINGLE)
        {
            0
        } else {
            input.sequence()
        };
        sequence
            .cash_serialize(&mut writer)
            .expect("hash writers never fail");
    }

    /// The FORKID (BIP 143 shaped) signature hash: a linear preimage over
    /// cached component hashes, including the spent output's value.
    fn signature_hash_v1(
        &mut self,
        index: usize,
        script_code: &[u8],
        value: Amount<NonNegative>,
        hash_type: SigHashType,
    ) -> [u8; 32] {
        let base = hash_type.base();
        let anyone_can_pay = hash_type.has_anyone_can_pay();

        let hash_prevouts = if anyone_can_pay {
            [0u8; 32]
        } else {
            self.hash_prevouts()
        };
        let hash_sequence = if anyone_can_pay
            || base == SigHashType::SINGLE
            || base == SigHashType::NONE
        {
            [0u8; 32]
        } else {
            self.hash_sequence()
        };
        let hash_outputs = match base {
            SigHashType::SINGLE if index < self.tx.outputs.len() => {
                let mut writer = sha256d::Writer::default();
                self.tx.outputs[index]
                    .cash_serialize(&mut writer)
                    .expect("hash writers never fail");
                writer.finish()
            }
            SigHashType::SINGLE | SigHashType::NONE => [0u8; 32],
            _ => self.hash_outputs(),
        };

        let input = &self.tx.inputs[index];

        let mut writer = sha256d::Writer::default();
        self.tx
            .version
            .cash_serialize(&mut writer)
            .expect("hash writers never fail");
        hash_prevouts
            .cash_serialize(&mut writer)
            .expect("hash writers never fail");
        hash_sequence
            .cash_serialize(&mut writer)
            .expect("hash writers never fail");
        input
            .outpoint()
            .unwrap_or_else(OutPoint::null)
            .cash_serialize(&mut writer)
            .expect("hash writers never fail");
        script_code
            .to_vec()
            .cash_serialize(&mut writer)
            .expect("hash writers never fail");
        value
            .cash_serialize(&mut writer)
            .expect("hash writers never fail");
        input
            .sequence()
            .cash_serialize(&mut writer)
            .expect("hash writers never fail");
        hash_outputs
            .cash_serialize(&mut writer)
            .expect("hash writers never fail");
        self.tx
            .locktime
            .cash_serialize(&mut writer)
            .expect("hash writers never fail");
        hash_type
            .0
            .cash_serialize(&mut writer)
            .expect("hash writers never fail");
        writer.finish()
    }

    fn hash_prevouts(&mut self) -> [u8; 32] {
        if let Some(hash) = self.hash_prevouts {
            return hash;
        }
        let mut writer = sha256d::Writer::default();
        for input in &self.tx.inputs {
            input
                .outpoint()
                .unwrap_or_else(OutPoint::null)
                .cash_serialize(&mut writer)
                .expect("hash writers never fail");
        }
        let hash = writer.finish();
        self.hash_prevouts = Some(hash);
        hash
    }

    fn hash_sequence(&mut self) -> [u8; 32] {
        if let Some(hash) = self.hash_sequence {
            return hash;
        }
        let mut writer = sha256d::Writer::default();
        for input in &self.tx.inputs {
            input
                .sequence()
                .cash_serialize(&mut writer)
                .expect("hash writers never fail");
        }
        let hash = writer.finish();
        self.hash_sequence = Some(hash);
        hash
    }

    fn hash_outputs(&mut self) -> [u8; 32] {
        if let Some(hash) = self.hash_outputs {
            return hash;
        }
        let mut writer = sha256d::Writer::default();
        for output in &self.tx.outputs {
            output
                .cash_serialize(&mut writer)
                .expect("hash writers never fail");
        }
        let hash = writer.finish();
        self.hash_outputs = Some(hash);
        hash
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use bch_chain::transaction::{Hash as TxHash, LockTime};
    use bch_chain::transparent::{Input, Output, Script, SEQUENCE_FINAL};

    use super::*;

    fn two_in_two_out() -> Transaction {
        Transaction::new(
            1,
            vec![
                Input::PrevOut {
                    outpoint: OutPoint {
                        hash: TxHash([0x11; 32]),
                        index: 0,
                    },
                    unlock_script: Script(vec![]),
                    sequence: SEQUENCE_FINAL,
                },
                Input::PrevOut {
                    outpoint: OutPoint {
                        hash: TxHash([0x22; 32]),
                        index: 3,
                    },
                    unlock_script: Script(vec![]),
                    sequence: 0xFFFF_FFFE,
                },
            ],
            vec![
                Output {
                    value: Amount::try_from(40_000i64).unwrap(),
                    lock_script: Script(vec![0x51]),
                },
                Output {
                    value: Amount::try_from(50_000i64).unwrap(),
                    lock_script: Script(vec![0x52]),
                },
            ],
            LockTime::unlocked(),
        )
    }

    fn forkid_flags() -> VerifyFlags {
        VerifyFlags::SIGHASH_FORKID
    }

    #[test]
    fn single_bug_returns_constant_one() {
        bch_test::init();

        let tx = two_in_two_out();
        let mut cache = SigHashCache::new(&tx);
        // Strip the second output so index 1 has no pair.
        let mut short = tx.clone();
        short.outputs.truncate(1);
        let mut short_cache = SigHashCache::new(&short);

        let hash = short_cache.signature_hash(
            1,
            &[0x51],
            Amount::zero(),
            SigHashType(SigHashType::SINGLE),
            VerifyFlags::NONE,
        );
        let mut one = [0u8; 32];
        one[0] = 1;
        assert_eq!(hash, one);

        // With a matching output, the hash is a real digest.
        let hash = cache.signature_hash(
            1,
            &[0x51],
            Amount::zero(),
            SigHashType(SigHashType::SINGLE),
            VerifyFlags::NONE,
        );
        assert_ne!(hash, one);
    }

    #[test]
    fn forkid_and_legacy_differ() {
        bch_test::init();

        let tx = two_in_two_out();
        let value = Amount::try_from(100_000i64).unwrap();

        let mut cache = SigHashCache::new(&tx);
        let legacy = cache.signature_hash(
            0,
            &[0x51],
            value,
            SigHashType(SigHashType::ALL),
            forkid_flags(),
        );
        let forkid = cache.signature_hash(
            0,
            &[0x51],
            value,
            SigHashType(SigHashType::ALL | SigHashType::FORKID),
            forkid_flags(),
        );
        assert_ne!(legacy, forkid);

        // Without the verify flag the FORKID bit falls back to legacy
        // hashing (with the bit still serialized into the hash type field).
        let mut cache2 = SigHashCache::new(&tx);
        let fallback = cache2.signature_hash(
            0,
            &[0x51],
            value,
            SigHashType(SigHashType::ALL | SigHashType::FORKID),
            VerifyFlags::NONE,
        );
        assert_ne!(fallback, forkid);
    }

    #[test]
    fn forkid_binds_spent_value() {
        bch_test::init();

        let tx = two_in_two_out();
        let mut cache = SigHashCache::new(&tx);
        let hash_type = SigHashType(SigHashType::ALL | SigHashType::FORKID);

        let a = cache.signature_hash(
            0,
            &[0x51],
            Amount::try_from(100_000i64).unwrap(),
            hash_type,
            forkid_flags(),
        );
        let b = cache.signature_hash(
            0,
            &[0x51],
            Amount::try_from(100_001i64).unwrap(),
            hash_type,
            forkid_flags(),
        );
        assert_ne!(a, b);
    }

    #[test]
    fn replay_protection_changes_every_hash() {
        bch_test::init();

        let tx = two_in_two_out();
        let mut cache = SigHashCache::new(&tx);
        let value = Amount::try_from(100_000i64).unwrap();
        let hash_type = SigHashType(SigHashType::ALL | SigHashType::FORKID);

        let normal = cache.signature_hash(0, &[0x51], value, hash_type, forkid_flags());
        let protected = cache.signature_hash(
            0,
            &[0x51],
            value,
            hash_type,
            forkid_flags() | VerifyFlags::REPLAY_PROTECTION,
        );
        assert_ne!(normal, protected);
    }

    #[test]
    fn replay_protection_transform() {
        bch_test::init();

        let transformed = SigHashType(0x41).with_replay_protection();
        // fork value 0 ^ 0xdead, OR'd with 0xff0000, above the base byte.
        assert_eq!(transformed.0, 0xffde_ad41);
        assert!(transformed.has_forkid());
    }

    #[test]
    fn anyone_can_pay_ignores_other_inputs() {
        bch_test::init();

        let tx = two_in_two_out();
        let mut other = tx.clone();
        // Change the *other* input's outpoint.
        other.inputs[1] = Input::PrevOut {
            outpoint: OutPoint {
                hash: TxHash([0x33; 32]),
                index: 9,
            },
            unlock_script: Script(vec![]),
            sequence: 0,
        };

        let value = Amount::try_from(100_000i64).unwrap();
        let hash_type =
            SigHashType(SigHashType::ALL | SigHashType::FORKID | SigHashType::ANYONECANPAY);

        let mut cache_a = SigHashCache::new(&tx);
        let mut cache_b = SigHashCache::new(&other);
        let a = cache_a.signature_hash(0, &[0x51], value, hash_type, forkid_flags());
        let b = cache_b.signature_hash(0, &[0x51], value, hash_type, forkid_flags());
        assert_eq!(a, b);
    }
}
