//! Signature and public key encoding rules, and ECDSA verification.

use lazy_static::lazy_static;
use secp256k1::{ecdsa, Message, PublicKey, Secp256k1, VerifyOnly};

use crate::error::ScriptError;
use crate::flags::VerifyFlags;
use crate::sighash::SigHashType;

lazy_static! {
    static ref SECP: Secp256k1<VerifyOnly> = Secp256k1::verification_only();
}

/// The secp256k1 group order halved, big-endian. A signature S value above
/// this is "high" and malleable.
const HALF_ORDER: [u8; 32] = [
    0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b,
    0x20, 0xa0,
];

/// Strict DER check for a bare signature (no trailing hash type byte),
/// following BIP 66.
pub fn is_valid_der(sig: &[u8]) -> bool {
    // Minimum: 0x30 len 0x02 lenR R(1) 0x02 lenS S(1).
    if sig.len() < 8 || sig.len() > 72 {
        return false;
    }
    if sig[0] != 0x30 || sig[1] as usize != sig.len() - 2 {
        return false;
    }

    let len_r = sig[3] as usize;
    if len_r == 0 || 5 + len_r >= sig.len() {
        return false;
    }
    let len_s = sig[5 + len_r] as usize;
    if len_s == 0 || len_r + len_s + 6 != sig.len() {
        return false;
    }

    if sig[2] != 0x02 {
        return false;
    }
    if sig[4] & 0x80 != 0 {
        return false;
    }
    if len_r > 1 && sig[4] == 0x00 && sig[5] & 0x80 == 0 {
        return false;
    }

    if sig[len_r + 4] != 0x02 {
        return false;
    }
    if sig[len_r + 6] & 0x80 != 0 {
        return false;
    }
    if len_s > 1 && sig[len_r + 6] == 0x00 && sig[len_r + 7] & 0x80 == 0 {
        return false;
    }

    true
}

/// Whether a DER signature's S value is in the lower half of the group
/// order. Assumes `sig` already passed [`is_valid_der`].
pub fn is_low_s(sig: &[u8]) -> bool {
    if !is_valid_der(sig) {
        return false;
    }
    let len_r = sig[3] as usize;
    let len_s = sig[5 + len_r] as usize;
    let s = &sig[6 + len_r..6 + len_r + len_s];

    // Strip any leading zero; a canonical S has at most one.
    let s = if s[0] == 0 { &s[1..] } else { s };
    if s.len() > 32 {
        return false;
    }

    // Left-pad to 32 bytes and compare big-endian.
    let mut padded = [0u8; 32];
    padded[32 - s.len()..].copy_from_slice(s);
    padded <= HALF_ORDER
}

/// Validate the encoding of a transaction signature (DER plus trailing hash
/// type byte) against the active flags.
///
/// The empty signature is always well-formed: it is the canonical way to
/// make `OP_CHECKSIG` yield false.
pub fn check_signature_encoding(sig: &[u8], flags: VerifyFlags) -> Result<(), ScriptError> {
    if sig.is_empty() {
        return Ok(());
    }

    if flags.intersects(VerifyFlags::DERSIG | VerifyFlags::LOW_S | VerifyFlags::STRICTENC) {
        let (der, _hash_type) = sig.split_at(sig.len() - 1);
        if !is_valid_der(der) {
            return Err(ScriptError::SigDer);
        }
    }
    if flags.contains(VerifyFlags::LOW_S) && !is_low_s(&sig[..sig.len() - 1]) {
        return Err(ScriptError::SigHighS);
    }
    if flags.contains(VerifyFlags::STRICTENC) {
        let hash_type = SigHashType::from_byte(sig[sig.len() - 1]);
        if !hash_type.is_defined() {
            return Err(ScriptError::SigHashType);
        }
        if hash_type.has_forkid() != flags.contains(VerifyFlags::SIGHASH_FORKID) {
            return Err(ScriptError::SigHashType);
        }
    }
    Ok(())
}

/// Validate the encoding of an `OP_CHECKDATASIG` signature, which carries no
/// hash type byte.
pub fn check_datasig_encoding(sig: &[u8], flags: VerifyFlags) -> Result<(), ScriptError> {
    if sig.is_empty() {
        return Ok(());
    }

    if flags.intersects(VerifyFlags::DERSIG | VerifyFlags::LOW_S | VerifyFlags::STRICTENC)
        && !is_valid_der(sig)
    {
        return Err(ScriptError::SigDer);
    }
    if flags.contains(VerifyFlags::LOW_S) && !is_low_s(sig) {
        return Err(ScriptError::SigHighS);
    }
    Ok(())
}

/// Validate a public key encoding against the active flags.
pub fn check_pubkey_encoding(key: &[u8], flags: VerifyFlags) -> Result<(), ScriptError> {
    if !flags.contains(VerifyFlags::STRICTENC) {
        return Ok(());
    }

    let compressed = key.len() == 33 && (key[0] == 0x02 || key[0] == 0x03);
    let uncompressed = key.len() == 65 && key[0] == 0x04;

    if flags.contains(VerifyFlags::COMPRESSED_PUBKEYTYPE) {
        if !compressed {
            return Err(ScriptError::PubkeyType);
        }
    } else if !compressed && !uncompressed {
        // Hybrid encodings (0x06/0x07) and garbage both land here.
        return Err(ScriptError::PubkeyType);
    }
    Ok(())
}

/// ECDSA-verify a bare DER signature over a 32-byte message hash.
///
/// Unparseable signatures and keys verify as false, never as errors; the
/// encoding rules above decide whether malformed data aborts the script.
pub fn verify_signature(msg32: &[u8; 32], sig_der: &[u8], pubkey: &[u8]) -> bool {
    let pubkey = match PublicKey::from_slice(pubkey) {
        Ok(key) => key,
        Err(_) => return false,
    };
    let mut sig = match ecdsa::Signature::from_der(sig_der) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    // Consensus accepts high-S signatures unless LOW_S rejects them first,
    // but libsecp verifies only normalized signatures.
    sig.normalize_s();
    let msg = Message::from_digest(*msg32);
    SECP.verify_ecdsa(&msg, &sig, &pubkey).is_ok()
}

#[cfg(test)]
mod tests {
    use secp256k1::SecretKey;
    use sha2::{Digest, Sha256};

    use super::*;

    fn one_key() -> (SecretKey, PublicKey) {
        let secp = Secp256k1::new();
        let mut sk_bytes = [0u8; 32];
        sk_bytes[31] = 1;
        let sk = SecretKey::from_slice(&sk_bytes).unwrap();
        let pk = PublicKey::from_secret_key(&secp, &sk);
        (sk, pk)
    }

    fn sign(msg32: [u8; 32], sk: &SecretKey) -> Vec<u8> {
        let secp = Secp256k1::new();
        let msg = Message::from_digest(msg32);
        secp.sign_ecdsa(&msg, sk).serialize_der().to_vec()
    }

    fn digest(data: &[u8]) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&Sha256::digest(data));
        out
    }

    #[test]
    fn deterministic_signature_verifies() {
        bch_test::init();

        let (sk, pk) = one_key();
        let msg = digest(b"");
        let sig = sign(msg, &sk);

        assert!(is_valid_der(&sig));
        assert!(is_low_s(&sig));
        assert!(verify_signature(&msg, &sig, &pk.serialize()));
        assert!(!verify_signature(&digest(b"other"), &sig, &pk.serialize()));
    }

    #[test]
    fn high_s_detected() {
        bch_test::init();

        let (sk, pk) = one_key();
        let msg = digest(b"");
        let sig = sign(msg, &sk);

        // Flip S to the high half: s' = order - s.
        let compact = ecdsa::Signature::from_der(&sig).unwrap().serialize_compact();
        let mut s = [0u8; 32];
        s.copy_from_slice(&compact[32..]);
        let high_s = subtract_from_order(&s);
        let mut high_compact = [0u8; 64];
        high_compact[..32].copy_from_slice(&compact[..32]);
        high_compact[32..].copy_from_slice(&high_s);
        let high_sig = ecdsa::Signature::from_compact(&high_compact)
            .unwrap()
            .serialize_der()
            .to_vec();

        assert!(is_valid_der(&high_sig));
        assert!(!is_low_s(&high_sig));
        // The signature still verifies after normalization.
        assert!(verify_signature(&msg, &high_sig, &pk.serialize()));
    }

    fn subtract_from_order(s: &[u8; 32]) -> [u8; 32] {
        let order = secp256k1::constants::CURVE_ORDER;
        let mut result = [0u8; 32];
        let mut borrow = 0i16;
        for i in (0..32).rev() {
            let mut diff = i16::from(order[i]) - i16::from(s[i]) - borrow;
            if diff < 0 {
                diff += 256;
                borrow = 1;
            } else {
                borrow = 0;
            }
            result[i] = diff as u8;
        }
        result
    }

    #[test]
    fn hybrid_pubkeys_rejected_by_strictenc() {
        bch_test::init();

        let (_, pk) = one_key();
        let mut hybrid = pk.serialize_uncompressed();
        hybrid[0] = 0x06 | (hybrid[64] & 1);

        assert!(check_pubkey_encoding(&hybrid, VerifyFlags::NONE).is_ok());
        assert_eq!(
            check_pubkey_encoding(&hybrid, VerifyFlags::STRICTENC).unwrap_err(),
            ScriptError::PubkeyType
        );
    }

    #[test]
    fn compressed_only_mode() {
        bch_test::init();

        let (_, pk) = one_key();
        let flags = VerifyFlags::STRICTENC | VerifyFlags::COMPRESSED_PUBKEYTYPE;
        assert!(check_pubkey_encoding(&pk.serialize(), flags).is_ok());
        assert_eq!(
            check_pubkey_encoding(&pk.serialize_uncompressed(), flags).unwrap_err(),
            ScriptError::PubkeyType
        );
    }

    #[test]
    fn hashtype_checks() {
        bch_test::init();

        let (sk, _) = one_key();
        let msg = digest(b"");
        let mut sig = sign(msg, &sk);
        let forkid_flags = VerifyFlags::STRICTENC | VerifyFlags::SIGHASH_FORKID;

        // ALL without FORKID is rejected when FORKID is required.
        sig.push(0x01);
        assert_eq!(
            check_signature_encoding(&sig, forkid_flags).unwrap_err(),
            ScriptError::SigHashType
        );

        // ALL | FORKID passes.
        *sig.last_mut().unwrap() = 0x41;
        assert!(check_signature_encoding(&sig, forkid_flags).is_ok());

        // ...but is rejected when FORKID is not enabled.
        assert_eq!(
            check_signature_encoding(&sig, VerifyFlags::STRICTENC).unwrap_err(),
            ScriptError::SigHashType
        );

        // Undefined base type.
        *sig.last_mut().unwrap() = 0x44;
        assert_eq!(
            check_signature_encoding(&sig, forkid_flags).unwrap_err(),
            ScriptError::SigHashType
        );
    }
}
