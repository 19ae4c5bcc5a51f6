//! Standard script templates: classification, sigop counting, builders.

use bch_chain::parameters::Network;
use bch_chain::transparent::{Address, Script};

use crate::opcode::{self, *};

/// The standard script templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptKind {
    /// `<pubkey> OP_CHECKSIG`
    PayToPublicKey,
    /// `OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG`
    PayToPublicKeyHash,
    /// `OP_HASH160 <hash> OP_EQUAL`
    PayToScriptHash,
    /// `m <key>... n OP_CHECKMULTISIG`
    Multisig { required: usize, keys: usize },
    /// `OP_RETURN <data>...`
    NullData,
    NonStandard,
}

/// The maximum serialized size of a standard OP_RETURN output script.
pub const MAX_NULL_DATA_SIZE: usize = 83;

/// Classify a lock script against the standard templates.
pub fn classify(script: &[u8]) -> ScriptKind {
    if is_pay_to_script_hash(script) {
        return ScriptKind::PayToScriptHash;
    }
    if is_pay_to_pubkey_hash(script) {
        return ScriptKind::PayToPublicKeyHash;
    }
    if is_pay_to_pubkey(script) {
        return ScriptKind::PayToPublicKey;
    }
    if let Some((required, keys)) = parse_multisig(script) {
        return ScriptKind::Multisig { required, keys };
    }
    if is_null_data(script) {
        return ScriptKind::NullData;
    }
    ScriptKind::NonStandard
}

/// `OP_HASH160 <20 bytes> OP_EQUAL`, matched byte-exactly.
pub fn is_pay_to_script_hash(script: &[u8]) -> bool {
    script.len() == 23 && script[0] == OP_HASH160 && script[1] == 0x14 && script[22] == OP_EQUAL
}

fn is_pay_to_pubkey_hash(script: &[u8]) -> bool {
    script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 0x14
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
}

fn is_pay_to_pubkey(script: &[u8]) -> bool {
    match script.len() {
        35 => script[0] == 33 && script[34] == OP_CHECKSIG,
        67 => script[0] == 65 && script[66] == OP_CHECKSIG,
        _ => false,
    }
}

fn small_int(op: u8) -> Option<usize> {
    match op {
        OP_0 => Some(0),
        OP_1..=OP_16 => Some((op - OP_1 + 1) as usize),
        _ => None,
    }
}

fn parse_multisig(script: &[u8]) -> Option<(usize, usize)> {
    let ops: Vec<_> = opcode::iter(script).collect::<Result<_, _>>().ok()?;
    if ops.len() < 4 {
        return None;
    }
    let required = small_int(ops[0].opcode)?;
    let keys = small_int(ops[ops.len() - 2].opcode)?;
    if ops[ops.len() - 1].opcode != OP_CHECKMULTISIG {
        return None;
    }
    if required > keys || keys == 0 || keys > 16 || ops.len() != keys + 3 {
        return None;
    }
    for key in &ops[1..ops.len() - 2] {
        match key.push {
            Some(push) if push.len() == 33 || push.len() == 65 => {}
            _ => return None,
        }
    }
    Some((required, keys))
}

fn is_null_data(script: &[u8]) -> bool {
    if script.is_empty() || script[0] != OP_RETURN || script.len() > MAX_NULL_DATA_SIZE {
        return false;
    }
    is_push_only(&script[1..])
}

/// Whether every operation in the script is a data push.
pub fn is_push_only(script: &[u8]) -> bool {
    for instruction in opcode::iter(script) {
        match instruction {
            Ok(op) if op.opcode <= OP_16 => {}
            _ => return false,
        }
    }
    true
}

/// The final push of a push-only script, used to extract P2SH redeem
/// scripts.
pub fn last_push(script: &[u8]) -> Option<Vec<u8>> {
    let mut last = None;
    for instruction in opcode::iter(script) {
        match instruction {
            Ok(op) if op.opcode <= OP_16 => {
                last = Some(op.push.map(|p| p.to_vec()).unwrap_or_else(|| {
                    // OP_1NEGATE and OP_1..OP_16 push their number.
                    match op.opcode {
                        OP_1NEGATE => vec![0x81],
                        n => vec![n - OP_1 + 1],
                    }
                }));
            }
            _ => return None,
        }
    }
    last
}

/// Count the signature operations in a script.
///
/// In `accurate` mode a CHECKMULTISIG preceded by a small integer counts
/// that many keys; otherwise it counts the maximum of 20.
pub fn sig_ops(script: &[u8], accurate: bool) -> usize {
    let mut count = 0;
    let mut previous: Option<u8> = None;
    for instruction in opcode::iter(script) {
        let instruction = match instruction {
            Ok(instruction) => instruction,
            // Sigops in the valid prefix of a malformed script still count.
            Err(_) => break,
        };
        match instruction.opcode {
            OP_CHECKSIG | OP_CHECKSIGVERIFY | OP_CHECKDATASIG | OP_CHECKDATASIGVERIFY => {
                count += 1;
            }
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                count += match (accurate, previous) {
                    (true, Some(op)) if (OP_1..=OP_16).contains(&op) => {
                        (op - OP_1 + 1) as usize
                    }
                    _ => crate::interpreter::MAX_MULTISIG_PUBKEYS,
                };
            }
            _ => {}
        }
        previous = Some(instruction.opcode);
    }
    count
}

/// Count the signature operations a P2SH input's redeem script adds.
pub fn p2sh_sig_ops(lock_script: &[u8], unlock_script: &[u8]) -> usize {
    if !is_pay_to_script_hash(lock_script) {
        return 0;
    }
    if !is_push_only(unlock_script) {
        return 0;
    }
    match last_push(unlock_script) {
        Some(redeem) => sig_ops(&redeem, true),
        None => 0,
    }
}

/// Append a minimal push of `data`.
pub fn push_data(out: &mut Vec<u8>, data: &[u8]) {
    match data.len() {
        0 => out.push(OP_0),
        1 if data[0] >= 1 && data[0] <= 16 => out.push(OP_1 + data[0] - 1),
        1 if data[0] == 0x81 => out.push(OP_1NEGATE),
        len if len <= 75 => {
            out.push(len as u8);
            out.extend_from_slice(data);
        }
        len if len <= 255 => {
            out.push(OP_PUSHDATA1);
            out.push(len as u8);
            out.extend_from_slice(data);
        }
        len if len <= 65535 => {
            out.push(OP_PUSHDATA2);
            out.extend_from_slice(&(len as u16).to_le_bytes());
            out.extend_from_slice(data);
        }
        len => {
            out.push(OP_PUSHDATA4);
            out.extend_from_slice(&(len as u32).to_le_bytes());
            out.extend_from_slice(data);
        }
    }
}

/// Append a minimal push of the script number `n`.
pub fn push_number(out: &mut Vec<u8>, n: i64) {
    let encoded = crate::num::ScriptNum(n).encode();
    push_data(out, &encoded);
}

/// The address a standard lock script pays to, if any.
pub fn script_address(script: &Script, network: Network) -> Option<Address> {
    match classify(&script.0) {
        ScriptKind::PayToPublicKeyHash => {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&script.0[3..23]);
            Some(Address::PayToPublicKeyHash {
                network,
                pub_key_hash: hash,
            })
        }
        ScriptKind::PayToScriptHash => {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&script.0[2..22]);
            Some(Address::PayToScriptHash {
                network,
                script_hash: hash,
            })
        }
        _ => None,
    }
}
