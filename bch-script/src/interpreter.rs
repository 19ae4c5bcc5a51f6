//! The opcode interpreter.

use ripemd::Ripemd160;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use bch_chain::amount::{Amount, NonNegative};
use bch_chain::serialization::sha256d;
use bch_chain::transaction::{LockTime, Transaction};
use bch_chain::transparent::{Script, SEQUENCE_FINAL};

use crate::error::ScriptError;
use crate::flags::VerifyFlags;
use crate::num::ScriptNum;
use crate::opcode::{self, *};
use crate::sighash::{SigHashCache, SigHashType};
use crate::signature;
use crate::standard;

/// Maximum script length in bytes.
pub const MAX_SCRIPT_SIZE: usize = 10_000;
/// Maximum length of a single stack element.
pub const MAX_SCRIPT_PUSH: usize = 520;
/// Maximum combined depth of the stack and altstack.
pub const MAX_SCRIPT_STACK: usize = 1_000;
/// Maximum number of executed non-push opcodes.
pub const MAX_SCRIPT_OPS: usize = 201;
/// Maximum number of public keys in a multisig.
pub const MAX_MULTISIG_PUBKEYS: usize = 20;

/// The value stack: byte strings, top at the end.
pub type Stack = Vec<Vec<u8>>;

/// Transaction context for signature and lock-time opcodes.
///
/// The interpreter itself is pure; everything it needs from the spending
/// transaction arrives through this trait.
pub trait SignatureChecker {
    /// Check a transaction signature (with trailing hash type byte) over
    /// `script_code`.
    fn check_sig(
        &mut self,
        sig: &[u8],
        pubkey: &[u8],
        script_code: &[u8],
        flags: VerifyFlags,
    ) -> Result<bool, ScriptError>;

    /// OP_CHECKLOCKTIMEVERIFY: whether the transaction satisfies `locktime`.
    fn check_locktime(&self, _locktime: &ScriptNum) -> bool {
        false
    }

    /// OP_CHECKSEQUENCEVERIFY: whether the input satisfies `sequence`.
    fn check_sequence(&self, _sequence: &ScriptNum) -> bool {
        false
    }
}

/// A checker with no transaction context; every signature check fails.
pub struct NullSignatureChecker;

impl SignatureChecker for NullSignatureChecker {
    fn check_sig(
        &mut self,
        _sig: &[u8],
        _pubkey: &[u8],
        _script_code: &[u8],
        _flags: VerifyFlags,
    ) -> Result<bool, ScriptError> {
        Ok(false)
    }
}

/// Checks signatures and lock times against a real transaction input.
pub struct TransactionSignatureChecker<'a> {
    cache: SigHashCache<'a>,
    tx: &'a Transaction,
    index: usize,
    value: Amount<NonNegative>,
}

impl<'a> TransactionSignatureChecker<'a> {
    /// `index` is the input being verified and `value` the amount of the
    /// output it spends.
    pub fn new(
        tx: &'a Transaction,
        index: usize,
        value: Amount<NonNegative>,
    ) -> TransactionSignatureChecker<'a> {
        TransactionSignatureChecker {
            cache: SigHashCache::new(tx),
            tx,
            index,
            value,
        }
    }
}

impl SignatureChecker for TransactionSignatureChecker<'_> {
    fn check_sig(
        &mut self,
        sig: &[u8],
        pubkey: &[u8],
        script_code: &[u8],
        flags: VerifyFlags,
    ) -> Result<bool, ScriptError> {
        if sig.is_empty() {
            return Ok(false);
        }
        let (der, hash_type) = sig.split_at(sig.len() - 1);
        let hash_type = SigHashType::from_byte(hash_type[0]);
        let hash =
            self.cache
                .signature_hash(self.index, script_code, self.value, hash_type, flags);
        Ok(signature::verify_signature(&hash, der, pubkey))
    }

    fn check_locktime(&self, locktime: &ScriptNum) -> bool {
        let tx_locktime = i64::from(self.tx.locktime.raw());
        let required = locktime.0;

        // Both values must be on the same side of the height/time split.
        let threshold = i64::from(LockTime::MIN_TIMESTAMP);
        let same_kind = (tx_locktime < threshold) == (required < threshold);
        if !same_kind {
            return false;
        }
        if required > tx_locktime {
            return false;
        }
        // A final sequence number would let the transaction bypass its own
        // lock time, so the signer must not have used one.
        self.tx.inputs[self.index].sequence() != SEQUENCE_FINAL
    }

    fn check_sequence(&self, sequence: &ScriptNum) -> bool {
        // Relative lock times are disabled when bit 31 is set; bit 22
        // selects time-based rather than height-based locks.
        const DISABLE_FLAG: i64 = 1 << 31;
        const TYPE_FLAG: i64 = 1 << 22;
        const MASK: i64 = 0x0000_ffff;

        let input_sequence = i64::from(self.tx.inputs[self.index].sequence());
        let required = sequence.0;

        // Relative lock times are only available from version 2.
        if self.tx.version < 2 {
            return false;
        }
        if input_sequence & DISABLE_FLAG != 0 {
            return false;
        }

        let required_masked = required & (TYPE_FLAG | MASK);
        let input_masked = input_sequence & (TYPE_FLAG | MASK);
        let same_kind = (required_masked & TYPE_FLAG) == (input_masked & TYPE_FLAG);
        same_kind && (required_masked & MASK) <= (input_masked & MASK)
    }
}

/// Interpret a stack element as a boolean: anything but zero (of any length,
/// with or without the negative-zero sign byte) is true.
pub fn cast_to_bool(data: &[u8]) -> bool {
    for (i, &byte) in data.iter().enumerate() {
        if byte != 0 {
            return !(i == data.len() - 1 && byte == 0x80);
        }
    }
    false
}

/// Verify an input: run the unlock script, then the lock script, then (under
/// the P2SH rules) the redeem script, over a shared stack.
pub fn verify_script(
    unlock_script: &Script,
    lock_script: &Script,
    flags: VerifyFlags,
    checker: &mut dyn SignatureChecker,
) -> Result<(), ScriptError> {
    if flags.contains(VerifyFlags::SIGPUSHONLY) && !standard::is_push_only(&unlock_script.0) {
        return Err(ScriptError::SigPushOnly);
    }

    let mut stack: Stack = Vec::new();
    eval_script(&mut stack, &unlock_script.0, flags, checker)?;

    let is_p2sh = flags.contains(VerifyFlags::P2SH)
        && standard::is_pay_to_script_hash(&lock_script.0);
    let p2sh_stack = if is_p2sh { stack.clone() } else { Vec::new() };

    eval_script(&mut stack, &lock_script.0, flags, checker)?;

    match stack.last() {
        Some(top) if cast_to_bool(top) => {}
        _ => return Err(ScriptError::EvalFalse),
    }

    if is_p2sh {
        if !standard::is_push_only(&unlock_script.0) {
            return Err(ScriptError::SigPushOnly);
        }
        let mut stack = p2sh_stack;
        // The unlock script is push-only and produced a truthy hash match,
        // so it pushed at least the redeem script.
        let redeem = stack.pop().ok_or(ScriptError::EvalFalse)?;
        eval_script(&mut stack, &redeem, flags, checker)?;
        match stack.last() {
            Some(top) if cast_to_bool(top) => {}
            _ => return Err(ScriptError::EvalFalse),
        }
        if flags.contains(VerifyFlags::CLEANSTACK) && stack.len() != 1 {
            return Err(ScriptError::CleanStack);
        }
        return Ok(());
    }

    // CLEANSTACK is only sound together with P2SH.
    if flags.contains(VerifyFlags::CLEANSTACK) && stack.len() != 1 {
        return Err(ScriptError::CleanStack);
    }

    Ok(())
}

fn pop(stack: &mut Stack) -> Result<Vec<u8>, ScriptError> {
    stack.pop().ok_or(ScriptError::InvalidStackOperation)
}

fn peek(stack: &Stack, depth_from_top: usize) -> Result<&Vec<u8>, ScriptError> {
    if depth_from_top >= stack.len() {
        return Err(ScriptError::InvalidStackOperation);
    }
    Ok(&stack[stack.len() - 1 - depth_from_top])
}

fn pop_num(stack: &mut Stack, flags: VerifyFlags) -> Result<ScriptNum, ScriptError> {
    let data = pop(stack)?;
    ScriptNum::decode(
        &data,
        flags.contains(VerifyFlags::MINIMALDATA),
        ScriptNum::DEFAULT_MAX_SIZE,
    )
}

fn push_bool(stack: &mut Stack, value: bool) {
    stack.push(if value { vec![1] } else { vec![] });
}

/// Execute a single script over `stack`.
pub fn eval_script(
    stack: &mut Stack,
    script: &[u8],
    flags: VerifyFlags,
    checker: &mut dyn SignatureChecker,
) -> Result<(), ScriptError> {
    if script.len() > MAX_SCRIPT_SIZE {
        return Err(ScriptError::ScriptSize);
    }

    let require_minimal = flags.contains(VerifyFlags::MINIMALDATA);
    let mut altstack: Stack = Vec::new();
    let mut cond_stack: Vec<bool> = Vec::new();
    let mut op_count = 0usize;
    let mut last_code_sep = 0usize;

    let mut ops = opcode::iter(script);
    loop {
        let instruction = match ops.next() {
            Some(result) => result?,
            None => break,
        };
        let pc = ops.position();
        let executing = cond_stack.iter().all(|&branch| branch);

        if let Some(push) = instruction.push {
            if push.len() > MAX_SCRIPT_PUSH {
                return Err(ScriptError::PushSize);
            }
            if executing {
                if require_minimal && !is_minimal_push(instruction.opcode, push) {
                    return Err(ScriptError::MinimalData);
                }
                stack.push(push.to_vec());
            }
        } else {
            let op = instruction.opcode;

            if op > OP_16 {
                op_count += 1;
                if op_count > MAX_SCRIPT_OPS {
                    return Err(ScriptError::OpCount);
                }
            }

            // Disabled opcodes poison the script wherever they appear.
            if is_disabled(op) {
                return Err(ScriptError::DisabledOpcode);
            }

            let is_conditional = (OP_IF..=OP_ENDIF).contains(&op);
            if !executing && !is_conditional {
                if stack.len() + altstack.len() > MAX_SCRIPT_STACK {
                    return Err(ScriptError::StackSize);
                }
                continue;
            }

            match op {
                OP_1NEGATE => stack.push(vec![0x81]),
                OP_1..=OP_16 => {
                    stack.push(ScriptNum(i64::from(op - OP_1 + 1)).encode());
                }

                OP_NOP => {}
                OP_CHECKLOCKTIMEVERIFY => {
                    if flags.contains(VerifyFlags::CHECKLOCKTIMEVERIFY) {
                        let data = peek(stack, 0)?;
                        // Lock times exceed 32 bits, so 5-byte operands are
                        // allowed here.
                        let locktime = ScriptNum::decode(data, require_minimal, 5)?;
                        if locktime.0 < 0 {
                            return Err(ScriptError::NegativeLocktime);
                        }
                        if !checker.check_locktime(&locktime) {
                            return Err(ScriptError::UnsatisfiedLocktime);
                        }
                    } else if flags.contains(VerifyFlags::DISCOURAGE_UPGRADABLE_NOPS) {
                        return Err(ScriptError::DiscourageUpgradableNops);
                    }
                }
                OP_CHECKSEQUENCEVERIFY => {
                    if flags.contains(VerifyFlags::CHECKSEQUENCEVERIFY) {
                        let data = peek(stack, 0)?;
                        let sequence = ScriptNum::decode(data, require_minimal, 5)?;
                        if sequence.0 < 0 {
                            return Err(ScriptError::NegativeLocktime);
                        }
                        // With the disable bit set the operand is a no-op.
                        if sequence.0 & (1 << 31) == 0 && !checker.check_sequence(&sequence) {
                            return Err(ScriptError::UnsatisfiedLocktime);
                        }
                    } else if flags.contains(VerifyFlags::DISCOURAGE_UPGRADABLE_NOPS) {
                        return Err(ScriptError::DiscourageUpgradableNops);
                    }
                }
                OP_NOP1 | OP_NOP4..=OP_NOP10 => {
                    if flags.contains(VerifyFlags::DISCOURAGE_UPGRADABLE_NOPS) {
                        return Err(ScriptError::DiscourageUpgradableNops);
                    }
                }

                OP_IF | OP_NOTIF => {
                    let mut value = false;
                    if executing {
                        let top = pop(stack).map_err(|_| ScriptError::UnbalancedConditional)?;
                        value = cast_to_bool(&top);
                        if op == OP_NOTIF {
                            value = !value;
                        }
                    }
                    cond_stack.push(value);
                }
                OP_ELSE => {
                    let last = cond_stack
                        .last_mut()
                        .ok_or(ScriptError::UnbalancedConditional)?;
                    *last = !*last;
                }
                OP_ENDIF => {
                    cond_stack
                        .pop()
                        .ok_or(ScriptError::UnbalancedConditional)?;
                }
                OP_VERIF | OP_VERNOTIF | OP_VER => return Err(ScriptError::BadOpcode),

                OP_VERIFY => {
                    let top = pop(stack)?;
                    if !cast_to_bool(&top) {
                        return Err(ScriptError::Verify);
                    }
                }
                OP_RETURN => return Err(ScriptError::OpReturn),

                OP_TOALTSTACK => altstack.push(pop(stack)?),
                OP_FROMALTSTACK => {
                    stack.push(
                        altstack
                            .pop()
                            .ok_or(ScriptError::InvalidAltstackOperation)?,
                    );
                }
                OP_2DROP => {
                    pop(stack)?;
                    pop(stack)?;
                }
                OP_2DUP => {
                    let a = peek(stack, 1)?.clone();
                    let b = peek(stack, 0)?.clone();
                    stack.push(a);
                    stack.push(b);
                }
                OP_3DUP => {
                    let a = peek(stack, 2)?.clone();
                    let b = peek(stack, 1)?.clone();
                    let c = peek(stack, 0)?.clone();
                    stack.push(a);
                    stack.push(b);
                    stack.push(c);
                }
                OP_2OVER => {
                    let a = peek(stack, 3)?.clone();
                    let b = peek(stack, 2)?.clone();
                    stack.push(a);
                    stack.push(b);
                }
                OP_2ROT => {
                    if stack.len() < 6 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let drained: Vec<Vec<u8>> =
                        stack.drain(stack.len() - 6..stack.len() - 4).collect();
                    stack.extend(drained);
                }
                OP_2SWAP => {
                    if stack.len() < 4 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let drained: Vec<Vec<u8>> =
                        stack.drain(stack.len() - 4..stack.len() - 2).collect();
                    stack.extend(drained);
                }
                OP_IFDUP => {
                    let top = peek(stack, 0)?;
                    if cast_to_bool(top) {
                        let dup = top.clone();
                        stack.push(dup);
                    }
                }
                OP_DEPTH => {
                    let depth = ScriptNum(stack.len() as i64).encode();
                    stack.push(depth);
                }
                OP_DROP => {
                    pop(stack)?;
                }
                OP_DUP => {
                    let top = peek(stack, 0)?.clone();
                    stack.push(top);
                }
                OP_NIP => {
                    let top = pop(stack)?;
                    pop(stack)?;
                    stack.push(top);
                }
                OP_OVER => {
                    let second = peek(stack, 1)?.clone();
                    stack.push(second);
                }
                OP_PICK | OP_ROLL => {
                    let depth = pop_num(stack, flags)?.0;
                    if depth < 0 || depth as usize >= stack.len() {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let position = stack.len() - 1 - depth as usize;
                    let item = if op == OP_ROLL {
                        stack.remove(position)
                    } else {
                        stack[position].clone()
                    };
                    stack.push(item);
                }
                OP_ROT => {
                    if stack.len() < 3 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let third = stack.remove(stack.len() - 3);
                    stack.push(third);
                }
                OP_SWAP => {
                    if stack.len() < 2 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let len = stack.len();
                    stack.swap(len - 1, len - 2);
                }
                OP_TUCK => {
                    if stack.len() < 2 {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let top = peek(stack, 0)?.clone();
                    let position = stack.len() - 2;
                    stack.insert(position, top);
                }
                OP_SIZE => {
                    let size = ScriptNum(peek(stack, 0)?.len() as i64).encode();
                    stack.push(size);
                }

                OP_CAT => {
                    let b = pop(stack)?;
                    let mut a = pop(stack)?;
                    if a.len() + b.len() > MAX_SCRIPT_PUSH {
                        return Err(ScriptError::PushSize);
                    }
                    a.extend_from_slice(&b);
                    stack.push(a);
                }
                OP_SPLIT => {
                    let position = pop_num(stack, flags)?.0;
                    let data = pop(stack)?;
                    if position < 0 || position as usize > data.len() {
                        return Err(ScriptError::InvalidSplitRange);
                    }
                    let (left, right) = data.split_at(position as usize);
                    stack.push(left.to_vec());
                    stack.push(right.to_vec());
                }
                OP_NUM2BIN => {
                    let size = pop_num(stack, flags)?.0;
                    if size < 0 || size as usize > MAX_SCRIPT_PUSH {
                        return Err(ScriptError::PushSize);
                    }
                    let size = size as usize;
                    let raw = pop(stack)?;
                    let mut data = ScriptNum::to_minimal(&raw);
                    if data.len() > size {
                        return Err(ScriptError::ImpossibleEncoding);
                    }
                    if data.len() < size {
                        let sign = if let Some(last) = data.last_mut() {
                            let sign = *last & 0x80;
                            *last &= 0x7f;
                            sign
                        } else {
                            0
                        };
                        data.resize(size - 1, 0);
                        data.push(sign);
                    }
                    stack.push(data);
                }
                OP_BIN2NUM => {
                    let raw = pop(stack)?;
                    let data = ScriptNum::to_minimal(&raw);
                    if data.len() > ScriptNum::DEFAULT_MAX_SIZE {
                        return Err(ScriptError::InvalidNumberRange);
                    }
                    stack.push(data);
                }

                OP_AND | OP_OR | OP_XOR => {
                    let b = pop(stack)?;
                    let mut a = pop(stack)?;
                    if a.len() != b.len() {
                        return Err(ScriptError::InvalidOperandSize);
                    }
                    match op {
                        OP_AND => {
                            for (x, y) in a.iter_mut().zip(&b) {
                                *x &= y;
                            }
                        }
                        OP_OR => {
                            for (x, y) in a.iter_mut().zip(&b) {
                                *x |= y;
                            }
                        }
                        _ => {
                            for (x, y) in a.iter_mut().zip(&b) {
                                *x ^= y;
                            }
                        }
                    }
                    stack.push(a);
                }
                OP_EQUAL | OP_EQUALVERIFY => {
                    let b = pop(stack)?;
                    let a = pop(stack)?;
                    let equal = a == b;
                    if op == OP_EQUALVERIFY {
                        if !equal {
                            return Err(ScriptError::EqualVerify);
                        }
                    } else {
                        push_bool(stack, equal);
                    }
                }
                OP_RESERVED | OP_RESERVED1 | OP_RESERVED2 => {
                    return Err(ScriptError::BadOpcode)
                }

                OP_1ADD | OP_1SUB | OP_NEGATE | OP_ABS | OP_NOT | OP_0NOTEQUAL => {
                    let n = pop_num(stack, flags)?.0;
                    let result = match op {
                        OP_1ADD => n + 1,
                        OP_1SUB => n - 1,
                        OP_NEGATE => -n,
                        OP_ABS => n.abs(),
                        OP_NOT => (n == 0) as i64,
                        _ => (n != 0) as i64,
                    };
                    stack.push(ScriptNum(result).encode());
                }
                OP_ADD | OP_SUB | OP_DIV | OP_MOD | OP_BOOLAND | OP_BOOLOR | OP_NUMEQUAL
                | OP_NUMEQUALVERIFY | OP_NUMNOTEQUAL | OP_LESSTHAN | OP_GREATERTHAN
                | OP_LESSTHANOREQUAL | OP_GREATERTHANOREQUAL | OP_MIN | OP_MAX => {
                    let b = pop_num(stack, flags)?.0;
                    let a = pop_num(stack, flags)?.0;
                    let result = match op {
                        OP_ADD => a + b,
                        OP_SUB => a - b,
                        OP_DIV => {
                            if b == 0 {
                                return Err(ScriptError::DivByZero);
                            }
                            // i64 division truncates toward zero, as
                            // consensus requires.
                            a / b
                        }
                        OP_MOD => {
                            if b == 0 {
                                return Err(ScriptError::ModByZero);
                            }
                            a % b
                        }
                        OP_BOOLAND => (a != 0 && b != 0) as i64,
                        OP_BOOLOR => (a != 0 || b != 0) as i64,
                        OP_NUMEQUAL | OP_NUMEQUALVERIFY => (a == b) as i64,
                        OP_NUMNOTEQUAL => (a != b) as i64,
                        OP_LESSTHAN => (a < b) as i64,
                        OP_GREATERTHAN => (a > b) as i64,
                        OP_LESSTHANOREQUAL => (a <= b) as i64,
                        OP_GREATERTHANOREQUAL => (a >= b) as i64,
                        OP_MIN => a.min(b),
                        _ => a.max(b),
                    };
                    if op == OP_NUMEQUALVERIFY {
                        if result == 0 {
                            return Err(ScriptError::NumEqualVerify);
                        }
                    } else {
                        stack.push(ScriptNum(result).encode());
                    }
                }
                OP_WITHIN => {
                    let max = pop_num(stack, flags)?.0;
                    let min = pop_num(stack, flags)?.0;
                    let x = pop_num(stack, flags)?.0;
                    push_bool(stack, min <= x && x < max);
                }

                OP_RIPEMD160 => {
                    let data = pop(stack)?;
                    stack.push(Ripemd160::digest(&data).to_vec());
                }
                OP_SHA1 => {
                    let data = pop(stack)?;
                    stack.push(Sha1::digest(&data).to_vec());
                }
                OP_SHA256 => {
                    let data = pop(stack)?;
                    stack.push(Sha256::digest(&data).to_vec());
                }
                OP_HASH160 => {
                    let data = pop(stack)?;
                    let sha = Sha256::digest(&data);
                    stack.push(Ripemd160::digest(&sha).to_vec());
                }
                OP_HASH256 => {
                    let data = pop(stack)?;
                    stack.push(sha256d::hash(&data).to_vec());
                }

                OP_CODESEPARATOR => last_code_sep = pc,

                OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                    let pubkey = pop(stack)?;
                    let sig = pop(stack)?;
                    let script_code = &script[last_code_sep..];

                    signature::check_signature_encoding(&sig, flags)?;
                    signature::check_pubkey_encoding(&pubkey, flags)?;
                    let success = checker.check_sig(&sig, &pubkey, script_code, flags)?;
                    if !success && flags.contains(VerifyFlags::NULLFAIL) && !sig.is_empty() {
                        return Err(ScriptError::NullFail);
                    }
                    if op == OP_CHECKSIGVERIFY {
                        if !success {
                            return Err(ScriptError::CheckSigVerify);
                        }
                    } else {
                        push_bool(stack, success);
                    }
                }
                OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                    let key_count = pop_num(stack, flags)?.0;
                    if key_count < 0 || key_count as usize > MAX_MULTISIG_PUBKEYS {
                        return Err(ScriptError::PubkeyCount);
                    }
                    op_count += key_count as usize;
                    if op_count > MAX_SCRIPT_OPS {
                        return Err(ScriptError::OpCount);
                    }
                    let mut keys = Vec::with_capacity(key_count as usize);
                    for _ in 0..key_count {
                        keys.push(pop(stack)?);
                    }
                    keys.reverse();

                    let sig_count = pop_num(stack, flags)?.0;
                    if sig_count < 0 || sig_count > key_count {
                        return Err(ScriptError::SigCount);
                    }
                    let mut sigs = Vec::with_capacity(sig_count as usize);
                    for _ in 0..sig_count {
                        sigs.push(pop(stack)?);
                    }
                    sigs.reverse();

                    // The historical extra element.
                    let dummy = pop(stack)?;
                    if flags.contains(VerifyFlags::NULLDUMMY) && !dummy.is_empty() {
                        return Err(ScriptError::SigNullDummy);
                    }

                    let script_code = &script[last_code_sep..];
                    let mut success = true;
                    let mut ikey = 0usize;
                    let mut isig = 0usize;
                    while success && isig < sigs.len() {
                        // Not enough keys left for the remaining signatures.
                        if sigs.len() - isig > keys.len() - ikey {
                            success = false;
                            break;
                        }
                        let sig = &sigs[isig];
                        let key = &keys[ikey];
                        signature::check_signature_encoding(sig, flags)?;
                        signature::check_pubkey_encoding(key, flags)?;
                        if checker.check_sig(sig, key, script_code, flags)? {
                            isig += 1;
                        }
                        ikey += 1;
                    }

                    if !success && flags.contains(VerifyFlags::NULLFAIL) {
                        if sigs.iter().any(|sig| !sig.is_empty()) {
                            return Err(ScriptError::NullFail);
                        }
                    }

                    if op == OP_CHECKMULTISIGVERIFY {
                        if !success {
                            return Err(ScriptError::CheckMultisigVerify);
                        }
                    } else {
                        push_bool(stack, success);
                    }
                }
                OP_CHECKDATASIG | OP_CHECKDATASIGVERIFY => {
                    if !flags.contains(VerifyFlags::CHECKDATASIG) {
                        return Err(ScriptError::BadOpcode);
                    }
                    let pubkey = pop(stack)?;
                    let message = pop(stack)?;
                    let sig = pop(stack)?;

                    signature::check_datasig_encoding(&sig, flags)?;
                    signature::check_pubkey_encoding(&pubkey, flags)?;

                    let success = if sig.is_empty() {
                        false
                    } else {
                        let mut digest = [0u8; 32];
                        digest.copy_from_slice(&Sha256::digest(&message));
                        signature::verify_signature(&digest, &sig, &pubkey)
                    };
                    if !success && flags.contains(VerifyFlags::NULLFAIL) && !sig.is_empty() {
                        return Err(ScriptError::NullFail);
                    }
                    if op == OP_CHECKDATASIGVERIFY {
                        if !success {
                            return Err(ScriptError::CheckDataSigVerify);
                        }
                    } else {
                        push_bool(stack, success);
                    }
                }

                _ => return Err(ScriptError::BadOpcode),
            }
        }

        if stack.len() + altstack.len() > MAX_SCRIPT_STACK {
            return Err(ScriptError::StackSize);
        }
    }

    if !cond_stack.is_empty() {
        return Err(ScriptError::UnbalancedConditional);
    }

    Ok(())
}

/// Whether a push used the shortest possible encoding.
fn is_minimal_push(opcode: u8, data: &[u8]) -> bool {
    match data.len() {
        0 => opcode == OP_0,
        1 if data[0] >= 1 && data[0] <= 16 => false,
        1 if data[0] == 0x81 => false,
        len if len <= 75 => opcode as usize == len,
        len if len <= 255 => opcode == OP_PUSHDATA1,
        len if len <= 65535 => opcode == OP_PUSHDATA2,
        _ => true,
    }
}
