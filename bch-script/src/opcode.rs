//! Opcode constants and raw script iteration.
#![allow(missing_docs)]

use crate::error::ScriptError;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_RESERVED: u8 = 0x50;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;

pub const OP_NOP: u8 = 0x61;
pub const OP_VER: u8 = 0x62;
pub const OP_IF: u8 = 0x63;
pub const OP_NOTIF: u8 = 0x64;
pub const OP_VERIF: u8 = 0x65;
pub const OP_VERNOTIF: u8 = 0x66;
pub const OP_ELSE: u8 = 0x67;
pub const OP_ENDIF: u8 = 0x68;
pub const OP_VERIFY: u8 = 0x69;
pub const OP_RETURN: u8 = 0x6a;

pub const OP_TOALTSTACK: u8 = 0x6b;
pub const OP_FROMALTSTACK: u8 = 0x6c;
pub const OP_2DROP: u8 = 0x6d;
pub const OP_2DUP: u8 = 0x6e;
pub const OP_3DUP: u8 = 0x6f;
pub const OP_2OVER: u8 = 0x70;
pub const OP_2ROT: u8 = 0x71;
pub const OP_2SWAP: u8 = 0x72;
pub const OP_IFDUP: u8 = 0x73;
pub const OP_DEPTH: u8 = 0x74;
pub const OP_DROP: u8 = 0x75;
pub const OP_DUP: u8 = 0x76;
pub const OP_NIP: u8 = 0x77;
pub const OP_OVER: u8 = 0x78;
pub const OP_PICK: u8 = 0x79;
pub const OP_ROLL: u8 = 0x7a;
pub const OP_ROT: u8 = 0x7b;
pub const OP_SWAP: u8 = 0x7c;
pub const OP_TUCK: u8 = 0x7d;

pub const OP_CAT: u8 = 0x7e;
pub const OP_SPLIT: u8 = 0x7f;
pub const OP_NUM2BIN: u8 = 0x80;
pub const OP_BIN2NUM: u8 = 0x81;
pub const OP_SIZE: u8 = 0x82;

pub const OP_INVERT: u8 = 0x83;
pub const OP_AND: u8 = 0x84;
pub const OP_OR: u8 = 0x85;
pub const OP_XOR: u8 = 0x86;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_RESERVED1: u8 = 0x89;
pub const OP_RESERVED2: u8 = 0x8a;

pub const OP_1ADD: u8 = 0x8b;
pub const OP_1SUB: u8 = 0x8c;
pub const OP_2MUL: u8 = 0x8d;
pub const OP_2DIV: u8 = 0x8e;
pub const OP_NEGATE: u8 = 0x8f;
pub const OP_ABS: u8 = 0x90;
pub const OP_NOT: u8 = 0x91;
pub const OP_0NOTEQUAL: u8 = 0x92;

pub const OP_ADD: u8 = 0x93;
pub const OP_SUB: u8 = 0x94;
pub const OP_MUL: u8 = 0x95;
pub const OP_DIV: u8 = 0x96;
pub const OP_MOD: u8 = 0x97;
pub const OP_LSHIFT: u8 = 0x98;
pub const OP_RSHIFT: u8 = 0x99;

pub const OP_BOOLAND: u8 = 0x9a;
pub const OP_BOOLOR: u8 = 0x9b;
pub const OP_NUMEQUAL: u8 = 0x9c;
pub const OP_NUMEQUALVERIFY: u8 = 0x9d;
pub const OP_NUMNOTEQUAL: u8 = 0x9e;
pub const OP_LESSTHAN: u8 = 0x9f;
pub const OP_GREATERTHAN: u8 = 0xa0;
pub const OP_LESSTHANOREQUAL: u8 = 0xa1;
pub const OP_GREATERTHANOREQUAL: u8 = 0xa2;
pub const OP_MIN: u8 = 0xa3;
pub const OP_MAX: u8 = 0xa4;
pub const OP_WITHIN: u8 = 0xa5;

pub const OP_RIPEMD160: u8 = 0xa6;
pub const OP_SHA1: u8 = 0xa7;
pub const OP_SHA256: u8 = 0xa8;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_HASH256: u8 = 0xaa;
pub const OP_CODESEPARATOR: u8 = 0xab;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

pub const OP_NOP1: u8 = 0xb0;
pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xb1;
pub const OP_CHECKSEQUENCEVERIFY: u8 = 0xb2;
pub const OP_NOP4: u8 = 0xb3;
pub const OP_NOP10: u8 = 0xb9;

pub const OP_CHECKDATASIG: u8 = 0xba;
pub const OP_CHECKDATASIGVERIFY: u8 = 0xbb;

/// Opcodes that fail the script even when they sit in an unexecuted branch.
pub fn is_disabled(opcode: u8) -> bool {
    matches!(
        opcode,
        OP_INVERT | OP_2MUL | OP_2DIV | OP_MUL | OP_LSHIFT | OP_RSHIFT
    )
}

/// One decoded script operation: the opcode plus its push payload, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction<'a> {
    pub opcode: u8,
    pub push: Option<&'a [u8]>,
}

/// An iterator over the operations of a raw script.
///
/// Yields `Err(ScriptError::BadOpcode)` once and then stops if a push runs
/// past the end of the script.
pub struct Instructions<'a> {
    script: &'a [u8],
    pc: usize,
    failed: bool,
}

/// Iterate the operations of a raw script.
pub fn iter(script: &[u8]) -> Instructions<'_> {
    Instructions {
        script,
        pc: 0,
        failed: false,
    }
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<Instruction<'a>, ScriptError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pc >= self.script.len() {
            return None;
        }

        let opcode = self.script[self.pc];
        self.pc += 1;

        let len = match opcode {
            0x01..=0x4b => opcode as usize,
            OP_PUSHDATA1 => match self.read_le(1) {
                Some(len) => len,
                None => return self.fail(),
            },
            OP_PUSHDATA2 => match self.read_le(2) {
                Some(len) => len,
                None => return self.fail(),
            },
            OP_PUSHDATA4 => match self.read_le(4) {
                Some(len) => len,
                None => return self.fail(),
            },
            _ => {
                return Some(Ok(Instruction {
                    opcode,
                    push: if opcode == OP_0 { Some(&[]) } else { None },
                }))
            }
        };

        if self.pc + len > self.script.len() {
            return self.fail();
        }
        let push = &self.script[self.pc..self.pc + len];
        self.pc += len;
        Some(Ok(Instruction {
            opcode,
            push: Some(push),
        }))
    }
}

impl<'a> Instructions<'a> {
    /// The byte offset of the next unread operation.
    pub fn position(&self) -> usize {
        self.pc
    }

    fn read_le(&mut self, width: usize) -> Option<usize> {
        if self.pc + width > self.script.len() {
            return None;
        }
        let mut len = 0usize;
        for i in 0..width {
            len |= (self.script[self.pc + i] as usize) << (8 * i);
        }
        self.pc += width;
        Some(len)
    }

    fn fail(&mut self) -> Option<Result<Instruction<'a>, ScriptError>> {
        self.failed = true;
        Some(Err(ScriptError::BadOpcode))
    }
}

/// Copy `script` with every `OP_CODESEPARATOR` removed, as required by the
/// legacy signature hash.
pub fn strip_code_separators(script: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(script.len());
    let mut ops = iter(script);
    let mut copied = 0;
    loop {
        let start = ops.position();
        match ops.next() {
            Some(Ok(instruction)) => {
                let end = ops.position();
                if instruction.opcode != OP_CODESEPARATOR {
                    out.extend_from_slice(&script[start..end]);
                }
                copied = end;
            }
            // A malformed trailing push is hashed verbatim.
            Some(Err(_)) | None => break,
        }
    }
    if copied < script.len() {
        out.extend_from_slice(&script[copied..]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterates_pushes_and_ops() {
        // OP_1 <0xaa 0xbb> OP_DUP
        let script = [OP_1, 0x02, 0xaa, 0xbb, OP_DUP];
        let ops: Vec<_> = iter(&script).collect::<Result<_, _>>().unwrap();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].opcode, OP_1);
        assert_eq!(ops[1].push, Some(&[0xaa, 0xbb][..]));
        assert_eq!(ops[2].opcode, OP_DUP);
    }

    #[test]
    fn truncated_push_fails() {
        let script = [0x05, 0x01];
        let mut ops = iter(&script);
        assert_eq!(ops.next(), Some(Err(ScriptError::BadOpcode)));
        assert_eq!(ops.next(), None);
    }

    #[test]
    fn strips_code_separators() {
        let script = [OP_1, OP_CODESEPARATOR, 0x01, 0xab, OP_CODESEPARATOR, OP_DUP];
        assert_eq!(strip_code_separators(&script), vec![OP_1, 0x01, 0xab, OP_DUP]);
    }
}
