//! Typed script execution failures.

use thiserror::Error;

/// An error raised inside the script interpreter.
///
/// Every failure mode has a stable code string, used when a failed input is
/// converted into a consensus rejection reason.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptError {
    #[error("script evaluated to false")]
    EvalFalse,
    #[error("OP_RETURN was encountered")]
    OpReturn,
    #[error("script is larger than the maximum size")]
    ScriptSize,
    #[error("push exceeds the maximum element size")]
    PushSize,
    #[error("too many operations executed")]
    OpCount,
    #[error("stack is too deep")]
    StackSize,
    #[error("more signatures than public keys in multisig")]
    SigCount,
    #[error("too many public keys in multisig")]
    PubkeyCount,
    #[error("OP_VERIFY failed")]
    Verify,
    #[error("OP_EQUALVERIFY failed")]
    EqualVerify,
    #[error("OP_CHECKMULTISIGVERIFY failed")]
    CheckMultisigVerify,
    #[error("OP_CHECKSIGVERIFY failed")]
    CheckSigVerify,
    #[error("OP_CHECKDATASIGVERIFY failed")]
    CheckDataSigVerify,
    #[error("OP_NUMEQUALVERIFY failed")]
    NumEqualVerify,
    #[error("undefined opcode")]
    BadOpcode,
    #[error("disabled opcode")]
    DisabledOpcode,
    #[error("stack operation on too few elements")]
    InvalidStackOperation,
    #[error("altstack operation on empty altstack")]
    InvalidAltstackOperation,
    #[error("unbalanced conditional")]
    UnbalancedConditional,
    #[error("negative locktime")]
    NegativeLocktime,
    #[error("locktime requirement not satisfied")]
    UnsatisfiedLocktime,
    #[error("operands are not the same size")]
    InvalidOperandSize,
    #[error("number is out of range")]
    InvalidNumberRange,
    #[error("split index is out of range")]
    InvalidSplitRange,
    #[error("the requested encoding is impossible")]
    ImpossibleEncoding,
    #[error("division by zero")]
    DivByZero,
    #[error("modulo by zero")]
    ModByZero,
    #[error("signature is not strict DER")]
    SigDer,
    #[error("signature hash type is invalid")]
    SigHashType,
    #[error("signature S value is too high")]
    SigHighS,
    #[error("signature must be empty when verification fails")]
    NullFail,
    #[error("multisig dummy element must be empty")]
    SigNullDummy,
    #[error("unlock script must be push-only")]
    SigPushOnly,
    #[error("push is not minimally encoded")]
    MinimalData,
    #[error("public key is not canonically encoded")]
    PubkeyType,
    #[error("stack is not clean after evaluation")]
    CleanStack,
    #[error("upgradable NOP used")]
    DiscourageUpgradableNops,
    #[error("unknown script error")]
    UnknownError,
}

impl ScriptError {
    /// The stable code string for this error.
    pub fn code(&self) -> &'static str {
        use ScriptError::*;
        match self {
            EvalFalse => "EVAL_FALSE",
            OpReturn => "OP_RETURN",
            ScriptSize => "SCRIPT_SIZE",
            PushSize => "PUSH_SIZE",
            OpCount => "OP_COUNT",
            StackSize => "STACK_SIZE",
            SigCount => "SIG_COUNT",
            PubkeyCount => "PUBKEY_COUNT",
            Verify => "VERIFY",
            EqualVerify => "EQUALVERIFY",
            CheckMultisigVerify => "CHECKMULTISIGVERIFY",
            CheckSigVerify => "CHECKSIGVERIFY",
            CheckDataSigVerify => "CHECKDATASIGVERIFY",
            NumEqualVerify => "NUMEQUALVERIFY",
            BadOpcode => "BAD_OPCODE",
            DisabledOpcode => "DISABLED_OPCODE",
            InvalidStackOperation => "INVALID_STACK_OPERATION",
            InvalidAltstackOperation => "INVALID_ALTSTACK_OPERATION",
            UnbalancedConditional => "UNBALANCED_CONDITIONAL",
            NegativeLocktime => "NEGATIVE_LOCKTIME",
            UnsatisfiedLocktime => "UNSATISFIED_LOCKTIME",
            InvalidOperandSize => "INVALID_OPERAND_SIZE",
            InvalidNumberRange => "INVALID_NUMBER_RANGE",
            InvalidSplitRange => "INVALID_SPLIT_RANGE",
            ImpossibleEncoding => "IMPOSSIBLE_ENCODING",
            DivByZero => "DIV_BY_ZERO",
            ModByZero => "MOD_BY_ZERO",
            SigDer => "SIG_DER",
            SigHashType => "SIG_HASHTYPE",
            SigHighS => "SIG_HIGH_S",
            NullFail => "NULLFAIL",
            SigNullDummy => "SIG_NULLDUMMY",
            SigPushOnly => "SIG_PUSHONLY",
            MinimalData => "MINIMALDATA",
            PubkeyType => "PUBKEYTYPE",
            CleanStack => "CLEANSTACK",
            DiscourageUpgradableNops => "DISCOURAGE_UPGRADABLE_NOPS",
            UnknownError => "UNKNOWN_ERROR",
        }
    }
}
