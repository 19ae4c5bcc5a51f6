//! The consensus rejection taxonomy.
//!
//! Every failure carries a short stable reason tag (matching the classic
//! node vocabulary, so peers and logs agree on names) and a 0-100 ban score
//! expressing how strongly the failure implies a misbehaving peer.

use thiserror::Error;

use bch_chain::transparent::OutPoint;
use bch_script::ScriptError;

/// A transaction failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("transaction has no inputs")]
    NoInputs,
    #[error("transaction has no outputs")]
    NoOutputs,
    #[error("transaction is larger than the maximum size")]
    Oversize,
    #[error("total output value out of range")]
    OutputTotalTooLarge,
    #[error("transaction spends the same outpoint twice")]
    DuplicateInputs,
    #[error("coinbase data size out of range")]
    CoinbaseLength,
    #[error("non-coinbase transaction has a null prevout")]
    NullPrevOut,
    #[error("input {0:?} is missing or already spent")]
    MissingOrSpentInput(OutPoint),
    #[error("coinbase output spent before maturity")]
    PrematureCoinbaseSpend,
    #[error("total input value out of range")]
    InputValuesOutOfRange,
    #[error("inputs are worth less than outputs")]
    InBelowOut,
    #[error("fee out of range")]
    FeeOutOfRange,
    #[error("transaction is not final")]
    NonFinal,
    #[error("input {index} failed script verification: {error}")]
    Script { index: u32, error: ScriptError },
    #[error("transaction has too many sigops")]
    TooManySigops,

    // Standardness policy.
    #[error("transaction version is non-standard")]
    NonStandardVersion,
    #[error("transaction is larger than the standard size limit")]
    NonStandardSize,
    #[error("unlock script is too large")]
    UnlockScriptSize,
    #[error("unlock script is not push-only")]
    UnlockScriptNotPushOnly,
    #[error("output script is non-standard")]
    NonStandardOutput,
    #[error("output is dust")]
    Dust,
    #[error("more than one data carrier output")]
    MultiOpReturn,
}

impl TransactionError {
    /// The stable rejection reason tag.
    pub fn reason(&self) -> &'static str {
        use TransactionError::*;
        match self {
            NoInputs => "bad-txns-vin-empty",
            NoOutputs => "bad-txns-vout-empty",
            Oversize => "bad-txns-oversize",
            OutputTotalTooLarge => "bad-txns-txouttotal-toolarge",
            DuplicateInputs => "bad-txns-inputs-duplicate",
            CoinbaseLength => "bad-cb-length",
            NullPrevOut => "bad-txns-prevout-null",
            MissingOrSpentInput(_) => "bad-txns-inputs-missingorspent",
            PrematureCoinbaseSpend => "bad-txns-premature-spend-of-coinbase",
            InputValuesOutOfRange => "bad-txns-inputvalues-outofrange",
            InBelowOut => "bad-txns-in-belowout",
            FeeOutOfRange => "bad-txns-fee-outofrange",
            NonFinal => "bad-txns-nonfinal",
            Script { .. } => "mandatory-script-verify-flag-failed",
            TooManySigops => "bad-txns-too-many-sigops",
            NonStandardVersion => "version",
            NonStandardSize => "tx-size",
            UnlockScriptSize => "scriptsig-size",
            UnlockScriptNotPushOnly => "scriptsig-not-pushonly",
            NonStandardOutput => "scriptpubkey",
            Dust => "dust",
            MultiOpReturn => "multi-op-return",
        }
    }

    /// The peer-banning weight of this failure.
    pub fn ban_score(&self) -> u32 {
        use TransactionError::*;
        match self {
            // Contextual misses can be honest races, not malice.
            MissingOrSpentInput(_) | PrematureCoinbaseSpend => 0,
            NullPrevOut | NonFinal => 10,
            // Policy failures never ban.
            NonStandardVersion | NonStandardSize | UnlockScriptSize
            | UnlockScriptNotPushOnly | NonStandardOutput | Dust | MultiOpReturn => 0,
            _ => 100,
        }
    }
}

/// A block failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("block has no transactions")]
    NoTransactions,
    #[error("block is larger than the maximum size")]
    Oversize,
    #[error("block has more transactions than its size allows")]
    TooManyTransactions,
    #[error("first transaction is not a coinbase")]
    CoinbaseMissing,
    #[error("block has a coinbase input past the first transaction")]
    MultipleCoinbase,
    #[error("merkle root does not commit to the transaction list")]
    BadMerkleRoot,
    #[error("block contains duplicate transactions")]
    DuplicateTransaction,
    #[error("block has too many sigops")]
    TooManySigops,
    #[error("transactions are not in canonical order")]
    NotCanonicallyOrdered,
    #[error("header hash does not meet its target")]
    InvalidPow,
    #[error("header bits do not match the expected target")]
    BadDiffBits,
    #[error("block time is not after the median time past")]
    TimeTooOld,
    #[error("block time is too far in the future")]
    TimeTooNew,
    #[error("coinbase does not push the block height")]
    BadCoinbaseHeight,
    #[error("coinbase claims more than subsidy plus fees")]
    BadCoinbaseAmount,
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

impl BlockError {
    /// The stable rejection reason tag.
    pub fn reason(&self) -> &'static str {
        use BlockError::*;
        match self {
            NoTransactions | Oversize | TooManyTransactions => "bad-blk-length",
            CoinbaseMissing => "bad-cb-missing",
            MultipleCoinbase => "bad-cb-multiple",
            BadMerkleRoot => "bad-txnmrklroot",
            DuplicateTransaction => "bad-txns-duplicate",
            TooManySigops => "bad-blk-sigops",
            NotCanonicallyOrdered => "tx-ordering",
            InvalidPow => "high-hash",
            BadDiffBits => "bad-diffbits",
            TimeTooOld => "time-too-old",
            TimeTooNew => "time-too-new",
            BadCoinbaseHeight => "bad-cb-height",
            BadCoinbaseAmount => "bad-cb-amount",
            Transaction(e) => e.reason(),
        }
    }

    /// The peer-banning weight of this failure.
    pub fn ban_score(&self) -> u32 {
        use BlockError::*;
        match self {
            TimeTooOld | TimeTooNew => 0,
            InvalidPow => 50,
            Transaction(e) => e.ban_score(),
            _ => 100,
        }
    }
}

/// The top-level verification failure surfaced by the chain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    /// An implementation-imposed verification time budget was exceeded.
    #[error("verification exceeded its time budget")]
    Timeout,
}

impl VerifyError {
    pub fn reason(&self) -> &'static str {
        match self {
            VerifyError::Block(e) => e.reason(),
            VerifyError::Transaction(e) => e.reason(),
            VerifyError::Timeout => "verify-timeout",
        }
    }

    pub fn ban_score(&self) -> u32 {
        match self {
            VerifyError::Block(e) => e.ban_score(),
            VerifyError::Transaction(e) => e.ban_score(),
            VerifyError::Timeout => 0,
        }
    }
}
