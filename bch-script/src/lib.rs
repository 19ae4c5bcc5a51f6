//! The script execution engine.
//!
//! Scripts are stack machines over byte strings. An input's unlock script
//! runs first, then the referenced output's lock script over the resulting
//! stack; the input is valid when the final stack top is truthy (plus the
//! pay-to-script-hash and clean-stack rules selected by the verification
//! flags).
//!
//! The engine implements the cash opcode set: the re-enabled splice and
//! bitwise operations, `OP_DIV`/`OP_MOD`, `OP_NUM2BIN`/`OP_BIN2NUM`, and the
//! `OP_CHECKDATASIG` pair, together with FORKID signature hashing.

pub mod error;
pub mod flags;
pub mod interpreter;
pub mod num;
pub mod opcode;
pub mod sighash;
pub mod signature;
pub mod standard;

pub use error::ScriptError;
pub use flags::VerifyFlags;
pub use interpreter::{
    verify_script, NullSignatureChecker, SignatureChecker, TransactionSignatureChecker,
};
pub use num::ScriptNum;
pub use sighash::{SigHashCache, SigHashType};
