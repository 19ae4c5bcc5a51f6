//! The hookable "verify many inputs" seam.
//!
//! Block connection produces one [`InputCheck`] job per non-coinbase input.
//! The chain hands the whole batch to a [`ScriptVerifier`]; the default
//! verifier runs them in order, and an external worker pool may run them in
//! parallel instead. Each job is independent, the first failure decides the
//! block's verdict, and any parallel implementation must surface the same
//! error taxonomy.

use std::sync::Arc;

use bch_chain::transaction::Transaction;
use bch_chain::transparent::Input;
use bch_script::{verify_script, TransactionSignatureChecker, VerifyFlags};

use crate::coins::UtxoEntry;
use crate::error::TransactionError;

/// One independent script verification job.
#[derive(Clone)]
pub struct InputCheck {
    /// The transaction being verified.
    pub tx: Arc<Transaction>,
    /// The input index within `tx`.
    pub index: usize,
    /// The UTXO the input spends.
    pub coin: UtxoEntry,
    /// The script rules in force for the containing block.
    pub flags: VerifyFlags,
}

/// Verify a single input job.
pub fn verify_input(check: &InputCheck) -> Result<(), TransactionError> {
    let unlock_script = match &check.tx.inputs[check.index] {
        Input::PrevOut { unlock_script, .. } => unlock_script,
        // Coinbase inputs carry data, not scripts.
        Input::Coinbase { .. } => return Ok(()),
    };

    let mut checker =
        TransactionSignatureChecker::new(&check.tx, check.index, check.coin.output.value);
    verify_script(
        unlock_script,
        &check.coin.output.lock_script,
        check.flags,
        &mut checker,
    )
    .map_err(|error| TransactionError::Script {
        index: check.index as u32,
        error,
    })
}

/// A batch input verifier.
///
/// Implementations may parallelise freely: jobs are a pure map, no job's
/// outcome depends on another's. Cancellation is cooperative; once one job
/// fails the rest may be abandoned.
pub trait ScriptVerifier: Send + Sync {
    fn verify_inputs(&self, checks: &[InputCheck]) -> Result<(), TransactionError>;
}

/// The default verifier: run every job on the calling thread, stopping at
/// the first failure.
pub struct SequentialVerifier;

impl ScriptVerifier for SequentialVerifier {
    fn verify_inputs(&self, checks: &[InputCheck]) -> Result<(), TransactionError> {
        tracing::trace!(inputs = checks.len(), "verifying input batch");
        for check in checks {
            verify_input(check)?;
        }
        Ok(())
    }
}
