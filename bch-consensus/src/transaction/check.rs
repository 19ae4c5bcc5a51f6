//! Context-free and contextual transaction checks.

use std::collections::HashSet;
use std::convert::TryFrom;

use thiserror::Error;

use bch_chain::amount::{Amount, NonNegative};
use bch_chain::block::Height;
use bch_chain::parameters::{
    COINBASE_MATURITY, MAX_COINBASE_SCRIPT_SIZE, MIN_COINBASE_SCRIPT_SIZE,
};
use bch_chain::transaction::{Transaction, MAX_TX_SIZE};
use bch_chain::transparent::Input;
use bch_script::{standard, VerifyFlags};

use crate::coins::{BoxError, CoinView};
use crate::error::TransactionError;

/// A contextual input check either rejects the transaction or hits a
/// storage fault; the two must not be conflated, because storage faults are
/// fatal and carry no ban score.
#[derive(Error, Debug)]
pub enum InputError {
    #[error(transparent)]
    Invalid(#[from] TransactionError),
    #[error("utxo backend error: {0}")]
    Store(#[source] BoxError),
}

/// Context-free sanity checks.
///
/// These hold for any transaction regardless of chain state; failing any of
/// them means the bytes themselves are invalid.
pub fn check_sanity(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.inputs.is_empty() {
        return Err(TransactionError::NoInputs);
    }
    if tx.outputs.is_empty() {
        return Err(TransactionError::NoOutputs);
    }
    if tx.serialized_size() as u64 > MAX_TX_SIZE {
        return Err(TransactionError::Oversize);
    }

    // Individual output values are constrained by `Amount<NonNegative>`;
    // the running total still needs a check.
    let mut total = Amount::<NonNegative>::zero();
    for output in &tx.outputs {
        total = (total + output.value).map_err(|_| TransactionError::OutputTotalTooLarge)?;
    }

    if tx.is_coinbase() {
        let data = match &tx.inputs[0] {
            Input::Coinbase { data, .. } => data.as_ref(),
            _ => unreachable!("is_coinbase checked the input variant"),
        };
        if data.len() < MIN_COINBASE_SCRIPT_SIZE || data.len() > MAX_COINBASE_SCRIPT_SIZE {
            return Err(TransactionError::CoinbaseLength);
        }
    } else {
        let mut seen = HashSet::with_capacity(tx.inputs.len());
        for input in &tx.inputs {
            match input.outpoint() {
                // A null prevout outside a coinbase is never acceptable.
                None => return Err(TransactionError::NullPrevOut),
                Some(outpoint) => {
                    if !seen.insert(outpoint) {
                        return Err(TransactionError::DuplicateInputs);
                    }
                }
            }
        }
    }

    Ok(())
}

/// Contextual input checks against a [`CoinView`], for a non-coinbase
/// transaction being connected at `spend_height`.
///
/// On success every input has been marked spent in the view, and the
/// transaction's fee is returned.
pub fn check_inputs(
    tx: &Transaction,
    view: &mut CoinView<'_>,
    spend_height: Height,
) -> Result<Amount<NonNegative>, InputError> {
    let mut total_in = Amount::<NonNegative>::zero();

    for input in &tx.inputs {
        let outpoint = input
            .outpoint()
            .ok_or(TransactionError::NullPrevOut)?;
        let entry = view
            .spend(&outpoint)
            .map_err(InputError::Store)?
            .ok_or(TransactionError::MissingOrSpentInput(outpoint))?;

        if entry.coinbase {
            let mature_height = entry.height.0.saturating_add(COINBASE_MATURITY);
            if spend_height.0 < mature_height {
                return Err(TransactionError::PrematureCoinbaseSpend.into());
            }
        }

        total_in = (total_in + entry.output.value)
            .map_err(|_| TransactionError::InputValuesOutOfRange)?;
    }

    let mut total_out = Amount::<NonNegative>::zero();
    for output in &tx.outputs {
        total_out =
            (total_out + output.value).map_err(|_| TransactionError::OutputTotalTooLarge)?;
    }

    if total_in < total_out {
        return Err(TransactionError::InBelowOut.into());
    }
    let fee = Amount::try_from(total_in.value() - total_out.value())
        .map_err(|_| TransactionError::FeeOutOfRange)?;
    Ok(fee)
}

/// Count the signature operations of a transaction: the legacy count over
/// its own scripts, plus the accurate count of P2SH redeem scripts when the
/// `P2SH` flag is active.
///
/// The P2SH count resolves prevouts through `view` without spending them.
pub fn transaction_sigops(
    tx: &Transaction,
    view: &mut CoinView<'_>,
    flags: VerifyFlags,
) -> Result<usize, InputError> {
    let mut count = 0;

    for output in &tx.outputs {
        count += standard::sig_ops(&output.lock_script.0, false);
    }
    for input in &tx.inputs {
        let unlock = match input {
            Input::PrevOut { unlock_script, .. } => unlock_script,
            Input::Coinbase { .. } => continue,
        };
        count += standard::sig_ops(&unlock.0, false);

        if flags.contains(VerifyFlags::P2SH) {
            if let Some(outpoint) = input.outpoint() {
                if let Some(entry) = view.get(&outpoint).map_err(InputError::Store)? {
                    count += standard::p2sh_sig_ops(&entry.output.lock_script.0, &unlock.0);
                }
            }
        }
    }

    Ok(count)
}
