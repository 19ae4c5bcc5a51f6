//! Relay standardness policy.
//!
//! Policy failures carry no ban score: a non-standard transaction is merely
//! declined, since a block containing it may still be perfectly valid.

use bch_chain::transaction::Transaction;
use bch_chain::transparent::Input;
use bch_script::standard::{self, ScriptKind};

use crate::error::TransactionError;
use crate::parameters::{DUST_THRESHOLD, MAX_STANDARD_TX_SIZE, MAX_STANDARD_UNLOCK_SIZE};

/// Check a transaction against the relay standardness rules.
pub fn check_standard(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.version == 0 || tx.version > 2 {
        return Err(TransactionError::NonStandardVersion);
    }
    if tx.serialized_size() > MAX_STANDARD_TX_SIZE {
        return Err(TransactionError::NonStandardSize);
    }

    for input in &tx.inputs {
        let unlock = match input {
            Input::PrevOut { unlock_script, .. } => unlock_script,
            Input::Coinbase { .. } => continue,
        };
        if unlock.0.len() > MAX_STANDARD_UNLOCK_SIZE {
            return Err(TransactionError::UnlockScriptSize);
        }
        if !standard::is_push_only(&unlock.0) {
            return Err(TransactionError::UnlockScriptNotPushOnly);
        }
    }

    let mut data_outputs = 0;
    for output in &tx.outputs {
        match standard::classify(&output.lock_script.0) {
            ScriptKind::NonStandard => return Err(TransactionError::NonStandardOutput),
            ScriptKind::NullData => data_outputs += 1,
            _ => {
                if output.value.value() < DUST_THRESHOLD {
                    return Err(TransactionError::Dust);
                }
            }
        }
    }
    if data_outputs > 1 {
        return Err(TransactionError::MultiOpReturn);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use bch_chain::amount::Amount;
    use bch_chain::transaction::{Hash as TxHash, LockTime};
    use bch_chain::transparent::{OutPoint, Output, Script, SEQUENCE_FINAL};
    use bch_script::opcode::{OP_NOP, OP_RETURN};

    use super::*;

    fn standard_tx() -> Transaction {
        let mut lock = vec![0x76, 0xa9, 0x14];
        lock.extend_from_slice(&[0u8; 20]);
        lock.extend_from_slice(&[0x88, 0xac]);
        Transaction::new(
            1,
            vec![Input::PrevOut {
                outpoint: OutPoint {
                    hash: TxHash([1; 32]),
                    index: 0,
                },
                unlock_script: Script(vec![0x01, 0xab]),
                sequence: SEQUENCE_FINAL,
            }],
            vec![Output {
                value: Amount::try_from(10_000i64).unwrap(),
                lock_script: Script(lock),
            }],
            LockTime::unlocked(),
        )
    }

    #[test]
    fn accepts_a_plain_p2pkh_spend() {
        bch_test::init();
        assert!(check_standard(&standard_tx()).is_ok());
    }

    #[test]
    fn rejects_nonstandard_pieces() {
        bch_test::init();

        let mut bad_version = standard_tx();
        bad_version.version = 3;
        assert_eq!(
            check_standard(&bad_version),
            Err(TransactionError::NonStandardVersion)
        );

        let mut non_push = standard_tx();
        non_push.inputs[0] = Input::PrevOut {
            outpoint: OutPoint {
                hash: TxHash([1; 32]),
                index: 0,
            },
            unlock_script: Script(vec![OP_NOP]),
            sequence: SEQUENCE_FINAL,
        };
        assert_eq!(
            check_standard(&non_push),
            Err(TransactionError::UnlockScriptNotPushOnly)
        );

        let mut weird_output = standard_tx();
        weird_output.outputs[0].lock_script = Script(vec![OP_NOP]);
        assert_eq!(
            check_standard(&weird_output),
            Err(TransactionError::NonStandardOutput)
        );

        let mut dust = standard_tx();
        dust.outputs[0].value = Amount::try_from(1i64).unwrap();
        assert_eq!(check_standard(&dust), Err(TransactionError::Dust));

        let mut two_data = standard_tx();
        two_data.outputs.push(Output {
            value: Amount::try_from(0i64).unwrap(),
            lock_script: Script(vec![OP_RETURN]),
        });
        two_data.outputs.push(Output {
            value: Amount::try_from(0i64).unwrap(),
            lock_script: Script(vec![OP_RETURN]),
        });
        assert_eq!(
            check_standard(&two_data),
            Err(TransactionError::MultiOpReturn)
        );
    }
}
