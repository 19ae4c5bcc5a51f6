//! End-to-end interpreter tests: cash opcodes, data signatures, and real
//! transaction spends.

use std::convert::TryFrom;

use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

use bch_chain::amount::{Amount, NonNegative};
use bch_chain::parameters::Network;
use bch_chain::transaction::{Hash as TxHash, LockTime, Transaction};
use bch_chain::transparent::{
    Input, OutPoint, Output, Script, ToAddressWithNetwork, SEQUENCE_FINAL,
};

use bch_script::interpreter::{eval_script, verify_script, Stack};
use bch_script::opcode::*;
use bch_script::sighash::{SigHashCache, SigHashType};
use bch_script::standard;
use bch_script::{
    NullSignatureChecker, ScriptError, TransactionSignatureChecker, VerifyFlags,
};

fn run(script: &[u8], flags: VerifyFlags) -> Result<Stack, ScriptError> {
    let mut stack = Vec::new();
    eval_script(&mut stack, script, flags, &mut NullSignatureChecker)?;
    Ok(stack)
}

fn script(build: impl FnOnce(&mut Vec<u8>)) -> Vec<u8> {
    let mut out = Vec::new();
    build(&mut out);
    out
}

fn one_key() -> (SecretKey, PublicKey) {
    let secp = Secp256k1::new();
    let mut sk_bytes = [0u8; 32];
    sk_bytes[31] = 1;
    let sk = SecretKey::from_slice(&sk_bytes).unwrap();
    let pk = PublicKey::from_secret_key(&secp, &sk);
    (sk, pk)
}

fn sign_digest(digest: [u8; 32], sk: &SecretKey) -> Vec<u8> {
    let secp = Secp256k1::new();
    secp.sign_ecdsa(&Message::from_digest(digest), sk)
        .serialize_der()
        .to_vec()
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

mod cash_opcodes {
    use super::*;

    #[test]
    fn cat_concatenates_within_element_limit() {
        bch_test::init();

        let ok = script(|s| {
            standard::push_data(s, b"abc");
            standard::push_data(s, b"def");
            s.push(OP_CAT);
        });
        let stack = run(&ok, VerifyFlags::NONE).unwrap();
        assert_eq!(stack, vec![b"abcdef".to_vec()]);

        let too_big = script(|s| {
            standard::push_data(s, &[0xaa; 520]);
            standard::push_data(s, &[0xbb; 1]);
            s.push(OP_CAT);
        });
        assert_eq!(run(&too_big, VerifyFlags::NONE).unwrap_err().code(), "PUSH_SIZE");

        let underflow = script(|s| {
            standard::push_data(s, b"abc");
            s.push(OP_CAT);
        });
        assert_eq!(
            run(&underflow, VerifyFlags::NONE).unwrap_err().code(),
            "INVALID_STACK_OPERATION"
        );
    }

    #[test]
    fn split_partitions_and_rejects_out_of_range() {
        bch_test::init();

        let ok = script(|s| {
            standard::push_data(s, b"abcdef");
            standard::push_number(s, 2);
            s.push(OP_SPLIT);
        });
        let stack = run(&ok, VerifyFlags::NONE).unwrap();
        assert_eq!(stack, vec![b"ab".to_vec(), b"cdef".to_vec()]);

        // Splitting at the very end leaves an empty right side.
        let at_end = script(|s| {
            standard::push_data(s, b"ab");
            standard::push_number(s, 2);
            s.push(OP_SPLIT);
        });
        let stack = run(&at_end, VerifyFlags::NONE).unwrap();
        assert_eq!(stack, vec![b"ab".to_vec(), vec![]]);

        let out_of_range = script(|s| {
            standard::push_data(s, b"ab");
            standard::push_number(s, 3);
            s.push(OP_SPLIT);
        });
        assert_eq!(
            run(&out_of_range, VerifyFlags::NONE).unwrap_err(),
            ScriptError::InvalidSplitRange
        );
    }

    #[test]
    fn bitwise_ops_require_equal_lengths() {
        bch_test::init();

        let ok = script(|s| {
            standard::push_data(s, &[0b1100, 0xff]);
            standard::push_data(s, &[0b1010, 0x0f]);
            s.push(OP_AND);
        });
        assert_eq!(run(&ok, VerifyFlags::NONE).unwrap(), vec![vec![0b1000, 0x0f]]);

        let xor = script(|s| {
            standard::push_data(s, &[0b1100]);
            standard::push_data(s, &[0b1010]);
            s.push(OP_XOR);
        });
        assert_eq!(run(&xor, VerifyFlags::NONE).unwrap(), vec![vec![0b0110]]);

        let mismatch = script(|s| {
            standard::push_data(s, &[0xff, 0xff]);
            standard::push_data(s, &[0x0f]);
            s.push(OP_OR);
        });
        assert_eq!(
            run(&mismatch, VerifyFlags::NONE).unwrap_err(),
            ScriptError::InvalidOperandSize
        );
    }

    #[test]
    fn div_and_mod_truncate_toward_zero() {
        bch_test::init();

        let cases: Vec<(i64, i64, i64, i64)> = vec![
            (7, 3, 2, 1),
            (-7, 3, -2, -1),
            (7, -3, -2, 1),
            (-7, -3, 2, -1),
        ];
        for (a, b, quotient, remainder) in cases {
            let div = script(|s| {
                standard::push_number(s, a);
                standard::push_number(s, b);
                s.push(OP_DIV);
            });
            let stack = run(&div, VerifyFlags::NONE).unwrap();
            assert_eq!(
                stack,
                vec![bch_script::ScriptNum(quotient).encode()],
                "{} / {}",
                a,
                b
            );

            let modulo = script(|s| {
                standard::push_number(s, a);
                standard::push_number(s, b);
                s.push(OP_MOD);
            });
            let stack = run(&modulo, VerifyFlags::NONE).unwrap();
            assert_eq!(
                stack,
                vec![bch_script::ScriptNum(remainder).encode()],
                "{} % {}",
                a,
                b
            );
        }

        let div_zero = script(|s| {
            standard::push_number(s, 7);
            standard::push_number(s, 0);
            s.push(OP_DIV);
        });
        assert_eq!(run(&div_zero, VerifyFlags::NONE).unwrap_err().code(), "DIV_BY_ZERO");

        let mod_zero = script(|s| {
            standard::push_number(s, 7);
            standard::push_number(s, 0);
            s.push(OP_MOD);
        });
        assert_eq!(run(&mod_zero, VerifyFlags::NONE).unwrap_err().code(), "MOD_BY_ZERO");
    }

    #[test]
    fn num2bin_and_bin2num() {
        bch_test::init();

        // 256 in 4 bytes.
        let widen = script(|s| {
            standard::push_number(s, 256);
            standard::push_number(s, 4);
            s.push(OP_NUM2BIN);
        });
        assert_eq!(
            run(&widen, VerifyFlags::NONE).unwrap(),
            vec![vec![0x00, 0x01, 0x00, 0x00]]
        );

        // -1 in 2 bytes keeps the sign in the top byte.
        let negative = script(|s| {
            standard::push_number(s, -1);
            standard::push_number(s, 2);
            s.push(OP_NUM2BIN);
        });
        assert_eq!(run(&negative, VerifyFlags::NONE).unwrap(), vec![vec![0x01, 0x80]]);

        // A number that cannot fit.
        let impossible = script(|s| {
            standard::push_number(s, 256);
            standard::push_number(s, 1);
            s.push(OP_NUM2BIN);
        });
        assert_eq!(
            run(&impossible, VerifyFlags::NONE).unwrap_err().code(),
            "IMPOSSIBLE_ENCODING"
        );

        // Oversize target length.
        let oversize = script(|s| {
            standard::push_number(s, 1);
            standard::push_number(s, 521);
            s.push(OP_NUM2BIN);
        });
        assert_eq!(run(&oversize, VerifyFlags::NONE).unwrap_err().code(), "PUSH_SIZE");

        // BIN2NUM reduces padded forms.
        let reduce = script(|s| {
            standard::push_data(s, &[0x01, 0x00, 0x00, 0x00]);
            s.push(OP_BIN2NUM);
        });
        assert_eq!(run(&reduce, VerifyFlags::NONE).unwrap(), vec![vec![0x01]]);

        // Values outside the 4-byte range are rejected.
        let out_of_range = script(|s| {
            standard::push_data(s, &[0xff, 0xff, 0xff, 0xff, 0x7f]);
            s.push(OP_BIN2NUM);
        });
        assert_eq!(
            run(&out_of_range, VerifyFlags::NONE).unwrap_err().code(),
            "INVALID_NUMBER_RANGE"
        );

        // num2bin round-trips through bin2num.
        let roundtrip = script(|s| {
            standard::push_number(s, 0x1234);
            standard::push_number(s, 4);
            s.push(OP_NUM2BIN);
            s.push(OP_BIN2NUM);
        });
        assert_eq!(
            run(&roundtrip, VerifyFlags::NONE).unwrap(),
            vec![bch_script::ScriptNum(0x1234).encode()]
        );
    }

    #[test]
    fn disabled_opcodes_poison_unexecuted_branches() {
        bch_test::init();

        let poisoned = script(|s| {
            standard::push_number(s, 0);
            s.push(OP_IF);
            s.push(OP_MUL);
            s.push(OP_ENDIF);
            standard::push_number(s, 1);
        });
        assert_eq!(
            run(&poisoned, VerifyFlags::NONE).unwrap_err(),
            ScriptError::DisabledOpcode
        );
    }
}

mod check_data_sig {
    use super::*;

    fn flags() -> VerifyFlags {
        VerifyFlags::CHECKDATASIG | VerifyFlags::STRICTENC | VerifyFlags::NULLFAIL
    }

    #[test]
    fn verifies_signature_over_empty_message() {
        bch_test::init();

        let (sk, pk) = one_key();
        let sig = sign_digest(sha256(b""), &sk);

        let checkdatasig = script(|s| {
            standard::push_data(s, &sig);
            standard::push_data(s, b"");
            standard::push_data(s, &pk.serialize());
            s.push(OP_CHECKDATASIG);
        });
        assert_eq!(run(&checkdatasig, flags()).unwrap(), vec![vec![0x01]]);

        let verify = script(|s| {
            standard::push_data(s, &sig);
            standard::push_data(s, b"");
            standard::push_data(s, &pk.serialize());
            s.push(OP_CHECKDATASIGVERIFY);
        });
        assert_eq!(run(&verify, flags()).unwrap(), Vec::<Vec<u8>>::new());
    }

    #[test]
    fn message_is_hashed_once() {
        bch_test::init();

        // A signature over sha256d would not verify.
        let (sk, pk) = one_key();
        let sig = sign_digest(sha256(&sha256(b"")), &sk);
        let wrong = script(|s| {
            standard::push_data(s, &sig);
            standard::push_data(s, b"");
            standard::push_data(s, &pk.serialize());
            s.push(OP_CHECKDATASIG);
        });
        // NULLFAIL turns the false result into an error.
        assert_eq!(run(&wrong, flags()).unwrap_err(), ScriptError::NullFail);
        assert_eq!(
            run(&wrong, VerifyFlags::CHECKDATASIG).unwrap(),
            vec![Vec::<u8>::new()]
        );
    }

    #[test]
    fn hybrid_pubkey_rejected_under_strictenc() {
        bch_test::init();

        let (sk, pk) = one_key();
        let sig = sign_digest(sha256(b""), &sk);
        let mut hybrid = pk.serialize_uncompressed();
        hybrid[0] = 0x06 | (hybrid[64] & 1);

        for op in &[OP_CHECKDATASIG, OP_CHECKDATASIGVERIFY] {
            let bad = script(|s| {
                standard::push_data(s, &sig);
                standard::push_data(s, b"");
                standard::push_data(s, &hybrid);
                s.push(*op);
            });
            assert_eq!(run(&bad, flags()).unwrap_err().code(), "PUBKEYTYPE");
        }
    }

    #[test]
    fn high_s_rejected_when_low_s_required() {
        bch_test::init();

        let (sk, pk) = one_key();
        let sig = sign_digest(sha256(b""), &sk);

        // s' = order - s.
        let compact = secp256k1::ecdsa::Signature::from_der(&sig)
            .unwrap()
            .serialize_compact();
        let order = secp256k1::constants::CURVE_ORDER;
        let mut high = [0u8; 64];
        high[..32].copy_from_slice(&compact[..32]);
        let mut borrow = 0i16;
        for i in (0..32).rev() {
            let mut diff = i16::from(order[i]) - i16::from(compact[32 + i]) - borrow;
            if diff < 0 {
                diff += 256;
                borrow = 1;
            } else {
                borrow = 0;
            }
            high[32 + i] = diff as u8;
        }
        let high_sig = secp256k1::ecdsa::Signature::from_compact(&high)
            .unwrap()
            .serialize_der()
            .to_vec();

        for op in &[OP_CHECKDATASIG, OP_CHECKDATASIGVERIFY] {
            let bad = script(|s| {
                standard::push_data(s, &high_sig);
                standard::push_data(s, b"");
                standard::push_data(s, &pk.serialize());
                s.push(*op);
            });
            assert_eq!(
                run(&bad, flags() | VerifyFlags::LOW_S).unwrap_err().code(),
                "SIG_HIGH_S"
            );
        }
    }

    #[test]
    fn opcode_is_invalid_before_activation() {
        bch_test::init();

        let (sk, pk) = one_key();
        let sig = sign_digest(sha256(b""), &sk);
        let s = script(|s| {
            standard::push_data(s, &sig);
            standard::push_data(s, b"");
            standard::push_data(s, &pk.serialize());
            s.push(OP_CHECKDATASIG);
        });
        assert_eq!(
            run(&s, VerifyFlags::NONE).unwrap_err(),
            ScriptError::BadOpcode
        );
    }
}

mod transaction_spends {
    use super::*;

    fn forkid_flags() -> VerifyFlags {
        VerifyFlags::P2SH
            | VerifyFlags::STRICTENC
            | VerifyFlags::SIGHASH_FORKID
            | VerifyFlags::NULLFAIL
            | VerifyFlags::LOW_S
            | VerifyFlags::DERSIG
    }

    /// Build a transaction spending `value` from `lock_script`, signed with
    /// `sk` over the FORKID sighash.
    fn signed_spend(
        lock_script: &Script,
        value: Amount<NonNegative>,
        sk: &SecretKey,
        pk: &PublicKey,
    ) -> Transaction {
        let mut spend = Transaction::new(
            1,
            vec![Input::PrevOut {
                outpoint: OutPoint {
                    hash: TxHash([0x77; 32]),
                    index: 0,
                },
                unlock_script: Script(vec![]),
                sequence: SEQUENCE_FINAL,
            }],
            vec![Output {
                value: Amount::try_from(value.value() - 1_000).unwrap(),
                lock_script: lock_script.clone(),
            }],
            LockTime::unlocked(),
        );

        let hash_type = SigHashType(SigHashType::ALL | SigHashType::FORKID);
        let digest = SigHashCache::new(&spend).signature_hash(
            0,
            &lock_script.0,
            value,
            hash_type,
            forkid_flags(),
        );
        let mut sig = sign_digest(digest, sk);
        sig.push(0x41);

        let unlock = script(|s| {
            standard::push_data(s, &sig);
            standard::push_data(s, &pk.serialize());
        });
        spend.inputs[0] = Input::PrevOut {
            outpoint: OutPoint {
                hash: TxHash([0x77; 32]),
                index: 0,
            },
            unlock_script: Script(unlock),
            sequence: SEQUENCE_FINAL,
        };
        spend
    }

    #[test]
    fn p2pkh_spend_verifies() {
        bch_test::init();

        let (sk, pk) = one_key();
        let address = pk.to_address(Network::Regtest);
        let lock_script = address.lock_script();
        let value = Amount::try_from(100_000i64).unwrap();

        let spend = signed_spend(&lock_script, value, &sk, &pk);
        let unlock = match &spend.inputs[0] {
            Input::PrevOut { unlock_script, .. } => unlock_script.clone(),
            _ => unreachable!(),
        };

        let mut checker = TransactionSignatureChecker::new(&spend, 0, value);
        verify_script(&unlock, &lock_script, forkid_flags(), &mut checker).unwrap();

        // The same spend against a different value fails: FORKID binds the
        // spent amount.
        let wrong_value = Amount::try_from(100_001i64).unwrap();
        let mut checker = TransactionSignatureChecker::new(&spend, 0, wrong_value);
        assert_eq!(
            verify_script(&unlock, &lock_script, forkid_flags(), &mut checker).unwrap_err(),
            ScriptError::NullFail
        );
    }

    #[test]
    fn p2sh_spend_runs_the_redeem_script() {
        bch_test::init();

        use bch_chain::transparent::ToAddressWithNetwork;

        // Redeem script: OP_1 (anyone can spend).
        let redeem = Script(vec![OP_1]);
        let address = redeem.to_address(Network::Regtest);
        let lock_script = address.lock_script();

        let unlock = Script(script(|s| standard::push_data(s, &redeem.0)));
        verify_script(
            &unlock,
            &lock_script,
            VerifyFlags::P2SH | VerifyFlags::CLEANSTACK,
            &mut NullSignatureChecker,
        )
        .unwrap();

        // A wrong redeem script fails the template hash.
        let bad_unlock = Script(script(|s| standard::push_data(s, &[OP_1, OP_1])));
        assert_eq!(
            verify_script(
                &bad_unlock,
                &lock_script,
                VerifyFlags::P2SH,
                &mut NullSignatureChecker,
            )
            .unwrap_err(),
            ScriptError::EvalFalse
        );

        // Non-push-only unlock scripts are rejected for P2SH, even when the
        // template hash matches.
        let non_push = Script(script(|s| {
            standard::push_data(s, &redeem.0);
            s.push(OP_DUP);
        }));
        assert_eq!(
            verify_script(
                &non_push,
                &lock_script,
                VerifyFlags::P2SH,
                &mut NullSignatureChecker,
            )
            .unwrap_err(),
            ScriptError::SigPushOnly
        );
    }

    #[test]
    fn cleanstack_catches_leftovers() {
        bch_test::init();

        let unlock = Script(script(|s| {
            standard::push_number(s, 1);
            standard::push_number(s, 1);
        }));
        let lock = Script(vec![OP_NOP]);
        assert_eq!(
            verify_script(
                &unlock,
                &lock,
                VerifyFlags::P2SH | VerifyFlags::CLEANSTACK,
                &mut NullSignatureChecker,
            )
            .unwrap_err(),
            ScriptError::CleanStack
        );
    }

    #[test]
    fn op_count_limit_enforced() {
        bch_test::init();

        let mut s = vec![OP_1];
        for _ in 0..202 {
            s.push(OP_DUP);
            s.push(OP_DROP);
        }
        assert_eq!(run(&s, VerifyFlags::NONE).unwrap_err(), ScriptError::OpCount);
    }

    #[test]
    fn unbalanced_conditionals_rejected() {
        bch_test::init();

        let s = script(|b| {
            standard::push_number(b, 1);
            b.push(OP_IF);
        });
        assert_eq!(
            run(&s, VerifyFlags::NONE).unwrap_err(),
            ScriptError::UnbalancedConditional
        );

        assert_eq!(
            run(&[OP_ELSE], VerifyFlags::NONE).unwrap_err(),
            ScriptError::UnbalancedConditional
        );
    }
}
