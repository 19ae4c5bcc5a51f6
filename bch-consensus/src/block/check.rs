//! Consensus check functions for whole blocks.

use std::cmp::Ordering;
use std::collections::HashSet;

use bch_chain::block::{merkle, Block, Header, Height, MAX_FORK_BLOCK_SIZE};
use bch_chain::transparent::Input;
use bch_script::standard;

use crate::error::BlockError;
use crate::parameters::max_block_sigops;
use crate::transaction::check_sanity;

/// Context-free block checks: structure, merkle commitment, size and legacy
/// sigop caps, and the sanity of every transaction.
///
/// Contextual rules (difficulty, timestamps, input resolution, ordering)
/// live with the chain state, which owns the required context.
pub fn check_block(block: &Block) -> Result<(), BlockError> {
    let first = block.transactions.get(0).ok_or(BlockError::NoTransactions)?;

    let size = block.serialized_size();
    if size as u64 > MAX_FORK_BLOCK_SIZE {
        return Err(BlockError::Oversize);
    }
    if block.transactions.len() as u64 > size as u64 / 10 {
        return Err(BlockError::TooManyTransactions);
    }

    if !first.is_coinbase() {
        return Err(BlockError::CoinbaseMissing);
    }
    if block
        .transactions
        .iter()
        .skip(1)
        .any(|tx| tx.contains_coinbase_input())
    {
        return Err(BlockError::MultipleCoinbase);
    }

    for tx in &block.transactions {
        check_sanity(tx)?;
    }

    let hashes = block.transaction_hashes();
    let (root, mutated) = merkle::root_and_mutation(&hashes);
    if mutated {
        return Err(BlockError::DuplicateTransaction);
    }
    if root != block.header.merkle_root {
        return Err(BlockError::BadMerkleRoot);
    }
    // The merkle tree is malleable (CVE-2012-2459); as defense in depth,
    // also reject duplicate hashes directly.
    if hashes.len() != hashes.iter().collect::<HashSet<_>>().len() {
        return Err(BlockError::DuplicateTransaction);
    }

    // The legacy sigop count needs no UTXO context; the accurate P2SH count
    // is re-checked during connection.
    let mut sigops = 0;
    for tx in &block.transactions {
        for output in &tx.outputs {
            sigops += standard::sig_ops(&output.lock_script.0, false);
        }
        for input in &tx.inputs {
            if let Input::PrevOut { unlock_script, .. } = input {
                sigops += standard::sig_ops(&unlock_script.0, false);
            }
        }
    }
    if sigops > max_block_sigops(size) {
        return Err(BlockError::TooManySigops);
    }

    Ok(())
}

/// Proof of work: the header hash, read as a little-endian 256-bit integer,
/// must not exceed the target encoded in `bits`.
pub fn check_proof_of_work(header: &Header) -> Result<(), BlockError> {
    let target = header.bits.to_expanded().ok_or(BlockError::BadDiffBits)?;
    if !target.is_met_by(&header.hash()) {
        return Err(BlockError::InvalidPow);
    }
    Ok(())
}

/// Canonical transaction ordering: every non-coinbase transaction's id must
/// be strictly greater than its predecessor's.
pub fn check_transaction_order(block: &Block) -> Result<(), BlockError> {
    for pair in block.transactions.windows(2).skip(1) {
        if pair[0].hash().txid_cmp(&pair[1].hash()) != Ordering::Less {
            return Err(BlockError::NotCanonicallyOrdered);
        }
    }
    Ok(())
}

/// BIP 34: the coinbase must push the block's height.
pub fn check_coinbase_height(block: &Block, height: Height) -> Result<(), BlockError> {
    if block.coinbase_height() != Some(height) {
        return Err(BlockError::BadCoinbaseHeight);
    }
    Ok(())
}
