//! Block validation: structural checks and the subsidy schedule.

pub mod check;
pub mod subsidy;

pub use check::{
    check_block, check_coinbase_height, check_proof_of_work, check_transaction_order,
};
pub use subsidy::block_subsidy;
