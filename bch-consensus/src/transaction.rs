//! Transaction validation: sanity, standardness, contextual input checks,
//! sigop counting.

pub mod check;
pub mod policy;

pub use check::{check_inputs, check_sanity, transaction_sigops, InputError};
pub use policy::check_standard;
