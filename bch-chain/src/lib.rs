//! Consensus-critical data structures for a Bitcoin Cash style chain.
//!
//! This crate defines the byte-exact wire format (transactions, blocks,
//! headers, the `CompactInt` varint), the address encodings (Base58Check and
//! cashaddr), network parameters and upgrade schedules, and the compact
//! target / chain work arithmetic. Everything downstream of the codec --
//! script execution, consensus checks, chain state -- builds on these types.
#![allow(clippy::unit_arg)]

pub mod amount;
pub mod block;
pub mod cached;
pub mod compactint;
pub mod parameters;
pub mod serialization;
pub mod transaction;
pub mod transparent;
pub mod work;

pub use cached::Cached;
pub use compactint::CompactInt;
pub use serialization::{CashDeserialize, CashDeserializeInto, CashSerialize, SerializationError};
