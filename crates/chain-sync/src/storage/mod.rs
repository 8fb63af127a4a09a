//! # Storage Layer
//!
//! Transactions, key layout and block persistence over a [`crate::ports::KeyValueStore`].

pub mod chain;
pub mod keys;
pub mod transaction;

pub use transaction::StoreTransaction;
