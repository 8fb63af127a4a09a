//! Cross-component sync scenarios.

pub mod catch_up;
pub mod forks;
pub mod ledger;
pub mod tcp_sync;
