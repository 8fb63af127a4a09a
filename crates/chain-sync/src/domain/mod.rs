//! # Domain Module
//!
//! Block model, codec and validator, rollback ledger and error taxonomy.

pub mod block;
pub mod codec;
pub mod errors;
pub mod producers;
pub mod rollback;

pub use block::*;
pub use codec::{HashCheck, MAX_BLOCK_SIZE};
pub use errors::*;
pub use producers::*;
pub use rollback::*;
