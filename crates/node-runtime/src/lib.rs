//! # Ledger Node Runtime
//!
//! Process wiring for the ledger node: configuration, storage backend,
//! block server and the timer-driven chain sync loop.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (TOML file, then environment)
//! 2. Open the chain store
//! 3. Start the block server
//! 4. Start the sync coordinator loop
//! 5. Wait for Ctrl+C, then cancel and join both tasks

pub mod config;
pub mod runtime;
pub mod storage;

pub use config::{ConfigError, NodeConfig};
pub use runtime::NodeRuntime;
