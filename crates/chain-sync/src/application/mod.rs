//! # Application Module
//!
//! Sync workflows built on the domain and outbound ports.

pub mod apply;
pub mod coordinator;
pub mod monitor;
pub mod peers;
pub mod resolver;
pub mod updater;

pub use apply::{apply_block, retire_horizon, SyncDependencies};
pub use coordinator::SyncCoordinator;
pub use monitor::{DesyncMonitor, DesyncReport};
pub use peers::best_peer;
pub use resolver::{ForkResolver, ResolutionReport};
pub use updater::{ChainUpdater, UpdaterState};
