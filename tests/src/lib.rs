//! # Ledger Node Test Suite
//!
//! End-to-end scenarios for the sync engine, run against in-memory stores,
//! simulated peers and real TCP connections.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── catch_up.rs        # Plain catch-up, first load, single flight
//!     ├── forks.rs           # Fork resolution and its atomicity
//!     ├── ledger.rs          # Rollback ledger properties
//!     └── tcp_sync.rs        # Two nodes over the wire protocol
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p sync-tests
//!
//! # By scenario
//! cargo test -p sync-tests integration::forks::
//!
//! # Benchmarks
//! cargo bench -p sync-tests
//! ```

pub mod integration;
