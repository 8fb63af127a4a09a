//! # Adapters
//!
//! Implementations of the outbound ports.
//!
//! | Adapter | Port |
//! |---------|------|
//! | `InMemoryKVStore` | `KeyValueStore` |
//! | `TcpPeerClient`, `MockPeerNetwork` | `PeerClient` |
//! | `BlockServer` | serves peers over TCP |
//! | `RegistryEngine` | `ExecutionEngine` |
//! | `BanList`, `NoopReputation` | `PeerReputation` |
//! | `InMemoryTransactionPool` | `TransactionPool` |
//! | `CachedSystemParameters` | `SystemParameters` |
//! | `FileBootstrap` | `BootstrapSource` |

pub mod collaborators;
pub mod memory_store;
pub mod mock_peer;
pub mod registry_engine;
pub mod reputation;
pub mod tcp_client;
pub mod tcp_server;
pub mod wire;

pub use collaborators::{CachedSystemParameters, FileBootstrap, InMemoryTransactionPool};
pub use memory_store::InMemoryKVStore;
pub use mock_peer::MockPeerNetwork;
pub use registry_engine::{RegistryEngine, RegistryOp, RegistryTx, PLATFORM_ECOSYSTEM, SYSTEM_PARAMETERS};
pub use reputation::{BanList, NoopReputation};
pub use tcp_client::TcpPeerClient;
pub use tcp_server::BlockServer;
