//! Wires the sync engine to storage, the peer client and the block server.

use crate::config::NodeConfig;
use crate::storage::open_store;
use anyhow::{Context, Result};
use chain_sync::adapters::{
    BanList, BlockServer, CachedSystemParameters, FileBootstrap, InMemoryTransactionPool,
    NoopReputation, RegistryEngine, TcpPeerClient,
};
use chain_sync::ports::{BootstrapSource, KeyValueStore, PeerReputation};
use chain_sync::{ChainSyncApi, ProducerKeys, SyncCoordinator, SyncDependencies};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Running node.
pub struct NodeRuntime {
    config: NodeConfig,
    store: Arc<dyn KeyValueStore>,
    coordinator: Arc<SyncCoordinator>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeRuntime {
    /// Build every component from `config`.
    pub fn new(config: NodeConfig) -> Result<Self> {
        let store = open_store(&config.storage)?;
        let producers = config.producer_set().context("Invalid producer keys")?;
        if producers.is_empty() {
            warn!("No producer keys configured; every block will be rejected");
        }

        let reputation: Arc<dyn PeerReputation> = if config.sync.ban.enabled {
            let known = config
                .sync
                .remote_peers
                .iter()
                .chain(config.sync.static_peers.iter())
                .cloned();
            Arc::new(BanList::new(config.sync.ban.clone(), known))
        } else {
            Arc::new(NoopReputation)
        };

        let bootstrap = config
            .sync
            .first_block_path
            .as_ref()
            .map(|path| Arc::new(FileBootstrap::new(path.clone())) as Arc<dyn BootstrapSource>);

        let deps = SyncDependencies {
            store: store.clone(),
            peers: Arc::new(TcpPeerClient::new(&config.sync)),
            engine: Arc::new(RegistryEngine::new()),
            producers: Arc::new(producers),
            reputation,
            tx_pool: Arc::new(InMemoryTransactionPool::new()),
            system_parameters: Arc::new(CachedSystemParameters::new()),
            bootstrap,
        };
        let coordinator = Arc::new(SyncCoordinator::new(deps, config.sync.clone()));

        Ok(Self {
            config,
            store,
            coordinator,
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }

    /// Start the block server and the sync loop. Returns the bound server address.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        let tip = self.coordinator.local_tip()?;
        info!("===========================================");
        info!("  Ledger Node v{}", env!("CARGO_PKG_VERSION"));
        info!("  Local tip: {}", tip.block_id);
        info!("  Peers: {:?}", self.config.sync.remote_peers);
        info!("===========================================");

        let listener = TcpListener::bind(&self.config.network.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.network.listen_addr))?;
        let addr = listener.local_addr()?;

        let server = Arc::new(BlockServer::new(
            self.store.clone(),
            self.config.sync.blocks_per_request,
        ));
        let server_cancel = self.shutdown.child_token();
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = server.serve(listener, server_cancel).await {
                warn!("Block server stopped with error: {}", e);
            }
        }));

        let coordinator = self.coordinator.clone();
        let sync_cancel = self.shutdown.child_token();
        self.tasks.push(tokio::spawn(coordinator.run(sync_cancel)));

        info!("Node started, serving blocks on {}", addr);
        Ok(addr)
    }

    /// Sync API of this node.
    pub fn sync_api(&self) -> Arc<SyncCoordinator> {
        self.coordinator.clone()
    }

    /// Cancel background tasks and wait for them to finish.
    pub async fn shutdown(&mut self) {
        info!("Shutting down node");
        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Task ended abnormally: {}", e);
            }
        }
        info!("Node stopped");
    }
}
