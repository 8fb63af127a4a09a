//! # Sync Coordinator
//!
//! Entry point of the sync engine. Guarantees at most one pass at a time and
//! holds the chain write lock for the whole pass.
//!
//! ## Pass
//!
//! 1. Acquire the single-flight guard (or return `AlreadyRunning`).
//! 2. Take the chain write lock.
//! 3. Empty chain: load block 1 from the bootstrap source.
//! 4. Otherwise pick the best unbanned remote peer, falling back to the
//!    static peers, and run a [`ChainUpdater`] up to its tip.

use super::apply::{apply_block, SyncDependencies};
use super::peers::best_peer;
use super::updater::ChainUpdater;
use crate::config::SyncConfig;
use crate::domain::{codec, BlockId, BootstrapError, Host, InfoBlock, PeerError, SyncError};
use crate::ports::{ChainSyncApi, SyncOutcome};
use crate::storage::chain;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

const IDLE: u8 = 0;
const RUNNING: u8 = 1;

/// Releases the single-flight flag on every exit path.
struct RunGuard<'a> {
    state: &'a AtomicU8,
}

impl<'a> RunGuard<'a> {
    fn acquire(state: &'a AtomicU8) -> Option<Self> {
        state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { state })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.state.store(IDLE, Ordering::Release);
    }
}

/// Single-flight sync coordinator.
pub struct SyncCoordinator {
    deps: SyncDependencies,
    config: SyncConfig,
    state: AtomicU8,
    chain_lock: Arc<RwLock<()>>,
}

impl SyncCoordinator {
    /// Coordinator with its own chain lock.
    pub fn new(deps: SyncDependencies, config: SyncConfig) -> Self {
        Self::with_lock(deps, config, Arc::new(RwLock::new(())))
    }

    /// Coordinator sharing `chain_lock` with other chain users.
    pub fn with_lock(
        deps: SyncDependencies,
        config: SyncConfig,
        chain_lock: Arc<RwLock<()>>,
    ) -> Self {
        Self {
            deps,
            config,
            state: AtomicU8::new(IDLE),
            chain_lock,
        }
    }

    /// Lock that serializes chain mutation. Readers of chain state take it shared.
    pub fn chain_lock(&self) -> Arc<RwLock<()>> {
        self.chain_lock.clone()
    }

    /// Run one pass unless one is already running.
    pub async fn trigger(&self, cancel: &CancellationToken) -> Result<SyncOutcome, SyncError> {
        let Some(_guard) = RunGuard::acquire(&self.state) else {
            tracing::debug!("[chain-sync] sync already running, skipping trigger");
            return Ok(SyncOutcome::AlreadyRunning);
        };

        let _write = tokio::select! {
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            guard = self.chain_lock.write() => guard,
        };

        let tip = chain::committed_info(self.deps.store.as_ref())?.block_id;
        if tip == 0 {
            return self.first_load();
        }

        let (host, max_block_id) = self.select_peer(cancel).await?;
        if tip >= max_block_id {
            tracing::debug!(
                "[chain-sync] up to date at {} (best peer {} at {})",
                tip,
                host,
                max_block_id
            );
            return Ok(SyncOutcome::UpToDate { tip });
        }

        tracing::info!(
            "[chain-sync] syncing from {}: local {} -> remote {}",
            host,
            tip,
            max_block_id
        );
        let report = ChainUpdater::new(&self.deps, &self.config, host, max_block_id)
            .run(cancel)
            .await?;
        tracing::info!(
            "[chain-sync] sync pass done: {} -> {}, {} blocks, {} forks",
            report.start_tip,
            report.end_tip,
            report.blocks_applied,
            report.forks_resolved
        );
        Ok(SyncOutcome::Updated(report))
    }

    /// Trigger a pass every `sync_interval` until `cancel` fires.
    ///
    /// Passes run on their own task; a tick that lands on a running pass is a
    /// no-op. Returns only after the last pass has finished.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.sync_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            "[chain-sync] coordinator started, interval {:?}",
            self.config.sync_interval()
        );

        let mut pass: Option<JoinHandle<()>> = None;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if pass.as_ref().is_some_and(|p| !p.is_finished()) {
                tracing::trace!("[chain-sync] previous pass still running");
                continue;
            }

            let coordinator = self.clone();
            let pass_cancel = cancel.child_token();
            pass = Some(tokio::spawn(async move {
                match coordinator.trigger(&pass_cancel).await {
                    Ok(_) => {}
                    Err(e) if e.is_cancelled() => {
                        tracing::debug!("[chain-sync] sync pass cancelled")
                    }
                    Err(SyncError::PeerUnavailable) => {
                        tracing::debug!("[chain-sync] no peer available, retrying next tick")
                    }
                    Err(e @ (SyncError::Storage(_) | SyncError::Ledger(_))) => {
                        tracing::error!("[chain-sync] sync pass failed: {}", e)
                    }
                    Err(e) => tracing::warn!("[chain-sync] sync pass failed: {}", e),
                }
            }));
        }

        if let Some(pass) = pass {
            if let Err(e) = pass.await {
                tracing::error!("[chain-sync] sync pass task failed: {}", e);
            }
        }
        tracing::info!("[chain-sync] coordinator stopped");
    }

    fn first_load(&self) -> Result<SyncOutcome, SyncError> {
        let source = self
            .deps
            .bootstrap
            .as_ref()
            .ok_or(BootstrapError::NotConfigured)?;
        let raw = source.first_block()?;

        let mut block = codec::decode(&raw)?;
        if block.id() != 1 {
            return Err(SyncError::BlockIdMismatch {
                expected: 1,
                actual: block.id(),
            });
        }

        let mut txn = self.deps.begin();
        apply_block(
            &mut txn,
            &mut block,
            raw,
            self.deps.engine.as_ref(),
            self.deps.producers.as_ref(),
        )?;
        txn.commit()?;

        if block.sys_update {
            self.deps
                .system_parameters
                .reload(self.deps.store.as_ref())?;
        }

        tracing::info!("[chain-sync] loaded first block {}", block.id());
        Ok(SyncOutcome::FirstLoad { tip: block.id() })
    }

    async fn select_peer(&self, cancel: &CancellationToken) -> Result<(Host, BlockId), SyncError> {
        let remote = self.deps.reputation.filter_banned(&self.config.remote_peers);
        let timeout = self.config.peer_timeout();

        match best_peer(self.deps.peers.as_ref(), &remote, timeout, cancel).await {
            Ok(found) => return Ok(found),
            Err(PeerError::Cancelled) => return Err(SyncError::Cancelled),
            Err(e) => tracing::debug!(
                "[chain-sync] no remote peer usable ({}), trying static peers",
                e
            ),
        }

        Ok(best_peer(self.deps.peers.as_ref(), &self.config.static_peers, timeout, cancel).await?)
    }
}

#[async_trait]
impl ChainSyncApi for SyncCoordinator {
    async fn sync(&self, cancel: &CancellationToken) -> Result<SyncOutcome, SyncError> {
        self.trigger(cancel).await
    }

    fn local_tip(&self) -> Result<InfoBlock, SyncError> {
        Ok(chain::committed_info(self.deps.store.as_ref())?)
    }

    fn is_syncing(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }
}
