//! # Chain Updater
//!
//! Catches the local chain up to a peer's tip, one window at a time.
//!
//! ```text
//! Idle → Fetching → Validating → Applying → Committed
//!                        │                      │
//!                        └→ ForkDetected ───────┘
//!                   (any error) → Aborted
//! ```
//!
//! Every block is committed on its own; a failure leaves the chain valid up
//! to the last committed block.

use super::apply::{apply_block, retire_horizon, SyncDependencies};
use super::resolver::ForkResolver;
use crate::config::SyncConfig;
use crate::domain::{codec, BlockId, Host, SyncError};
use crate::ports::UpdateReport;
use crate::storage::chain;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Updater states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdaterState {
    /// Not started.
    Idle,
    /// Requesting a window from the peer.
    Fetching,
    /// Decoding and checking a received block.
    Validating,
    /// Playing and persisting a block.
    Applying,
    /// Peer chain diverges from ours; resolving.
    ForkDetected,
    /// Last block committed.
    Committed,
    /// Stopped on an error.
    Aborted,
}

impl fmt::Display for UpdaterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Validating => "validating",
            Self::Applying => "applying",
            Self::ForkDetected => "fork-detected",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// One catch-up pass against a chosen peer.
pub struct ChainUpdater<'a> {
    deps: &'a SyncDependencies,
    config: &'a SyncConfig,
    host: Host,
    target: BlockId,
    state: UpdaterState,
    last_block: Option<(BlockId, i64)>,
    report: UpdateReport,
}

impl<'a> ChainUpdater<'a> {
    /// Updater that syncs from `host` up to `target`.
    pub fn new(
        deps: &'a SyncDependencies,
        config: &'a SyncConfig,
        host: Host,
        target: BlockId,
    ) -> Self {
        Self {
            deps,
            config,
            host,
            target,
            state: UpdaterState::Idle,
            last_block: None,
            report: UpdateReport::default(),
        }
    }

    /// Current state.
    pub fn state(&self) -> UpdaterState {
        self.state
    }

    /// Run the pass. Errors abort the pass after reporting the peer when the
    /// error is attributable to it.
    pub async fn run(mut self, cancel: &CancellationToken) -> Result<UpdateReport, SyncError> {
        let start = chain::committed_info(self.deps.store.as_ref())?.block_id;
        self.report.start_tip = start;
        self.report.end_tip = start;

        match self.fetch_all(cancel).await {
            Ok(()) => Ok(self.report),
            Err(err) => {
                self.transition(UpdaterState::Aborted);
                self.report_peer(&err);
                Err(err)
            }
        }
    }

    async fn fetch_all(&mut self, cancel: &CancellationToken) -> Result<(), SyncError> {
        while self.report.end_tip < self.target {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let from = self.report.end_tip + 1;
            self.transition(UpdaterState::Fetching);
            tracing::info!(
                "[chain-sync] fetching blocks from {} starting at {} (target {})",
                self.host,
                from,
                self.target
            );

            let mut stream = self
                .deps
                .peers
                .get_blocks_bodies(&self.host, from, false, cancel.child_token())
                .await?;

            let mut received = 0usize;
            while let Some(item) = stream.next().await {
                let raw = item?;
                received += 1;
                self.process(raw, cancel).await?;
                if self.report.end_tip >= self.target {
                    break;
                }
            }

            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            if received == 0 {
                tracing::warn!(
                    "[chain-sync] {} returned no blocks from {}, stopping at {}",
                    self.host,
                    from,
                    self.report.end_tip
                );
                break;
            }
        }
        Ok(())
    }

    async fn process(&mut self, raw: Vec<u8>, cancel: &CancellationToken) -> Result<(), SyncError> {
        self.transition(UpdaterState::Validating);
        self.last_block = None;

        let mut block = codec::decode(&raw)?;
        self.last_block = Some((block.id(), block.header.time));

        let read = self.deps.begin();
        let tip = chain::read_info(&read)?.block_id;
        codec::check_linkage(&block, tip, self.deps.producers.as_ref())?;
        block.prev_header = chain::read_header(&read, tip)?;
        drop(read);

        if let Some(replace_count) = codec::check_hash(&block).replace_count() {
            self.transition(UpdaterState::ForkDetected);
            let divergence = block.id() - 1;
            tracing::warn!(
                "[chain-sync] block {} from {} does not extend local block {}",
                block.id(),
                self.host,
                divergence
            );

            ForkResolver::new(self.deps, self.config)
                .resolve(&self.host, divergence, replace_count, cancel)
                .await?;
            self.report.forks_resolved += 1;

            let read = self.deps.begin();
            block.prev_header = chain::read_header(&read, divergence)?;
        }

        self.transition(UpdaterState::Applying);
        let block_id = block.id();
        let mut txn = self.deps.begin();
        apply_block(
            &mut txn,
            &mut block,
            raw,
            self.deps.engine.as_ref(),
            self.deps.producers.as_ref(),
        )?;
        retire_horizon(&mut txn, block_id, self.config.rollback_blocks)?;
        txn.commit()?;

        if block.sys_update {
            self.deps
                .system_parameters
                .reload(self.deps.store.as_ref())?;
        }

        self.report.end_tip = block_id;
        self.report.blocks_applied += 1;
        self.transition(UpdaterState::Committed);
        Ok(())
    }

    fn report_peer(&self, err: &SyncError) {
        if !err.is_ban_worthy() || !self.config.ban.enabled {
            return;
        }
        let (block_id, block_time) = match err {
            SyncError::ResolutionFailed {
                candidate: Some(candidate),
                ..
            } => *candidate,
            _ => self.last_block.unwrap_or((self.report.end_tip + 1, 0)),
        };
        tracing::warn!(
            "[chain-sync] rejecting block {} from {}: {}",
            block_id,
            self.host,
            err
        );
        if let Err(e) = self.deps.reputation.register_bad_block(
            &self.host,
            block_id,
            block_time,
            &err.to_string(),
        ) {
            tracing::warn!("[chain-sync] failed to register bad block: {}", e);
        }
    }

    fn transition(&mut self, next: UpdaterState) {
        tracing::debug!("[chain-sync] updater {} -> {}", self.state, next);
        self.state = next;
    }
}
