//! # Fork Resolver
//!
//! Replaces the local chain tail with a peer's competing tail.
//!
//! ## Algorithm
//!
//! 1. Walk the peer's chain backward from the divergence point, collecting
//!    blocks until one verifies against the local previous block and at
//!    least `replace_count` blocks were collected (bounded by block 1 and
//!    by the rollback horizon).
//! 2. Drop compiled execution state and mark pending transactions unverified.
//! 3. In one transaction: roll back local blocks newest-first, then validate,
//!    play and persist the candidates oldest-first.
//! 4. Commit. Any failure discards the transaction and leaves the local
//!    chain exactly as it was.
//!
//! Failures come back as [`SyncError::ResolutionFailed`] naming the peer
//! block that was being handled, so the peer can be charged for it.

use super::apply::{apply_block, retire_horizon, SyncDependencies};
use crate::config::SyncConfig;
use crate::domain::{
    codec, Block, BlockHeader, BlockId, Host, RollbackLedger, SyncError,
};
use crate::storage::chain;
use tokio_util::sync::CancellationToken;

/// Summary of a completed resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolutionReport {
    /// Block the fork was detected at.
    pub divergence: BlockId,
    /// Last block shared with the peer.
    pub common_ancestor: BlockId,
    /// Local blocks removed.
    pub rolled_back: usize,
    /// Peer blocks applied.
    pub applied: usize,
}

struct Candidate {
    block: Block,
    raw: Vec<u8>,
}

/// Atomic fork resolution against one peer.
pub struct ForkResolver<'a> {
    deps: &'a SyncDependencies,
    config: &'a SyncConfig,
}

impl<'a> ForkResolver<'a> {
    /// Resolver using `deps` and `config`.
    pub fn new(deps: &'a SyncDependencies, config: &'a SyncConfig) -> Self {
        Self { deps, config }
    }

    /// Replace local blocks up to `divergence` with `host`'s chain.
    pub async fn resolve(
        &self,
        host: &Host,
        divergence: BlockId,
        replace_count: u64,
        cancel: &CancellationToken,
    ) -> Result<ResolutionReport, SyncError> {
        tracing::info!(
            "[chain-sync] resolving fork at block {} against {} (replace {})",
            divergence,
            host,
            replace_count
        );

        let mut candidate = None;
        let result = self
            .try_resolve(host, divergence, replace_count, cancel, &mut candidate)
            .await;
        result.map_err(|source| SyncError::ResolutionFailed {
            block_id: divergence,
            candidate,
            source: Box::new(source),
        })
    }

    async fn try_resolve(
        &self,
        host: &Host,
        divergence: BlockId,
        replace_count: u64,
        cancel: &CancellationToken,
        candidate: &mut Option<(BlockId, i64)>,
    ) -> Result<ResolutionReport, SyncError> {
        let candidates = self
            .collect_candidates(host, divergence, replace_count, cancel, candidate)
            .await?;
        *candidate = None;

        self.deps.engine.clean_cache();
        self.deps.tx_pool.mark_unverified()?;

        let report = self.replace_chain(divergence, candidates, candidate)?;
        tracing::info!(
            "[chain-sync] fork resolved: common ancestor {}, rolled back {}, applied {}",
            report.common_ancestor,
            report.rolled_back,
            report.applied
        );
        Ok(report)
    }

    /// Newest-first peer blocks ending at the first one that links to local history.
    async fn collect_candidates(
        &self,
        host: &Host,
        divergence: BlockId,
        replace_count: u64,
        cancel: &CancellationToken,
        current: &mut Option<(BlockId, i64)>,
    ) -> Result<Vec<Candidate>, SyncError> {
        let limit = self.config.rollback_blocks as usize;
        let read = self.deps.begin();
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut next = divergence;
        let mut linked = false;

        'windows: while next >= 1 && candidates.len() < limit {
            let mut stream = self
                .deps
                .peers
                .get_blocks_bodies(host, next, true, cancel.child_token())
                .await?;
            let mut received = 0usize;

            while let Some(item) = stream.next().await {
                *current = Some((next, 0));
                let raw = item?;
                received += 1;

                let mut block = codec::decode(&raw)?;
                *current = Some((block.id(), block.header.time));
                let key = codec::check_linkage(&block, next - 1, self.deps.producers.as_ref())?;
                block.prev_header = chain::read_header(&read, next - 1)?;

                let verified = codec::verify_signature(&block, &key).is_ok();
                tracing::debug!(
                    "[chain-sync] fork candidate {} links to local chain: {}",
                    next,
                    verified
                );
                candidates.push(Candidate { block, raw });

                if verified && candidates.len() as u64 >= replace_count {
                    linked = true;
                    break 'windows;
                }
                next -= 1;
                if next < 1 || candidates.len() >= limit {
                    break 'windows;
                }
            }

            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            if received == 0 {
                break;
            }
        }

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        // Block 1 has no local predecessor; a verified block 1 always links.
        let oldest = candidates.last().map(|c| c.block.id()).unwrap_or(divergence);
        if !linked {
            let genesis_linked = candidates.last().is_some_and(|c| {
                c.block.id() == 1
                    && self
                        .deps
                        .producers
                        .public_key(c.block.header.node_position)
                        .is_some_and(|key| codec::verify_signature(&c.block, &key).is_ok())
            });
            if !genesis_linked {
                return Err(SyncError::NoCommonAncestor { oldest });
            }
        }
        Ok(candidates)
    }

    fn replace_chain(
        &self,
        divergence: BlockId,
        candidates: Vec<Candidate>,
        current: &mut Option<(BlockId, i64)>,
    ) -> Result<ResolutionReport, SyncError> {
        let Some(oldest) = candidates.last() else {
            return Err(SyncError::NoCommonAncestor { oldest: divergence });
        };
        let oldest_id = oldest.block.id();
        let mut parent: Option<BlockHeader> = oldest.block.prev_header.clone();

        let mut txn = self.deps.begin();

        let local = chain::blocks_after_desc(&txn, oldest_id - 1)?;
        for stored in &local {
            let id = stored.header.block_id;
            RollbackLedger::new(&mut txn).rollback_state(id)?;
            chain::delete_block(&mut txn, id)?;
            let prev_info = chain::read_header(&txn, id - 1)?
                .map(|h| h.info())
                .unwrap_or_default();
            chain::write_info(&mut txn, &prev_info)?;
        }

        let applied = candidates.len();
        let mut sys_update = false;
        let mut new_tip = oldest_id - 1;
        for Candidate { mut block, raw } in candidates.into_iter().rev() {
            block.prev_header = parent.take();
            *current = Some((block.id(), block.header.time));
            apply_block(
                &mut txn,
                &mut block,
                raw,
                self.deps.engine.as_ref(),
                self.deps.producers.as_ref(),
            )?;
            sys_update |= block.sys_update;
            new_tip = block.id();
            parent = Some(block.header);
        }
        *current = None;

        retire_horizon(&mut txn, new_tip, self.config.rollback_blocks)?;
        txn.commit()?;

        if sys_update {
            self.deps
                .system_parameters
                .reload(self.deps.store.as_ref())?;
        }

        Ok(ResolutionReport {
            divergence,
            common_ancestor: oldest_id - 1,
            rolled_back: local.len(),
            applied,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ChainFixture, TestNode};

    fn cause(err: SyncError) -> SyncError {
        match err {
            SyncError::ResolutionFailed { source, .. } => *source,
            other => panic!("unwrapped resolver error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_replaces_two_block_tail() {
        let local = ChainFixture::new(3).with_blocks(10);
        let peer = local.fork_at(9).with_blocks(3);
        let node = TestNode::with_chain(&local, 10);
        node.serve(&peer);

        let report = ForkResolver::new(&node.deps, &node.config)
            .resolve(&node.peer, 10, 1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.common_ancestor, 8);
        assert_eq!(report.rolled_back, 2);
        assert_eq!(report.applied, 2);
        assert_eq!(node.tip().block_id, 10);
        assert_eq!(node.tip().hash, peer.header(10).hash);
    }

    #[tokio::test]
    async fn test_failure_leaves_store_untouched() {
        let local = ChainFixture::new(3).with_blocks(10);
        let peer = local.fork_at(9).with_blocks(3);
        let node = TestNode::with_chain(&local, 10);
        node.serve(&peer);
        let before = node.store.snapshot();

        node.store.fail_batches_touching("chain/info");
        let err = ForkResolver::new(&node.deps, &node.config)
            .resolve(&node.peer, 10, 1, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(cause(err), SyncError::Storage(_)));
        assert_eq!(node.store.snapshot(), before);
    }

    #[tokio::test]
    async fn test_bad_candidate_aborts_before_commit() {
        let local = ChainFixture::new(3).with_blocks(10);
        let mut peer = local.fork_at(9).with_blocks(3);
        peer.corrupt_rollbacks_hash(10);
        let node = TestNode::with_chain(&local, 10);
        node.serve(&peer);
        let before = node.store.snapshot();

        let err = ForkResolver::new(&node.deps, &node.config)
            .resolve(&node.peer, 10, 1, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_ban_worthy());
        let SyncError::ResolutionFailed { candidate, .. } = &err else {
            panic!("expected a failed resolution");
        };
        assert_eq!(*candidate, Some((10, peer.header(10).time)));
        assert_eq!(node.store.snapshot(), before);
    }

    #[tokio::test]
    async fn test_fork_deeper_than_horizon() {
        let local = ChainFixture::new(3).with_blocks(10);
        let peer = local.fork_at(2).with_blocks(9);
        let mut node = TestNode::with_chain(&local, 10);
        node.config.rollback_blocks = 4;
        node.serve(&peer);

        let err = ForkResolver::new(&node.deps, &node.config)
            .resolve(&node.peer, 10, 1, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(cause(err), SyncError::NoCommonAncestor { oldest: 7 }));
        assert_eq!(node.tip().block_id, 10);
    }

    #[tokio::test]
    async fn test_replace_count_extends_search() {
        let local = ChainFixture::new(3).with_blocks(10);
        let peer = local.fork_at(10).with_blocks(2);
        let node = TestNode::with_chain(&local, 10);
        node.serve(&peer);

        let report = ForkResolver::new(&node.deps, &node.config)
            .resolve(&node.peer, 10, 2, &CancellationToken::new())
            .await
            .unwrap();

        // Peer 10 already links to local 9, but two blocks were requested.
        assert_eq!(report.applied, 2);
        assert_eq!(report.common_ancestor, 8);
        assert_eq!(node.tip().hash, peer.header(10).hash);
    }

    #[tokio::test]
    async fn test_cancelled_before_replace() {
        let local = ChainFixture::new(3).with_blocks(10);
        let peer = local.fork_at(9).with_blocks(3);
        let node = TestNode::with_chain(&local, 10);
        node.serve(&peer);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = ForkResolver::new(&node.deps, &node.config)
            .resolve(&node.peer, 10, 1, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(node.tip().hash, local.header(10).hash);
    }
}
