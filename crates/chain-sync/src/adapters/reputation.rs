//! # Peer Reputation
//!
//! [`BanList`] bans a peer for a fixed period once it serves too many bad
//! blocks within 24 hours. [`NoopReputation`] is used when banning is off.

use crate::config::BanConfig;
use crate::domain::{BlockId, Host, ReputationError};
use crate::ports::PeerReputation;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

/// Window over which bad blocks are counted.
const BAD_BLOCK_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Default)]
struct HostRecord {
    bad_blocks: VecDeque<Instant>,
    banned_until: Option<Instant>,
}

/// Sliding-window ban list.
pub struct BanList {
    config: BanConfig,
    known: HashSet<Host>,
    records: Mutex<HashMap<Host, HostRecord>>,
}

impl BanList {
    /// Create a ban list. An empty `known` set accepts reports for any host.
    pub fn new(config: BanConfig, known: impl IntoIterator<Item = Host>) -> Self {
        Self {
            config,
            known: known.into_iter().collect(),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `host` is banned right now.
    pub fn is_banned(&self, host: &Host) -> bool {
        self.is_banned_at(host, Instant::now())
    }

    /// Number of bad blocks counted for `host` in the current window.
    pub fn bad_blocks(&self, host: &Host) -> usize {
        self.records
            .lock()
            .get(host)
            .map(|r| r.bad_blocks.len())
            .unwrap_or(0)
    }

    fn is_banned_at(&self, host: &Host, now: Instant) -> bool {
        self.records
            .lock()
            .get(host)
            .and_then(|r| r.banned_until)
            .is_some_and(|until| now < until)
    }

    fn register_at(
        &self,
        host: &Host,
        block_id: BlockId,
        block_time: i64,
        reason: &str,
        now: Instant,
    ) -> Result<(), ReputationError> {
        if !self.known.is_empty() && !self.known.contains(host) {
            return Err(ReputationError::UnknownNode(host.to_string()));
        }

        let mut records = self.records.lock();
        let record = records.entry(host.clone()).or_default();

        while record
            .bad_blocks
            .front()
            .is_some_and(|at| now.duration_since(*at) >= BAD_BLOCK_WINDOW)
        {
            record.bad_blocks.pop_front();
        }
        record.bad_blocks.push_back(now);

        tracing::warn!(
            "[chain-sync] peer {} served bad block {} (time {}): {}",
            host,
            block_id,
            block_time,
            reason
        );

        if record.bad_blocks.len() >= self.config.incorrect_blocks_per_day as usize {
            let duration = Duration::from_secs(self.config.ban_duration_secs);
            record.banned_until = Some(now + duration);
            record.bad_blocks.clear();
            tracing::warn!(
                "[chain-sync] banning peer {} for {}s",
                host,
                duration.as_secs()
            );
        }
        Ok(())
    }
}

impl PeerReputation for BanList {
    fn register_bad_block(
        &self,
        host: &Host,
        block_id: BlockId,
        block_time: i64,
        reason: &str,
    ) -> Result<(), ReputationError> {
        self.register_at(host, block_id, block_time, reason, Instant::now())
    }

    fn filter_banned(&self, hosts: &[Host]) -> Vec<Host> {
        let now = Instant::now();
        hosts
            .iter()
            .filter(|h| !self.is_banned_at(h, now))
            .cloned()
            .collect()
    }
}

/// Reputation that never bans.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopReputation;

impl PeerReputation for NoopReputation {
    fn register_bad_block(
        &self,
        host: &Host,
        block_id: BlockId,
        _block_time: i64,
        reason: &str,
    ) -> Result<(), ReputationError> {
        tracing::debug!(
            "[chain-sync] bad block {} from {} ignored: {}",
            block_id,
            host,
            reason
        );
        Ok(())
    }

    fn filter_banned(&self, hosts: &[Host]) -> Vec<Host> {
        hosts.to_vec()
    }
}
