//! # Chain Sync Configuration
//!
//! Tunables for the sync coordinator, updater and fork resolver.

use crate::domain::Host;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration rejected by [`SyncConfig::validate`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid config value for {field}: {reason}")]
pub struct ConfigError {
    /// Offending field.
    pub field: &'static str,
    /// Why it was rejected.
    pub reason: String,
}

/// Peer banning policy.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BanConfig {
    /// Record bad blocks and skip banned peers.
    pub enabled: bool,
    /// Bad blocks tolerated from one peer within 24 hours.
    pub incorrect_blocks_per_day: u32,
    /// How long a ban lasts, in seconds.
    pub ban_duration_secs: u64,
}

impl Default for BanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            incorrect_blocks_per_day: 10,
            ban_duration_secs: 3600,
        }
    }
}

/// Chain sync configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// Blocks per peer request window.
    pub blocks_per_request: u32,

    /// Depth of rollback history kept, and the deepest fork that can be repaired.
    pub rollback_blocks: u32,

    /// Buffered blocks between a peer stream and its consumer.
    pub stream_buffer: usize,

    /// Timeout for a single peer query, in milliseconds.
    pub peer_timeout_ms: u64,

    /// Interval between sync triggers, in seconds.
    pub sync_interval_secs: u64,

    /// Preferred peers.
    pub remote_peers: Vec<Host>,

    /// Fallback peers used when no preferred peer is usable.
    pub static_peers: Vec<Host>,

    /// Wire-encoded block 1 for an empty chain.
    pub first_block_path: Option<PathBuf>,

    /// Peer banning.
    pub ban: BanConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            blocks_per_request: 1000,
            rollback_blocks: 60,
            stream_buffer: 64,
            peer_timeout_ms: 5000,
            sync_interval_secs: 2,
            remote_peers: Vec::new(),
            static_peers: Vec::new(),
            first_block_path: None,
            ban: BanConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Create a config for testing (small windows, short timeouts).
    pub fn for_testing() -> Self {
        Self {
            blocks_per_request: 4,
            rollback_blocks: 20,
            stream_buffer: 2,
            peer_timeout_ms: 500,
            sync_interval_secs: 1,
            ..Default::default()
        }
    }

    /// Per-query peer timeout.
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }

    /// Trigger interval.
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |field: &'static str, value: u64| {
            if value == 0 {
                Err(ConfigError {
                    field,
                    reason: "must be greater than zero".into(),
                })
            } else {
                Ok(())
            }
        };

        positive("blocks_per_request", u64::from(self.blocks_per_request))?;
        positive("rollback_blocks", u64::from(self.rollback_blocks))?;
        positive("stream_buffer", self.stream_buffer as u64)?;
        positive("peer_timeout_ms", self.peer_timeout_ms)?;
        positive("sync_interval_secs", self.sync_interval_secs)?;
        if self.ban.enabled {
            positive(
                "ban.incorrect_blocks_per_day",
                u64::from(self.ban.incorrect_blocks_per_day),
            )?;
        }
        Ok(())
    }
}
