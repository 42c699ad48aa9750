//! Shard collection statistics
//!
//! Tracks, per shard, how its most recent collection went. Read by the
//! readiness endpoint; never consulted by the diff path.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Outcome of a shard's most recent collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionHealth {
    /// Not collected yet
    Pending,
    /// Last query succeeded
    Ok,
    /// Last query failed or panicked
    Failed,
}

/// Statistics for a single shard
#[derive(Debug)]
pub struct ShardStatsEntry {
    pub health: CollectionHealth,
    pub sessions: usize,
    pub collections: AtomicU64,
    pub failures: AtomicU64,
    pub last_collected: Option<Instant>,
}

impl Default for ShardStatsEntry {
    fn default() -> Self {
        Self {
            health: CollectionHealth::Pending,
            sessions: 0,
            collections: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            last_collected: None,
        }
    }
}

/// Shared statistics across all shards, written from shard contexts
#[derive(Debug, Clone, Default)]
pub struct ShardStats {
    inner: Arc<DashMap<String, ShardStatsEntry>>,
}

impl ShardStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful collection of `sessions` sessions
    pub fn record_collection(&self, shard_id: &str, sessions: usize) {
        let mut entry = self.inner.entry(shard_id.to_string()).or_default();
        entry.health = CollectionHealth::Ok;
        entry.sessions = sessions;
        entry.last_collected = Some(Instant::now());
        entry.collections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed collection; the shard contributes no sessions
    pub fn record_failure(&self, shard_id: &str) {
        let mut entry = self.inner.entry(shard_id.to_string()).or_default();
        entry.health = CollectionHealth::Failed;
        entry.sessions = 0;
        entry.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop entries for shards that are no longer active
    pub fn retain_active(&self, active: &[&str]) {
        self.inner.retain(|id, _| active.contains(&id.as_str()));
    }

    pub fn health(&self, shard_id: &str) -> Option<CollectionHealth> {
        self.inner.get(shard_id).map(|e| e.health)
    }

    pub fn shard_count(&self) -> usize {
        self.inner.len()
    }

    /// Shards whose last collection failed
    pub fn failed_shards(&self) -> usize {
        self.inner
            .iter()
            .filter(|e| e.health == CollectionHealth::Failed)
            .count()
    }

    /// Sessions reported across all shards in their last collection
    pub fn total_sessions(&self) -> usize {
        self.inner.iter().map(|e| e.sessions).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.inner
            .iter()
            .map(|e| e.failures.load(Ordering::Relaxed))
            .sum()
    }
}
