//! Shard coordinator
//!
//! Fans a collection request out to every active shard's own execution
//! context and folds the results back into one snapshot. The only
//! synchronisation point is a countdown: the shard task that takes it to
//! zero posts `CycleComplete` to the coordinator's channel, and the
//! coordinator task does the merge. Nothing here ever blocks on a shard.

use crate::metrics::SyncMetrics;
use crate::session::{Position, SessionState, Snapshot};
use crate::shard::source::{PositionSource, Shard};
use crate::shard::state::ShardStats;

use dashmap::DashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Posted to the coordinator once every shard of `cycle` has reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleComplete {
    pub cycle: u64,
}

/// Exactly-once countdown barrier.
#[derive(Debug)]
pub struct Countdown {
    remaining: AtomicUsize,
}

impl Countdown {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
        }
    }

    /// Decrement; returns `true` for the single caller that reaches zero.
    pub fn count_down(&self) -> bool {
        self.remaining.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }
}

/// Counts its shard down when dropped: after the task ran, after it
/// panicked, or when the shard discarded the task without running it.
struct CompletionGuard {
    cycle: u64,
    countdown: Arc<Countdown>,
    done_tx: mpsc::UnboundedSender<CycleComplete>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if self.countdown.count_down() {
            let _ = self.done_tx.send(CycleComplete { cycle: self.cycle });
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    cycle: u64,
    started: Instant,
}

/// Owned by the coordinator task; not shared.
pub struct ShardCoordinator {
    source: Arc<dyn PositionSource>,
    live: Arc<DashMap<String, SessionState>>,
    stats: ShardStats,
    metrics: Arc<SyncMetrics>,
    done_tx: mpsc::UnboundedSender<CycleComplete>,
    stall_timeout: Duration,
    cycle: u64,
    in_flight: Option<InFlight>,
}

impl ShardCoordinator {
    pub fn new(
        source: Arc<dyn PositionSource>,
        stats: ShardStats,
        metrics: Arc<SyncMetrics>,
        done_tx: mpsc::UnboundedSender<CycleComplete>,
        stall_timeout: Duration,
    ) -> Self {
        Self {
            source,
            live: Arc::new(DashMap::new()),
            stats,
            metrics,
            done_tx,
            stall_timeout,
            cycle: 0,
            in_flight: None,
        }
    }

    /// Start a collection cycle across all active shards.
    ///
    /// Returns the number of shards queried; 0 means nothing was started
    /// (no active shards, or the previous cycle is still running).
    pub fn collect(&mut self) -> usize {
        if let Some(in_flight) = self.in_flight {
            if in_flight.started.elapsed() < self.stall_timeout {
                debug!(cycle = in_flight.cycle, "Previous collection still in flight");
                return 0;
            }
            warn!(
                cycle = in_flight.cycle,
                timeout_ms = self.stall_timeout.as_millis() as u64,
                "Abandoning stalled collection cycle"
            );
            // Stragglers keep writing into the detached map.
            self.live = Arc::new(DashMap::new());
            self.in_flight = None;
        }

        let shards = self.source.active_shards();
        if shards.is_empty() {
            return 0;
        }

        let active: Vec<&str> = shards.iter().map(|s| s.id()).collect();
        self.stats.retain_active(&active);

        self.live.clear();
        self.cycle += 1;
        let cycle = self.cycle;
        self.in_flight = Some(InFlight {
            cycle,
            started: Instant::now(),
        });

        let countdown = Arc::new(Countdown::new(shards.len()));
        let shard_count = shards.len();

        for shard in shards {
            let guard = CompletionGuard {
                cycle,
                countdown: Arc::clone(&countdown),
                done_tx: self.done_tx.clone(),
            };
            let live = Arc::clone(&self.live);
            let stats = self.stats.clone();
            let metrics = Arc::clone(&self.metrics);
            let queried = Arc::clone(&shard);

            shard.execute(Box::new(move || {
                let _guard = guard;
                collect_shard(queried.as_ref(), &live, &stats, &metrics);
            }));
        }

        debug!(cycle, shard_count, "Collection cycle started");
        shard_count
    }

    /// Merge the live map once `done` arrives for the current cycle.
    ///
    /// Returns `None` for completions of abandoned cycles.
    pub fn complete(&mut self, done: CycleComplete) -> Option<Snapshot> {
        let in_flight = match self.in_flight {
            Some(in_flight) if in_flight.cycle == done.cycle => in_flight,
            _ => {
                debug!(cycle = done.cycle, "Ignoring completion of abandoned cycle");
                return None;
            }
        };
        self.in_flight = None;

        let snapshot: Snapshot = self
            .live
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        self.metrics
            .record_cycle(in_flight.started.elapsed(), snapshot.len());
        Some(snapshot)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn current_cycle(&self) -> u64 {
        self.cycle
    }
}

/// Runs on the shard's context. Failures are contained here so the
/// completion guard still fires.
fn collect_shard(
    shard: &dyn Shard,
    live: &DashMap<String, SessionState>,
    stats: &ShardStats,
    metrics: &SyncMetrics,
) {
    let shard_id = shard.id();

    let records = match panic::catch_unwind(AssertUnwindSafe(|| shard.sessions())) {
        Ok(Ok(records)) => records,
        Ok(Err(e)) => {
            warn!(shard_id, error = %e, "Shard query failed");
            stats.record_failure(shard_id);
            metrics.record_shard_failure(shard_id);
            metrics.record_error(e.error_type_label());
            return;
        }
        Err(_) => {
            warn!(shard_id, "Shard query panicked");
            stats.record_failure(shard_id);
            metrics.record_shard_failure(shard_id);
            return;
        }
    };

    let count = records.len();
    for record in records {
        let position = record
            .position
            .map(|[x, y, z]| Position::new(x, y, z, shard_id));
        let state = SessionState::new(record.id, record.name).with_position(position);
        live.insert(state.id().to_string(), state);
    }

    stats.record_collection(shard_id, count);
}
