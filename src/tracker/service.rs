//! Tracker actor - owns the coordinator and diff engine
//!
//! The tracker task is the coordinator context: it starts collection
//! cycles on a fixed rate, merges them when the countdown posts back,
//! runs the diff and handles forced flushes. Everything else talks to it
//! through a [`TrackerHandle`].

use super::diff::DiffEngine;
use super::publisher::UpdatePublisher;
use crate::config::TrackerConfig;
use crate::error::SyncError;
use crate::metrics::SyncMetrics;
use crate::session::Snapshot;
use crate::shard::{CycleComplete, PositionSource, ShardCoordinator, ShardStats};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bound on queued tracker commands
const COMMAND_CAPACITY: usize = 64;

/// Why a forced flush was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Grace period after startup
    Startup,
    /// Periodic resynchronisation
    Interval,
    /// The remote side accepted this server
    Reconnected,
    /// Caller request
    Requested,
}

impl FlushReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Interval => "interval",
            Self::Reconnected => "reconnected",
            Self::Requested => "requested",
        }
    }
}

/// Counters owned by the tracker task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    pub cycles_started: u64,
    pub cycles_merged: u64,
    pub updates_sent: u64,
    pub forced_updates: u64,
    /// Session count of the most recently merged snapshot
    pub tracked_sessions: usize,
}

pub enum TrackerCommand {
    ForceFlush { reason: FlushReason },
    Stats { respond_to: oneshot::Sender<TrackerStats> },
}

/// Cheap-to-clone handle to the tracker task.
#[derive(Clone)]
pub struct TrackerHandle {
    sender: mpsc::Sender<TrackerCommand>,
    shutdown: CancellationToken,
}

impl TrackerHandle {
    /// Queue an unconditional send of the latest merged snapshot.
    ///
    /// Callable from synchronous code. A full queue already holds work
    /// that will reach the diff engine, so the request is dropped.
    pub fn force_flush(&self, reason: FlushReason) -> Result<(), SyncError> {
        match self.sender.try_send(TrackerCommand::ForceFlush { reason }) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(reason = reason.as_str(), "Tracker queue full, dropping flush request");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SyncError::ChannelClosed),
        }
    }

    pub async fn stats(&self) -> Result<TrackerStats, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(TrackerCommand::Stats { respond_to: tx })
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        rx.await.map_err(|_| SyncError::ChannelClosed)
    }

    /// Stop the periodic tasks. In-flight shard queries are abandoned.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

pub struct Tracker {
    config: TrackerConfig,
    coordinator: ShardCoordinator,
    diff: DiffEngine,
    done_rx: mpsc::UnboundedReceiver<CycleComplete>,
    commands: mpsc::Receiver<TrackerCommand>,
    shutdown: CancellationToken,
    latest: Snapshot,
    stats: TrackerStats,
}

impl Tracker {
    pub fn new(
        config: TrackerConfig,
        source: Arc<dyn PositionSource>,
        publisher: UpdatePublisher,
        shard_stats: ShardStats,
        metrics: SyncMetrics,
        shutdown: CancellationToken,
    ) -> (Self, TrackerHandle) {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (sender, commands) = mpsc::channel(COMMAND_CAPACITY);

        let coordinator = ShardCoordinator::new(
            source,
            shard_stats,
            Arc::new(metrics.clone()),
            done_tx,
            config.cycle_stall_timeout,
        );

        let tracker = Self {
            config,
            coordinator,
            diff: DiffEngine::new(publisher, metrics),
            done_rx,
            commands,
            shutdown: shutdown.clone(),
            latest: Snapshot::new(),
            stats: TrackerStats::default(),
        };
        let handle = TrackerHandle { sender, shutdown };
        (tracker, handle)
    }

    /// Run until shut down or every handle is dropped.
    pub async fn run(mut self) {
        info!(
            interval_ms = self.config.collect_interval.as_millis() as u64,
            force_interval_s = self.config.force_interval.as_secs(),
            "Tracker starting"
        );

        let start = Instant::now();
        let mut collect = interval_at(
            start + self.config.first_collect_delay,
            self.config.collect_interval,
        );
        collect.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut force = interval_at(
            start + self.config.force_interval,
            self.config.force_interval,
        );
        force.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let startup = sleep(self.config.startup_flush_delay);
        tokio::pin!(startup);
        let mut startup_pending = true;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                Some(done) = self.done_rx.recv() => self.on_cycle_complete(done),
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                _ = &mut startup, if startup_pending => {
                    startup_pending = false;
                    self.flush(FlushReason::Startup);
                }
                _ = force.tick() => self.flush(FlushReason::Interval),
                _ = collect.tick() => {
                    if self.coordinator.collect() > 0 {
                        self.stats.cycles_started += 1;
                    }
                }
            }
        }

        info!(
            cycles = self.stats.cycles_merged,
            updates = self.stats.updates_sent,
            "Tracker stopped"
        );
    }

    fn on_cycle_complete(&mut self, done: CycleComplete) {
        let Some(snapshot) = self.coordinator.complete(done) else {
            return;
        };
        self.stats.cycles_merged += 1;
        self.stats.tracked_sessions = snapshot.len();
        self.latest = snapshot.clone();

        if self.diff.reconcile(snapshot, false) {
            self.stats.updates_sent += 1;
        }
    }

    fn handle_command(&mut self, command: TrackerCommand) {
        match command {
            TrackerCommand::ForceFlush { reason } => self.flush(reason),
            TrackerCommand::Stats { respond_to } => {
                let _ = respond_to.send(self.stats);
            }
        }
    }

    fn flush(&mut self, reason: FlushReason) {
        debug!(reason = reason.as_str(), players = self.latest.len(), "Forced flush");
        if self.diff.reconcile(self.latest.clone(), true) {
            self.stats.updates_sent += 1;
            self.stats.forced_updates += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::names;
    use crate::shard::{InMemoryHost, SessionRecord};
    use crate::tracker::publisher::RecordingEmitter;
    use std::time::Duration;

    fn config() -> TrackerConfig {
        TrackerConfig {
            collect_interval: Duration::from_secs(1),
            first_collect_delay: Duration::from_secs(5),
            force_interval: Duration::from_secs(180),
            startup_flush_delay: Duration::from_secs(2),
            cycle_stall_timeout: Duration::from_secs(10),
        }
    }

    fn spawn_tracker(host: &InMemoryHost) -> (TrackerHandle, RecordingEmitter) {
        let emitter = RecordingEmitter::new();
        let (tracker, handle) = Tracker::new(
            config(),
            Arc::new(host.clone()),
            UpdatePublisher::new(Arc::new(emitter.clone())),
            ShardStats::new(),
            SyncMetrics::detached(),
            CancellationToken::new(),
        );
        tokio::spawn(tracker.run());
        (handle, emitter)
    }

    fn player_counts(emitter: &RecordingEmitter) -> Vec<u64> {
        emitter
            .payloads(names::PLAYERS)
            .iter()
            .map(|p| p["playerCount"].as_u64().unwrap_or_default())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn startup_flush_then_first_collection() {
        let host = InMemoryHost::new();
        let shard = host.add_shard("overworld");
        shard.upsert_session(SessionRecord::new("u-1", "alice", Some([0.0, 64.0, 0.0])));
        let (handle, emitter) = spawn_tracker(&host);

        sleep(Duration::from_millis(2_500)).await;
        assert_eq!(player_counts(&emitter), vec![0]);

        sleep(Duration::from_secs(3)).await;
        assert_eq!(player_counts(&emitter), vec![0, 1]);

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.cycles_merged, 1);
        assert_eq!(stats.tracked_sessions, 1);
        assert_eq!(stats.forced_updates, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_cycles_are_not_resent() {
        let host = InMemoryHost::new();
        let shard = host.add_shard("overworld");
        shard.upsert_session(SessionRecord::new("u-1", "alice", Some([0.0, 64.0, 0.0])));
        let (handle, emitter) = spawn_tracker(&host);

        sleep(Duration::from_millis(10_500)).await;
        let stats = handle.stats().await.unwrap();
        assert!(stats.cycles_merged >= 5);
        assert_eq!(player_counts(&emitter), vec![0, 1]);

        shard.upsert_session(SessionRecord::new("u-1", "alice", Some([3.0, 64.0, 0.0])));
        sleep(Duration::from_secs(1)).await;
        assert_eq!(player_counts(&emitter).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn force_interval_resends_unchanged_state() {
        let host = InMemoryHost::new();
        host.add_shard("overworld")
            .upsert_session(SessionRecord::new("u-1", "alice", None));
        let (_handle, emitter) = spawn_tracker(&host);

        sleep(Duration::from_secs(181)).await;
        assert_eq!(player_counts(&emitter), vec![0, 1, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn requested_flush_sends_latest_snapshot() {
        let host = InMemoryHost::new();
        host.add_shard("overworld")
            .upsert_session(SessionRecord::new("u-1", "alice", None));
        let (handle, emitter) = spawn_tracker(&host);

        sleep(Duration::from_millis(5_500)).await;
        emitter.clear();

        handle.force_flush(FlushReason::Reconnected).unwrap();
        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.forced_updates, 2);
        assert_eq!(player_counts(&emitter), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_actor() {
        let host = InMemoryHost::new();
        let (handle, emitter) = spawn_tracker(&host);

        handle.shutdown();
        sleep(Duration::from_secs(10)).await;

        assert!(handle.is_shutdown());
        assert!(emitter.events().is_empty());
        assert!(matches!(
            handle.force_flush(FlushReason::Requested),
            Err(SyncError::ChannelClosed)
        ));
        assert!(handle.stats().await.is_err());
    }
}
