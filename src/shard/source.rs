//! Position source: the host's read-only view of shards and their sessions
//!
//! The host runtime owns its shards and their execution contexts. This
//! crate only ever touches a shard's sessions from inside a task handed to
//! [`Shard::execute`].

use crate::error::SyncError;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Work posted onto a shard's own execution context.
pub type ShardTask = Box<dyn FnOnce() + Send + 'static>;

/// A session as the host reports it. `position` is `None` when the session
/// has no live entity (still loading, between worlds).
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: String,
    pub name: String,
    pub position: Option<[f64; 3]>,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, position: Option<[f64; 3]>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position,
        }
    }
}

/// One independently executing partition of the host (a world instance).
pub trait Shard: Send + Sync + 'static {
    /// World identifier, used as the `world` of every position it reports.
    fn id(&self) -> &str;

    /// Run `task` on this shard's execution context.
    ///
    /// Implementations may drop the task if the shard is shutting down.
    fn execute(&self, task: ShardTask);

    /// Sessions currently in this shard.
    ///
    /// Only valid from inside a task passed to [`Shard::execute`].
    fn sessions(&self) -> Result<Vec<SessionRecord>, SyncError>;
}

/// Enumerates the shards that are active right now.
pub trait PositionSource: Send + Sync + 'static {
    fn active_shards(&self) -> Vec<Arc<dyn Shard>>;
}

/// Host for embedders without their own shard threads.
///
/// Every shard gets a dedicated tokio task as its execution context;
/// sessions are pushed in by the embedder.
#[derive(Default, Clone)]
pub struct InMemoryHost {
    shards: Arc<DashMap<String, Arc<InMemoryShard>>>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or return the existing) shard. Must be called inside a tokio runtime.
    pub fn add_shard(&self, id: impl Into<String>) -> Arc<InMemoryShard> {
        let id = id.into();
        self.shards
            .entry(id.clone())
            .or_insert_with(|| InMemoryShard::spawn(id))
            .clone()
    }

    /// Remove a shard; its execution context stops once queued tasks drain.
    pub fn remove_shard(&self, id: &str) -> bool {
        self.shards.remove(id).is_some()
    }

    pub fn shard(&self, id: &str) -> Option<Arc<InMemoryShard>> {
        self.shards.get(id).map(|entry| Arc::clone(entry.value()))
    }
}

impl PositionSource for InMemoryHost {
    fn active_shards(&self) -> Vec<Arc<dyn Shard>> {
        self.shards
            .iter()
            .map(|entry| Arc::clone(entry.value()) as Arc<dyn Shard>)
            .collect()
    }
}

/// A shard whose execution context is a single tokio task.
pub struct InMemoryShard {
    id: String,
    sessions: DashMap<String, SessionRecord>,
    tasks: mpsc::UnboundedSender<ShardTask>,
}

impl InMemoryShard {
    fn spawn(id: String) -> Arc<Self> {
        let (tasks, mut rx) = mpsc::unbounded_channel::<ShardTask>();
        let shard_id = id.clone();

        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                task();
            }
            debug!(shard_id, "Shard execution context stopped");
        });

        Arc::new(Self {
            id,
            sessions: DashMap::new(),
            tasks,
        })
    }

    pub fn upsert_session(&self, record: SessionRecord) {
        self.sessions.insert(record.id.clone(), record);
    }

    pub fn remove_session(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Shard for InMemoryShard {
    fn id(&self) -> &str {
        &self.id
    }

    fn execute(&self, task: ShardTask) {
        // A closed context drops the task, which still counts as finished.
        let _ = self.tasks.send(task);
    }

    fn sessions(&self) -> Result<Vec<SessionRecord>, SyncError> {
        Ok(self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn tasks_run_on_the_shard_context() {
        let host = InMemoryHost::new();
        let shard = host.add_shard("overworld");
        shard.upsert_session(SessionRecord::new("u-1", "alice", Some([1.0, 2.0, 3.0])));

        let (tx, rx) = oneshot::channel();
        let queried = Arc::clone(&shard);
        shard.execute(Box::new(move || {
            let _ = tx.send(queried.sessions());
        }));

        let sessions = rx.await.unwrap().unwrap();
        assert_eq!(sessions, vec![SessionRecord::new("u-1", "alice", Some([1.0, 2.0, 3.0]))]);
    }

    #[tokio::test]
    async fn add_shard_is_idempotent() {
        let host = InMemoryHost::new();
        let a = host.add_shard("overworld");
        let b = host.add_shard("overworld");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(host.active_shards().len(), 1);

        assert!(host.remove_shard("overworld"));
        assert!(host.active_shards().is_empty());
        assert!(!host.remove_shard("overworld"));
    }
}
