//! Host-side collaborators
//!
//! Broadcasting to connected sessions and re-checking for a newer release
//! belong to the embedding host. The tracing-backed implementations are
//! what the standalone binary uses.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Presentation hint for a broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Joins and update notices
    Positive,
    /// Leaves
    Neutral,
}

impl Tone {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
        }
    }
}

pub trait Broadcaster: Send + Sync + 'static {
    fn broadcast(&self, message: &str, tone: Tone);
}

pub trait VersionCheck: Send + Sync + 'static {
    /// Re-run the release check. Must not block.
    fn recheck(&self);
}

/// Writes broadcasts to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogBroadcaster;

impl Broadcaster for LogBroadcaster {
    fn broadcast(&self, message: &str, tone: Tone) {
        info!(tone = tone.as_str(), message, "Broadcast");
    }
}

/// Logs the recheck request; there is no release feed to consult
#[derive(Debug, Default, Clone, Copy)]
pub struct LogVersionCheck;

impl VersionCheck for LogVersionCheck {
    fn recheck(&self) {
        info!("Remote service announced a new release, recheck requested");
    }
}

/// Captures broadcasts and rechecks, for tests and embedding
#[derive(Debug, Default, Clone)]
pub struct RecordingHost {
    broadcasts: Arc<Mutex<Vec<(String, Tone)>>>,
    rechecks: Arc<Mutex<usize>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broadcasts(&self) -> Vec<(String, Tone)> {
        self.broadcasts.lock().clone()
    }

    pub fn rechecks(&self) -> usize {
        *self.rechecks.lock()
    }
}

impl Broadcaster for RecordingHost {
    fn broadcast(&self, message: &str, tone: Tone) {
        self.broadcasts.lock().push((message.to_string(), tone));
    }
}

impl VersionCheck for RecordingHost {
    fn recheck(&self) {
        *self.rechecks.lock() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_host_captures_calls() {
        let host = RecordingHost::new();
        let broadcaster: Arc<dyn Broadcaster> = Arc::new(host.clone());
        let versions: Arc<dyn VersionCheck> = Arc::new(host.clone());

        broadcaster.broadcast("alice joined", Tone::Positive);
        versions.recheck();
        assert_eq!(host.broadcasts(), vec![("alice joined".to_string(), Tone::Positive)]);
        assert_eq!(host.rechecks(), 1);
    }
}
