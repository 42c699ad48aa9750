//! Diff engine
//!
//! Holds the last snapshot handed to the publisher and decides whether a
//! new one needs sending. Single owner: only the tracker task touches it.

use super::publisher::UpdatePublisher;
use crate::metrics::SyncMetrics;
use crate::session::Snapshot;
use crate::socket::EmitOutcome;
use tracing::{debug, error};

pub struct DiffEngine {
    previous: Snapshot,
    publisher: UpdatePublisher,
    metrics: SyncMetrics,
}

impl DiffEngine {
    pub fn new(publisher: UpdatePublisher, metrics: SyncMetrics) -> Self {
        Self {
            previous: Snapshot::new(),
            publisher,
            metrics,
        }
    }

    /// Send `snapshot` if it differs from the last one sent, or always
    /// when `force` is set. Returns whether a send was made.
    ///
    /// The previous snapshot is replaced only after a send. Delivery is
    /// not confirmed, so a send dropped while disconnected still counts.
    pub fn reconcile(&mut self, snapshot: Snapshot, force: bool) -> bool {
        if !force && !snapshot.differs_from(&self.previous) {
            self.metrics.record_update_skipped();
            return false;
        }

        let outcome = match self.publisher.publish(&snapshot) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Failed to publish session update");
                self.metrics.record_error(e.error_type_label());
                return false;
            }
        };

        debug!(
            players = snapshot.len(),
            forced = force,
            delivered = outcome == EmitOutcome::Sent,
            "Session update published"
        );
        self.metrics.record_update_sent(force);
        self.previous = snapshot;
        true
    }

    /// Last snapshot handed to the publisher
    pub fn previous(&self) -> &Snapshot {
        &self.previous
    }
}
