//! Snapshot of all sessions captured in one collection cycle

use super::SessionState;
use std::collections::HashMap;

/// Session id → state for one collection cycle. Order is irrelevant.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    sessions: HashMap<String, SessionState>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a state keyed by its id, replacing any previous entry.
    pub fn insert(&mut self, state: SessionState) {
        self.sessions.insert(state.id().to_string(), state);
    }

    pub fn get(&self, id: &str) -> Option<&SessionState> {
        self.sessions.get(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &SessionState> {
        self.sessions.values()
    }

    /// Whether this snapshot must be sent given `previous` was the last one sent.
    ///
    /// Size is compared first; otherwise keys are walked until the first
    /// missing or unequal state.
    pub fn differs_from(&self, previous: &Snapshot) -> bool {
        if self.sessions.len() != previous.sessions.len() {
            return true;
        }

        self.sessions
            .iter()
            .any(|(id, state)| previous.sessions.get(id) != Some(state))
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        !self.differs_from(other)
    }
}

impl FromIterator<SessionState> for Snapshot {
    fn from_iter<I: IntoIterator<Item = SessionState>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for state in iter {
            snapshot.insert(state);
        }
        snapshot
    }
}
