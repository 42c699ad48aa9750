//! Update publisher
//!
//! Turns snapshots and session join/quit notices into socket events.
//! Emission is fire-and-forget: a dropped frame is not an error.

use crate::error::SyncError;
use crate::events::{names, serialize_update};
use crate::session::Snapshot;
use crate::socket::{ConnectionManager, EmitOutcome};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Anything that can put a named event on the wire.
pub trait Emitter: Send + Sync + 'static {
    fn emit(&self, event: &str, payload: Value) -> EmitOutcome;
}

impl Emitter for ConnectionManager {
    fn emit(&self, event: &str, payload: Value) -> EmitOutcome {
        ConnectionManager::emit(self, event, payload)
    }
}

#[derive(Clone)]
pub struct UpdatePublisher {
    emitter: Arc<dyn Emitter>,
}

impl UpdatePublisher {
    pub fn new(emitter: Arc<dyn Emitter>) -> Self {
        Self { emitter }
    }

    /// Emit the full `server:players` envelope for `snapshot`.
    pub fn publish(&self, snapshot: &Snapshot) -> Result<EmitOutcome, SyncError> {
        let payload = serialize_update(snapshot)?;
        Ok(self.emitter.emit(names::PLAYERS, payload))
    }

    pub fn session_connected(&self, session_id: &str) -> EmitOutcome {
        self.emitter
            .emit(names::PLAYER_CONNECT, Value::String(session_id.to_string()))
    }

    pub fn session_disconnected(&self, session_id: &str) -> EmitOutcome {
        self.emitter
            .emit(names::PLAYER_DISCONNECT, Value::String(session_id.to_string()))
    }
}

/// Emitter that keeps every event it is given.
///
/// While marked disconnected it behaves like the socket: events are
/// dropped and not recorded.
#[derive(Clone)]
pub struct RecordingEmitter {
    events: Arc<Mutex<Vec<(String, Value)>>>,
    connected: Arc<AtomicBool>,
}

impl Default for RecordingEmitter {
    fn default() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().clone()
    }

    /// Payloads recorded for `event`, oldest first
    pub fn payloads(&self, event: &str) -> Vec<Value> {
        self.events
            .lock()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Emitter for RecordingEmitter {
    fn emit(&self, event: &str, payload: Value) -> EmitOutcome {
        if !self.connected.load(Ordering::SeqCst) {
            return EmitOutcome::Dropped;
        }
        self.events.lock().push((event.to_string(), payload));
        EmitOutcome::Sent
    }
}
