//! Outbound envelope serialization
//!
//! Converts snapshots to the JSON payloads emitted on the socket.

use super::names;
use crate::error::SyncError;
use crate::session::{SessionState, Snapshot};
use serde::Serialize;
use serde_json::Value;

/// `server:players` envelope
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayersUpdate<'a> {
    pub player_count: usize,
    pub players: Vec<&'a SessionState>,
}

impl<'a> PlayersUpdate<'a> {
    /// Players are ordered by id so identical snapshots encode identically.
    pub fn from_snapshot(snapshot: &'a Snapshot) -> Self {
        let mut players: Vec<&SessionState> = snapshot.values().collect();
        players.sort_by(|a, b| a.id().cmp(b.id()));
        Self {
            player_count: players.len(),
            players,
        }
    }
}

/// Serialize a snapshot to the `server:players` payload
pub fn serialize_update(snapshot: &Snapshot) -> Result<Value, SyncError> {
    serde_json::to_value(PlayersUpdate::from_snapshot(snapshot)).map_err(|source| {
        SyncError::Serialize {
            event: names::PLAYERS.to_string(),
            source,
        }
    })
}
