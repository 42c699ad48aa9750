//! Session state and world position

use serde::Serialize;
use serde_json::{Map, Value};

/// Coordinate deltas below this are treated as "not moved".
pub const POSITION_TOLERANCE: f64 = 0.01;

/// A 3D position inside one world (shard).
///
/// Equality is tolerant: two positions are equal iff the world matches
/// exactly and every axis differs by less than [`POSITION_TOLERANCE`].
/// This relation is reflexive and symmetric but NOT transitive: a chain
/// of sub-tolerance moves can drift arbitrarily far while each step
/// still compares equal to the previous one.
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub world: String,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64, world: impl Into<String>) -> Self {
        Self {
            x,
            y,
            z,
            world: world.into(),
        }
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        (self.x - other.x).abs() < POSITION_TOLERANCE
            && (self.y - other.y).abs() < POSITION_TOLERANCE
            && (self.z - other.z).abs() < POSITION_TOLERANCE
            && self.world == other.world
    }
}

/// One connected session as captured during a collection cycle.
///
/// Identity (`id`, `name`) is fixed at construction. The position can only
/// be replaced as a whole. `settings` is reserved for per-session voice
/// attributes and is currently always empty.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    #[serde(rename = "uuid")]
    id: String,
    name: String,
    settings: Map<String, Value>,
    position: Option<Position>,
}

impl SessionState {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            settings: Map::new(),
            position: None,
        }
    }

    /// Builder-style position assignment.
    pub fn with_position(mut self, position: Option<Position>) -> Self {
        self.position = position;
        self
    }

    pub fn set_position(&mut self, position: Option<Position>) {
        self.position = position;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn settings(&self) -> &Map<String, Value> {
        &self.settings
    }
}

/// Name + position only. The id is left out: two distinct
/// sessions with the same name standing in the same spot compare equal.
impl PartialEq for SessionState {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.position == other.position
    }
}
