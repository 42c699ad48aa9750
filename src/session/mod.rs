//! Session model
//!
//! Per-cycle session states, tolerant positions and the snapshot that the
//! diff engine compares against what was last sent.

mod model;
mod snapshot;

pub use model::{Position, SessionState, POSITION_TOLERANCE};
pub use snapshot::Snapshot;
