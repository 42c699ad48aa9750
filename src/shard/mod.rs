//! Shard collection
//!
//! The host's shards are queried on their own execution contexts and
//! merged into one snapshot per cycle.

pub mod coordinator;
pub mod source;
mod state;

pub use coordinator::{Countdown, CycleComplete, ShardCoordinator};
pub use source::{InMemoryHost, InMemoryShard, PositionSource, SessionRecord, Shard, ShardTask};
pub use state::{CollectionHealth, ShardStats};
