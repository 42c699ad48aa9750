//! proximity-sync
//!
//! Keeps a remote voice service informed of where every connected session
//! stands. Sessions are collected from the host's shards once a second,
//! diffed against the last update, and pushed over a Socket.IO channel
//! that reconnects on its own.

pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod host;
pub mod metrics;
pub mod placeholder;
pub mod session;
pub mod shard;
pub mod socket;
pub mod tracker;

pub use config::SyncConfig;
pub use error::SyncError;
