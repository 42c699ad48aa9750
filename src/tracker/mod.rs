//! Session tracking
//!
//! Periodic collection, change detection and publishing of session
//! updates. The [`Tracker`] task owns all of it; use a [`TrackerHandle`]
//! from elsewhere.

pub mod diff;
pub mod publisher;
pub mod service;

pub use diff::DiffEngine;
pub use publisher::{Emitter, RecordingEmitter, UpdatePublisher};
pub use service::{FlushReason, Tracker, TrackerCommand, TrackerHandle, TrackerStats};
