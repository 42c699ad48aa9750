//! Event handling module
//!
//! Inbound event decoding and dispatch, plus serialization of the
//! outbound update envelope.

pub mod handlers;
pub mod inbound;
pub mod registry;
pub mod serialize;

pub use handlers::{register_default_handlers, HandlerContext};
pub use inbound::{ConnectionData, InboundKind, RemoteUser, VersionUpdate, VoicePresence};
pub use registry::{DispatchOutcome, EventRegistry};
pub use serialize::{serialize_update, PlayersUpdate};

/// Socket event names
pub mod names {
    /// Outbound: full session update envelope
    pub const PLAYERS: &str = "server:players";
    /// Outbound: one session joined the host
    pub const PLAYER_CONNECT: &str = "server:player_connect";
    /// Outbound: one session left the host
    pub const PLAYER_DISCONNECT: &str = "server:player_disconnect";

    pub const CONNECTED: &str = "connected";
    pub const VOICE_JOINED: &str = "voice:player_joined";
    pub const VOICE_LEFT: &str = "voice:player_left";
    pub const VERSION_UPDATE: &str = "plugin:version_update";
    /// Answered by the connection manager itself, never dispatched
    pub const HEARTBEAT: &str = "heartbeat";
}
