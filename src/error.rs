//! Domain error types for proximity-sync
//!
//! main.rs is the ONLY module allowed to use anyhow::Result (process boundary).
//! All library code returns Result<T, SyncError>.

use thiserror::Error;

/// Sync domain errors
///
/// Every variant carries structured context fields for diagnostics.
/// None of them carry the server credential; URLs are reported by host only.
///
/// Example log output:
/// ```text
/// SyncError::Decode { event: "connected", .. }
/// → "failed to decode inbound 'connected' payload"
/// ```
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (environment variable missing or invalid)
    #[error("configuration error: {0}")]
    Config(String),

    /// Base URL could not be turned into a socket endpoint
    #[error("invalid socket url: {0}")]
    Url(String),

    /// Transport could not be opened
    #[error("failed to connect to {host}")]
    Connect {
        host: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Remote service refused the credential; retrying will not help
    #[error("connection rejected by remote service: {reason}")]
    Rejected { reason: String },

    /// The remote side violated the Engine.IO / Socket.IO handshake
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Transport open + handshake did not finish in time
    #[error("connect attempt timed out after {timeout_ms}ms")]
    ConnectTimeout { timeout_ms: u64 },

    /// Read or write failed on an open connection
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed inbound frame or payload
    #[error("failed to decode inbound '{event}' payload")]
    Decode {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    /// Inbound text frame is not a valid Engine.IO packet
    #[error("malformed frame: {0}")]
    Frame(String),

    /// A shard failed while enumerating its sessions
    #[error("shard '{shard_id}' query failed: {reason}")]
    ShardQuery { shard_id: String, reason: String },

    /// Outbound envelope could not be serialized
    #[error("failed to serialize '{event}' envelope")]
    Serialize {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    /// An actor's channel closed (the owning task has shut down)
    #[error("channel closed")]
    ChannelClosed,
}

impl SyncError {
    /// Returns a static label string suitable for Prometheus metrics.
    ///
    /// Used as the `error_type` label on `sync_errors_total`.
    pub fn error_type_label(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Url(_) => "url",
            Self::Connect { .. } => "connect",
            Self::Rejected { .. } => "rejected",
            Self::Handshake(_) => "handshake",
            Self::ConnectTimeout { .. } => "connect_timeout",
            Self::Transport(_) => "transport",
            Self::Decode { .. } => "decode",
            Self::Frame(_) => "frame",
            Self::ShardQuery { .. } => "shard_query",
            Self::Serialize { .. } => "serialize",
            Self::ChannelClosed => "channel_closed",
        }
    }

    /// Whether retrying the connection can fix this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected { .. } | Self::Url(_) | Self::Config(_))
    }
}
