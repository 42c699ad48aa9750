//! Typed inbound event payloads

use super::names;
use serde::Deserialize;

/// Payload of `connected`, sent once the remote side accepted the credential
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionData {
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub client_type: Option<String>,
    #[serde(default)]
    pub socket_api_version: Option<u32>,
    /// Server clock, epoch millis
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub user: Option<RemoteUser>,
}

impl ConnectionData {
    /// A connect counts only when the remote confirmed an identity.
    pub fn is_accepted(&self) -> bool {
        self.authenticated && self.user.is_some()
    }
}

/// Identity the credential belongs to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteUser {
    pub id: String,
    pub username: String,
}

/// Payload of `voice:player_joined` / `voice:player_left`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoicePresence {
    pub player_id: String,
    pub player_name: String,
}

/// Payload of `plugin:version_update`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionUpdate {
    #[serde(default)]
    pub need_broadcast: bool,
}

/// Inbound events this process understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundKind {
    Connected,
    VoiceJoined,
    VoiceLeft,
    VersionUpdate,
    Heartbeat,
}

impl InboundKind {
    pub const ALL: [InboundKind; 5] = [
        Self::Connected,
        Self::VoiceJoined,
        Self::VoiceLeft,
        Self::VersionUpdate,
        Self::Heartbeat,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Connected => names::CONNECTED,
            Self::VoiceJoined => names::VOICE_JOINED,
            Self::VoiceLeft => names::VOICE_LEFT,
            Self::VersionUpdate => names::VERSION_UPDATE,
            Self::Heartbeat => names::HEARTBEAT,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}
