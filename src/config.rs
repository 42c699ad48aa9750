//! Configuration module
//!
//! Loads process configuration from environment variables (with `.env`
//! support). Timing constants live in [`SocketConfig`] and
//! [`TrackerConfig`] and are not read from the environment.

use crate::error::SyncError;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Socket.IO protocol revision the remote service expects.
pub const SOCKET_API_VERSION: &str = "2";

/// Role tag sent with every connect.
pub const CLIENT_TYPE: &str = "server";

/// Process configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Identifier for this host, logged at startup
    pub server_id: String,

    /// Health/metrics HTTP port
    pub http_port: u16,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    pub socket: SocketConfig,

    pub tracker: TrackerConfig,

    pub broadcasts: BroadcastConfig,
}

impl SyncConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, SyncError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SyncError> {
        let server_token = lookup("SERVER_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| SyncError::Config("SERVER_TOKEN must be set".to_string()))?;

        let base_url = lookup("SOCKET_URL").unwrap_or_else(|| DEFAULT_SOCKET_URL.to_string());

        let server_id = lookup("SERVER_ID").unwrap_or_else(|| "default".to_string());

        let http_port = parse_var(&lookup, "HTTP_PORT", 9090u16)?;

        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let log_info = parse_flag(&lookup, "LOG_SOCKET_INFO", true)?;

        let defaults = BroadcastConfig::default();
        let broadcasts = BroadcastConfig {
            join_enabled: parse_flag(&lookup, "BROADCAST_JOIN_ENABLED", defaults.join_enabled)?,
            join_message: lookup("BROADCAST_JOIN_MESSAGE").unwrap_or(defaults.join_message),
            leave_enabled: parse_flag(&lookup, "BROADCAST_LEAVE_ENABLED", defaults.leave_enabled)?,
            leave_message: lookup("BROADCAST_LEAVE_MESSAGE").unwrap_or(defaults.leave_message),
        };

        let socket = SocketConfig {
            base_url,
            server_token,
            log_info,
            ..SocketConfig::default()
        };
        // Fail at startup rather than on the first connect
        socket.endpoint()?;

        Ok(Self {
            server_id,
            http_port,
            log_level,
            socket,
            tracker: TrackerConfig::default(),
            broadcasts,
        })
    }
}

const DEFAULT_SOCKET_URL: &str = "https://voice.example.com";

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, SyncError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| SyncError::Config(format!("{key} must be a valid value: {e}"))),
        None => Ok(default),
    }
}

fn parse_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: bool,
) -> Result<bool, SyncError> {
    match lookup(key).map(|raw| raw.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(raw) => match raw.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(SyncError::Config(format!("{key} must be true or false, got '{raw}'"))),
        },
    }
}

/// Connection Manager settings
#[derive(Clone)]
pub struct SocketConfig {
    /// Base URL of the remote service (http/https/ws/wss)
    pub base_url: String,

    /// Pre-shared credential, sent as the `server_token` query parameter
    pub server_token: String,

    /// Log connection lifecycle at info level
    pub log_info: bool,

    pub reconnect_delay: Duration,

    pub max_reconnect_attempts: u32,

    /// Watchdog for one connect attempt (transport open + handshake)
    pub connect_timeout: Duration,

    /// How long shutdown waits for connection tasks before cancelling them
    pub shutdown_grace: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SOCKET_URL.to_string(),
            server_token: String::new(),
            log_info: true,
            reconnect_delay: Duration::from_secs(2),
            max_reconnect_attempts: 30,
            connect_timeout: Duration::from_secs(15),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl fmt::Debug for SocketConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketConfig")
            .field("base_url", &self.base_url)
            .field("server_token", &"<redacted>")
            .field("log_info", &self.log_info)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("connect_timeout", &self.connect_timeout)
            .field("shutdown_grace", &self.shutdown_grace)
            .finish()
    }
}

impl SocketConfig {
    /// Authenticated Engine.IO WebSocket endpoint. Contains the credential;
    /// never log the result.
    pub fn endpoint(&self) -> Result<Url, SyncError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| SyncError::Url(e.to_string()))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(SyncError::Url(format!("unsupported scheme '{other}'"))),
        };
        url.set_scheme(scheme)
            .map_err(|_| SyncError::Url(format!("cannot switch to scheme '{scheme}'")))?;

        let path = format!("{}/socket.io/", url.path().trim_end_matches('/'));
        url.set_path(&path);

        url.query_pairs_mut()
            .clear()
            .append_pair("EIO", "4")
            .append_pair("transport", "websocket")
            .append_pair("socketApiVersion", SOCKET_API_VERSION)
            .append_pair("server_token", &self.server_token)
            .append_pair("client_type", CLIENT_TYPE);

        Ok(url)
    }

    /// Host part of the base URL, safe for logs.
    pub fn host(&self) -> String {
        Url::parse(&self.base_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "<invalid>".to_string())
    }
}

/// Tracker actor timing
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub collect_interval: Duration,

    /// Delay before the first collection
    pub first_collect_delay: Duration,

    /// Unconditional flush period
    pub force_interval: Duration,

    /// One-off forced flush after startup
    pub startup_flush_delay: Duration,

    /// A cycle still in flight after this long is abandoned
    pub cycle_stall_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            collect_interval: Duration::from_secs(1),
            first_collect_delay: Duration::from_secs(5),
            force_interval: Duration::from_secs(180),
            startup_flush_delay: Duration::from_secs(2),
            cycle_stall_timeout: Duration::from_secs(10),
        }
    }
}

/// Voice presence broadcast templates
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub join_enabled: bool,
    pub join_message: String,
    pub leave_enabled: bool,
    pub leave_message: String,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            join_enabled: true,
            join_message: "{player.name} joined the voice chat".to_string(),
            leave_enabled: true,
            leave_message: "{player.name} left the voice chat".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_token_is_required() {
        let err = SyncConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, SyncError::Config(ref msg) if msg.contains("SERVER_TOKEN")));

        let err = SyncConfig::from_lookup(lookup(&[("SERVER_TOKEN", "  ")])).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_default_values() {
        let config = SyncConfig::from_lookup(lookup(&[("SERVER_TOKEN", "secret")])).unwrap();

        assert_eq!(config.server_id, "default");
        assert_eq!(config.http_port, 9090);
        assert_eq!(config.log_level, "info");
        assert!(config.socket.log_info);
        assert_eq!(config.socket.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.socket.max_reconnect_attempts, 30);
        assert_eq!(config.socket.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.tracker.force_interval, Duration::from_secs(180));
        assert!(config.broadcasts.join_enabled);
        assert_eq!(config.broadcasts.leave_message, "{player.name} left the voice chat");
    }

    #[test]
    fn test_overrides_and_parse_errors() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("SERVER_TOKEN", "secret"),
            ("HTTP_PORT", "8081"),
            ("LOG_SOCKET_INFO", "false"),
            ("BROADCAST_JOIN_ENABLED", "0"),
            ("BROADCAST_JOIN_MESSAGE", "hi {player.name}"),
        ]))
        .unwrap();
        assert_eq!(config.http_port, 8081);
        assert!(!config.socket.log_info);
        assert!(!config.broadcasts.join_enabled);
        assert_eq!(config.broadcasts.join_message, "hi {player.name}");

        let err = SyncConfig::from_lookup(lookup(&[("SERVER_TOKEN", "s"), ("HTTP_PORT", "http")]))
            .unwrap_err();
        assert!(matches!(err, SyncError::Config(ref msg) if msg.contains("HTTP_PORT")));

        let err = SyncConfig::from_lookup(lookup(&[
            ("SERVER_TOKEN", "s"),
            ("LOG_SOCKET_INFO", "maybe"),
        ]))
        .unwrap_err();
        assert!(matches!(err, SyncError::Config(ref msg) if msg.contains("LOG_SOCKET_INFO")));
    }

    #[test]
    fn test_endpoint_url() {
        let socket = SocketConfig {
            base_url: "https://voice.example.com/api/".to_string(),
            server_token: "s3cr&t".to_string(),
            ..SocketConfig::default()
        };
        let url = socket.endpoint().unwrap();

        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/api/socket.io/");
        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["EIO"], "4");
        assert_eq!(query["transport"], "websocket");
        assert_eq!(query["socketApiVersion"], "2");
        assert_eq!(query["server_token"], "s3cr&t");
        assert_eq!(query["client_type"], "server");

        let plain = SocketConfig {
            base_url: "http://localhost:3000".to_string(),
            ..SocketConfig::default()
        };
        let url = plain.endpoint().unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.path(), "/socket.io/");
    }

    #[test]
    fn test_invalid_base_url_rejected_at_load() {
        let err = SyncConfig::from_lookup(lookup(&[
            ("SERVER_TOKEN", "s"),
            ("SOCKET_URL", "ftp://voice.example.com"),
        ]))
        .unwrap_err();
        assert!(matches!(err, SyncError::Url(_)));
    }

    #[test]
    fn test_debug_redacts_token() {
        let socket = SocketConfig {
            server_token: "very-secret".to_string(),
            ..SocketConfig::default()
        };
        let rendered = format!("{socket:?}");
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
