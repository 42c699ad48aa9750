//! Default inbound handlers
//!
//! `connected` forces a resync, voice presence events become templated
//! broadcasts, and release announcements trigger a version recheck.

use super::inbound::{ConnectionData, InboundKind, VersionUpdate, VoicePresence};
use super::registry::EventRegistry;
use crate::config::BroadcastConfig;
use crate::host::{Broadcaster, Tone, VersionCheck};
use crate::placeholder::Placeholders;
use crate::tracker::{FlushReason, TrackerHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Broadcast when the remote service asks for it after a release
pub const UPDATE_NOTICE: &str = "[Voice Chat] An update has just been released!";

/// Collaborators the default handlers need
#[derive(Clone)]
pub struct HandlerContext {
    pub tracker: TrackerHandle,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub versions: Arc<dyn VersionCheck>,
    pub broadcasts: BroadcastConfig,
}

/// Register handlers for every dispatched [`InboundKind`].
pub fn register_default_handlers(registry: &EventRegistry, ctx: HandlerContext) {
    let banner_shown = Arc::new(AtomicBool::new(false));

    {
        let tracker = ctx.tracker.clone();
        registry.register(InboundKind::Connected.name(), false, move |data: ConnectionData| {
            on_connected(&data, &tracker, &banner_shown);
        });
    }

    {
        let broadcaster = Arc::clone(&ctx.broadcaster);
        let enabled = ctx.broadcasts.join_enabled;
        let template = ctx.broadcasts.join_message.clone();
        registry.register(InboundKind::VoiceJoined.name(), false, move |p: VoicePresence| {
            if enabled {
                broadcaster.broadcast(&render_presence(&template, &p), Tone::Positive);
            }
        });
    }

    {
        let broadcaster = Arc::clone(&ctx.broadcaster);
        let enabled = ctx.broadcasts.leave_enabled;
        let template = ctx.broadcasts.leave_message.clone();
        registry.register(InboundKind::VoiceLeft.name(), false, move |p: VoicePresence| {
            if enabled {
                broadcaster.broadcast(&render_presence(&template, &p), Tone::Neutral);
            }
        });
    }

    {
        let broadcaster = Arc::clone(&ctx.broadcaster);
        let versions = Arc::clone(&ctx.versions);
        registry.register(InboundKind::VersionUpdate.name(), false, move |update: VersionUpdate| {
            versions.recheck();
            info!("Remote service announced a new release");
            if update.need_broadcast {
                broadcaster.broadcast(UPDATE_NOTICE, Tone::Positive);
            }
        });
    }
}

fn on_connected(data: &ConnectionData, tracker: &TrackerHandle, banner_shown: &AtomicBool) {
    let user = match &data.user {
        Some(user) if data.is_accepted() => user,
        _ => {
            warn!(
                authenticated = data.authenticated,
                "Remote service connected without confirming this server"
            );
            return;
        }
    };

    if !banner_shown.swap(true, Ordering::SeqCst) {
        info!(
            user_id = %user.id,
            username = %user.username,
            client_type = data.client_type.as_deref().unwrap_or("unknown"),
            api_version = data.socket_api_version.unwrap_or_default(),
            "Remote service connected"
        );
    }

    if let Err(e) = tracker.force_flush(FlushReason::Reconnected) {
        warn!(error = %e, "Could not request resync after connect");
    }
}

fn render_presence(template: &str, presence: &VoicePresence) -> String {
    Placeholders::new()
        .add("player.name", presence.player_name.as_str())
        .add("player.id", presence.player_id.as_str())
        .render(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::events::{names, DispatchOutcome};
    use crate::host::RecordingHost;
    use crate::metrics::SyncMetrics;
    use crate::shard::{InMemoryHost, ShardStats};
    use crate::tracker::{RecordingEmitter, Tracker, UpdatePublisher};
    use serde_json::json;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct Fixture {
        registry: EventRegistry,
        host: RecordingHost,
        emitter: RecordingEmitter,
        tracker: TrackerHandle,
    }

    fn fixture(broadcasts: BroadcastConfig) -> Fixture {
        let emitter = RecordingEmitter::new();
        let config = TrackerConfig {
            startup_flush_delay: Duration::from_secs(3_600),
            ..TrackerConfig::default()
        };
        let (tracker, handle) = Tracker::new(
            config,
            Arc::new(InMemoryHost::new()),
            UpdatePublisher::new(Arc::new(emitter.clone())),
            ShardStats::new(),
            SyncMetrics::detached(),
            CancellationToken::new(),
        );
        tokio::spawn(tracker.run());

        let host = RecordingHost::new();
        let registry = EventRegistry::new(SyncMetrics::detached());
        register_default_handlers(
            &registry,
            HandlerContext {
                tracker: handle.clone(),
                broadcaster: Arc::new(host.clone()),
                versions: Arc::new(host.clone()),
                broadcasts,
            },
        );

        Fixture {
            registry,
            host,
            emitter,
            tracker: handle,
        }
    }

    #[tokio::test]
    async fn authenticated_connect_forces_flush() {
        let f = fixture(BroadcastConfig::default());

        let outcome = f.registry.dispatch(
            names::CONNECTED,
            Some(json!({
                "authenticated": true,
                "clientType": "server",
                "socketApiVersion": 2,
                "time": 1_700_000_000_000i64,
                "user": { "id": "7", "username": "lobby" }
            })),
        );
        assert_eq!(outcome, DispatchOutcome::Handled);

        let stats = f.tracker.stats().await.unwrap();
        assert_eq!(stats.forced_updates, 1);
        assert_eq!(f.emitter.payloads(names::PLAYERS).len(), 1);
    }

    #[tokio::test]
    async fn unauthenticated_connect_is_ignored() {
        let f = fixture(BroadcastConfig::default());

        f.registry
            .dispatch(names::CONNECTED, Some(json!({ "authenticated": false })));
        f.registry
            .dispatch(names::CONNECTED, Some(json!({ "authenticated": true })));

        let stats = f.tracker.stats().await.unwrap();
        assert_eq!(stats.forced_updates, 0);
    }

    #[tokio::test]
    async fn voice_presence_is_broadcast_with_placeholders() {
        let f = fixture(BroadcastConfig {
            join_message: "{player.name} ({player.id}) is talking".to_string(),
            ..BroadcastConfig::default()
        });

        f.registry.dispatch(
            names::VOICE_JOINED,
            Some(json!({ "playerId": "u-1", "playerName": "alice" })),
        );
        f.registry.dispatch(
            names::VOICE_LEFT,
            Some(json!({ "playerId": "u-1", "playerName": "alice" })),
        );

        assert_eq!(
            f.host.broadcasts(),
            vec![
                ("alice (u-1) is talking".to_string(), Tone::Positive),
                ("alice left the voice chat".to_string(), Tone::Neutral),
            ]
        );
    }

    #[tokio::test]
    async fn disabled_broadcasts_stay_quiet() {
        let f = fixture(BroadcastConfig {
            join_enabled: false,
            leave_enabled: false,
            ..BroadcastConfig::default()
        });

        f.registry.dispatch(
            names::VOICE_JOINED,
            Some(json!({ "playerId": "u-1", "playerName": "alice" })),
        );
        f.registry.dispatch(
            names::VOICE_LEFT,
            Some(json!({ "playerId": "u-1", "playerName": "alice" })),
        );

        assert!(f.host.broadcasts().is_empty());
    }

    #[tokio::test]
    async fn version_update_rechecks_and_optionally_broadcasts() {
        let f = fixture(BroadcastConfig::default());

        f.registry
            .dispatch(names::VERSION_UPDATE, Some(json!({ "needBroadcast": false })));
        assert_eq!(f.host.rechecks(), 1);
        assert!(f.host.broadcasts().is_empty());

        f.registry
            .dispatch(names::VERSION_UPDATE, Some(json!({ "needBroadcast": true })));
        assert_eq!(f.host.rechecks(), 2);
        assert_eq!(
            f.host.broadcasts(),
            vec![(UPDATE_NOTICE.to_string(), Tone::Positive)]
        );
    }

    #[tokio::test]
    async fn every_dispatched_kind_is_registered() {
        let f = fixture(BroadcastConfig::default());
        for kind in InboundKind::ALL {
            if kind == InboundKind::Heartbeat {
                continue;
            }
            assert!(f.registry.is_registered(kind.name()), "{} missing", kind.name());
        }
    }
}
