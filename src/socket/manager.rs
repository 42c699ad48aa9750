//! Connection manager
//!
//! Owns the Socket.IO channel to the remote service: connect with a
//! per-attempt watchdog, automatic reconnection with a fixed delay and an
//! attempt cap, heartbeat echo, inbound dispatch and fire-and-forget emit.
//!
//! Each connect starts a driver task under a fresh generation and session
//! token. A cancelled driver exits without touching the shared state; the
//! caller that cancelled it has already moved the state.

use super::packet::Packet;
use super::state::{ConnectionState, DisconnectReason, StateCell};
use super::transport::{Connector, Transport};
use crate::config::SocketConfig;
use crate::error::SyncError;
use crate::events::{names, EventRegistry, InboundKind};
use crate::metrics::SyncMetrics;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Result of a fire-and-forget emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// Handed to the open connection
    Sent,
    /// Not connected; the frame was discarded
    Dropped,
}

/// Handle to the socket connection. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: SocketConfig,
    host: String,
    connector: Arc<dyn Connector>,
    registry: Arc<EventRegistry>,
    metrics: SyncMetrics,
    state: StateCell,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    connection_id: RwLock<Option<String>>,
    session: Mutex<CancellationToken>,
    driver: Mutex<Option<JoinHandle<()>>>,
    root: CancellationToken,
    tasks: TaskTracker,
}

/// Handshake finished; the socket is usable.
struct Established {
    transport: Transport,
    sid: String,
    ping_window: Duration,
}

impl ConnectionManager {
    pub fn new(
        config: SocketConfig,
        connector: Arc<dyn Connector>,
        registry: Arc<EventRegistry>,
        metrics: SyncMetrics,
    ) -> Self {
        let host = config.host();
        Self {
            inner: Arc::new(Inner {
                config,
                host,
                connector,
                registry,
                metrics,
                state: StateCell::new(),
                outbound: Mutex::new(None),
                connection_id: RwLock::new(None),
                session: Mutex::new(CancellationToken::new()),
                driver: Mutex::new(None),
                root: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Start connecting. Returns false if already connecting or connected.
    pub fn connect(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        let Some(generation) = self.inner.state.begin_connect() else {
            debug!(state = self.state().label(), "connect() ignored");
            return false;
        };
        self.spawn_driver(generation);
        true
    }

    /// Operator reconnect: resets the attempt counter and flags, drops any
    /// pending retry and connects afresh. No-op while connecting or connected.
    pub fn reconnect(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        let Some(generation) = self.inner.state.restart() else {
            debug!(state = self.state().label(), "reconnect() ignored");
            return false;
        };
        info!(host = %self.inner.host, "Reconnecting to remote service");
        self.spawn_driver(generation);
        true
    }

    /// Operator disconnect. Suppresses automatic reconnection until the
    /// next `reconnect()`.
    pub fn disconnect(&self) {
        self.inner.state.close();
        self.inner.session.lock().cancel();
        self.inner.outbound.lock().take();
        self.inner.connection_id.write().take();
        self.inner.metrics.set_socket_connected(false);

        if self.inner.config.log_info {
            info!(host = %self.inner.host, "Disconnected from remote service");
        }
    }

    /// Write one event if connected; otherwise drop it with a warning.
    pub fn emit(&self, event: &str, payload: Value) -> EmitOutcome {
        if self.state() == ConnectionState::Connected {
            let frame = Packet::event(event, payload).encode();
            let sent = self
                .inner
                .outbound
                .lock()
                .as_ref()
                .is_some_and(|tx| tx.send(frame).is_ok());
            if sent {
                return EmitOutcome::Sent;
            }
        }

        if self.inner.config.log_info {
            warn!(
                event,
                state = self.state().label(),
                "Socket not connected, dropping outbound event"
            );
        }
        self.inner.metrics.record_emit_dropped(event);
        EmitOutcome::Dropped
    }

    /// Disconnect and wait for connection tasks, cancelling them if they
    /// outlive the grace period.
    pub async fn shutdown(&self) {
        self.disconnect();
        self.inner.tasks.close();

        let grace = self.inner.config.shutdown_grace;
        if timeout(grace, self.inner.tasks.wait()).await.is_err() {
            warn!(grace_ms = grace.as_millis() as u64, "Connection tasks still running, aborting");
            if let Some(driver) = self.inner.driver.lock().take() {
                driver.abort();
            }
        }
        self.inner.root.cancel();
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.state.reconnect_attempts()
    }

    /// Socket.IO session id of the live connection
    pub fn connection_id(&self) -> Option<String> {
        self.inner.connection_id.read().clone()
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.inner.registry
    }

    fn is_closed(&self) -> bool {
        self.inner.root.is_cancelled() || self.inner.tasks.is_closed()
    }

    fn spawn_driver(&self, generation: u64) {
        let token = self.inner.root.child_token();
        let previous = std::mem::replace(&mut *self.inner.session.lock(), token.clone());
        previous.cancel();

        let inner = Arc::clone(&self.inner);
        let handle = self.inner.tasks.spawn(inner.drive(generation, token));
        *self.inner.driver.lock() = Some(handle);
    }
}

impl Inner {
    /// Connect, run the session, and retry transient failures until
    /// connected for good, forced down, cancelled or out of attempts.
    async fn drive(self: Arc<Self>, generation: u64, token: CancellationToken) {
        let mut retrying = false;

        loop {
            if retrying && !self.schedule_retry(generation, &token).await {
                return;
            }
            retrying = true;

            let opened = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                result = timeout(self.config.connect_timeout, self.open()) => result,
            };

            let established = match opened {
                Ok(Ok(established)) => established,
                Ok(Err(e)) if !e.is_retryable() => {
                    error!(
                        host = %self.host,
                        error = %e,
                        "Remote service refused this server, waiting for reconnect()"
                    );
                    self.metrics.record_error(e.error_type_label());
                    self.state.mark_disconnected(generation, DisconnectReason::Rejected);
                    return;
                }
                Ok(Err(e)) => {
                    if self.config.log_info {
                        warn!(host = %self.host, error = %e, "Failed to connect to remote service");
                    }
                    self.metrics.record_error(e.error_type_label());
                    if !self.state.mark_disconnected(generation, DisconnectReason::ConnectFailed) {
                        return;
                    }
                    continue;
                }
                Err(_) => {
                    let e = SyncError::ConnectTimeout {
                        timeout_ms: self.config.connect_timeout.as_millis() as u64,
                    };
                    warn!(host = %self.host, error = %e, "Connect attempt timed out");
                    self.metrics.record_error(e.error_type_label());
                    if !self.state.mark_disconnected(generation, DisconnectReason::ConnectTimeout) {
                        return;
                    }
                    continue;
                }
            };

            // The sender is in place before the state says Connected, so an
            // emit that sees Connected always finds it. A stale driver puts
            // back whatever it displaced.
            let (tx, rx) = mpsc::unbounded_channel();
            {
                let mut outbound = self.outbound.lock();
                let displaced = outbound.replace(tx.clone());
                let displaced_id = self.connection_id.write().replace(established.sid.clone());
                if !self.state.mark_connected(generation) {
                    *outbound = displaced;
                    *self.connection_id.write() = displaced_id;
                    return;
                }
            }
            self.metrics.set_socket_connected(true);
            if self.config.log_info {
                info!(host = %self.host, "Connected to remote service");
            }

            let ended = self.run_session(established, rx, &token).await;

            if self.release_outbound(&tx) {
                self.metrics.set_socket_connected(false);
            }

            let Some(reason) = ended else {
                return;
            };
            if !self.state.mark_disconnected(generation, reason) {
                return;
            }
            if reason.is_forced() {
                warn!(
                    host = %self.host,
                    reason = reason.as_str(),
                    "Disconnected from remote service, not reconnecting"
                );
                return;
            }
            if self.config.log_info {
                warn!(
                    host = %self.host,
                    reason = reason.as_str(),
                    "Lost connection to remote service"
                );
            }
        }
    }

    /// Clear the outbound sender and connection id if they still belong
    /// to `tx`. A newer session may already have replaced them.
    fn release_outbound(&self, tx: &mpsc::UnboundedSender<String>) -> bool {
        let mut outbound = self.outbound.lock();
        if !outbound.as_ref().is_some_and(|current| current.same_channel(tx)) {
            return false;
        }
        *outbound = None;
        self.connection_id.write().take();
        true
    }

    /// One step of the reconnection loop. False means stop driving.
    async fn schedule_retry(&self, generation: u64, token: &CancellationToken) -> bool {
        if !self.state.is_current(generation) || !self.state.may_reconnect() {
            return false;
        }

        let max = self.config.max_reconnect_attempts;
        let attempt = self.state.next_attempt();
        if attempt > max {
            error!(host = %self.host, max, "Giving up reconnecting to remote service");
            self.state.give_up(generation);
            return false;
        }

        self.metrics.record_reconnect_attempt();
        if self.config.log_info {
            info!(
                attempt,
                max,
                delay_ms = self.config.reconnect_delay.as_millis() as u64,
                "Reconnecting to remote service"
            );
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => return false,
            _ = sleep(self.config.reconnect_delay) => {}
        }

        self.state.retry(generation)
    }

    /// Open the transport and run the Engine.IO + Socket.IO handshake.
    async fn open(&self) -> Result<Established, SyncError> {
        let url = self.config.endpoint()?;
        let mut transport = self.connector.connect(url).await?;

        let info = match next_packet(&mut transport).await? {
            Packet::Open(info) => info,
            other => {
                return Err(SyncError::Handshake(format!("expected open packet, got {other:?}")));
            }
        };
        transport.sink.send(Packet::Connect { sid: None }.encode()).await?;

        loop {
            match next_packet(&mut transport).await? {
                Packet::Connect { sid: Some(sid) } => {
                    return Ok(Established {
                        transport,
                        sid,
                        ping_window: info.ping_window(),
                    });
                }
                Packet::ConnectError { message } => {
                    return Err(SyncError::Rejected { reason: message });
                }
                Packet::Ping => transport.sink.send(Packet::Pong.encode()).await?,
                Packet::Noop => {}
                other => {
                    return Err(SyncError::Handshake(format!(
                        "expected connect ack, got {other:?}"
                    )));
                }
            }
        }
    }

    /// Pump one connected session. `None` means the session was cancelled.
    async fn run_session(
        &self,
        established: Established,
        mut outbound: mpsc::UnboundedReceiver<String>,
        token: &CancellationToken,
    ) -> Option<DisconnectReason> {
        let Established {
            mut transport,
            sid,
            ping_window,
        } = established;

        let deadline = sleep_until(Instant::now() + ping_window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    let _ = transport.sink.send(Packet::Disconnect.encode()).await;
                    let _ = transport.sink.close().await;
                    return None;
                }
                Some(frame) = outbound.recv() => {
                    if let Err(e) = transport.sink.send(frame).await {
                        warn!(error = %e, "Failed to write to socket");
                        return Some(DisconnectReason::TransportError);
                    }
                }
                () = &mut deadline => {
                    return Some(DisconnectReason::PingTimeout);
                }
                frame = transport.stream.next() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => {
                            warn!(error = %e, "Socket read failed");
                            return Some(DisconnectReason::TransportError);
                        }
                        None => return Some(DisconnectReason::TransportClose),
                    };
                    deadline.as_mut().reset(Instant::now() + ping_window);

                    let reply = match self.handle_frame(&frame, &sid) {
                        Ok(reply) => reply,
                        Err(reason) => return Some(reason),
                    };
                    if let Some(reply) = reply {
                        if let Err(e) = transport.sink.send(reply).await {
                            warn!(error = %e, "Failed to write to socket");
                            return Some(DisconnectReason::TransportError);
                        }
                    }
                }
            }
        }
    }

    /// Process one inbound frame; returns a frame to write back, or the
    /// reason the session ends.
    fn handle_frame(&self, frame: &str, sid: &str) -> Result<Option<String>, DisconnectReason> {
        let packet = match Packet::decode(frame) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "Skipping malformed frame");
                self.metrics.record_error(e.error_type_label());
                return Ok(None);
            }
        };

        match packet {
            Packet::Ping => Ok(Some(Packet::Pong.encode())),
            Packet::Close => Err(DisconnectReason::TransportClose),
            Packet::Disconnect => Err(DisconnectReason::ServerClose),
            Packet::Event { name, payload }
                if InboundKind::from_name(&name) == Some(InboundKind::Heartbeat) =>
            {
                self.metrics.record_inbound(&name);
                match payload {
                    Some(nonce) => Ok(Some(heartbeat_echo(&nonce, sid))),
                    None => {
                        warn!("Heartbeat without nonce ignored");
                        Ok(None)
                    }
                }
            }
            Packet::Event { name, payload } => {
                self.registry.dispatch(&name, payload);
                Ok(None)
            }
            other => {
                debug!(packet = ?other, "Ignoring packet");
                Ok(None)
            }
        }
    }
}

async fn next_packet(transport: &mut Transport) -> Result<Packet, SyncError> {
    match transport.stream.next().await {
        Some(Ok(frame)) => Packet::decode(&frame),
        Some(Err(e)) => Err(e),
        None => Err(SyncError::Handshake("transport closed during handshake".to_string())),
    }
}

/// `nonce.sid`, sent back on the heartbeat event
fn heartbeat_echo(nonce: &Value, sid: &str) -> String {
    let nonce = match nonce {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Packet::event(names::HEARTBEAT, Value::String(format!("{nonce}.{sid}"))).encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::memory::{Dial, MemoryConnector, MemoryPeer};
    use crate::socket::packet::MAX_PING_WINDOW;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(max_attempts: u32) -> SocketConfig {
        SocketConfig {
            base_url: "http://voice.test".to_string(),
            server_token: "token-1".to_string(),
            log_info: true,
            reconnect_delay: Duration::from_millis(100),
            max_reconnect_attempts: max_attempts,
            connect_timeout: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(1),
        }
    }

    fn manager_with(
        fallback: Dial,
        max_attempts: u32,
    ) -> (ConnectionManager, Arc<MemoryConnector>, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (connector, peers) = MemoryConnector::new(fallback);
        let registry = Arc::new(EventRegistry::new(SyncMetrics::detached()));
        let manager = ConnectionManager::new(
            config(max_attempts),
            connector.clone(),
            registry,
            SyncMetrics::detached(),
        );
        (manager, connector, peers)
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..10_000 {
            if condition() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    async fn connected_peer(
        manager: &ConnectionManager,
        peers: &mut mpsc::UnboundedReceiver<MemoryPeer>,
        sid: &str,
    ) -> MemoryPeer {
        let mut peer = peers.recv().await.unwrap();
        assert!(peer.accept(sid).await);
        wait_for(|| manager.is_connected()).await;
        peer
    }

    #[tokio::test(start_paused = true)]
    async fn connects_with_authenticated_url() {
        let (manager, connector, mut peers) = manager_with(Dial::Accept, 3);
        assert!(manager.connect());
        let _peer = connected_peer(&manager, &mut peers, "sock-1").await;

        assert_eq!(manager.connection_id().as_deref(), Some("sock-1"));
        let url = connector.last_url().unwrap();
        assert_eq!(url.scheme(), "ws");
        assert!(url.query().unwrap().contains("server_token=token-1"));
        assert!(url.query().unwrap().contains("client_type=server"));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_and_reconnect_are_noops_while_active() {
        let (manager, connector, mut peers) = manager_with(Dial::Accept, 3);
        assert!(manager.connect());
        assert!(!manager.connect());
        assert!(!manager.reconnect());

        let _peer = connected_peer(&manager, &mut peers, "sock-1").await;
        assert!(!manager.connect());
        assert!(!manager.reconnect());
        assert_eq!(connector.dials(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let (manager, connector, _peers) = manager_with(Dial::Refuse, 3);
        let started = Instant::now();
        assert!(manager.connect());

        wait_for(|| {
            manager.state() == ConnectionState::Disconnected(DisconnectReason::GaveUp)
        })
        .await;
        // initial attempt + 3 retries
        assert_eq!(connector.dials(), 4);
        assert!(started.elapsed() >= Duration::from_millis(300));

        sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.dials(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_reconnect_resets_after_giving_up() {
        let (manager, connector, mut peers) = manager_with(Dial::Refuse, 1);
        manager.connect();
        wait_for(|| {
            manager.state() == ConnectionState::Disconnected(DisconnectReason::GaveUp)
        })
        .await;
        assert_eq!(connector.dials(), 2);

        connector.push(Dial::Accept);
        assert!(manager.reconnect());
        let _peer = connected_peer(&manager, &mut peers, "sock-2").await;
        assert_eq!(manager.reconnect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let (manager, connector, mut peers) = manager_with(Dial::Accept, 5);
        connector.push(Dial::Refuse);
        connector.push(Dial::Refuse);

        manager.connect();
        let _peer = connected_peer(&manager, &mut peers, "sock-1").await;

        assert_eq!(connector.dials(), 3);
        assert_eq!(manager.reconnect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_loss_triggers_reconnect() {
        let (manager, connector, mut peers) = manager_with(Dial::Accept, 3);
        manager.connect();
        let peer = connected_peer(&manager, &mut peers, "sock-1").await;

        peer.drop_connection();
        let _peer = connected_peer(&manager, &mut peers, "sock-2").await;
        assert_eq!(connector.dials(), 2);
        assert_eq!(manager.connection_id().as_deref(), Some("sock-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_pings_time_out_the_session() {
        let (manager, connector, mut peers) = manager_with(Dial::Accept, 3);
        manager.connect();
        let _silent = connected_peer(&manager, &mut peers, "sock-1").await;

        // memory peer advertises a 25s + 20s window
        let _peer = connected_peer(&manager, &mut peers, "sock-2").await;
        assert_eq!(connector.dials(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_ping_window_is_capped_and_recoverable() {
        let (manager, connector, mut peers) = manager_with(Dial::Accept, 3);
        manager.connect();

        let mut silent = peers.recv().await.unwrap();
        let open = format!(
            r#"0{{"sid":"engine-1","upgrades":[],"pingInterval":{},"pingTimeout":1}}"#,
            u64::MAX
        );
        assert!(silent.send(open));
        assert_eq!(silent.recv().await.as_deref(), Some("40"));
        assert!(silent.send(r#"40{"sid":"sock-1"}"#));
        wait_for(|| manager.is_connected()).await;
        let connected_at = Instant::now();

        // silence past the cap ends the session and the driver retries
        let _peer = connected_peer(&manager, &mut peers, "sock-2").await;
        assert_eq!(connector.dials(), 2);
        assert!(connected_at.elapsed() >= MAX_PING_WINDOW);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn first_emit_after_connect_is_never_dropped() {
        let (manager, _connector, mut peers) = manager_with(Dial::Accept, 3);

        let watcher = manager.clone();
        let first_emit = tokio::spawn(async move {
            while !watcher.is_connected() {
                tokio::task::yield_now().await;
            }
            watcher.emit(names::PLAYER_CONNECT, json!("u-1"))
        });

        manager.connect();
        let mut peer = peers.recv().await.unwrap();
        assert!(peer.accept("sock-1").await);

        assert_eq!(first_emit.await.unwrap(), EmitOutcome::Sent);
        assert_eq!(
            peer.recv().await.as_deref(),
            Some(r#"42["server:player_connect","u-1"]"#)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn server_disconnect_is_forced() {
        let (manager, connector, mut peers) = manager_with(Dial::Accept, 3);
        manager.connect();
        let peer = connected_peer(&manager, &mut peers, "sock-1").await;

        assert!(peer.send_packet(&Packet::Disconnect));
        wait_for(|| {
            manager.state() == ConnectionState::Disconnected(DisconnectReason::ServerClose)
        })
        .await;

        sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.dials(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn operator_disconnect_halts_retries() {
        let (manager, connector, _peers) = manager_with(Dial::Refuse, 30);
        manager.connect();
        wait_for(|| connector.dials() >= 2).await;

        manager.disconnect();
        let dials = connector.dials();
        sleep(Duration::from_secs(10)).await;

        assert_eq!(connector.dials(), dials);
        assert_eq!(
            manager.state(),
            ConnectionState::Disconnected(DisconnectReason::ClientClose)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn operator_disconnect_closes_socket() {
        let (manager, _connector, mut peers) = manager_with(Dial::Accept, 3);
        manager.connect();
        let mut peer = connected_peer(&manager, &mut peers, "sock-1").await;

        manager.disconnect();
        assert_eq!(peer.recv().await.as_deref(), Some("41"));
        assert_eq!(peer.recv().await, None);
        assert!(manager.connection_id().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_token_stops_reconnecting() {
        let (manager, connector, mut peers) = manager_with(Dial::Accept, 30);
        manager.connect();
        let mut peer = peers.recv().await.unwrap();
        assert!(peer.refuse("invalid server token").await);

        wait_for(|| {
            manager.state() == ConnectionState::Disconnected(DisconnectReason::Rejected)
        })
        .await;
        sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.dials(), 1);

        assert!(manager.reconnect());
        let _peer = connected_peer(&manager, &mut peers, "sock-1").await;
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_upgrade_stops_reconnecting() {
        let (manager, connector, _peers) = manager_with(Dial::Reject, 30);
        manager.connect();

        wait_for(|| {
            manager.state() == ConnectionState::Disconnected(DisconnectReason::Rejected)
        })
        .await;
        sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.dials(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_abandons_hung_attempt() {
        let (manager, connector, mut peers) = manager_with(Dial::Accept, 3);
        connector.push(Dial::Hang);
        let started = Instant::now();

        manager.connect();
        let _peer = connected_peer(&manager, &mut peers, "sock-1").await;

        assert_eq!(connector.dials(), 2);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn emit_while_disconnected_is_dropped() {
        let (manager, _connector, mut peers) = manager_with(Dial::Accept, 3);
        assert_eq!(manager.emit(names::PLAYERS, json!({})), EmitOutcome::Dropped);

        manager.connect();
        let mut peer = connected_peer(&manager, &mut peers, "sock-1").await;
        manager.disconnect();
        assert_eq!(manager.emit(names::PLAYERS, json!({})), EmitOutcome::Dropped);

        assert_eq!(peer.recv().await.as_deref(), Some("41"));
        assert_eq!(peer.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn emit_while_connected_writes_event_frame() {
        let (manager, _connector, mut peers) = manager_with(Dial::Accept, 3);
        manager.connect();
        let mut peer = connected_peer(&manager, &mut peers, "sock-1").await;

        let outcome = manager.emit(names::PLAYER_CONNECT, json!("u-1"));
        assert_eq!(outcome, EmitOutcome::Sent);
        assert_eq!(
            peer.recv().await.as_deref(),
            Some(r#"42["server:player_connect","u-1"]"#)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn answers_pings_and_heartbeats() {
        let (manager, _connector, mut peers) = manager_with(Dial::Accept, 3);
        manager.connect();
        let mut peer = connected_peer(&manager, &mut peers, "sock-1").await;

        assert!(peer.send("2"));
        assert_eq!(peer.recv().await.as_deref(), Some("3"));

        assert!(peer.send(r#"42["heartbeat","n-7"]"#));
        assert_eq!(
            peer.recv().await.as_deref(),
            Some(r#"42["heartbeat","n-7.sock-1"]"#)
        );

        assert!(peer.send(r#"42["heartbeat",1234]"#));
        assert_eq!(
            peer.recv().await.as_deref(),
            Some(r#"42["heartbeat","1234.sock-1"]"#)
        );
    }

    #[derive(Deserialize)]
    struct Count {
        n: usize,
    }

    #[tokio::test(start_paused = true)]
    async fn bad_frames_do_not_drop_the_connection() {
        let (manager, connector, mut peers) = manager_with(Dial::Accept, 3);
        let total = Arc::new(AtomicUsize::new(0));
        let seen = total.clone();
        manager.registry().register("count", false, move |c: Count| {
            seen.fetch_add(c.n, Ordering::SeqCst);
        });

        manager.connect();
        let mut peer = connected_peer(&manager, &mut peers, "sock-1").await;

        assert!(peer.send("42not json"));
        assert!(peer.send(r#"42["count",{"n":"x"}]"#));
        assert!(peer.send(r#"42["unknown:event",{}]"#));
        assert!(peer.send(r#"42["count",{"n":2}]"#));

        // ping round trip orders the assertions after the frames above
        assert!(peer.send("2"));
        assert_eq!(peer.recv().await.as_deref(), Some("3"));

        assert_eq!(total.load(Ordering::SeqCst), 2);
        assert!(manager.is_connected());
        assert_eq!(connector.dials(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_and_refuses_new_connects() {
        let (manager, _connector, mut peers) = manager_with(Dial::Accept, 3);
        manager.connect();
        let mut peer = connected_peer(&manager, &mut peers, "sock-1").await;

        manager.shutdown().await;
        assert_eq!(peer.recv().await.as_deref(), Some("41"));
        assert!(!manager.connect());
        assert!(!manager.reconnect());
    }

    #[test]
    fn heartbeat_echo_appends_connection_id() {
        assert_eq!(
            heartbeat_echo(&json!("abc"), "sid-9"),
            r#"42["heartbeat","abc.sid-9"]"#
        );
    }
}
