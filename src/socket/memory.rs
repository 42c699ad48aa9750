//! In-memory transport
//!
//! Each accepted dial hands a [`MemoryPeer`] (the "server" end) to whoever
//! holds the receiver. Used by the test suites and for running without a
//! remote service.

use crate::error::SyncError;
use crate::socket::packet::Packet;
use crate::socket::transport::{Connector, Transport};

use futures::channel::mpsc as fmpsc;
use futures::future::{self, BoxFuture};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

/// What the next dial does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dial {
    /// Open a transport and hand its peer end out
    Accept,
    /// Fail like a refused TCP connection
    Refuse,
    /// Fail like a refused credential
    Reject,
    /// Never complete
    Hang,
}

pub struct MemoryConnector {
    plan: Mutex<VecDeque<Dial>>,
    fallback: Dial,
    dials: AtomicUsize,
    last_url: Mutex<Option<Url>>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

impl MemoryConnector {
    /// `fallback` applies once the queued plan is exhausted.
    pub fn new(fallback: Dial) -> (Arc<Self>, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            plan: Mutex::new(VecDeque::new()),
            fallback,
            dials: AtomicUsize::new(0),
            last_url: Mutex::new(None),
            peers,
        });
        (connector, rx)
    }

    /// Queue the outcome of the next unplanned dial.
    pub fn push(&self, dial: Dial) {
        self.plan.lock().push_back(dial);
    }

    /// Number of connect calls so far.
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn last_url(&self) -> Option<Url> {
        self.last_url.lock().clone()
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, url: Url) -> BoxFuture<'static, Result<Transport, SyncError>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let host = url.host_str().unwrap_or_default().to_string();
        *self.last_url.lock() = Some(url);
        let dial = self.plan.lock().pop_front().unwrap_or(self.fallback);

        match dial {
            Dial::Accept => {
                let (to_client, client_rx) = fmpsc::unbounded::<Result<String, SyncError>>();
                let (client_tx, from_client) = fmpsc::unbounded::<String>();

                let peer = MemoryPeer {
                    to_client,
                    from_client,
                };
                if self.peers.send(peer).is_err() {
                    return Box::pin(future::ready(Err(SyncError::Transport(
                        "memory peer receiver dropped".to_string(),
                    ))));
                }

                let transport = Transport {
                    sink: Box::pin(
                        client_tx.sink_map_err(|e| SyncError::Transport(e.to_string())),
                    ),
                    stream: Box::pin(client_rx),
                };
                Box::pin(future::ready(Ok(transport)))
            }
            Dial::Refuse => Box::pin(future::ready(Err(SyncError::Connect {
                host,
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )),
            }))),
            Dial::Reject => Box::pin(future::ready(Err(SyncError::Rejected {
                reason: "invalid server token".to_string(),
            }))),
            Dial::Hang => Box::pin(future::pending()),
        }
    }
}

/// Server end of an in-memory transport. Dropping it closes the transport.
pub struct MemoryPeer {
    to_client: fmpsc::UnboundedSender<Result<String, SyncError>>,
    from_client: fmpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Push a raw frame to the client. Returns false once the client is gone.
    pub fn send(&self, frame: impl Into<String>) -> bool {
        self.to_client.unbounded_send(Ok(frame.into())).is_ok()
    }

    pub fn send_packet(&self, packet: &Packet) -> bool {
        self.send(packet.encode())
    }

    /// Inject a transport-level read error.
    pub fn fail(&self, message: &str) -> bool {
        self.to_client
            .unbounded_send(Err(SyncError::Transport(message.to_string())))
            .is_ok()
    }

    /// Next frame written by the client; `None` once it closed its sink.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.next().await
    }

    /// Play the server side of the Engine.IO + Socket.IO handshake.
    pub async fn accept(&mut self, sid: &str) -> bool {
        let open = serde_json::json!({
            "sid": format!("engine-{sid}"),
            "upgrades": [],
            "pingInterval": 25_000,
            "pingTimeout": 20_000,
            "maxPayload": 1_000_000,
        });
        if !self.send(format!("0{open}")) {
            return false;
        }
        match self.recv().await {
            Some(frame) if frame == "40" => {}
            _ => return false,
        }
        self.send(format!("40{}", serde_json::json!({ "sid": sid })))
    }

    /// Play the handshake but refuse the namespace connect.
    pub async fn refuse(&mut self, message: &str) -> bool {
        let open =
            r#"0{"sid":"engine-refused","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;
        if !self.send(open) {
            return false;
        }
        let _ = self.recv().await;
        self.send_packet(&Packet::ConnectError {
            message: message.to_string(),
        })
    }

    /// Close the transport from the server side without a socket-level disconnect.
    pub fn drop_connection(self) {
        drop(self);
    }
}
