//! Duplex text-frame transport
//!
//! The connection manager only sees a sink and a stream of text frames.
//! `WebSocketConnector` provides them over tokio-tungstenite.

use crate::error::SyncError;
use futures::future::{self, BoxFuture};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, http::StatusCode, Message};
use url::Url;

pub type FrameSink = Pin<Box<dyn Sink<String, Error = SyncError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, SyncError>> + Send>>;

/// An open transport. The stream ending means the peer closed it.
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens transports. Implementations must not log the URL's query string.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: Url) -> BoxFuture<'static, Result<Transport, SyncError>>;
}

/// WebSocket transport (ws:// or wss://)
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect(&self, url: Url) -> BoxFuture<'static, Result<Transport, SyncError>> {
        Box::pin(async move {
            let host = url.host_str().unwrap_or_default().to_string();
            let (ws, _response) = connect_async(url.as_str())
                .await
                .map_err(|e| classify_connect_error(host, e))?;

            let (sink, stream) = ws.split();

            let sink = sink
                .with(|text: String| {
                    future::ready(Ok::<_, tungstenite::Error>(Message::Text(text.into())))
                })
                .sink_map_err(|e| SyncError::Transport(e.to_string()));

            let stream = stream.filter_map(|message| {
                future::ready(match message {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    // Close is followed by the end of the stream
                    Ok(_) => None,
                    Err(e) => Some(Err(SyncError::Transport(e.to_string()))),
                })
            });

            Ok(Transport {
                sink: Box::pin(sink),
                stream: Box::pin(stream),
            })
        })
    }
}

/// 401/403 on the upgrade request means the credential was refused.
fn classify_connect_error(host: String, error: tungstenite::Error) -> SyncError {
    if let tungstenite::Error::Http(response) = &error {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return SyncError::Rejected {
                reason: format!("upgrade refused with HTTP {}", status.as_u16()),
            };
        }
    }

    SyncError::Connect {
        host,
        source: Box::new(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_plain_connect_failures() {
        let err = classify_connect_error(
            "voice.example.com".to_string(),
            tungstenite::Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )),
        );
        assert!(matches!(err, SyncError::Connect { ref host, .. } if host == "voice.example.com"));
        assert!(err.is_retryable());
    }
}
