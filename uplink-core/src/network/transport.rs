//! Message transport to the signaling server.
//!
//! [`Transport`] is the seam the session loops talk through: one
//! bidirectional, message-framed connection. [`WsTransport`] implements
//! it over a WebSocket, [`WsConnector`] opens one per connection cycle.
//!
//! Sending and receiving are guarded by separate async mutexes, so the
//! control channel can block on `recv` while the frame uplink keeps
//! sending.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::error::UplinkError;
use crate::message::{InboundMessage, OutboundMessage};

// ── Constants ────────────────────────────────────────────────────

/// Upper bound on the WebSocket opening handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on flushing the close frame.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// ── Traits ───────────────────────────────────────────────────────

/// A single message-framed connection, exclusively owned by one session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one message. Any failure means the connection is gone.
    async fn send(&self, message: &OutboundMessage) -> Result<(), UplinkError>;

    /// Wait for the next inbound message.
    ///
    /// Returns [`UplinkError::TransportClosed`] once the peer closes or
    /// the read fails.
    async fn recv(&self) -> Result<InboundMessage, UplinkError>;

    /// Close the connection. Idempotent, never fails.
    async fn close(&self);
}

/// Opens a fresh [`Transport`] for every connection cycle.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Transport>, UplinkError>;
}

// ── WsTransport ──────────────────────────────────────────────────

/// [`Transport`] over a `tokio-tungstenite` WebSocket.
///
/// Generic over the byte stream so it works for client connections
/// (`MaybeTlsStream<TcpStream>`) as well as accepted server sockets.
pub struct WsTransport<S> {
    sink: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    stream: Mutex<SplitStream<WebSocketStream<S>>>,
    closed: AtomicBool,
}

impl<S> WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap an established WebSocket.
    pub fn new(ws: WebSocketStream<S>) -> Self {
        let (sink, stream) = ws.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            closed: AtomicBool::new(false),
        }
    }

    /// Whether [`close`](Transport::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, message: &OutboundMessage) -> Result<(), UplinkError> {
        if self.is_closed() {
            return Err(UplinkError::TransportClosed("closed locally".into()));
        }
        let text = message.to_json()?;
        self.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| UplinkError::TransportClosed(format!("send {}: {e}", message.kind())))
    }

    async fn recv(&self) -> Result<InboundMessage, UplinkError> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(InboundMessage::from_text(&text)),
                Some(Ok(Message::Binary(data))) => {
                    return Ok(match String::from_utf8(data) {
                        Ok(text) => InboundMessage::from_text(&text),
                        Err(e) => InboundMessage::unrecognized(&format!(
                            "<{} binary bytes>",
                            e.as_bytes().len()
                        )),
                    });
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("closed by server ({}): {}", f.code, f.reason))
                        .unwrap_or_else(|| "closed by server".into());
                    return Err(UplinkError::TransportClosed(reason));
                }
                // Control frames are answered by tungstenite itself.
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(UplinkError::TransportClosed("stream ended".into())),
            }
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut sink = self.sink.lock().await;
        match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
            Ok(Ok(())) => debug!("websocket closed"),
            Ok(Err(e)) => debug!("websocket close: {e}"),
            Err(_) => debug!("websocket close timed out"),
        }
    }
}

// ── WsConnector ──────────────────────────────────────────────────

/// Opens plain `ws://` client connections.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    /// Override the handshake deadline.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Transport>, UplinkError> {
        let connect_err = |reason: String| UplinkError::TransportConnect {
            endpoint: endpoint.to_string(),
            reason,
        };

        let (ws, response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(endpoint))
                .await
                .map_err(|_| connect_err(format!("timed out after {:?}", self.connect_timeout)))?
                .map_err(|e| connect_err(e.to_string()))?;

        debug!(status = %response.status(), "websocket handshake complete");
        Ok(Arc::new(WsTransport::new(ws)))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    /// Accept one WebSocket on an ephemeral port; returns the client URL
    /// and the pending server side.
    async fn ephemeral_server() -> (
        String,
        tokio::task::JoinHandle<WebSocketStream<TcpStream>>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio_tungstenite::accept_async(stream).await.unwrap()
        });
        (url, handle)
    }

    #[tokio::test]
    async fn send_and_receive_json_messages() {
        let (url, server) = ephemeral_server().await;
        let client = WsConnector::new().connect(&url).await.unwrap();
        let mut server = server.await.unwrap();

        client.send(&OutboundMessage::ping(42.0)).await.unwrap();
        let got = server.next().await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(got.to_text().unwrap()).unwrap();
        assert_eq!(value["type"], "ping");
        assert_eq!(value["timestamp"], 42.0);

        server
            .send(Message::Text(r#"{"type":"pong","timestamp":42.0}"#.into()))
            .await
            .unwrap();
        assert_eq!(
            client.recv().await.unwrap(),
            InboundMessage::Pong { timestamp: 42.0 }
        );
    }

    #[tokio::test]
    async fn malformed_and_binary_messages_are_unrecognized() {
        let (url, server) = ephemeral_server().await;
        let client = WsConnector::new().connect(&url).await.unwrap();
        let mut server = server.await.unwrap();

        server.send(Message::Text("garbage".into())).await.unwrap();
        server
            .send(Message::Binary(vec![0xff, 0xfe, 0x00]))
            .await
            .unwrap();
        server
            .send(Message::Binary(br#"{"type":"pong","timestamp":1}"#.to_vec()))
            .await
            .unwrap();

        assert!(matches!(
            client.recv().await.unwrap(),
            InboundMessage::Unrecognized(_)
        ));
        assert!(matches!(
            client.recv().await.unwrap(),
            InboundMessage::Unrecognized(_)
        ));
        assert_eq!(
            client.recv().await.unwrap(),
            InboundMessage::Pong { timestamp: 1.0 }
        );
    }

    #[tokio::test]
    async fn server_close_surfaces_transport_closed() {
        let (url, server) = ephemeral_server().await;
        let client = WsConnector::new().connect(&url).await.unwrap();
        let mut server = server.await.unwrap();

        server.close(None).await.unwrap();
        let err = client.recv().await.unwrap_err();
        assert!(matches!(err, UplinkError::TransportClosed(_)), "{err}");
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (url, server) = ephemeral_server().await;
        let client = WsConnector::new().connect(&url).await.unwrap();
        let _server = server.await.unwrap();

        client.close().await;
        client.close().await;
        let err = client.send(&OutboundMessage::ping(1.0)).await.unwrap_err();
        assert!(matches!(err, UplinkError::TransportClosed(_)));
    }

    #[tokio::test]
    async fn refused_connection_is_connect_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = match WsConnector::new().connect(&url).await {
            Err(e) => e,
            Ok(_) => panic!("connected to a closed port"),
        };
        assert!(matches!(err, UplinkError::TransportConnect { .. }), "{err}");
    }
}
