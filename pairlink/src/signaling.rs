//! WebSocket client for the `Pairlink` signaling relay.
//!
//! Connects to the relay, learns this connection's participant id from the
//! `connected` greeting, and exposes the room vocabulary (create, join,
//! check, relay, leave) as async methods. Relay events arrive through
//! [`SignalingClient::recv`], fed by a background reader task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use pairlink_proto::codec::CodecError;
use pairlink_proto::signal::{self, ClientEvent, ParticipantId, ServerEvent, SignalKind};

/// Write half of the relay WebSocket.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Read half of the relay WebSocket.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Errors from the signaling client.
#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    /// The relay URL could not be parsed.
    #[error("invalid relay URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The relay URL is not `ws://` or `wss://`.
    #[error("unsupported relay URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Connecting or waiting for the greeting took too long.
    #[error("timed out connecting to relay")]
    Timeout,

    /// The relay could not be reached.
    #[error("relay unreachable: {0}")]
    Unreachable(String),

    /// The relay did not greet the connection as expected.
    #[error("unexpected relay greeting: {0}")]
    Handshake(String),

    /// The relay connection is closed.
    #[error("relay connection closed")]
    ConnectionClosed,

    /// An event could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Lower-level WebSocket or I/O failure.
    #[error("relay I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connected signaling session with the relay.
pub struct SignalingClient {
    /// Id the relay assigned to this connection.
    participant_id: ParticipantId,
    /// Write half of the WebSocket (shared for concurrent sends).
    ws_sender: Mutex<WsSender>,
    /// Events forwarded by the background reader task.
    incoming: Mutex<mpsc::Receiver<ServerEvent>>,
    /// Whether the WebSocket connection is still up.
    connected: Arc<AtomicBool>,
    _reader_handle: tokio::task::JoinHandle<()>,
}

impl SignalingClient {
    /// Connect to the relay at `relay_url` and wait for its greeting.
    ///
    /// # Errors
    ///
    /// - [`SignalingError::InvalidUrl`] / [`SignalingError::UnsupportedScheme`]
    ///   for a bad URL.
    /// - [`SignalingError::Timeout`] if the connection or greeting takes
    ///   longer than `timeout`.
    /// - [`SignalingError::Unreachable`] if nothing is listening.
    /// - [`SignalingError::Handshake`] if the first frame is not `connected`.
    pub async fn connect(relay_url: &str, timeout: Duration) -> Result<Self, SignalingError> {
        let parsed = url::Url::parse(relay_url)?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(SignalingError::UnsupportedScheme(parsed.scheme().to_string()));
        }

        let (ws_stream, _response) = tokio::time::timeout(timeout, connect_async(relay_url))
            .await
            .map_err(|_| {
                tracing::warn!(url = relay_url, "relay connect timed out");
                SignalingError::Timeout
            })?
            .map_err(|e| {
                tracing::warn!(url = relay_url, err = %e, "relay connect failed");
                map_ws_connect_error(relay_url, e)
            })?;

        let (ws_sender, mut ws_reader) = ws_stream.split();

        let greeting = tokio::time::timeout(timeout, ws_reader.next())
            .await
            .map_err(|_| SignalingError::Timeout)?;

        let participant_id = match greeting {
            Some(Ok(Message::Text(text))) => match signal::decode_server(&text) {
                Ok(ServerEvent::Connected { participant_id }) => participant_id,
                Ok(other) => return Err(SignalingError::Handshake(format!("{other:?}"))),
                Err(e) => return Err(SignalingError::Handshake(e.to_string())),
            },
            Some(Ok(Message::Close(_))) | None => return Err(SignalingError::ConnectionClosed),
            Some(Ok(other)) => {
                return Err(SignalingError::Handshake(format!(
                    "non-text greeting frame: {other:?}"
                )));
            }
            Some(Err(e)) => return Err(SignalingError::Io(std::io::Error::other(e))),
        };

        tracing::info!(participant_id = %participant_id, url = relay_url, "connected to relay");

        let (tx, rx) = mpsc::channel(256);
        let connected = Arc::new(AtomicBool::new(true));
        let reader_handle = tokio::spawn(reader_loop(ws_reader, tx, Arc::clone(&connected)));

        Ok(Self {
            participant_id,
            ws_sender: Mutex::new(ws_sender),
            incoming: Mutex::new(rx),
            connected,
            _reader_handle: reader_handle,
        })
    }

    /// Id the relay assigned to this connection.
    pub const fn participant_id(&self) -> &ParticipantId {
        &self.participant_id
    }

    /// Whether the relay connection is still up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Create the room, or join it if it already has one member.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError`] if the event cannot be sent.
    pub async fn create_or_join(&self, room: &str) -> Result<(), SignalingError> {
        self.send_event(&ClientEvent::CreateOrJoin {
            room: room.to_string(),
        })
        .await
    }

    /// Create the room; the relay answers `exists` if it is taken.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError`] if the event cannot be sent.
    pub async fn create(&self, room: &str) -> Result<(), SignalingError> {
        self.send_event(&ClientEvent::Create {
            room: room.to_string(),
        })
        .await
    }

    /// Join an existing room; the relay answers `absence` if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError`] if the event cannot be sent.
    pub async fn join(&self, room: &str) -> Result<(), SignalingError> {
        self.send_event(&ClientEvent::Join {
            room: room.to_string(),
        })
        .await
    }

    /// Ask whether a room exists and how many members it has.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError`] if the event cannot be sent.
    pub async fn check_room(&self, room: &str) -> Result<(), SignalingError> {
        self.send_event(&ClientEvent::CheckRoom {
            room: room.to_string(),
        })
        .await
    }

    /// Relay a handshake payload to the other member of `room`.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError`] if the event cannot be sent.
    pub async fn send_signal(
        &self,
        room: &str,
        kind: SignalKind,
        payload: serde_json::Value,
    ) -> Result<(), SignalingError> {
        self.send_event(&ClientEvent::Message {
            room: room.to_string(),
            kind,
            payload,
        })
        .await
    }

    /// Leave the current room without disconnecting.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError`] if the event cannot be sent.
    pub async fn leave(&self) -> Result<(), SignalingError> {
        self.send_event(&ClientEvent::Leave).await
    }

    /// Wait for the next relay event.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError::ConnectionClosed`] once the reader task
    /// has exited and all buffered events are consumed.
    pub async fn recv(&self) -> Result<ServerEvent, SignalingError> {
        let mut rx = self.incoming.lock().await;
        rx.recv().await.ok_or(SignalingError::ConnectionClosed)
    }

    /// Close the WebSocket. The relay treats this as a disconnect.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError::Io`] if the close frame cannot be sent.
    pub async fn close(&self) -> Result<(), SignalingError> {
        self.connected.store(false, Ordering::Relaxed);
        let mut sender = self.ws_sender.lock().await;
        sender
            .close()
            .await
            .map_err(|e| SignalingError::Io(std::io::Error::other(e)))
    }

    async fn send_event(&self, event: &ClientEvent) -> Result<(), SignalingError> {
        if !self.is_connected() {
            return Err(SignalingError::ConnectionClosed);
        }

        let text = signal::encode_client(event)?;
        let mut sender = self.ws_sender.lock().await;
        sender.send(Message::Text(text.into())).await.map_err(|e| {
            tracing::warn!(err = %e, "relay send failed");
            self.connected.store(false, Ordering::Relaxed);
            SignalingError::ConnectionClosed
        })
    }
}

/// Background task that decodes relay frames and forwards them.
///
/// Undecodable text frames are logged and skipped. Exits when the socket
/// closes or the client is dropped.
async fn reader_loop(
    mut ws_reader: WsReader,
    tx: mpsc::Sender<ServerEvent>,
    connected: Arc<AtomicBool>,
) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match signal::decode_server(&text) {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed relay event, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("relay closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(err = %e, "relay read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    tracing::debug!("relay reader task exiting");
}

/// Map a connection failure to a [`SignalingError`].
fn map_ws_connect_error(url: &str, err: tokio_tungstenite::tungstenite::Error) -> SignalingError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err)
            if matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::AddrNotAvailable
            ) =>
        {
            SignalingError::Unreachable(url.to_string())
        }
        WsError::Io(io_err) => SignalingError::Io(io_err),
        WsError::Http(response) => SignalingError::Io(std::io::Error::other(format!(
            "relay HTTP error: status {}",
            response.status()
        ))),
        other => SignalingError::Io(std::io::Error::other(format!(
            "relay connection error: {other}"
        ))),
    }
}
