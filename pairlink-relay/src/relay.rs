//! Relay server core: shared state, WebSocket handler, and event dispatch.
//!
//! Every WebSocket connection becomes one participant with a fresh
//! [`ParticipantId`]. Text frames are decoded as [`ClientEvent`]s and
//! applied to the [`SessionRegistry`]; the resulting deliveries are queued
//! on the addressed participants' writer channels before the registry lock
//! is released, so every participant observes events in registry order.
//! Disconnecting leaves the room.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use pairlink_proto::signal::{self, ClientEvent, ParticipantId, ServerEvent};
use tokio::sync::{Mutex, RwLock, mpsc};
use uuid::Uuid;

use crate::registry::{Delivery, SessionRegistry};

/// Default maximum accepted size of one client text frame (64 KB).
const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Shared relay server state: live connections and the room table.
pub struct RelayState {
    /// Maps each participant to the channel feeding its WebSocket writer.
    connections: RwLock<HashMap<ParticipantId, mpsc::UnboundedSender<Message>>>,
    /// Room table. One lock for the whole table keeps each
    /// create/join/leave atomic. Lock order: `registry`, then `connections`.
    pub registry: Mutex<SessionRegistry>,
    /// Maximum accepted client frame size in bytes.
    max_message_size: usize,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Creates relay state with an empty room table and default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Creates relay state with a custom client frame size limit.
    #[must_use]
    pub fn with_config(max_message_size: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            registry: Mutex::new(SessionRegistry::new()),
            max_message_size,
        }
    }

    /// Registers the writer channel for a participant.
    pub async fn register(
        &self,
        participant: &ParticipantId,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Option<mpsc::UnboundedSender<Message>> {
        let mut conns = self.connections.write().await;
        conns.insert(participant.clone(), sender)
    }

    /// Removes a participant's writer channel, returning it if it existed.
    pub async fn unregister(
        &self,
        participant: &ParticipantId,
    ) -> Option<mpsc::UnboundedSender<Message>> {
        let mut conns = self.connections.write().await;
        conns.remove(participant)
    }

    /// Returns a clone of the writer channel for a participant, if connected.
    pub async fn get_sender(
        &self,
        participant: &ParticipantId,
    ) -> Option<mpsc::UnboundedSender<Message>> {
        let conns = self.connections.read().await;
        conns.get(participant).cloned()
    }

    /// Number of currently connected participants.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

/// Handles an upgraded WebSocket connection for a single participant.
///
/// The connection lifecycle:
/// 1. Assign a participant id and register a writer channel.
/// 2. Send `connected` with the id.
/// 3. Apply each incoming client event to the registry.
/// 4. On disconnect, leave the room and notify the remaining member.
pub async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let participant = ParticipantId::new(Uuid::now_v7().to_string());

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.register(&participant, tx).await;
    tracing::info!(participant_id = %participant, "participant connected");

    send_event(
        &state,
        &participant,
        &ServerEvent::Connected {
            participant_id: participant.clone(),
        },
    )
    .await;

    let writer_participant = participant.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(participant_id = %writer_participant, "WebSocket write failed");
                break;
            }
        }
    });

    let reader_participant = participant.clone();
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_text_message(&reader_participant, text.as_str(), &reader_state).await;
                }
                Message::Close(_) => {
                    tracing::info!(participant_id = %reader_participant, "received close frame");
                    break;
                }
                Message::Binary(data) => {
                    tracing::debug!(
                        participant_id = %reader_participant,
                        len = data.len(),
                        "ignoring binary frame"
                    );
                }
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    {
        let mut registry = state.registry.lock().await;
        let deliveries = registry.leave(&participant);
        state.unregister(&participant).await;
        dispatch(&state, deliveries).await;
    }
    tracing::info!(participant_id = %participant, "participant disconnected");
}

/// Decodes one client text frame and applies it.
async fn handle_text_message(participant: &ParticipantId, text: &str, state: &Arc<RelayState>) {
    if text.len() > state.max_message_size {
        tracing::warn!(
            participant_id = %participant,
            size = text.len(),
            max = state.max_message_size,
            "message exceeds size limit"
        );
        let err = ServerEvent::Error {
            reason: format!(
                "message too large: {} bytes (max {})",
                text.len(),
                state.max_message_size
            ),
        };
        send_event(state, participant, &err).await;
        return;
    }

    let event = match signal::decode_client(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(participant_id = %participant, error = %e, "failed to decode client event");
            let err = ServerEvent::Error {
                reason: format!("malformed event: {e}"),
            };
            send_event(state, participant, &err).await;
            return;
        }
    };

    let mut registry = state.registry.lock().await;
    let deliveries = match event {
        ClientEvent::CreateOrJoin { room } => {
            tracing::debug!(participant_id = %participant, room = %room, "create-or-join");
            registry.create_or_join(&room, participant)
        }
        ClientEvent::Create { room } => {
            tracing::debug!(participant_id = %participant, room = %room, "create");
            registry.create(&room, participant)
        }
        ClientEvent::Join { room } => {
            tracing::debug!(participant_id = %participant, room = %room, "join");
            registry.join(&room, participant)
        }
        ClientEvent::CheckRoom { room } => {
            let status = registry.check_room(&room);
            tracing::debug!(
                participant_id = %participant,
                room = %room,
                exists = status.exists,
                member_count = status.member_count,
                "replying with room status"
            );
            vec![Delivery {
                to: participant.clone(),
                event: status.into(),
            }]
        }
        ClientEvent::Message {
            room,
            kind,
            payload,
        } => {
            tracing::debug!(participant_id = %participant, room = %room, kind = %kind, "relaying signal");
            registry.relay(&room, participant, kind, &payload)
        }
        ClientEvent::Leave => registry.leave(participant),
    };

    // Queued under the registry lock: writer channels are unbounded, so
    // this never waits on a socket.
    dispatch(state, deliveries).await;
    drop(registry);
}

/// Queues each delivery on its recipient's writer channel.
async fn dispatch(state: &Arc<RelayState>, deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        send_event(state, &delivery.to, &delivery.event).await;
    }
}

/// Encodes a server event and queues it on a participant's writer channel.
///
/// Recipients that have already disconnected are skipped.
async fn send_event(state: &RelayState, participant: &ParticipantId, event: &ServerEvent) {
    let Some(sender) = state.get_sender(participant).await else {
        tracing::debug!(participant_id = %participant, "recipient no longer connected");
        return;
    };
    match signal::encode_server(event) {
        Ok(text) => {
            let _ = sender.send(Message::Text(text.into()));
        }
        Err(e) => {
            tracing::error!(participant_id = %participant, error = %e, "failed to encode server event");
        }
    }
}

/// Starts the relay server on the given address and returns the bound address
/// and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(RelayState::new())).await
}

/// Starts the relay server with a pre-configured [`RelayState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .route("/health", axum::routing::get(|| async { "ok" }))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<RelayState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
