//! Relay event vocabulary.
//!
//! Clients and the relay exchange JSON text frames of the form
//! `{"event": "<name>", ...fields}`. [`ClientEvent`] covers everything a
//! client may send; [`ServerEvent`] everything the relay may emit.
//! Signaling payloads are carried as opaque [`serde_json::Value`]s; the
//! relay never looks inside them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{self, CodecError};

/// Identifier the relay assigns to a connection for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Creates a participant id from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string form of this id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of handshake payload being relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// Session-description offer.
    Offer,
    /// Session-description answer.
    Answer,
    /// Connectivity candidate.
    Candidate,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offer => f.write_str("offer"),
            Self::Answer => f.write_str("answer"),
            Self::Candidate => f.write_str("candidate"),
        }
    }
}

/// Events sent from a client to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Create the room if it is unseen, otherwise join it.
    CreateOrJoin {
        /// Target room name.
        room: String,
    },

    /// Create a room; answered with `exists` if the name is taken.
    Create {
        /// Target room name.
        room: String,
    },

    /// Join an existing room; answered with `absence` if it does not exist.
    Join {
        /// Target room name.
        room: String,
    },

    /// Query room status. Does not change any state.
    CheckRoom {
        /// Room name to inspect.
        room: String,
    },

    /// Relay a handshake payload to the other member of a room.
    Message {
        /// Room the sender belongs to.
        room: String,
        /// What kind of payload this is.
        #[serde(rename = "type")]
        kind: SignalKind,
        /// Opaque session description or candidate.
        payload: serde_json::Value,
    },

    /// Leave the current room without disconnecting.
    Leave,
}

/// Events sent from the relay to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// First frame on every connection; tells the client its id.
    Connected {
        /// Id assigned to this connection.
        participant_id: ParticipantId,
    },

    /// The requester created the room and is its only member.
    Created {
        /// Room name.
        room: String,
        /// The requester's id.
        participant_id: ParticipantId,
    },

    /// The requester joined as the second member.
    Joined {
        /// Room name.
        room: String,
        /// The requester's id.
        participant_id: ParticipantId,
    },

    /// `create` was sent for a room that already exists.
    Exists {
        /// Room name.
        room: String,
    },

    /// `join` was sent for a room that does not exist.
    Absence {
        /// Room name.
        room: String,
    },

    /// Both members are present; the handshake may begin.
    Ready {
        /// Room name.
        room: String,
    },

    /// The room already has two members.
    Full {
        /// Room name.
        room: String,
    },

    /// Reply to `check-room`.
    RoomStatus {
        /// Room name.
        room: String,
        /// Whether the room currently exists.
        exists: bool,
        /// Number of members (0 when absent).
        member_count: usize,
    },

    /// A handshake payload relayed from the other member.
    Message {
        /// What kind of payload this is.
        #[serde(rename = "type")]
        kind: SignalKind,
        /// Opaque session description or candidate.
        payload: serde_json::Value,
    },

    /// The room's creator left and the room was torn down.
    RoomClosed {
        /// Room name.
        room: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The non-creator member left; the room stays open.
    PeerLeft {
        /// Room name.
        room: String,
        /// Id of the member who left.
        participant_id: ParticipantId,
    },

    /// The request could not be processed.
    Error {
        /// Human-readable reason.
        reason: String,
    },
}

/// Encodes a [`ClientEvent`] as a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError`] if serialization fails.
pub fn encode_client(event: &ClientEvent) -> Result<String, CodecError> {
    codec::encode(event)
}

/// Decodes a [`ClientEvent`] from a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError`] if the frame is not a known client event.
pub fn decode_client(text: &str) -> Result<ClientEvent, CodecError> {
    codec::decode(text)
}

/// Encodes a [`ServerEvent`] as a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError`] if serialization fails.
pub fn encode_server(event: &ServerEvent) -> Result<String, CodecError> {
    codec::encode(event)
}

/// Decodes a [`ServerEvent`] from a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError`] if the frame is not a known server event.
pub fn decode_server(text: &str) -> Result<ServerEvent, CodecError> {
    codec::decode(text)
}
