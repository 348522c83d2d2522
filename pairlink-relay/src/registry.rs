//! Session registry: room membership for two-peer pairing.
//!
//! Maintains an in-memory table of rooms keyed by client-supplied name.
//! Each room holds at most [`MAX_MEMBERS`] participants; the first member
//! is the creator. Every operation is plain bookkeeping that returns the
//! [`Delivery`] list the caller must dispatch, so the registry itself never
//! touches a socket.
//!
//! Disconnects use creator-privileged teardown: when the creator leaves the
//! room is deleted and the other member is released with `room-closed`;
//! when the joiner leaves only the joiner is removed and the creator is
//! told with `peer-left`.
//!
//! Room entries are ephemeral and lost on relay restart.

use std::collections::HashMap;

use pairlink_proto::signal::{ParticipantId, ServerEvent, SignalKind};

/// Maximum number of participants in one room.
pub const MAX_MEMBERS: usize = 2;

/// Reason sent with `room-closed` when the creator leaves.
pub const CREATOR_LEFT_REASON: &str = "Creator has left.";

/// A notification addressed to one participant.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Recipient.
    pub to: ParticipantId,
    /// Event to send.
    pub event: ServerEvent,
}

impl Delivery {
    fn new(to: &ParticipantId, event: ServerEvent) -> Self {
        Self {
            to: to.clone(),
            event,
        }
    }
}

/// Answer to a `check-room` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomStatus {
    /// Room name as queried.
    pub room: String,
    /// Whether the room exists.
    pub exists: bool,
    /// Current number of members.
    pub member_count: usize,
}

impl From<RoomStatus> for ServerEvent {
    fn from(status: RoomStatus) -> Self {
        Self::RoomStatus {
            room: status.room,
            exists: status.exists,
            member_count: status.member_count,
        }
    }
}

/// Errors reported back to the requesting participant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The participant already belongs to a different room.
    #[error("already a member of room '{0}'")]
    AlreadyInRoom(String),
}

#[derive(Debug, Default)]
struct Room {
    /// Ordered membership; index 0 is the creator.
    members: Vec<ParticipantId>,
}

impl Room {
    fn is_creator(&self, participant: &ParticipantId) -> bool {
        self.members.first() == Some(participant)
    }
}

/// In-memory room table.
///
/// Not internally synchronized: the relay wraps it in a single mutex so that
/// each create/join/leave read-then-write runs to completion before the next.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    rooms: HashMap<String, Room>,
    /// Reverse index; a participant is in at most one room.
    memberships: HashMap<ParticipantId, String>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the room if it is unseen, otherwise joins it.
    ///
    /// - absent room: requester becomes creator and gets `created`.
    /// - one member: requester gets `joined`, both members get `ready`.
    /// - two members: requester gets `full`, nothing changes.
    pub fn create_or_join(&mut self, room: &str, participant: &ParticipantId) -> Vec<Delivery> {
        if let Some(reply) = self.check_existing_membership(room, participant) {
            return vec![reply];
        }
        if self.rooms.contains_key(room) {
            self.admit(room, participant)
        } else {
            vec![self.open(room, participant)]
        }
    }

    /// Creates a room, answering `exists` if the name is already taken.
    pub fn create(&mut self, room: &str, participant: &ParticipantId) -> Vec<Delivery> {
        if let Some(reply) = self.check_existing_membership(room, participant) {
            return vec![reply];
        }
        if self.rooms.contains_key(room) {
            tracing::info!(room = %room, participant_id = %participant, "room already exists");
            return vec![Delivery::new(
                participant,
                ServerEvent::Exists {
                    room: room.to_string(),
                },
            )];
        }
        vec![self.open(room, participant)]
    }

    /// Joins an existing room, answering `absence` if there is none.
    pub fn join(&mut self, room: &str, participant: &ParticipantId) -> Vec<Delivery> {
        if let Some(reply) = self.check_existing_membership(room, participant) {
            return vec![reply];
        }
        if !self.rooms.contains_key(room) {
            tracing::info!(room = %room, participant_id = %participant, "join for absent room");
            return vec![Delivery::new(
                participant,
                ServerEvent::Absence {
                    room: room.to_string(),
                },
            )];
        }
        self.admit(room, participant)
    }

    /// Reports whether a room exists and how many members it has.
    #[must_use]
    pub fn check_room(&self, room: &str) -> RoomStatus {
        let member_count = self.member_count(room);
        RoomStatus {
            room: room.to_string(),
            exists: member_count > 0,
            member_count,
        }
    }

    /// Forwards a handshake payload to every other member of `room`.
    ///
    /// Returns no deliveries when the room is absent or the sender is not
    /// one of its members. The sender never receives its own message.
    #[must_use]
    pub fn relay(
        &self,
        room: &str,
        sender: &ParticipantId,
        kind: SignalKind,
        payload: &serde_json::Value,
    ) -> Vec<Delivery> {
        let Some(entry) = self.rooms.get(room) else {
            tracing::debug!(room = %room, participant_id = %sender, "relay to absent room dropped");
            return Vec::new();
        };
        if !entry.members.contains(sender) {
            tracing::debug!(room = %room, participant_id = %sender, "relay from non-member dropped");
            return Vec::new();
        }
        entry
            .members
            .iter()
            .filter(|member| *member != sender)
            .map(|member| {
                Delivery::new(
                    member,
                    ServerEvent::Message {
                        kind,
                        payload: payload.clone(),
                    },
                )
            })
            .collect()
    }

    /// Removes a participant from whatever room it is in.
    ///
    /// Returns the teardown notifications for the remaining member, or
    /// nothing if the participant was not in a room.
    pub fn leave(&mut self, participant: &ParticipantId) -> Vec<Delivery> {
        let Some(room_name) = self.memberships.remove(participant) else {
            return Vec::new();
        };
        let Some(room) = self.rooms.get_mut(&room_name) else {
            tracing::warn!(room = %room_name, participant_id = %participant, "membership pointed at missing room");
            return Vec::new();
        };

        if room.is_creator(participant) {
            let Some(room) = self.rooms.remove(&room_name) else {
                return Vec::new();
            };
            tracing::info!(room = %room_name, participant_id = %participant, "creator left, room deleted");
            return room
                .members
                .iter()
                .filter(|member| *member != participant)
                .map(|member| {
                    self.memberships.remove(member);
                    Delivery::new(
                        member,
                        ServerEvent::RoomClosed {
                            room: room_name.clone(),
                            reason: CREATOR_LEFT_REASON.to_string(),
                        },
                    )
                })
                .collect();
        }

        room.members.retain(|member| member != participant);
        let remaining = room.members.clone();
        if remaining.is_empty() {
            self.rooms.remove(&room_name);
        }
        tracing::info!(
            room = %room_name,
            participant_id = %participant,
            remaining = remaining.len(),
            "joiner left room"
        );
        remaining
            .iter()
            .map(|member| {
                Delivery::new(
                    member,
                    ServerEvent::PeerLeft {
                        room: room_name.clone(),
                        participant_id: participant.clone(),
                    },
                )
            })
            .collect()
    }

    /// Number of rooms currently open.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of members in `room`, 0 if it does not exist.
    #[must_use]
    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map_or(0, |r| r.members.len())
    }

    /// Ordered member list of `room`; the creator comes first.
    #[must_use]
    pub fn members(&self, room: &str) -> Option<&[ParticipantId]> {
        self.rooms.get(room).map(|r| r.members.as_slice())
    }

    /// Name of the room `participant` belongs to, if any.
    #[must_use]
    pub fn room_of(&self, participant: &ParticipantId) -> Option<&str> {
        self.memberships.get(participant).map(String::as_str)
    }

    /// Handles a request from a participant that is already seated somewhere.
    ///
    /// Re-requesting the same room repeats the original role reply without
    /// touching state; asking for another room is refused.
    fn check_existing_membership(
        &self,
        room: &str,
        participant: &ParticipantId,
    ) -> Option<Delivery> {
        let current = self.memberships.get(participant)?;
        if current != room {
            tracing::warn!(
                participant_id = %participant,
                current = %current,
                requested = %room,
                "participant already seated in another room"
            );
            let err = RegistryError::AlreadyInRoom(current.clone());
            return Some(Delivery::new(
                participant,
                ServerEvent::Error {
                    reason: err.to_string(),
                },
            ));
        }
        let is_creator = self.rooms.get(room).is_some_and(|r| r.is_creator(participant));
        let event = if is_creator {
            ServerEvent::Created {
                room: room.to_string(),
                participant_id: participant.clone(),
            }
        } else {
            ServerEvent::Joined {
                room: room.to_string(),
                participant_id: participant.clone(),
            }
        };
        Some(Delivery::new(participant, event))
    }

    fn open(&mut self, room: &str, participant: &ParticipantId) -> Delivery {
        self.rooms.insert(
            room.to_string(),
            Room {
                members: vec![participant.clone()],
            },
        );
        self.memberships
            .insert(participant.clone(), room.to_string());
        tracing::info!(room = %room, participant_id = %participant, "room created");
        Delivery::new(
            participant,
            ServerEvent::Created {
                room: room.to_string(),
                participant_id: participant.clone(),
            },
        )
    }

    fn admit(&mut self, room: &str, participant: &ParticipantId) -> Vec<Delivery> {
        let Some(entry) = self.rooms.get_mut(room) else {
            return Vec::new();
        };
        if entry.members.len() >= MAX_MEMBERS {
            tracing::info!(room = %room, participant_id = %participant, "room is full");
            return vec![Delivery::new(
                participant,
                ServerEvent::Full {
                    room: room.to_string(),
                },
            )];
        }

        entry.members.push(participant.clone());
        self.memberships
            .insert(participant.clone(), room.to_string());
        tracing::info!(
            room = %room,
            participant_id = %participant,
            members = entry.members.len(),
            "participant joined room"
        );

        let mut deliveries = vec![Delivery::new(
            participant,
            ServerEvent::Joined {
                room: room.to_string(),
                participant_id: participant.clone(),
            },
        )];
        deliveries.extend(entry.members.iter().map(|member| {
            Delivery::new(
                member,
                ServerEvent::Ready {
                    room: room.to_string(),
                },
            )
        }));
        deliveries
    }
}
