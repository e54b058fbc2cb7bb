//! Real-time event payloads
//!
//! Inbound events are decoded from Socket.IO event frames into
//! `ServerEvent`; outbound emits are built from `ClientEvent`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::models::{MediaItem, Message, Room, RoomId, UserId};

/// Accept numeric ids sent either as numbers or as numeric strings.
fn lenient_id<'de, D: Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Num(i64),
        Str(String),
    }
    match Id::deserialize(de)? {
        Id::Num(n) => Ok(n),
        Id::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// A user acknowledged a message (and, implicitly, everything before it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesRead {
    #[serde(deserialize_with = "lenient_id")]
    pub room_id: RoomId,
    pub message_id: String,
    #[serde(deserialize_with = "lenient_id")]
    pub user_id: UserId,
    /// Absent on older servers; the merge-time clock is used instead.
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

/// Authoritative unread counter for one room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountUpdate {
    #[serde(deserialize_with = "lenient_id")]
    pub room_id: RoomId,
    pub unread_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusChanged {
    #[serde(deserialize_with = "lenient_id")]
    pub user_id: UserId,
    pub is_online: bool,
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// Payload of both `user-joined` and `user-left`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMemberChange {
    #[serde(deserialize_with = "lenient_id")]
    pub user_id: UserId,
    #[serde(deserialize_with = "lenient_id")]
    pub room_id: RoomId,
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTyping {
    #[serde(deserialize_with = "lenient_id")]
    pub room_id: RoomId,
    #[serde(deserialize_with = "lenient_id")]
    pub user_id: UserId,
    pub user_name: String,
    pub is_typing: bool,
}

/// Event category, used to filter subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Connection lifecycle (connected, disconnected, connect error)
    Connection,
    NewMessage,
    MessagesRead,
    UnreadCountUpdate,
    RoomUpdated,
    UserStatusChanged,
    UserJoined,
    UserLeft,
    UserTyping,
    /// Matches every event
    All,
}

impl EventKind {
    pub fn matches(&self, event: &ServerEvent) -> bool {
        *self == EventKind::All || *self == event.kind()
    }
}

/// Inbound event, decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Connected,
    Disconnected { reason: String },
    ConnectError { message: String },
    NewMessage(Box<Message>),
    MessagesRead(MessagesRead),
    UnreadCountUpdate(UnreadCountUpdate),
    RoomUpdated(Box<Room>),
    UserStatusChanged(UserStatusChanged),
    UserJoined(RoomMemberChange),
    UserLeft(RoomMemberChange),
    UserTyping(UserTyping),
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::Connected
            | ServerEvent::Disconnected { .. }
            | ServerEvent::ConnectError { .. } => EventKind::Connection,
            ServerEvent::NewMessage(_) => EventKind::NewMessage,
            ServerEvent::MessagesRead(_) => EventKind::MessagesRead,
            ServerEvent::UnreadCountUpdate(_) => EventKind::UnreadCountUpdate,
            ServerEvent::RoomUpdated(_) => EventKind::RoomUpdated,
            ServerEvent::UserStatusChanged(_) => EventKind::UserStatusChanged,
            ServerEvent::UserJoined(_) => EventKind::UserJoined,
            ServerEvent::UserLeft(_) => EventKind::UserLeft,
            ServerEvent::UserTyping(_) => EventKind::UserTyping,
        }
    }

    /// Decode a named event. Unknown names yield `Ok(None)`.
    pub fn decode(name: &str, payload: Value) -> Result<Option<Self>, serde_json::Error> {
        let event = match name {
            "new-message" => ServerEvent::NewMessage(Box::new(serde_json::from_value(payload)?)),
            // Servers emit either spelling.
            "messages-read" | "message-read" => {
                ServerEvent::MessagesRead(serde_json::from_value(payload)?)
            }
            "unread-count-update" => ServerEvent::UnreadCountUpdate(serde_json::from_value(payload)?),
            "room-updated" => ServerEvent::RoomUpdated(Box::new(serde_json::from_value(payload)?)),
            "user-status-changed" => {
                ServerEvent::UserStatusChanged(serde_json::from_value(payload)?)
            }
            "user-joined" => ServerEvent::UserJoined(serde_json::from_value(payload)?),
            "user-left" => ServerEvent::UserLeft(serde_json::from_value(payload)?),
            "user-typing" => ServerEvent::UserTyping(serde_json::from_value(payload)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Outbound emit.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    JoinRoom(RoomId),
    LeaveRoom(RoomId),
    SendMessage {
        room_id: RoomId,
        text: Option<String>,
        media: Vec<MediaItem>,
    },
    /// "Read up to `message_id`"; the server fans out per-message receipts.
    MarkRead {
        room_id: RoomId,
        message_id: String,
    },
    Typing {
        room_id: RoomId,
        is_typing: bool,
    },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom(_) => "join-room",
            ClientEvent::LeaveRoom(_) => "leave-room",
            ClientEvent::SendMessage { .. } => "send-message",
            ClientEvent::MarkRead { .. } => "mark-read",
            ClientEvent::Typing { .. } => "typing",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            ClientEvent::JoinRoom(id) | ClientEvent::LeaveRoom(id) => json!(id),
            ClientEvent::SendMessage {
                room_id,
                text,
                media,
            } => json!({ "roomId": room_id, "text": text, "media": media }),
            ClientEvent::MarkRead {
                room_id,
                message_id,
            } => json!({ "roomId": room_id, "messageId": message_id }),
            ClientEvent::Typing { room_id, is_typing } => {
                json!({ "roomId": room_id, "isTyping": is_typing })
            }
        }
    }
}
