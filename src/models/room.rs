//! Chat room models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Message, RoomId, User, UserId};

/// Room type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    /// Two-party conversation
    Direct,
    Group,
}

/// Summary of the most recent message, as carried on a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub id: String,
    #[serde(default)]
    pub text: Option<String>,
    pub sender_id: UserId,
    pub sender_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for LastMessage {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id.clone(),
            text: msg.text.clone(),
            sender_id: msg.sender_id,
            sender_name: msg.sender_name.clone(),
            created_at: msg.created_at,
        }
    }
}

/// Chat room entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub participant_count: u32,
    pub room_type: RoomType,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub participants: Vec<User>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub is_muted: bool,
}

impl Room {
    /// Timestamp used to order the room list, most recent first.
    pub fn latest_activity(&self) -> DateTime<Utc> {
        self.last_message
            .as_ref()
            .map(|m| m.created_at)
            .or(self.last_message_at)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn is_group(&self) -> bool {
        self.room_type == RoomType::Group
    }
}
