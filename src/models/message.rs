//! Message-related models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RoomId, UserId};

/// Kind of media attached to a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Audio,
    Image,
    Video,
    File,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Audio => "audio",
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::File => "file",
        }
    }

    /// MIME type used when the file itself gives no better hint.
    pub fn default_mime(&self) -> &'static str {
        match self {
            MediaType::Audio => "audio/m4a",
            MediaType::Image => "image/jpeg",
            MediaType::Video => "video/mp4",
            MediaType::File => "application/octet-stream",
        }
    }

    /// Fallback file name when the local path has none.
    pub fn default_file_name(&self) -> &'static str {
        match self {
            MediaType::Audio => "file.m4a",
            MediaType::Image => "file.jpg",
            MediaType::Video => "file.mp4",
            MediaType::File => "file.bin",
        }
    }
}

impl std::str::FromStr for MediaType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "audio" => Ok(MediaType::Audio),
            "image" => Ok(MediaType::Image),
            "video" => Ok(MediaType::Video),
            "file" => Ok(MediaType::File),
            other => anyhow::bail!("Unknown media type: {}. Use: audio, image, video, file", other),
        }
    }
}

/// Media attachment. `key` is the storage key; `url` is a signed display URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    /// Seconds, for audio and video
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Record that a user has seen a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub user_id: UserId,
    pub read_at: DateTime<Utc>,
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Opaque document id
    pub id: String,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub sender_name: String,
    #[serde(default)]
    pub sender_nickname: Option<String>,
    #[serde(default)]
    pub sender_image_url: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media: Vec<MediaItem>,
    #[serde(default)]
    pub read_by: Vec<ReadReceipt>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Whether `user_id` holds a receipt for this message.
    pub fn is_read_by(&self, user_id: UserId) -> bool {
        self.read_by.iter().any(|r| r.user_id == user_id)
    }

    /// Append a receipt unless the user already has one.
    ///
    /// Returns true if the receipt set grew.
    pub fn merge_receipt(&mut self, user_id: UserId, read_at: DateTime<Utc>) -> bool {
        if self.is_read_by(user_id) {
            return false;
        }
        self.read_by.push(ReadReceipt { user_id, read_at });
        true
    }

    /// Number of distinct receipt holders other than the sender.
    pub fn read_by_count(&self) -> usize {
        let mut readers: Vec<UserId> = self
            .read_by
            .iter()
            .map(|r| r.user_id)
            .filter(|&id| id != self.sender_id)
            .collect();
        readers.sort_unstable();
        readers.dedup();
        readers.len()
    }

    /// Display name: nickname if set, else the account name.
    pub fn display_sender(&self) -> &str {
        self.sender_nickname
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.sender_name)
    }

    /// One-line text for list display.
    pub fn preview(&self) -> String {
        if self.is_deleted {
            return "(deleted)".to_string();
        }
        match self.text.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => match self.media.first() {
                Some(m) => format!("[{}]", m.media_type.as_str()),
                None => String::new(),
            },
        }
    }
}
