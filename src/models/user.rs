//! User-related models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;

/// Per-user preferences stored on the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSetting {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Simplified accessibility interface
    #[serde(default)]
    pub is_special: bool,
    #[serde(default)]
    pub is_test: bool,
    #[serde(default)]
    pub enable_notifications: bool,
    #[serde(default)]
    pub enable_summary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// Partial settings update. Only fields that are `Some` are sent.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    /// Storage key of a freshly uploaded profile image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_special: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_notifications: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_summary: Option<bool>,
}

impl SettingUpdate {
    pub fn is_empty(&self) -> bool {
        self.nickname.is_none()
            && self.image_key.is_none()
            && self.is_special.is_none()
            && self.enable_notifications.is_none()
            && self.enable_summary.is_none()
    }
}

impl UserSetting {
    /// Apply a partial update locally (cached profile refresh).
    pub fn apply(&mut self, update: &SettingUpdate) {
        if let Some(ref nickname) = update.nickname {
            self.nickname = Some(nickname.clone());
        }
        if let Some(v) = update.is_special {
            self.is_special = v;
        }
        if let Some(v) = update.enable_notifications {
            self.enable_notifications = v;
        }
        if let Some(v) = update.enable_summary {
            self.enable_summary = v;
        }
    }
}

/// Friendship state relative to the viewer (search results only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendshipStatus {
    None,
    Pending,
    Accepted,
    Blocked,
}

/// User profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting: Option<UserSetting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendship_status: Option<FriendshipStatus>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.setting
            .as_ref()
            .and_then(|s| s.nickname.as_deref())
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.name)
    }
}

/// Entry in the viewer's friend list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Friend {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub setting: Option<UserSetting>,
}

impl Friend {
    pub fn is_online(&self) -> bool {
        self.setting
            .as_ref()
            .and_then(|s| s.is_online)
            .unwrap_or(false)
    }
}
