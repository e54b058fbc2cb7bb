//! Conversation summary model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Generated summary of recent room activity, with a spoken rendition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: i64,
    pub text: String,
    #[serde(default)]
    pub audio_url: Option<String>,
    pub message_count: u32,
    pub created_at: DateTime<Utc>,
}
