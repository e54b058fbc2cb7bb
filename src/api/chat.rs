//! Rooms, messages, summaries and quick replies

use serde_json::json;

use super::client::{field, field_or_default, ApiError, ChatClient};
use crate::models::{ChatSummary, MediaItem, Message, Room, RoomId, UserId};

/// One page of room history.
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub has_more: bool,
}

/// List the viewer's rooms.
pub async fn list_rooms(client: &ChatClient) -> Result<Vec<Room>, ApiError> {
    let mut body = client.get("/chat/rooms").await?;
    field_or_default(&mut body, "rooms")
}

/// Fetch a single room.
pub async fn get_room(client: &ChatClient, room_id: RoomId) -> Result<Room, ApiError> {
    let mut body = client.get(&format!("/chat/rooms/{}", room_id)).await?;
    field(&mut body, "room")
}

/// Create a room. The creator is always included among the participants.
pub async fn create_room(
    client: &ChatClient,
    name: &str,
    friend_ids: &[UserId],
) -> Result<Room, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("Room name must not be empty".into()));
    }
    if friend_ids.is_empty() {
        return Err(ApiError::Validation(
            "Select at least one friend for the room".into(),
        ));
    }

    let me = client.current_user_id()?;
    let mut participant_ids = friend_ids.to_vec();
    if !participant_ids.contains(&me) {
        participant_ids.push(me);
    }

    let body = json!({ "name": name, "participantIds": participant_ids });
    let mut resp = client.post("/chat/rooms", Some(&body)).await?;
    field(&mut resp, "room")
}

/// Load room history as seen by the current user (oldest first).
pub async fn list_messages(client: &ChatClient, room_id: RoomId) -> Result<MessagePage, ApiError> {
    let me = client.current_user_id()?;
    let mut body = client
        .get(&format!(
            "/chat/rooms/{}/messages?currentUserId={}",
            room_id, me
        ))
        .await?;
    Ok(MessagePage {
        messages: field_or_default(&mut body, "messages")?,
        has_more: field_or_default(&mut body, "hasMore")?,
    })
}

/// Send a message over REST. The returned message is the optimistic local copy.
pub async fn send_message(
    client: &ChatClient,
    room_id: RoomId,
    text: &str,
    media: &[MediaItem],
) -> Result<Message, ApiError> {
    let text = text.trim();
    if text.is_empty() && media.is_empty() {
        return Err(ApiError::Validation("Message is empty".into()));
    }

    let body = json!({ "text": text, "media": media });
    let mut resp = client
        .post(&format!("/chat/rooms/{}/messages", room_id), Some(&body))
        .await?;
    field(&mut resp, "message")
}

/// Fetch the latest summary of a room.
pub async fn get_summary(client: &ChatClient, room_id: RoomId) -> Result<ChatSummary, ApiError> {
    let mut body = client
        .get(&format!("/chat/rooms/{}/summary", room_id))
        .await?;
    field(&mut body, "summary")
}

/// Ask the backend to generate a fresh summary.
pub async fn generate_summary(
    client: &ChatClient,
    room_id: RoomId,
) -> Result<ChatSummary, ApiError> {
    let mut body = client
        .post(&format!("/chat/rooms/{}/summary", room_id), None::<&()>)
        .await?;
    field(&mut body, "summary")
}

/// Load the room summary, generating one when none exists yet.
///
/// Summaries are optional: every failure is logged and yields `None`.
pub async fn load_or_generate_summary(client: &ChatClient, room_id: RoomId) -> Option<ChatSummary> {
    match get_summary(client, room_id).await {
        Ok(summary) => Some(summary),
        Err(e) if e.is_not_found() => {
            tracing::info!("No summary yet for room {}, generating", room_id);
            match generate_summary(client, room_id).await {
                Ok(summary) => Some(summary),
                Err(e) => {
                    tracing::warn!("Summary generation failed for room {}: {}", room_id, e);
                    None
                }
            }
        }
        Err(e) => {
            tracing::warn!("Failed to load summary for room {}: {}", room_id, e);
            None
        }
    }
}

/// Suggested short replies for the room's latest messages.
pub async fn quick_replies(client: &ChatClient, room_id: RoomId) -> Result<Vec<String>, ApiError> {
    let mut body = client
        .get(&format!("/chat/rooms/{}/quick-replies", room_id))
        .await?;
    field_or_default(&mut body, "suggestions")
}
