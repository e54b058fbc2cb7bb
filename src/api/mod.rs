//! REST API for the Ieum chat backend
//!
//! Each submodule exposes data-returning functions taking a `&ChatClient`.
//! The functions here are the CLI front ends that build a client from the
//! stored config and print the results.

pub mod chat;
pub mod client;
pub mod friends;
pub mod media;
pub mod users;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};

use crate::models::{MediaType, RoomId, SettingUpdate, UserId};
use crate::sync::{ChatRoomState, RoomList};
use client::ChatClient;

fn local_time(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%m-%d %H:%M").to_string()
}

/// Show the logged-in user, refreshing the cached profile
pub async fn whoami() -> Result<()> {
    let client = ChatClient::from_config()?;
    let me = users::fetch_me(&client).await?;
    {
        let mut store = client.store().lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = store.set_user(me.clone()) {
            tracing::warn!("Failed to cache profile: {:#}", e);
        }
    }

    println!();
    println!("Name:     {}", me.name);
    if let Some(nick) = me.setting.as_ref().and_then(|s| s.nickname.as_deref()) {
        println!("Nickname: {}", nick);
    }
    println!("Email:    {}", me.email);
    println!("Phone:    {}", me.phone.as_deref().unwrap_or("(none)"));
    println!("ID:       {}", me.id);
    Ok(())
}

/// List rooms, most recent activity first
pub async fn list_rooms(filter: Option<&str>) -> Result<()> {
    let client = ChatClient::from_config()?;
    let viewer = client.current_user_id()?;
    let mut list = RoomList::new(viewer);
    list.load(chat::list_rooms(&client).await?);

    let rooms = list.filter(filter.unwrap_or(""));
    if rooms.is_empty() {
        println!("(no rooms)");
        return Ok(());
    }

    for room in rooms {
        let unread = if room.unread_count > 0 {
            format!(" ({})", room.unread_count)
        } else {
            String::new()
        };
        let last = room
            .last_message
            .as_ref()
            .map(|m| {
                format!(
                    "{}: {}",
                    m.sender_name,
                    m.text.as_deref().unwrap_or("[media]")
                )
            })
            .unwrap_or_default();
        println!("[{}] {}{}  {}", room.id, room.name, unread, last);
    }
    println!("\nUnread total: {}", list.total_unread());
    Ok(())
}

pub async fn create_room(name: &str, friend_ids: &[UserId]) -> Result<()> {
    let client = ChatClient::from_config()?;
    let room = chat::create_room(&client, name, friend_ids).await?;
    println!("Created room {} (id {}).", room.name, room.id);
    Ok(())
}

/// Print a room's history with read indicators
pub async fn read_messages(room_id: RoomId) -> Result<()> {
    let client = ChatClient::from_config()?;
    let viewer = client.current_user_id()?;
    let room = chat::get_room(&client, room_id).await?;
    let page = chat::list_messages(&client, room_id).await?;

    let mut state = ChatRoomState::new(&room, viewer);
    state.load(page.messages);

    if state.messages().is_empty() {
        println!("(no messages)");
        return Ok(());
    }
    if page.has_more {
        println!("(older messages not shown)");
    }
    for msg in state.messages() {
        let indicator = state.read_indicator(msg).to_string();
        println!(
            "[{}] {}: {}{}",
            local_time(&msg.created_at),
            msg.display_sender(),
            msg.preview(),
            if indicator.is_empty() {
                String::new()
            } else {
                format!("  ({})", indicator)
            }
        );
    }
    Ok(())
}

/// Send a text message, optionally with one attachment
pub async fn send_message(
    room_id: RoomId,
    text: &str,
    attach: Option<&Path>,
    kind: MediaType,
) -> Result<()> {
    let client = ChatClient::from_config()?;
    let mut attachments = Vec::new();
    if let Some(path) = attach {
        attachments.push(
            media::upload_media(&client, path, kind)
                .await
                .context("Attachment upload failed")?,
        );
    }
    let msg = chat::send_message(&client, room_id, text, &attachments).await?;
    println!("Message sent (id {}).", msg.id);
    Ok(())
}

pub async fn summary(room_id: RoomId, regenerate: bool) -> Result<()> {
    let client = ChatClient::from_config()?;
    let summary = if regenerate {
        Some(chat::generate_summary(&client, room_id).await?)
    } else {
        chat::load_or_generate_summary(&client, room_id).await
    };

    match summary {
        Some(s) => {
            println!("Summary of {} messages ({}):", s.message_count, local_time(&s.created_at));
            println!("{}", s.text);
            if let Some(url) = s.audio_url {
                println!("Audio: {}", url);
            }
        }
        None => println!("(no summary available)"),
    }
    Ok(())
}

pub async fn quick_replies(room_id: RoomId) -> Result<()> {
    let client = ChatClient::from_config()?;
    let suggestions = chat::quick_replies(&client, room_id).await?;
    if suggestions.is_empty() {
        println!("(no suggestions)");
    }
    for (i, s) in suggestions.iter().enumerate() {
        println!("{}. {}", i + 1, s);
    }
    Ok(())
}

pub async fn list_friends() -> Result<()> {
    let client = ChatClient::from_config()?;
    let friends = friends::list_friends(&client).await?;
    if friends.is_empty() {
        println!("(no friends)");
    }
    for f in &friends {
        println!(
            "[{}] {}{}",
            f.id,
            f.name,
            if f.is_online() { "  (online)" } else { "" }
        );
    }
    Ok(())
}

pub async fn search_users(query: &str) -> Result<()> {
    let client = ChatClient::from_config()?;
    let users = friends::search_users(&client, query).await?;
    if users.is_empty() {
        println!("(no matches)");
    }
    for u in &users {
        let status = u
            .friendship_status
            .map(|s| format!("  [{:?}]", s).to_lowercase())
            .unwrap_or_default();
        println!("[{}] {} <{}>{}", u.id, u.display_name(), u.email, status);
    }
    Ok(())
}

pub async fn add_friend(friend_id: UserId) -> Result<()> {
    let client = ChatClient::from_config()?;
    friends::add_friend(&client, friend_id).await?;
    println!("Friend {} added.", friend_id);
    Ok(())
}

pub async fn remove_friend(friend_id: UserId) -> Result<()> {
    let client = ChatClient::from_config()?;
    friends::remove_friend(&client, friend_id).await?;
    println!("Friend {} removed.", friend_id);
    Ok(())
}

/// Show the cached settings of the logged-in user
pub async fn show_settings() -> Result<()> {
    let client = ChatClient::from_config()?;
    let user = client
        .current_user()
        .context("Not logged in. Run 'ieum-cli login' first.")?;
    let s = user.setting.unwrap_or_default();
    println!("Nickname:      {}", s.nickname.as_deref().unwrap_or("(none)"));
    println!("Image:         {}", s.image_url.as_deref().unwrap_or("(none)"));
    println!("Simple mode:   {}", s.is_special);
    println!("Notifications: {}", s.enable_notifications);
    println!("Summaries:     {}", s.enable_summary);
    Ok(())
}

pub async fn update_settings(update: &SettingUpdate) -> Result<()> {
    let client = ChatClient::from_config()?;
    users::update_settings(&client, update).await?;
    println!("Settings updated.");
    Ok(())
}

/// Change nickname and/or profile image
pub async fn update_profile(nickname: Option<&str>, image: Option<&Path>) -> Result<()> {
    let client = ChatClient::from_config()?;
    let mut update = SettingUpdate {
        nickname: nickname.map(String::from),
        ..Default::default()
    };
    if let Some(path) = image {
        let item = media::upload_media(&client, path, MediaType::Image)
            .await
            .context("Profile image upload failed")?;
        update.image_key = Some(item.key);
    }
    users::update_settings(&client, &update).await?;
    println!("Profile updated.");
    Ok(())
}

pub async fn register_push_token(token: &str) -> Result<()> {
    let client = ChatClient::from_config()?;
    users::register_push_token(&client, token).await;
    Ok(())
}

pub async fn transcribe(path: &Path) -> Result<()> {
    let client = ChatClient::from_config()?;
    let text = media::transcribe_audio(&client, path).await?;
    println!("{}", text);
    Ok(())
}

/// Upload a file and print its storage key
pub async fn upload(path: &Path, kind: MediaType, inline: bool) -> Result<()> {
    let client = ChatClient::from_config()?;
    let item = if inline {
        media::upload_inline(&client, path, kind).await?
    } else {
        media::upload_media(&client, path, kind).await?
    };
    println!("Key: {}", item.key);
    if let Some(url) = item.url {
        println!("URL: {}", url);
    }
    Ok(())
}
