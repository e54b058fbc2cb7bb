//! Live terminal views over the real-time channel
//!
//! `listen` keeps a room list (or one open room) current from socket
//! events. On connection loss the view reloads its REST snapshot and
//! reconnects with exponential backoff (1s, 2s, 4s, ... capped at 64s).
//! A connection that lasted a minute starts the backoff over at 1s.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;

use crate::api::{chat, friends};
use crate::api::client::ChatClient;
use crate::auth;
use crate::config::Config;
use crate::models::{Message, RoomId, UserId};
use crate::realtime::{ConnectionManager, EventKind, ServerEvent, Subscription};
use crate::sync::{ChatRoomState, FriendDirectory, ReadTrigger, RoomList};

const MAX_BACKOFF_SECS: u64 = 64;

/// A connection that stayed up this long resets the backoff.
const STABLE_AFTER: Duration = Duration::from_secs(60);

/// Why an event loop stopped.
enum Exit {
    /// Ctrl-C or end of event stream. Do not reconnect.
    Shutdown,
    /// Connection lost; reload and reconnect.
    Lost(String),
}

struct Session {
    client: ChatClient,
    manager: ConnectionManager,
    token: String,
    viewer: UserId,
}

impl Session {
    fn open() -> Result<Self> {
        let config = Config::load().context("Failed to load config")?;
        let socket_url = config.socket_url().to_string();
        let api_url = config.api_url().to_string();
        let client = ChatClient::new(&api_url, auth::shared(config));

        let token = client
            .token()
            .context("Not logged in. Run 'ieum-cli login' first.")?;
        let viewer = client.current_user_id()?;
        Ok(Self {
            client,
            manager: ConnectionManager::new(&socket_url),
            token,
            viewer,
        })
    }
}

/// Delay before the next attempt and the backoff to carry after it.
fn backoff_step(backoff: u64, connected_for: Duration) -> (u64, u64) {
    let delay = if connected_for >= STABLE_AFTER { 1 } else { backoff };
    (delay, (delay * 2).min(MAX_BACKOFF_SECS))
}

/// Wait `secs` seconds unless interrupted. Returns false on Ctrl-C.
async fn wait_backoff(secs: u64) -> bool {
    tokio::select! {
        _ = time::sleep(Duration::from_secs(secs)) => true,
        _ = tokio::signal::ctrl_c() => {
            println!("Shutting down...");
            false
        }
    }
}

/// Follow the room list, or a single room when `room_id` is given.
///
/// With `via_socket`, lines typed in a room go out as `send-message` emits
/// while the socket is up, and over REST otherwise.
pub async fn listen(room_id: Option<RoomId>, via_socket: bool) -> Result<()> {
    let session = Session::open()?;
    let result = match room_id {
        Some(id) => watch_room(&session, id, via_socket).await,
        None => watch_rooms(&session).await,
    };
    if session.manager.is_connected() {
        session.manager.disconnect();
    }
    result
}

fn print_rooms(list: &RoomList) {
    println!("---");
    for room in list.rooms() {
        let preview = room
            .last_message
            .as_ref()
            .and_then(|m| m.text.as_deref())
            .unwrap_or("");
        if room.unread_count > 0 {
            println!("[{}] {} ({})  {}", room.id, room.name, room.unread_count, preview);
        } else {
            println!("[{}] {}  {}", room.id, room.name, preview);
        }
    }
}

/// Ask for the events of every listed room. A disconnect clears
/// membership, so this has to run before each connect.
fn join_all(manager: &ConnectionManager, list: &RoomList) {
    for room in list.rooms() {
        manager.join_room(room.id);
    }
}

/// Apply a room-list event, joining rooms that show up for the first time.
fn apply_room_event(manager: &ConnectionManager, list: &mut RoomList, event: &ServerEvent) -> bool {
    if let ServerEvent::RoomUpdated(room) = event {
        if list.get(room.id).is_none() {
            manager.join_room(room.id);
        }
    }
    list.apply(event)
}

async fn watch_rooms(session: &Session) -> Result<()> {
    let mut list = RoomList::new(session.viewer);
    let mut directory = FriendDirectory::default();
    let mut events = session.manager.subscribe(EventKind::All);
    let mut backoff = 1u64;

    loop {
        list.load(chat::list_rooms(&session.client).await?);
        print_rooms(&list);
        match friends::list_friends(&session.client).await {
            Ok(loaded) => {
                directory = FriendDirectory::new(loaded);
                println!(
                    "Friends online: {}/{}",
                    directory.online().len(),
                    directory.friends().len()
                );
            }
            Err(e) => tracing::warn!("Failed to load friends: {}", e),
        }

        join_all(&session.manager, &list);
        let mut connected_for = Duration::ZERO;
        match session.manager.connect(&session.token).await {
            Ok(()) => {
                let connected_at = Instant::now();
                println!("Listening for room updates... (Ctrl-C to stop)");
                match room_list_loop(&session.manager, &mut list, &mut directory, &mut events).await {
                    Exit::Shutdown => return Ok(()),
                    Exit::Lost(reason) => {
                        connected_for = connected_at.elapsed();
                        tracing::warn!("Connection lost: {}", reason);
                    }
                }
            }
            Err(e) => tracing::warn!("Connect failed: {}", e),
        }

        let (delay, next) = backoff_step(backoff, connected_for);
        tracing::info!("Reconnecting in {}s...", delay);
        if !wait_backoff(delay).await {
            return Ok(());
        }
        backoff = next;
    }
}

async fn room_list_loop(
    manager: &ConnectionManager,
    list: &mut RoomList,
    directory: &mut FriendDirectory,
    events: &mut Subscription,
) -> Exit {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ServerEvent::Disconnected { reason }) => return Exit::Lost(reason),
                Some(ServerEvent::ConnectError { message }) => {
                    eprintln!("Connection error: {}", message);
                }
                Some(ServerEvent::Connected) => {
                    tracing::info!("Connected, following {} rooms", manager.joined_rooms().len());
                }
                Some(ServerEvent::UserStatusChanged(status)) => {
                    if directory.on_status_changed(&status) {
                        if let Some(friend) = directory.get(status.user_id) {
                            let state = if friend.is_online() { "online" } else { "offline" };
                            println!("  {} is {}", friend.name, state);
                        }
                    }
                }
                Some(event) => {
                    if apply_room_event(manager, list, &event) {
                        print_rooms(list);
                    }
                }
                None => return Exit::Shutdown,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                return Exit::Shutdown;
            }
        }
    }
}

fn print_message(state: &ChatRoomState, msg: &Message) {
    let indicator = state.read_indicator(msg);
    let suffix = match indicator.to_string() {
        s if s.is_empty() => s,
        s => format!("  ({})", s),
    };
    println!(
        "[{}] {}: {}{}",
        msg.created_at.format("%H:%M"),
        msg.display_sender(),
        msg.preview(),
        suffix
    );
}

async fn load_room(session: &Session, room_id: RoomId) -> Result<ChatRoomState> {
    let room = chat::get_room(&session.client, room_id).await?;
    let page = chat::list_messages(&session.client, room_id).await?;
    let mut state = ChatRoomState::new(&room, session.viewer);
    state.load(page.messages);

    if room.is_group() {
        println!("--- {} ({} members) ---", room.name, state.participant_count());
    } else {
        println!("--- {} ---", room.name);
    }
    for msg in state.messages() {
        print_message(&state, msg);
    }
    Ok(state)
}

async fn watch_room(session: &Session, room_id: RoomId, via_socket: bool) -> Result<()> {
    let mut events = session.manager.subscribe(EventKind::All);
    let mut input = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    let mut backoff = 1u64;

    loop {
        let mut state = load_room(session, room_id).await?;

        // Join before connecting; the join is replayed once the socket is up.
        session.manager.join_room(room_id);
        let mut connected_for = Duration::ZERO;
        match session.manager.connect(&session.token).await {
            Ok(()) => {
                let connected_at = Instant::now();
                println!("Type a message and press Enter to send. (Ctrl-C to stop)");
                let exit =
                    chat_room_loop(session, &mut state, &mut events, &mut input, via_socket).await;
                session.manager.leave_room(room_id);
                match exit? {
                    Exit::Shutdown => return Ok(()),
                    Exit::Lost(reason) => {
                        connected_for = connected_at.elapsed();
                        tracing::warn!("Connection lost: {}", reason);
                    }
                }
            }
            Err(e) => tracing::warn!("Connect failed: {}", e),
        }

        let (delay, next) = backoff_step(backoff, connected_for);
        tracing::info!("Reconnecting in {}s...", delay);
        if !wait_backoff(delay).await {
            return Ok(());
        }
        backoff = next;
    }
}

async fn chat_room_loop<R>(
    session: &Session,
    state: &mut ChatRoomState,
    events: &mut Subscription,
    input: &mut LinesStream<R>,
    via_socket: bool,
) -> Result<Exit>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let room_id = state.room_id();
    // Dropped on return, which cancels any pending acknowledgement.
    let mut trigger = ReadTrigger::new(room_id, session.manager.clone());
    trigger.evaluate(state);
    let mut input_open = true;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    return Ok(Exit::Shutdown);
                };
                match event {
                    ServerEvent::Disconnected { reason } => return Ok(Exit::Lost(reason)),
                    ServerEvent::ConnectError { message } => {
                        eprintln!("Connection error: {}", message);
                    }
                    ServerEvent::NewMessage(ref msg) => {
                        if state.apply(&event) {
                            print_message(state, msg);
                        }
                    }
                    ServerEvent::MessagesRead(ref read) => {
                        if state.apply(&event) {
                            if let Some(msg) = state.messages().iter().find(|m| m.id == read.message_id) {
                                if msg.sender_id == session.viewer {
                                    println!("  message {}: {}", msg.id, state.read_indicator(msg));
                                }
                            }
                        }
                    }
                    ServerEvent::UserTyping(_) => {
                        if state.apply(&event) {
                            let names = state.typing_users();
                            if !names.is_empty() {
                                println!("  {} typing...", names.join(", "));
                            }
                        }
                    }
                    ServerEvent::UserJoined(ref change) => {
                        if state.apply(&event) {
                            println!(
                                "  {} joined ({} members)",
                                change.user_name,
                                state.participant_count()
                            );
                        }
                    }
                    ServerEvent::UserLeft(ref change) => {
                        if state.apply(&event) {
                            println!(
                                "  {} left ({} members)",
                                change.user_name,
                                state.participant_count()
                            );
                        }
                    }
                    other => {
                        state.apply(&other);
                    }
                }
                trigger.evaluate(state);
            }
            line = input.next(), if input_open => {
                match line {
                    Some(Ok(text)) if text.trim().is_empty() => {}
                    Some(Ok(text)) if via_socket && session.manager.is_connected() => {
                        // Shows up through the new-message echo.
                        if let Err(e) = session.manager.send_message(room_id, Some(text), Vec::new()) {
                            eprintln!("Send failed: {}", e);
                        }
                    }
                    Some(Ok(text)) => {
                        match chat::send_message(&session.client, room_id, &text, &[]).await {
                            Ok(msg) => {
                                if state.insert_local(msg.clone()) {
                                    print_message(state, &msg);
                                }
                                trigger.evaluate(state);
                            }
                            Err(e) => eprintln!("Send failed: {}", e),
                        }
                    }
                    Some(Err(e)) => return Err(e).context("Failed to read input"),
                    None => input_open = false,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                return Ok(Exit::Shutdown);
            }
        }
    }
}

/// Set the typing indicator in a room
pub async fn set_typing(room_id: RoomId, is_typing: bool) -> Result<()> {
    let session = Session::open()?;
    let mut events = session.manager.subscribe(EventKind::Connection);
    session.manager.join_room(room_id);
    session.manager.connect(&session.token).await?;

    let connected = time::timeout(Duration::from_secs(10), async {
        while let Some(event) = events.recv().await {
            match event {
                ServerEvent::Connected => return Ok(()),
                ServerEvent::ConnectError { message } => anyhow::bail!("Connection error: {}", message),
                ServerEvent::Disconnected { reason } => anyhow::bail!("Disconnected: {}", reason),
                _ => {}
            }
        }
        anyhow::bail!("Event stream closed")
    })
    .await
    .context("Timed out waiting for the socket handshake")?;

    events.unsubscribe();
    if let Err(e) = connected {
        session.manager.disconnect();
        return Err(e);
    }
    session.manager.send_typing(room_id, is_typing);
    session.manager.disconnect();

    println!("Typing {} in room {}.", if is_typing { "on" } else { "off" }, room_id);
    Ok(())
}
