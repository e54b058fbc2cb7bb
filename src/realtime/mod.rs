//! Real-time channel to the chat backend
//!
//! One Socket.IO connection per session, owned by a `ConnectionManager`.
//! The manager tracks room membership, replays joins requested before the
//! connection was up, and fans inbound events out to subscribers.
//!
//! Connection failures are logged and surfaced as `ConnectError` /
//! `Disconnected` events. Nothing here reconnects on its own: callers
//! reconcile through REST and call `connect` again.

pub mod events;
pub mod membership;
pub mod protocol;
pub mod subscriptions;
pub mod websocket;

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};

pub use events::{ClientEvent, EventKind, ServerEvent};
pub use subscriptions::{EventBus, Subscription};

use crate::models::{MediaItem, RoomId};
use membership::{JoinAction, LeaveAction, Membership};
use protocol::Frame;
use websocket::RealtimeSocket;

/// Errors from the real-time channel.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("socket not connected")]
    NotConnected,
    #[error("socket connection failed: {0}")]
    Connect(String),
    #[error("socket protocol error: {0}")]
    Protocol(String),
}

enum Outgoing {
    Text(String),
    Close,
}

struct Connection {
    /// Distinguishes this connection from earlier, torn-down ones.
    generation: u64,
    token: String,
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

#[derive(Default)]
struct State {
    connection: Option<Connection>,
    /// Socket.IO namespace connect acknowledged
    connected: bool,
    membership: Membership,
    next_generation: u64,
}

/// Handle to the session's real-time connection. Clones share one connection.
#[derive(Clone)]
pub struct ConnectionManager {
    socket_url: String,
    state: Arc<Mutex<State>>,
    bus: EventBus,
}

impl ConnectionManager {
    pub fn new(socket_url: &str) -> Self {
        Self {
            socket_url: socket_url.to_string(),
            state: Arc::new(Mutex::new(State::default())),
            bus: EventBus::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open the connection, or reuse the existing one.
    ///
    /// Returns once the WebSocket is open. The namespace handshake completes
    /// in the background and is signalled by `ServerEvent::Connected`.
    pub async fn connect(&self, token: &str) -> Result<(), RealtimeError> {
        let ws_url = protocol::endpoint(&self.socket_url)?;

        let (generation, outgoing_rx) = {
            let mut state = self.lock();
            if let Some(ref conn) = state.connection {
                if conn.token != token {
                    tracing::warn!(
                        "Socket already open with a different token; keeping existing connection"
                    );
                } else {
                    tracing::debug!("Socket already open, reusing");
                }
                return Ok(());
            }

            let generation = state.next_generation;
            state.next_generation += 1;
            let (tx, rx) = mpsc::unbounded_channel();
            state.connection = Some(Connection {
                generation,
                token: token.to_string(),
                outgoing: tx,
            });
            state.connected = false;
            (generation, rx)
        };

        let (ready_tx, ready_rx) = oneshot::channel();
        let driver = Driver {
            generation,
            token: token.to_string(),
            state: Arc::clone(&self.state),
            bus: self.bus.clone(),
        };
        tokio::spawn(driver.run(ws_url, outgoing_rx, ready_tx));

        match ready_rx.await {
            Ok(result) => result,
            Err(_) => Err(RealtimeError::Connect(
                "connection task ended before opening".into(),
            )),
        }
    }

    /// Tear down the connection and forget all room membership.
    pub fn disconnect(&self) {
        let conn = {
            let mut state = self.lock();
            state.connected = false;
            state.membership.clear();
            state.connection.take()
        };
        if let Some(conn) = conn {
            tracing::info!("Disconnecting socket");
            let _ = conn.outgoing.send(Outgoing::Close);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Rooms the server has been told about.
    pub fn joined_rooms(&self) -> Vec<RoomId> {
        self.lock().membership.joined()
    }

    /// Announce membership of a room. Deferred until connected; no-op if
    /// already joined or pending.
    pub fn join_room(&self, room_id: RoomId) {
        let mut state = self.lock();
        let connected = state.connected;
        match state.membership.request_join(room_id, connected) {
            JoinAction::Emit => {
                match send_locked(&state, &ClientEvent::JoinRoom(room_id)) {
                    Ok(()) => tracing::info!("Joined room {}", room_id),
                    Err(e) => tracing::warn!("join-room {} not sent: {}", room_id, e),
                }
            }
            JoinAction::Deferred => {
                if state.connection.is_none() {
                    tracing::warn!(
                        "Socket not initialized, join of room {} deferred until connect",
                        room_id
                    );
                } else {
                    tracing::info!("Socket not yet connected, join of room {} deferred", room_id);
                }
            }
            JoinAction::Noop => {
                tracing::debug!("Already joined room {}, skipping", room_id);
            }
        }
    }

    pub fn leave_room(&self, room_id: RoomId) {
        let mut state = self.lock();
        let connected = state.connected;
        match state.membership.request_leave(room_id, connected) {
            LeaveAction::Emit => {
                if let Err(e) = send_locked(&state, &ClientEvent::LeaveRoom(room_id)) {
                    tracing::warn!("leave-room {} not sent: {}", room_id, e);
                } else {
                    tracing::info!("Left room {}", room_id);
                }
            }
            LeaveAction::CancelledPending => {
                tracing::debug!("Cancelled deferred join of room {}", room_id);
            }
            LeaveAction::Noop => {}
        }
    }

    /// Emit an event. Fails unless the namespace handshake has completed.
    pub fn emit(&self, event: &ClientEvent) -> Result<(), RealtimeError> {
        let state = self.lock();
        if !state.connected {
            return Err(RealtimeError::NotConnected);
        }
        send_locked(&state, event)
    }

    pub fn send_message(
        &self,
        room_id: RoomId,
        text: Option<String>,
        media: Vec<MediaItem>,
    ) -> Result<(), RealtimeError> {
        self.emit(&ClientEvent::SendMessage {
            room_id,
            text,
            media,
        })
    }

    /// Acknowledge everything up to `message_id`. Dropped when disconnected.
    pub fn mark_read(&self, room_id: RoomId, message_id: &str) {
        let event = ClientEvent::MarkRead {
            room_id,
            message_id: message_id.to_string(),
        };
        match self.emit(&event) {
            Ok(()) => tracing::debug!("mark-read room {} up to {}", room_id, message_id),
            Err(e) => tracing::debug!("mark-read for room {} dropped: {}", room_id, e),
        }
    }

    /// Typing indicator. Dropped when disconnected.
    pub fn send_typing(&self, room_id: RoomId, is_typing: bool) {
        if let Err(e) = self.emit(&ClientEvent::Typing { room_id, is_typing }) {
            tracing::debug!("typing for room {} dropped: {}", room_id, e);
        }
    }

    pub fn subscribe(&self, kind: EventKind) -> Subscription {
        self.bus.subscribe(kind)
    }
}

fn send_locked(state: &State, event: &ClientEvent) -> Result<(), RealtimeError> {
    let conn = state
        .connection
        .as_ref()
        .ok_or(RealtimeError::NotConnected)?;
    let frame = protocol::encode_event(event.name(), &event.payload());
    conn.outgoing
        .send(Outgoing::Text(frame))
        .map_err(|_| RealtimeError::NotConnected)
}

/// Outcome of handling one inbound frame.
enum Flow {
    Continue,
    Stop(String),
}

/// Background task that owns one WebSocket.
struct Driver {
    generation: u64,
    token: String,
    state: Arc<Mutex<State>>,
    bus: EventBus,
}

impl Driver {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_current(&self, state: &State) -> bool {
        state
            .connection
            .as_ref()
            .map_or(false, |c| c.generation == self.generation)
    }

    /// Drop this connection's slot if it still holds it.
    fn release(&self) {
        let mut state = self.lock();
        if self.is_current(&state) {
            state.connection = None;
            state.connected = false;
            state.membership.clear();
        }
    }

    async fn run(
        self,
        ws_url: String,
        mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
        ready: oneshot::Sender<Result<(), RealtimeError>>,
    ) {
        let mut ws = match RealtimeSocket::connect(&ws_url).await {
            Ok(ws) => ws,
            Err(e) => {
                let message = format!("{:#}", e);
                tracing::error!("Socket connection error: {}", message);
                self.release();
                self.bus.publish(&ServerEvent::ConnectError {
                    message: message.clone(),
                });
                let _ = ready.send(Err(RealtimeError::Connect(message)));
                return;
            }
        };
        let _ = ready.send(Ok(()));

        let reason = loop {
            tokio::select! {
                frame = ws.recv_frame() => {
                    match frame {
                        Ok(Some(text)) => match self.handle_frame(&text, &mut ws).await {
                            Ok(Flow::Continue) => {}
                            Ok(Flow::Stop(reason)) => break reason,
                            Err(e) => break format!("{:#}", e),
                        },
                        Ok(None) => break "closed by server".to_string(),
                        Err(e) => {
                            tracing::error!("Socket error: {:#}", e);
                            break format!("{:#}", e);
                        }
                    }
                }
                cmd = outgoing.recv() => {
                    match cmd {
                        Some(Outgoing::Text(text)) => {
                            if let Err(e) = ws.send_text(&text).await {
                                break format!("{:#}", e);
                            }
                        }
                        Some(Outgoing::Close) | None => {
                            let _ = ws.send_text(protocol::DISCONNECT).await;
                            ws.close().await;
                            break "client disconnect".to_string();
                        }
                    }
                }
            }
        };

        tracing::info!("Socket disconnected: {}", reason);
        self.release();
        self.bus.publish(&ServerEvent::Disconnected { reason });
    }

    async fn handle_frame(&self, text: &str, ws: &mut RealtimeSocket) -> anyhow::Result<Flow> {
        let frame = match protocol::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("Ignoring frame {:?}: {}", text, e);
                return Ok(Flow::Continue);
            }
        };

        match frame {
            Frame::Open(info) => {
                tracing::debug!(
                    "Engine.IO open (sid={}, ping={}ms, timeout={}ms)",
                    info.sid,
                    info.ping_interval,
                    info.ping_timeout
                );
                ws.send_text(&protocol::encode_connect(&json!({ "token": self.token })))
                    .await?;
            }
            Frame::Ping => ws.send_text(protocol::PONG).await?,
            Frame::Pong | Frame::Noop => {}
            Frame::Ack { ack_id } => tracing::debug!("Ignoring ack {}", ack_id),
            Frame::Connect(payload) => {
                let replay = {
                    let mut state = self.lock();
                    if !self.is_current(&state) {
                        return Ok(Flow::Stop("superseded".into()));
                    }
                    state.connected = true;
                    state.membership.on_connected()
                };
                let sid = payload.get("sid").and_then(|v| v.as_str()).unwrap_or("?");
                tracing::info!("Socket connected: {}", sid);
                for room_id in replay {
                    let join = ClientEvent::JoinRoom(room_id);
                    ws.send_text(&protocol::encode_event(join.name(), &join.payload()))
                        .await?;
                    tracing::info!("Joined room {} (after connect)", room_id);
                }
                self.bus.publish(&ServerEvent::Connected);
            }
            Frame::ConnectError(message) => {
                tracing::error!("Socket connection error: {}", message);
                self.bus.publish(&ServerEvent::ConnectError {
                    message: message.clone(),
                });
                return Ok(Flow::Stop(format!("connect error: {}", message)));
            }
            Frame::Disconnect => return Ok(Flow::Stop("server disconnect".into())),
            Frame::Close => return Ok(Flow::Stop("transport close".into())),
            Frame::Event { name, args, ack_id } => {
                if let Some(id) = ack_id {
                    tracing::debug!("Event '{}' requests ack {}; acks are not sent", name, id);
                }
                let payload = args.into_iter().next().unwrap_or(Value::Null);
                match ServerEvent::decode(&name, payload) {
                    Ok(Some(event)) => {
                        tracing::debug!("Socket event received: {}", name);
                        self.bus.publish(&event);
                    }
                    Ok(None) => tracing::debug!("Unhandled socket event: {}", name),
                    Err(e) => tracing::warn!("Malformed '{}' event: {}", name, e),
                }
            }
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::events::UnreadCountUpdate;
    use futures::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;

    type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    const OPEN: &str = r#"0{"sid":"eio1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

    async fn next_text(ws: &mut ServerWs) -> Option<String> {
        while let Some(msg) = ws.next().await {
            if let Ok(Message::Text(text)) = msg {
                return Some(text);
            }
        }
        None
    }

    async fn send(ws: &mut ServerWs, text: &str) {
        ws.send(Message::Text(text.to_string())).await.unwrap();
    }

    async fn next_event(sub: &mut Subscription) -> ServerEvent {
        timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("timed out waiting for event")
            .expect("bus closed")
    }

    #[tokio::test]
    async fn test_handshake_deferred_join_and_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

            send(&mut ws, OPEN).await;
            assert_eq!(next_text(&mut ws).await.unwrap(), r#"40{"token":"tok"}"#);
            send(&mut ws, r#"40{"sid":"sio1"}"#).await;
            assert_eq!(next_text(&mut ws).await.unwrap(), r#"42["join-room",5]"#);

            send(&mut ws, "2").await;
            assert_eq!(next_text(&mut ws).await.unwrap(), "3");

            send(&mut ws, r#"42["unread-count-update",{"roomId":5,"unreadCount":3}]"#).await;
            send(&mut ws, r#"42["server-notice",{}]"#).await;

            // Joins after connect go out immediately; duplicates do not.
            assert_eq!(next_text(&mut ws).await.unwrap(), r#"42["join-room",8]"#);
            assert_eq!(next_text(&mut ws).await.unwrap(), "41");
        });

        let manager = ConnectionManager::new(&format!("http://{}", addr));
        let mut events = manager.subscribe(EventKind::All);

        manager.join_room(5);
        manager.join_room(5);
        manager.connect("tok").await.unwrap();
        manager.connect("tok").await.unwrap();

        assert_eq!(next_event(&mut events).await, ServerEvent::Connected);
        assert!(manager.is_connected());
        assert_eq!(manager.joined_rooms(), vec![5]);

        assert_eq!(
            next_event(&mut events).await,
            ServerEvent::UnreadCountUpdate(UnreadCountUpdate {
                room_id: 5,
                unread_count: 3
            })
        );

        manager.join_room(8);
        manager.join_room(8);
        manager.disconnect();
        assert!(!manager.is_connected());
        assert!(manager.joined_rooms().is_empty());

        timeout(Duration::from_secs(5), server)
            .await
            .expect("server timed out")
            .unwrap();
        assert!(matches!(
            next_event(&mut events).await,
            ServerEvent::Disconnected { .. }
        ));
    }

    #[tokio::test]
    async fn test_connect_error_releases_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            send(&mut ws, OPEN).await;
            let _ = next_text(&mut ws).await;
            send(&mut ws, r#"44{"message":"Authentication error"}"#).await;
            let _ = next_text(&mut ws).await;
        });

        let manager = ConnectionManager::new(&format!("http://{}", addr));
        let mut events = manager.subscribe(EventKind::Connection);
        manager.join_room(1);
        manager.connect("bad").await.unwrap();

        assert_eq!(
            next_event(&mut events).await,
            ServerEvent::ConnectError {
                message: "Authentication error".into()
            }
        );
        assert!(matches!(
            next_event(&mut events).await,
            ServerEvent::Disconnected { .. }
        ));
        assert!(!manager.is_connected());
        assert!(manager.joined_rooms().is_empty());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let manager = ConnectionManager::new(&format!("http://{}", addr));
        let err = manager.connect("tok").await.unwrap_err();
        assert!(matches!(err, RealtimeError::Connect(_)));
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_emit_requires_connection() {
        let manager = ConnectionManager::new("http://127.0.0.1:9");
        let err = manager.send_message(1, Some("hi".into()), Vec::new()).unwrap_err();
        assert!(matches!(err, RealtimeError::NotConnected));
        // Fire-and-forget emits are silently dropped.
        manager.mark_read(1, "m1");
        manager.send_typing(1, true);
    }
}
