//! Debounced automatic read acknowledgement for an open room

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::chat_room::ChatRoomState;
use crate::models::RoomId;
use crate::realtime::ConnectionManager;

/// Delay before the latest message counts as seen.
pub const READ_DEBOUNCE: Duration = Duration::from_millis(500);

/// Destination for read acknowledgements.
pub trait AckSink: Send + Sync + 'static {
    fn mark_read(&self, room_id: RoomId, message_id: &str);
}

impl AckSink for ConnectionManager {
    fn mark_read(&self, room_id: RoomId, message_id: &str) {
        ConnectionManager::mark_read(self, room_id, message_id);
    }
}

/// Sends one `mark-read` for the latest unread message once it has been on
/// screen for `READ_DEBOUNCE`. Dropping the trigger cancels any pending ack.
pub struct ReadTrigger<S: AckSink> {
    room_id: RoomId,
    sink: Arc<S>,
    delay: Duration,
    pending: Option<(String, JoinHandle<()>)>,
    last_acked: Arc<Mutex<Option<String>>>,
}

impl<S: AckSink> ReadTrigger<S> {
    pub fn new(room_id: RoomId, sink: S) -> Self {
        Self {
            room_id,
            sink: Arc::new(sink),
            delay: READ_DEBOUNCE,
            pending: None,
            last_acked: Arc::new(Mutex::new(None)),
        }
    }

    #[cfg(test)]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Re-check after the room state changed. Must run inside a tokio runtime.
    pub fn evaluate(&mut self, state: &ChatRoomState) {
        let target = state.pending_read_target().map(str::to_string);
        self.retarget(target);
    }

    fn retarget(&mut self, target: Option<String>) {
        if let (Some((pending_id, handle)), Some(target_id)) = (&self.pending, &target) {
            if pending_id == target_id && !handle.is_finished() {
                return;
            }
        }
        self.cancel();

        let Some(message_id) = target else {
            return;
        };
        if self.last_acked().as_deref() == Some(message_id.as_str()) {
            return;
        }

        let sink = Arc::clone(&self.sink);
        let last_acked = Arc::clone(&self.last_acked);
        let room_id = self.room_id;
        let delay = self.delay;
        let id = message_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut last = last_acked.lock().unwrap_or_else(|e| e.into_inner());
                if last.as_deref() == Some(id.as_str()) {
                    return;
                }
                *last = Some(id.clone());
            }
            tracing::info!("Auto-marking room {} read up to {}", room_id, id);
            sink.mark_read(room_id, &id);
        });
        self.pending = Some((message_id, handle));
    }

    /// Abort a pending acknowledgement, if any.
    pub fn cancel(&mut self) {
        if let Some((_, handle)) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn last_acked(&self) -> Option<String> {
        self.last_acked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl<S: AckSink> Drop for ReadTrigger<S> {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{message, room};
    use crate::models::UserId;
    use crate::realtime::events::MessagesRead;
    use tokio::sync::mpsc;
    use tokio::time::sleep;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct ReadAck {
        room_id: RoomId,
        message_id: String,
    }

    impl AckSink for mpsc::UnboundedSender<ReadAck> {
        fn mark_read(&self, room_id: RoomId, message_id: &str) {
            let _ = self.send(ReadAck {
                room_id,
                message_id: message_id.to_string(),
            });
        }
    }

    const A: UserId = 1;
    const B: UserId = 2;

    fn room_state(viewer: UserId) -> ChatRoomState {
        let mut s = ChatRoomState::new(&room(5, None), viewer);
        s.load(vec![message("1", 5, A, 1), message("2", 5, B, 2)]);
        s
    }

    fn trigger() -> (
        ReadTrigger<mpsc::UnboundedSender<ReadAck>>,
        mpsc::UnboundedReceiver<ReadAck>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ReadTrigger::new(5, tx), rx)
    }

    fn ack(message_id: &str) -> ReadAck {
        ReadAck {
            room_id: 5,
            message_id: message_id.into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_for_latest_message_after_debounce() {
        let (mut trigger, mut rx) = trigger();
        trigger.evaluate(&room_state(A));

        sleep(Duration::from_millis(400)).await;
        assert!(rx.try_recv().is_err());

        sleep(Duration::from_millis(200)).await;
        assert_eq!(rx.try_recv().unwrap(), ack("2"));
        assert!(rx.try_recv().is_err());
        assert_eq!(trigger.last_acked().as_deref(), Some("2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_fires_for_own_latest_message() {
        let (mut trigger, mut rx) = trigger();
        trigger.evaluate(&room_state(B));
        sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_fires_when_already_read() {
        let (mut trigger, mut rx) = trigger();
        let mut state = room_state(A);
        state.on_messages_read(&MessagesRead {
            room_id: 5,
            message_id: "2".into(),
            user_id: A,
            read_at: None,
        });
        trigger.evaluate(&state);
        sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_target_cancels_pending_timer() {
        let (mut trigger, mut rx) = trigger();
        let mut state = room_state(A);
        trigger.evaluate(&state);

        sleep(Duration::from_millis(300)).await;
        state.on_new_message(&message("3", 5, B, 3));
        trigger.evaluate(&state);

        sleep(Duration::from_millis(300)).await;
        assert!(rx.try_recv().is_err());

        sleep(Duration::from_millis(300)).await;
        assert_eq!(rx.try_recv().unwrap(), ack("3"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_id_not_acknowledged_twice() {
        let (mut trigger, mut rx) = trigger();
        let state = room_state(A);
        trigger.evaluate(&state);
        sleep(Duration::from_secs(1)).await;
        assert_eq!(rx.try_recv().unwrap(), ack("2"));

        // Receipt echo not yet received; re-evaluating must not re-send.
        trigger.evaluate(&state);
        trigger.evaluate(&state);
        sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_ack() {
        let (mut trigger, mut rx) = trigger();
        trigger.evaluate(&room_state(A));
        drop(trigger);
        sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_room_never_fires() {
        let (mut trigger, mut rx) = trigger();
        trigger.evaluate(&ChatRoomState::new(&room(5, None), A));
        sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut trigger = ReadTrigger::new(5, tx).with_delay(Duration::from_millis(50));
        trigger.evaluate(&room_state(A));
        sleep(Duration::from_millis(60)).await;
        assert_eq!(rx.try_recv().unwrap(), ack("2"));
    }
}
