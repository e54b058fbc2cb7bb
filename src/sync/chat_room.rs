//! Open chat room state: message timeline, receipts and typing

use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;

use crate::models::{Message, Room, RoomId, RoomType, UserId};
use crate::realtime::events::{MessagesRead, RoomMemberChange, UserTyping};
use crate::realtime::ServerEvent;

/// Read state shown under a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadIndicator {
    None,
    /// Direct room: the other party has read it
    Read,
    /// Group room: number of readers besides the sender
    ReadBy(usize),
}

impl fmt::Display for ReadIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadIndicator::None => Ok(()),
            ReadIndicator::Read => write!(f, "read"),
            ReadIndicator::ReadBy(n) => write!(f, "{} read", n),
        }
    }
}

/// Messages of one room in (created_at, id) order, unique by id.
#[derive(Debug, Clone)]
pub struct ChatRoomState {
    room_id: RoomId,
    room_type: RoomType,
    viewer: UserId,
    participant_count: u32,
    messages: Vec<Message>,
    /// user id -> display name
    typing: BTreeMap<UserId, String>,
}

impl ChatRoomState {
    pub fn new(room: &Room, viewer: UserId) -> Self {
        Self {
            room_id: room.id,
            room_type: room.room_type,
            viewer,
            participant_count: room.participant_count,
            messages: Vec::new(),
            typing: BTreeMap::new(),
        }
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn participant_count(&self) -> u32 {
        self.participant_count
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn latest(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Replace the timeline with a REST snapshot.
    pub fn load(&mut self, messages: Vec<Message>) {
        self.messages.clear();
        for msg in messages {
            self.insert(msg);
        }
    }

    /// Insert a message returned by our own send request.
    pub fn insert_local(&mut self, msg: Message) -> bool {
        self.insert(msg)
    }

    fn insert(&mut self, msg: Message) -> bool {
        if msg.room_id != self.room_id || self.messages.iter().any(|m| m.id == msg.id) {
            return false;
        }
        let pos = self
            .messages
            .partition_point(|m| (m.created_at, m.id.as_str()) <= (msg.created_at, msg.id.as_str()));
        self.messages.insert(pos, msg);
        true
    }

    /// Returns true if the state changed.
    pub fn apply(&mut self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::NewMessage(msg) => self.on_new_message(msg),
            ServerEvent::MessagesRead(read) => self.on_messages_read(read),
            ServerEvent::UserTyping(t) => self.on_typing(t),
            ServerEvent::UserJoined(change) => self.on_member_joined(change),
            ServerEvent::UserLeft(change) => self.on_member_left(change),
            ServerEvent::RoomUpdated(room) if room.id == self.room_id => {
                self.room_type = room.room_type;
                self.participant_count = room.participant_count;
                true
            }
            _ => false,
        }
    }

    pub fn on_new_message(&mut self, msg: &Message) -> bool {
        if msg.room_id != self.room_id {
            return false;
        }
        let inserted = self.insert(msg.clone());
        if inserted {
            // A message ends the sender's typing indicator.
            self.typing.remove(&msg.sender_id);
        } else {
            tracing::debug!("Duplicate new-message {} ignored", msg.id);
        }
        inserted
    }

    /// Record a receipt on the referenced message. Existing receipts are kept.
    pub fn on_messages_read(&mut self, read: &MessagesRead) -> bool {
        if read.room_id != self.room_id {
            return false;
        }
        let read_at = read.read_at.unwrap_or_else(Utc::now);
        match self.messages.iter_mut().find(|m| m.id == read.message_id) {
            Some(msg) => msg.merge_receipt(read.user_id, read_at),
            None => false,
        }
    }

    pub fn on_typing(&mut self, t: &UserTyping) -> bool {
        if t.room_id != self.room_id || t.user_id == self.viewer {
            return false;
        }
        if t.is_typing {
            self.typing.insert(t.user_id, t.user_name.clone()).is_none()
        } else {
            self.typing.remove(&t.user_id).is_some()
        }
    }

    pub fn on_member_joined(&mut self, change: &RoomMemberChange) -> bool {
        if change.room_id != self.room_id {
            return false;
        }
        self.participant_count += 1;
        true
    }

    pub fn on_member_left(&mut self, change: &RoomMemberChange) -> bool {
        if change.room_id != self.room_id {
            return false;
        }
        self.typing.remove(&change.user_id);
        self.participant_count = self.participant_count.saturating_sub(1);
        true
    }

    /// Names of users currently typing.
    pub fn typing_users(&self) -> Vec<&str> {
        self.typing.values().map(String::as_str).collect()
    }

    pub fn read_indicator(&self, msg: &Message) -> ReadIndicator {
        match (msg.read_by_count(), self.room_type) {
            (0, _) => ReadIndicator::None,
            (_, RoomType::Direct) => ReadIndicator::Read,
            (n, RoomType::Group) => ReadIndicator::ReadBy(n),
        }
    }

    /// Id of the latest message if the viewer still has to acknowledge it.
    pub fn pending_read_target(&self) -> Option<&str> {
        let latest = self.latest()?;
        if latest.sender_id == self.viewer || latest.is_read_by(self.viewer) {
            return None;
        }
        Some(&latest.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{at, message, room};

    const VIEWER: UserId = 1;

    fn state() -> ChatRoomState {
        ChatRoomState::new(&room(5, None), VIEWER)
    }

    fn ids(s: &ChatRoomState) -> Vec<&str> {
        s.messages().iter().map(|m| m.id.as_str()).collect()
    }

    fn read(message_id: &str, user_id: UserId) -> MessagesRead {
        MessagesRead {
            room_id: 5,
            message_id: message_id.into(),
            user_id,
            read_at: Some(at(100)),
        }
    }

    #[test]
    fn test_duplicate_new_message_kept_once() {
        let mut s = state();
        let msg = message("a", 5, 2, 1);
        assert!(s.on_new_message(&msg));
        assert!(!s.on_new_message(&msg));
        assert!(s.on_new_message(&message("b", 5, 2, 2)));
        assert!(!s.on_new_message(&msg));
        assert_eq!(ids(&s), vec!["a", "b"]);
    }

    #[test]
    fn test_own_send_then_echo_is_deduplicated() {
        let mut s = state();
        let mine = message("m1", 5, VIEWER, 1);
        assert!(s.insert_local(mine.clone()));
        assert!(!s.apply(&ServerEvent::NewMessage(Box::new(mine))));
        assert_eq!(s.messages().len(), 1);
    }

    #[test]
    fn test_out_of_order_arrival_is_commutative() {
        let (a, b, c) = (message("a", 5, 2, 1), message("b", 5, 3, 2), message("c", 5, 2, 3));

        let mut s1 = state();
        for m in [&a, &b, &c] {
            s1.on_new_message(m);
        }
        let mut s2 = state();
        for m in [&c, &a, &b] {
            s2.on_new_message(m);
        }
        assert_eq!(ids(&s1), vec!["a", "b", "c"]);
        assert_eq!(ids(&s1), ids(&s2));
    }

    #[test]
    fn test_other_room_ignored() {
        let mut s = state();
        assert!(!s.on_new_message(&message("x", 6, 2, 1)));
        assert!(s.messages().is_empty());
    }

    #[test]
    fn test_messages_read_merges_once() {
        let mut s = state();
        s.load(vec![message("a", 5, VIEWER, 1)]);

        assert!(s.on_messages_read(&read("a", 2)));
        let mut later = read("a", 2);
        later.read_at = Some(at(500));
        assert!(!s.on_messages_read(&later));

        let msg = &s.messages()[0];
        assert_eq!(msg.read_by.len(), 1);
        assert_eq!(msg.read_by[0].read_at, at(100));
        assert!(!s.on_messages_read(&read("missing", 2)));
    }

    #[test]
    fn test_messages_read_without_timestamp_uses_clock() {
        let mut s = state();
        s.load(vec![message("a", 5, VIEWER, 1)]);
        let before = Utc::now();
        let mut r = read("a", 2);
        r.read_at = None;
        assert!(s.on_messages_read(&r));
        assert!(s.messages()[0].read_by[0].read_at >= before);
    }

    #[test]
    fn test_read_indicator_by_room_type() {
        let mut direct = state();
        direct.load(vec![message("a", 5, VIEWER, 1)]);
        assert_eq!(direct.read_indicator(&direct.messages()[0]), ReadIndicator::None);
        direct.on_messages_read(&read("a", 2));
        assert_eq!(direct.read_indicator(&direct.messages()[0]), ReadIndicator::Read);

        let mut group_room = room(5, None);
        group_room.room_type = RoomType::Group;
        let mut group = ChatRoomState::new(&group_room, VIEWER);
        group.load(vec![message("a", 5, VIEWER, 1)]);
        // The sender's own receipt is not counted.
        group.on_messages_read(&read("a", VIEWER));
        assert_eq!(group.read_indicator(&group.messages()[0]), ReadIndicator::None);
        group.on_messages_read(&read("a", 2));
        group.on_messages_read(&read("a", 3));
        let indicator = group.read_indicator(&group.messages()[0]);
        assert_eq!(indicator, ReadIndicator::ReadBy(2));
        assert_eq!(indicator.to_string(), "2 read");
    }

    #[test]
    fn test_pending_read_target() {
        let mut s = state();
        assert_eq!(s.pending_read_target(), None);

        s.load(vec![message("1", 5, VIEWER, 1), message("2", 5, 2, 2)]);
        assert_eq!(s.pending_read_target(), Some("2"));

        s.on_messages_read(&read("2", VIEWER));
        assert_eq!(s.pending_read_target(), None);

        s.on_new_message(&message("3", 5, VIEWER, 3));
        assert_eq!(s.pending_read_target(), None);
    }

    #[test]
    fn test_typing_tracking() {
        let mut s = state();
        let mut t = UserTyping {
            room_id: 5,
            user_id: 2,
            user_name: "Mina".into(),
            is_typing: true,
        };
        assert!(s.on_typing(&t));
        assert!(!s.on_typing(&t));
        assert_eq!(s.typing_users(), vec!["Mina"]);

        // The viewer's own echo is ignored.
        t.user_id = VIEWER;
        assert!(!s.on_typing(&t));

        s.on_new_message(&message("a", 5, 2, 1));
        assert!(s.typing_users().is_empty());
    }

    #[test]
    fn test_member_changes_adjust_participants() {
        let mut s = state();
        let change = RoomMemberChange {
            user_id: 4,
            room_id: 5,
            user_name: "Joon".into(),
        };
        assert!(s.apply(&ServerEvent::UserJoined(change.clone())));
        assert_eq!(s.participant_count(), 3);
        assert!(s.apply(&ServerEvent::UserLeft(change)));
        assert_eq!(s.participant_count(), 2);
    }
}
