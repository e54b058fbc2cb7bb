//! Room list state, kept current from real-time events

use std::collections::{HashMap, HashSet};

use crate::models::{LastMessage, Message, Room, RoomId, UserId};
use crate::realtime::events::{MessagesRead, UnreadCountUpdate};
use crate::realtime::ServerEvent;

/// The viewer's rooms, most recent activity first.
#[derive(Debug, Clone)]
pub struct RoomList {
    viewer: UserId,
    rooms: Vec<Room>,
    /// Message ids already reflected in each room's preview and counter
    seen: HashMap<RoomId, HashSet<String>>,
}

impl RoomList {
    pub fn new(viewer: UserId) -> Self {
        Self {
            viewer,
            rooms: Vec::new(),
            seen: HashMap::new(),
        }
    }

    /// Replace the list with a fresh REST snapshot.
    pub fn load(&mut self, rooms: Vec<Room>) {
        self.seen.clear();
        for room in &rooms {
            self.mark_seen(room);
        }
        self.rooms = rooms;
        self.sort();
    }

    fn mark_seen(&mut self, room: &Room) {
        if let Some(last) = &room.last_message {
            self.seen.entry(room.id).or_default().insert(last.id.clone());
        }
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn get(&self, room_id: RoomId) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == room_id)
    }

    fn get_mut(&mut self, room_id: RoomId) -> Option<&mut Room> {
        self.rooms.iter_mut().find(|r| r.id == room_id)
    }

    pub fn total_unread(&self) -> u32 {
        self.rooms.iter().map(|r| r.unread_count).sum()
    }

    /// Rooms whose name contains `query`, case-insensitively.
    pub fn filter(&self, query: &str) -> Vec<&Room> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.rooms.iter().collect();
        }
        self.rooms
            .iter()
            .filter(|r| r.name.to_lowercase().contains(&needle))
            .collect()
    }

    // Stable, so rooms with equal activity keep their relative order.
    fn sort(&mut self) {
        self.rooms
            .sort_by(|a, b| b.latest_activity().cmp(&a.latest_activity()));
    }

    /// Returns true if the list changed.
    pub fn apply(&mut self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::NewMessage(msg) => self.on_new_message(msg),
            ServerEvent::MessagesRead(read) => self.on_messages_read(read),
            ServerEvent::UnreadCountUpdate(update) => self.on_unread_count(update),
            ServerEvent::RoomUpdated(room) => {
                self.on_room_updated((**room).clone());
                true
            }
            _ => false,
        }
    }

    /// Move the message's room to its activity position and count it unread.
    ///
    /// Each message id counts once per room. A message older than the
    /// current preview is counted but does not replace it.
    pub fn on_new_message(&mut self, msg: &Message) -> bool {
        let Some(room) = self.rooms.iter_mut().find(|r| r.id == msg.room_id) else {
            tracing::debug!("new-message for unknown room {}, ignoring", msg.room_id);
            return false;
        };
        if !self.seen.entry(msg.room_id).or_default().insert(msg.id.clone()) {
            tracing::debug!("Duplicate new-message {} in room list", msg.id);
            return false;
        }

        if room.last_message.is_none() || msg.created_at >= room.latest_activity() {
            room.last_message = Some(LastMessage::from(msg));
            room.last_message_at = Some(msg.created_at);
        }
        if msg.sender_id != self.viewer {
            room.unread_count += 1;
        }
        self.sort();
        true
    }

    /// A read by the viewer clears the room's unread counter.
    pub fn on_messages_read(&mut self, read: &MessagesRead) -> bool {
        if read.user_id != self.viewer {
            return false;
        }
        match self.get_mut(read.room_id) {
            Some(room) if room.unread_count != 0 => {
                room.unread_count = 0;
                true
            }
            _ => false,
        }
    }

    /// Server counter wins over any local increment.
    pub fn on_unread_count(&mut self, update: &UnreadCountUpdate) -> bool {
        match self.get_mut(update.room_id) {
            Some(room) => {
                room.unread_count = update.unread_count;
                true
            }
            None => {
                tracing::debug!("unread-count-update for unknown room {}", update.room_id);
                false
            }
        }
    }

    pub fn on_room_updated(&mut self, room: Room) {
        self.mark_seen(&room);
        match self.get_mut(room.id) {
            Some(existing) => *existing = room,
            None => self.rooms.push(room),
        }
        self.sort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{at, message, room};

    const VIEWER: UserId = 1;

    fn list(rooms: Vec<Room>) -> RoomList {
        let mut l = RoomList::new(VIEWER);
        l.load(rooms);
        l
    }

    fn ids(l: &RoomList) -> Vec<RoomId> {
        l.rooms().iter().map(|r| r.id).collect()
    }

    fn assert_sorted(l: &RoomList) {
        for pair in l.rooms().windows(2) {
            assert!(pair[0].latest_activity() >= pair[1].latest_activity());
        }
    }

    #[test]
    fn test_load_sorts_by_activity_with_fallbacks() {
        let mut by_timestamp = room(3, None);
        by_timestamp.last_message_at = Some(at(20));
        let l = list(vec![room(1, Some(10)), room(2, None), by_timestamp, room(4, Some(30))]);
        assert_eq!(ids(&l), vec![4, 3, 1, 2]);
    }

    #[test]
    fn test_new_message_moves_room_to_front() {
        let mut l = list(vec![room(1, Some(30)), room(2, Some(20)), room(3, Some(10))]);
        assert!(l.on_new_message(&message("m9", 3, 2, 40)));

        assert_eq!(ids(&l), vec![3, 1, 2]);
        let r = l.get(3).unwrap();
        assert_eq!(r.unread_count, 1);
        assert_eq!(r.last_message.as_ref().unwrap().id, "m9");
        assert_sorted(&l);
    }

    #[test]
    fn test_duplicate_new_message_counted_once() {
        let mut l = list(vec![room(1, Some(0))]);
        let msg = message("m1", 1, 2, 5);
        assert!(l.on_new_message(&msg));
        assert!(!l.on_new_message(&msg));
        assert_eq!(l.get(1).unwrap().unread_count, 1);
    }

    #[test]
    fn test_redelivered_older_message_counted_once() {
        let mut l = list(vec![room(1, Some(0)), room(2, Some(15))]);
        let m1 = message("m1", 1, 2, 10);
        assert!(l.on_new_message(&m1));
        assert!(l.on_new_message(&message("m2", 1, 2, 20)));
        assert!(!l.on_new_message(&m1));

        let r = l.get(1).unwrap();
        assert_eq!(r.unread_count, 2);
        assert_eq!(r.last_message.as_ref().unwrap().id, "m2");
        assert_eq!(ids(&l), vec![1, 2]);
    }

    #[test]
    fn test_late_message_keeps_newer_preview() {
        let mut l = list(vec![room(1, Some(30))]);
        assert!(l.on_new_message(&message("old", 1, 2, 5)));
        let r = l.get(1).unwrap();
        assert_eq!(r.unread_count, 1);
        assert_eq!(r.last_message.as_ref().unwrap().id, "last-1");
    }

    #[test]
    fn test_snapshot_preview_not_recounted() {
        let mut l = list(vec![room(1, Some(30))]);
        let mut echo = message("last-1", 1, 99, 30);
        echo.text = Some("hello".into());
        assert!(!l.on_new_message(&echo));
        assert_eq!(l.get(1).unwrap().unread_count, 0);
    }

    #[test]
    fn test_own_message_does_not_count_unread() {
        let mut l = list(vec![room(1, Some(0))]);
        l.on_new_message(&message("m1", 1, VIEWER, 5));
        assert_eq!(l.get(1).unwrap().unread_count, 0);
        assert_eq!(l.get(1).unwrap().last_message.as_ref().unwrap().id, "m1");
    }

    #[test]
    fn test_new_message_for_unknown_room_ignored() {
        let mut l = list(vec![room(1, Some(0))]);
        assert!(!l.on_new_message(&message("m1", 42, 2, 5)));
        assert_eq!(ids(&l), vec![1]);
    }

    #[test]
    fn test_messages_read_by_viewer_zeroes_unread() {
        let mut r = room(1, Some(0));
        r.unread_count = 4;
        let mut l = list(vec![r]);

        let mut read = MessagesRead {
            room_id: 1,
            message_id: "m1".into(),
            user_id: 7,
            read_at: None,
        };
        assert!(!l.on_messages_read(&read));
        assert_eq!(l.get(1).unwrap().unread_count, 4);

        read.user_id = VIEWER;
        assert!(l.on_messages_read(&read));
        assert_eq!(l.get(1).unwrap().unread_count, 0);
    }

    #[test]
    fn test_unread_update_overwrites_in_either_order() {
        let update = ServerEvent::UnreadCountUpdate(UnreadCountUpdate {
            room_id: 5,
            unread_count: 3,
        });
        let new_msg = ServerEvent::NewMessage(Box::new(message("m1", 5, 2, 10)));

        let mut a = list(vec![room(5, Some(0))]);
        a.apply(&new_msg);
        a.apply(&update);
        assert_eq!(a.get(5).unwrap().unread_count, 3);

        // Last write wins: a later local increment stands until the next update.
        let mut b = list(vec![room(5, Some(0))]);
        b.apply(&update);
        b.apply(&new_msg);
        assert_eq!(b.get(5).unwrap().unread_count, 4);
        b.apply(&update);
        assert_eq!(b.get(5).unwrap().unread_count, 3);
    }

    #[test]
    fn test_room_updated_replaces_or_inserts() {
        let mut l = list(vec![room(1, Some(10)), room(2, Some(5))]);
        let mut renamed = room(2, Some(20));
        renamed.name = "Family".into();
        l.apply(&ServerEvent::RoomUpdated(Box::new(renamed)));
        assert_eq!(ids(&l), vec![2, 1]);
        assert_eq!(l.get(2).unwrap().name, "Family");

        l.on_room_updated(room(3, Some(1)));
        assert_eq!(ids(&l), vec![2, 1, 3]);
        assert_sorted(&l);
    }

    #[test]
    fn test_filter_and_total_unread() {
        let mut a = room(1, Some(1));
        a.name = "Family Chat".into();
        a.unread_count = 2;
        let mut b = room(2, Some(2));
        b.name = "Work".into();
        b.unread_count = 5;
        let l = list(vec![a, b]);

        let found: Vec<RoomId> = l.filter("family").iter().map(|r| r.id).collect();
        assert_eq!(found, vec![1]);
        assert_eq!(l.filter("  ").len(), 2);
        assert_eq!(l.total_unread(), 7);
    }

    #[test]
    fn test_connection_events_ignored() {
        let mut l = list(vec![room(1, Some(0))]);
        assert!(!l.apply(&ServerEvent::Connected));
    }
}
