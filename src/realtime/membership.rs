//! Room membership tracking for the shared connection

use std::collections::BTreeSet;

use crate::models::RoomId;

/// What the caller should do after a join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinAction {
    /// Connected: emit `join-room` now.
    Emit,
    /// Not connected yet: replayed once on connect.
    Deferred,
    /// Already joined or pending.
    Noop,
}

/// What the caller should do after a leave request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveAction {
    /// Emit `leave-room` now.
    Emit,
    /// A deferred join was cancelled; nothing was ever sent.
    CancelledPending,
    Noop,
}

/// Joined and pending rooms. Each room is in at most one of the two.
#[derive(Debug, Default)]
pub struct Membership {
    joined: BTreeSet<RoomId>,
    /// Join intents in request order
    pending: Vec<RoomId>,
}

impl Membership {
    pub fn request_join(&mut self, room_id: RoomId, connected: bool) -> JoinAction {
        if self.joined.contains(&room_id) || self.pending.contains(&room_id) {
            return JoinAction::Noop;
        }
        if connected {
            self.joined.insert(room_id);
            JoinAction::Emit
        } else {
            self.pending.push(room_id);
            JoinAction::Deferred
        }
    }

    pub fn request_leave(&mut self, room_id: RoomId, connected: bool) -> LeaveAction {
        if let Some(pos) = self.pending.iter().position(|&id| id == room_id) {
            self.pending.remove(pos);
            return LeaveAction::CancelledPending;
        }
        if self.joined.remove(&room_id) && connected {
            LeaveAction::Emit
        } else {
            LeaveAction::Noop
        }
    }

    /// Move all pending rooms to joined. Returns the rooms to announce.
    pub fn on_connected(&mut self) -> Vec<RoomId> {
        let mut replay = Vec::with_capacity(self.pending.len());
        for room_id in self.pending.drain(..) {
            if self.joined.insert(room_id) {
                replay.push(room_id);
            }
        }
        replay
    }

    pub fn clear(&mut self) {
        self.joined.clear();
        self.pending.clear();
    }

    #[cfg(test)]
    pub fn is_joined(&self, room_id: RoomId) -> bool {
        self.joined.contains(&room_id)
    }

    pub fn joined(&self) -> Vec<RoomId> {
        self.joined.iter().copied().collect()
    }

    #[cfg(test)]
    pub fn pending(&self) -> &[RoomId] {
        &self.pending
    }
}
