//! Friend list with live presence

use crate::models::{Friend, UserId, UserSetting};
use crate::realtime::events::UserStatusChanged;

#[derive(Debug, Clone, Default)]
pub struct FriendDirectory {
    friends: Vec<Friend>,
}

impl FriendDirectory {
    pub fn new(friends: Vec<Friend>) -> Self {
        Self { friends }
    }

    pub fn friends(&self) -> &[Friend] {
        &self.friends
    }

    pub fn get(&self, id: UserId) -> Option<&Friend> {
        self.friends.iter().find(|f| f.id == id)
    }

    pub fn online(&self) -> Vec<&Friend> {
        self.friends.iter().filter(|f| f.is_online()).collect()
    }

    pub fn on_status_changed(&mut self, status: &UserStatusChanged) -> bool {
        let Some(friend) = self.friends.iter_mut().find(|f| f.id == status.user_id) else {
            return false;
        };
        let setting = friend.setting.get_or_insert_with(UserSetting::default);
        setting.is_online = Some(status.is_online);
        if status.last_seen_at.is_some() {
            setting.last_seen_at = status.last_seen_at;
        }
        tracing::debug!(
            "Friend {} is now {}",
            friend.id,
            if status.is_online { "online" } else { "offline" }
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::at;

    fn friend(id: UserId) -> Friend {
        Friend {
            id,
            name: format!("friend{}", id),
            email: None,
            setting: None,
        }
    }

    #[test]
    fn test_status_change_updates_presence() {
        let mut dir = FriendDirectory::new(vec![friend(1), friend(2)]);
        assert!(dir.online().is_empty());

        let changed = dir.on_status_changed(&UserStatusChanged {
            user_id: 2,
            is_online: true,
            last_seen_at: None,
        });
        assert!(changed);
        assert_eq!(dir.online().len(), 1);
        assert!(dir.get(2).unwrap().is_online());

        dir.on_status_changed(&UserStatusChanged {
            user_id: 2,
            is_online: false,
            last_seen_at: Some(at(10)),
        });
        let setting = dir.get(2).unwrap().setting.as_ref().unwrap();
        assert_eq!(setting.is_online, Some(false));
        assert_eq!(setting.last_seen_at, Some(at(10)));
    }

    #[test]
    fn test_unknown_user_ignored() {
        let mut dir = FriendDirectory::new(vec![friend(1)]);
        assert!(!dir.on_status_changed(&UserStatusChanged {
            user_id: 9,
            is_online: true,
            last_seen_at: None,
        }));
    }
}
