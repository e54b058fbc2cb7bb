//! Local state reconciled from REST snapshots and real-time events
//!
//! Each reconciler is a plain struct owned by whoever displays it. Feed it
//! the initial REST snapshot with `load`, then every `ServerEvent` with
//! `apply`.

pub mod chat_room;
pub mod friends;
pub mod read_trigger;
pub mod room_list;

pub use chat_room::ChatRoomState;
pub use friends::FriendDirectory;
pub use read_trigger::ReadTrigger;
pub use room_list::RoomList;
