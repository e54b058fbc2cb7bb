//! Data models for Ieum chat entities

mod message;
mod room;
mod summary;
mod user;

pub use message::*;
pub use room::*;
pub use summary::*;
pub use user::*;

/// Numeric room identifier (relational row id on the backend).
pub type RoomId = i64;

/// Numeric user identifier.
pub type UserId = i64;
