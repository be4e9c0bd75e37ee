//! Persistence layer for bridged chats: maps portal rows of the `portal`
//! table to in-memory entities and back.

pub mod db;
pub mod id;

pub use db::Database;
pub use db::portal::{Portal, PortalQuery};
pub use id::{ContentUri, InvalidContentUri, RoomId};
