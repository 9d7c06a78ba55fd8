//! Session model
//!
//! A session is an authenticated, live participant bound to one open
//! connection. It is created only when the login workflow succeeds and
//! destroyed on disconnect, kick or ban.

use std::collections::HashSet;

use crate::types::{ConnId, Permission, SessionId};

/// Display names are capped at this many characters, matching the
/// account store's column width.
pub const MAX_NAME_LEN: usize = 20;

/// An authenticated participant.
#[derive(Debug, Clone)]
pub struct Session {
    /// Display name, unique among active sessions
    pub name: String,
    /// Numeric id assigned at creation
    pub id: SessionId,
    /// Current permission level; seeded from the account at login, may be
    /// overridden at runtime by Admin commands
    pub permission: Permission,
    /// Owning connection
    pub conn: ConnId,
    /// Joined room names; always contains the default room
    rooms: HashSet<String>,
}

impl Session {
    /// Create a session already joined to the default room.
    pub fn new(
        name: impl Into<String>,
        id: SessionId,
        permission: Permission,
        conn: ConnId,
        default_room: &str,
    ) -> Self {
        let mut rooms = HashSet::new();
        rooms.insert(default_room.to_string());
        Self {
            name: name.into(),
            id,
            permission,
            conn,
            rooms,
        }
    }

    /// Whether this session has joined the named room.
    pub fn in_room(&self, room: &str) -> bool {
        self.rooms.contains(room)
    }

    /// Join a room. Idempotent.
    pub fn add_room(&mut self, room: &str) {
        self.rooms.insert(room.to_string());
    }

    /// Leave a room. The caller guards the default room.
    pub fn remove_room(&mut self, room: &str) -> bool {
        self.rooms.remove(room)
    }

    /// Joined room names, sorted for stable replies.
    pub fn rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self.rooms.iter().cloned().collect();
        rooms.sort();
        rooms
    }
}
