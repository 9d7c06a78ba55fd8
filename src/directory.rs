//! Session & Room Directory
//!
//! The authoritative in-memory maps of active sessions and room
//! membership. The maps are private: every mutation flows through the
//! operations here, and only the server actor calls them, so there is no
//! shared-memory contention anywhere in the system.

use std::collections::HashMap;

use crate::session::Session;
use crate::types::{ConnId, Permission};

/// Result of a room mutation that callers turn into reply frames.
#[derive(Debug, PartialEq, Eq)]
pub enum RoomChange {
    Done,
    /// Room already exists (create) or does not exist (join/leave/delete)
    NoSuchRoom,
    AlreadyExists,
    /// Attempt to leave or delete the default room
    DefaultRoom,
}

/// In-memory registry of active sessions and rooms.
#[derive(Debug)]
pub struct Directory {
    sessions: HashMap<String, Session>,
    /// Join order of display names, for stable user manifests
    order: Vec<String>,
    rooms: Vec<String>,
    default_room: String,
}

impl Directory {
    /// Create a directory containing only the default room.
    pub fn new(default_room: impl Into<String>) -> Self {
        let default_room = default_room.into();
        Self {
            sessions: HashMap::new(),
            order: Vec::new(),
            rooms: vec![default_room.clone()],
            default_room,
        }
    }

    /// Name of the default room.
    pub fn default_room(&self) -> &str {
        &self.default_room
    }

    /// Register a fully-formed session under its display name.
    ///
    /// The login workflow resolves name collisions before calling this;
    /// a residual collision is a bug, so the existing session wins and
    /// the insert is refused.
    pub fn register_session(&mut self, session: Session) -> bool {
        if self.sessions.contains_key(&session.name) {
            return false;
        }
        self.order.push(session.name.clone());
        self.sessions.insert(session.name.clone(), session);
        true
    }

    /// Remove a session by name. Idempotent.
    pub fn remove_session(&mut self, name: &str) -> Option<Session> {
        self.order.retain(|n| n != name);
        self.sessions.remove(name)
    }

    /// Remove the session owning the given connection, if any.
    pub fn remove_by_conn(&mut self, conn: ConnId) -> Option<Session> {
        let name = self
            .sessions
            .values()
            .find(|s| s.conn == conn)
            .map(|s| s.name.clone())?;
        self.remove_session(&name)
    }

    /// Look up an active session by display name.
    pub fn lookup(&self, name: &str) -> Option<&Session> {
        self.sessions.get(name)
    }

    /// Mutable lookup, for permission and room-set updates.
    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Session> {
        self.sessions.get_mut(name)
    }

    /// Whether any active session uses this display name.
    pub fn name_taken(&self, name: &str) -> bool {
        self.sessions.contains_key(name)
    }

    /// Active display names in join order.
    pub fn list_usernames(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Names of active sessions holding Manager permission.
    pub fn list_managers(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| {
                self.sessions
                    .get(*name)
                    .is_some_and(|s| s.permission == Permission::Manager)
            })
            .cloned()
            .collect()
    }

    /// All sessions, in join order.
    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.order.iter().filter_map(|name| self.sessions.get(name))
    }

    /// Whether the named room exists.
    pub fn room_exists(&self, name: &str) -> bool {
        self.rooms.iter().any(|r| r == name)
    }

    /// Current room names.
    pub fn rooms(&self) -> &[String] {
        &self.rooms
    }

    /// Create a room. Room names may not shadow an active display name,
    /// which would make message targets ambiguous.
    pub fn create_room(&mut self, name: &str) -> RoomChange {
        if self.room_exists(name) || self.name_taken(name) {
            return RoomChange::AlreadyExists;
        }
        self.rooms.push(name.to_string());
        RoomChange::Done
    }

    /// Delete a room, evicting it from every session's room set.
    /// Returns the evicted member names so the caller can notify them.
    pub fn delete_room(&mut self, name: &str) -> Result<Vec<String>, RoomChange> {
        if name == self.default_room {
            return Err(RoomChange::DefaultRoom);
        }
        if !self.room_exists(name) {
            return Err(RoomChange::NoSuchRoom);
        }
        self.rooms.retain(|r| r != name);
        let mut evicted = Vec::new();
        for member in self.order.clone() {
            if let Some(session) = self.sessions.get_mut(&member) {
                if session.remove_room(name) {
                    evicted.push(member);
                }
            }
        }
        Ok(evicted)
    }

    /// Join a session to an existing room.
    pub fn join_room(&mut self, session_name: &str, room: &str) -> RoomChange {
        if !self.room_exists(room) {
            return RoomChange::NoSuchRoom;
        }
        match self.sessions.get_mut(session_name) {
            Some(session) => {
                session.add_room(room);
                RoomChange::Done
            }
            None => RoomChange::NoSuchRoom,
        }
    }

    /// Leave a room. The default room cannot be left.
    pub fn leave_room(&mut self, session_name: &str, room: &str) -> RoomChange {
        if room == self.default_room {
            return RoomChange::DefaultRoom;
        }
        if !self.room_exists(room) {
            return RoomChange::NoSuchRoom;
        }
        match self.sessions.get_mut(session_name) {
            Some(session) => {
                session.remove_room(room);
                RoomChange::Done
            }
            None => RoomChange::NoSuchRoom,
        }
    }
}
