//! Per-connection session state.

use std::collections::HashSet;
use uuid::Uuid;

use crate::room::RoomId;

/// A unique session identifier.
pub type SessionId = String;

/// Lifecycle state of a session.
///
/// The handshake happens before a `Session` exists, so a session starts out
/// authenticated and ends disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Identity resolved; may join rooms and act in them.
    Authenticated,
    /// Connection gone. Terminal.
    Disconnected,
}

/// A live, authenticated connection.
///
/// Owned by the task driving the connection; nothing else mutates it.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    user_id: String,
    username: String,
    joined_rooms: HashSet<RoomId>,
    state: SessionState,
}

impl Session {
    /// Create an authenticated session with a fresh id.
    #[must_use]
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            username: username.into(),
            joined_rooms: HashSet::new(),
            state: SessionState::Authenticated,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Check if the session can still act.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// Rooms this session has joined.
    pub fn joined_rooms(&self) -> impl Iterator<Item = &RoomId> {
        self.joined_rooms.iter()
    }

    /// Check if this session has joined a room.
    #[must_use]
    pub fn has_joined(&self, room_id: &str) -> bool {
        self.joined_rooms.contains(room_id)
    }

    /// Record a joined room. Returns `true` if it was not joined yet.
    pub(crate) fn join(&mut self, room_id: &str) -> bool {
        self.joined_rooms.insert(room_id.to_string())
    }

    /// Forget a joined room. Returns `true` if it was joined.
    pub(crate) fn leave(&mut self, room_id: &str) -> bool {
        self.joined_rooms.remove(room_id)
    }

    /// Mark the session disconnected and hand back the rooms it had joined.
    ///
    /// A second call returns nothing.
    pub(crate) fn close(&mut self) -> Vec<RoomId> {
        self.state = SessionState::Disconnected;
        self.joined_rooms.drain().collect()
    }
}
