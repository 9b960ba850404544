//! Presence tracking for Parley.
//!
//! Presence records which users are currently connected to which rooms on
//! this gateway instance. It is the one piece of state shared by every
//! connection handler, so it is kept behind this narrow interface: insert,
//! remove and query. Nothing is persisted; a restart starts from empty.

use dashmap::DashMap;
use std::collections::HashSet;
use tracing::debug;

use crate::room::RoomId;

/// Room → present users.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    rooms: DashMap<RoomId, HashSet<String>>,
}

impl PresenceTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a user present in a room.
    ///
    /// Returns `true` if the user was not present before.
    pub fn insert(&self, room_id: &str, user_id: &str) -> bool {
        let inserted = self
            .rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(user_id.to_string());

        if inserted {
            debug!(room = %room_id, user = %user_id, "Presence: user joined");
        }
        inserted
    }

    /// Remove a user from a room.
    ///
    /// Returns `true` if the user was present. A room left empty is dropped.
    pub fn remove(&self, room_id: &str, user_id: &str) -> bool {
        let removed = match self.rooms.get_mut(room_id) {
            Some(mut users) => users.remove(user_id),
            None => false,
        };

        // The shard guard above is released; re-check emptiness under the lock.
        self.rooms.remove_if(room_id, |_, users| users.is_empty());

        if removed {
            debug!(room = %room_id, user = %user_id, "Presence: user left");
        }
        removed
    }

    /// Check if a user is present in a room.
    #[must_use]
    pub fn contains(&self, room_id: &str, user_id: &str) -> bool {
        self.rooms
            .get(room_id)
            .map(|users| users.contains(user_id))
            .unwrap_or(false)
    }

    /// Snapshot of the users present in a room.
    #[must_use]
    pub fn users(&self, room_id: &str) -> Vec<String> {
        self.rooms
            .get(room_id)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of users present in a room.
    #[must_use]
    pub fn count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map(|users| users.len()).unwrap_or(0)
    }

    /// Number of rooms with at least one present user.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Check if nobody is present anywhere.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
