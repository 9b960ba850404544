//! Connection registry for Parley.
//!
//! The registry maps live sessions to their outbound queues and users to
//! their sessions. Fan-out resolves a room's present users through the
//! [`PresenceTracker`] and pushes one shared event into every matching
//! session queue.

use dashmap::DashMap;
use parley_protocol::ServerEvent;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, trace, warn};

use crate::presence::PresenceTracker;
use crate::session::{Session, SessionId};

/// Default capacity of a session's outbound queue.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

/// Receiving half of a session's outbound queue.
pub type OutboundReceiver = mpsc::Receiver<Arc<ServerEvent>>;

struct SessionEntry {
    user_id: String,
    tx: mpsc::Sender<Arc<ServerEvent>>,
}

/// Live sessions and their outbound queues.
pub struct ConnectionRegistry {
    /// Sessions indexed by id.
    sessions: DashMap<SessionId, SessionEntry>,
    /// User id -> session ids.
    users: DashMap<String, HashSet<SessionId>>,
    /// Outbound queue capacity per session.
    capacity: usize,
}

impl ConnectionRegistry {
    /// Create a registry with the default outbound buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_OUTBOUND_BUFFER)
    }

    /// Create a registry with a custom outbound buffer per session.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        info!(capacity, "Creating connection registry");
        Self {
            sessions: DashMap::new(),
            users: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Register a session and return its outbound queue.
    pub fn register(&self, session: &Session) -> OutboundReceiver {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.sessions.insert(
            session.id().to_string(),
            SessionEntry {
                user_id: session.user_id().to_string(),
                tx,
            },
        );
        self.users
            .entry(session.user_id().to_string())
            .or_default()
            .insert(session.id().to_string());

        debug!(session = %session.id(), user = %session.user_id(), "Registered session");
        rx
    }

    /// Remove a session. Returns `false` if it was not registered.
    pub fn unregister(&self, session_id: &str) -> bool {
        let Some((_, entry)) = self.sessions.remove(session_id) else {
            return false;
        };

        if let Some(mut sessions) = self.users.get_mut(&entry.user_id) {
            sessions.remove(session_id);
        }
        self.users.remove_if(&entry.user_id, |_, sessions| sessions.is_empty());

        debug!(session = %session_id, user = %entry.user_id, "Unregistered session");
        true
    }

    /// Queue an event for one session.
    ///
    /// Returns `true` if the event was queued.
    pub fn send_to_session(&self, session_id: &str, event: Arc<ServerEvent>) -> bool {
        match self.sessions.get(session_id) {
            Some(entry) => deliver(session_id, &entry.tx, event),
            None => false,
        }
    }

    /// Queue an event for every session of the given users.
    ///
    /// Returns the number of sessions the event was queued for.
    pub fn send_to_users<'a, I>(
        &self,
        user_ids: I,
        event: &Arc<ServerEvent>,
        exclude_user: Option<&str>,
    ) -> usize
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut delivered = 0;
        for user_id in user_ids {
            if exclude_user == Some(user_id.as_str()) {
                continue;
            }
            let Some(session_ids) = self.users.get(user_id) else {
                continue;
            };
            for session_id in session_ids.iter() {
                if let Some(entry) = self.sessions.get(session_id) {
                    if deliver(session_id, &entry.tx, Arc::clone(event)) {
                        delivered += 1;
                    }
                }
            }
        }
        delivered
    }

    /// Queue an event for everyone present in a room, optionally skipping one user.
    ///
    /// Returns the number of sessions the event was queued for.
    pub fn broadcast_to_room(
        &self,
        presence: &PresenceTracker,
        room_id: &str,
        event: ServerEvent,
        exclude_user: Option<&str>,
    ) -> usize {
        let event = Arc::new(event);
        let users = presence.users(room_id);
        let count = self.send_to_users(&users, &event, exclude_user);
        trace!(room = %room_id, event = event.name(), recipients = count, "Broadcast");
        count
    }

    /// Check if a user has at least one live session.
    #[must_use]
    pub fn is_connected(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            session_count: self.sessions.len(),
            user_count: self.users.len(),
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn deliver(
    session_id: &str,
    tx: &mpsc::Sender<Arc<ServerEvent>>,
    event: Arc<ServerEvent>,
) -> bool {
    match tx.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(event)) => {
            warn!(
                session = %session_id,
                event = event.name(),
                "Outbound queue full, dropping event"
            );
            false
        }
        Err(TrySendError::Closed(_)) => {
            trace!(session = %session_id, "Outbound queue closed");
            false
        }
    }
}

/// Registry statistics.
#[derive(Debug, Clone)]
pub struct RegistryStats {
    /// Number of live sessions.
    pub session_count: usize,
    /// Number of distinct connected users.
    pub user_count: usize,
}
