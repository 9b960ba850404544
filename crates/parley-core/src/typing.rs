//! Typing indicator relay.
//!
//! Stateless and best effort: an indicator is relayed only if the user is
//! present in the room at that moment. Indicators racing a join are lost.

use parley_protocol::ServerEvent;
use std::sync::Arc;
use tracing::trace;

use crate::presence::PresenceTracker;
use crate::registry::ConnectionRegistry;
use crate::session::Session;

/// Relays typing indicators to the other users present in a room.
pub struct TypingRelay {
    presence: Arc<PresenceTracker>,
    registry: Arc<ConnectionRegistry>,
}

impl TypingRelay {
    pub fn new(presence: Arc<PresenceTracker>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { presence, registry }
    }

    /// Relay a typing start (`typing == true`) or stop.
    ///
    /// Returns the number of sessions notified, or `None` if the user is not
    /// present in the room.
    pub fn relay(&self, session: &Session, room_id: &str, typing: bool) -> Option<usize> {
        if !self.presence.contains(room_id, session.user_id()) {
            trace!(session = %session.id(), room = %room_id, "Typing from absent user, dropping");
            return None;
        }

        let user_id = session.user_id().to_string();
        let username = session.username().to_string();
        let room = room_id.to_string();
        let event = if typing {
            ServerEvent::UserTyping {
                user_id,
                username,
                room_id: room,
            }
        } else {
            ServerEvent::UserStopTyping {
                user_id,
                username,
                room_id: room,
            }
        };

        Some(
            self.registry
                .broadcast_to_room(&self.presence, room_id, event, Some(session.user_id())),
        )
    }
}
