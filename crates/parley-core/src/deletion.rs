//! Deletion authority.
//!
//! Only the author of a message may delete it, only through the room it was
//! posted to, and only while still a member of that room. Deletion is soft: the row stays, flagged, and everyone
//! present in the room is told to redact it.

use chrono::Utc;
use parley_protocol::ServerEvent;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::membership::MembershipAuthority;
use crate::presence::PresenceTracker;
use crate::registry::ConnectionRegistry;
use crate::session::Session;
use crate::store::{ChatStore, StoreResult};

/// What happened to a deletion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The message was flagged and the room notified.
    Deleted { recipients: usize },
    /// Not a member, not found, wrong room, already deleted or not the author.
    Ignored,
}

/// Checks ownership and soft-deletes messages.
pub struct DeletionAuthority {
    membership: MembershipAuthority,
    store: Arc<dyn ChatStore>,
    presence: Arc<PresenceTracker>,
    registry: Arc<ConnectionRegistry>,
}

impl DeletionAuthority {
    pub fn new(
        store: Arc<dyn ChatStore>,
        presence: Arc<PresenceTracker>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            membership: MembershipAuthority::new(Arc::clone(&store)),
            store,
            presence,
            registry,
        }
    }

    /// Delete a message on behalf of a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn delete(
        &self,
        session: &Session,
        message_id: &str,
        room_id: &str,
    ) -> StoreResult<DeleteOutcome> {
        let Ok(id) = Uuid::parse_str(message_id) else {
            return Ok(DeleteOutcome::Ignored);
        };

        if !self.membership.authorize(session, room_id).await {
            return Ok(DeleteOutcome::Ignored);
        }

        let Some(message) = self.store.find_message(id).await? else {
            return Ok(DeleteOutcome::Ignored);
        };

        let permitted = message.room_id == room_id
            && !message.is_deleted
            && message.sender_id == session.user_id();
        if !permitted {
            debug!(session = %session.id(), message = %id, "Delete not permitted, ignoring");
            return Ok(DeleteOutcome::Ignored);
        }

        let deleted = self.store.soft_delete_message(id, Utc::now()).await?;
        let event = ServerEvent::MessageDeleted {
            message_id: deleted.id.to_string(),
        };
        let recipients = self
            .registry
            .broadcast_to_room(&self.presence, room_id, event, None);

        debug!(session = %session.id(), message = %id, recipients, "Message deleted");
        Ok(DeleteOutcome::Deleted { recipients })
    }
}
