//! Persisted collaborators of the gateway.
//!
//! The gateway owns none of this schema. It only needs the handful of
//! operations below; a deployment plugs in whatever backend holds rooms,
//! memberships, messages and notifications.

mod memory;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::{MemoryStore, StaticIdentityResolver};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::message::{Message, MessageId, NewMessage};

/// Placeholder username for identities without a handle or display name.
pub const ANONYMOUS_USERNAME: &str = "Anonymous";

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or failed.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A record the operation depends on does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A resolved user identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    /// User-chosen handle.
    pub handle: Option<String>,
    pub display_name: Option<String>,
}

impl Identity {
    /// Create an identity with no names.
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            handle: None,
            display_name: None,
        }
    }

    /// Set the user-chosen handle.
    #[must_use]
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    /// Set the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Name shown to other users: handle, else display name, else a placeholder.
    #[must_use]
    pub fn username(&self) -> String {
        [&self.handle, &self.display_name]
            .into_iter()
            .flatten()
            .map(|name| name.trim())
            .find(|name| !name.is_empty())
            .unwrap_or(ANONYMOUS_USERNAME)
            .to_string()
    }
}

/// A chat room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: String,
    pub name: String,
}

/// Role of a member within a room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    #[default]
    Member,
}

/// Authorization record linking a user to a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub user_id: String,
    pub room_id: String,
    pub role: Role,
}

/// A notification for a member who missed a message.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    /// Recipient.
    pub user_id: String,
    pub room_id: String,
    pub message_id: MessageId,
    pub sender_id: String,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

/// A notification about to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: String,
    pub room_id: String,
    pub message_id: MessageId,
    pub sender_id: String,
    pub title: String,
    pub body: String,
}

/// Resolves handshake credentials to identities.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve an opaque credential. `Ok(None)` means the credential is unknown.
    async fn resolve(&self, credential: &str) -> StoreResult<Option<Identity>>;
}

/// The persisted store operations the gateway needs.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Membership of a user in a room, if any.
    async fn find_membership(&self, user_id: &str, room_id: &str)
        -> StoreResult<Option<Membership>>;

    /// All memberships of a room.
    async fn room_members(&self, room_id: &str) -> StoreResult<Vec<Membership>>;

    /// Room metadata.
    async fn find_room(&self, room_id: &str) -> StoreResult<Option<Room>>;

    /// Persist a new message.
    async fn create_message(&self, message: NewMessage) -> StoreResult<Message>;

    /// Load a message, deleted or not.
    async fn find_message(&self, id: MessageId) -> StoreResult<Option<Message>>;

    /// Flag a message as deleted. Returns the updated message.
    async fn soft_delete_message(
        &self,
        id: MessageId,
        deleted_at: DateTime<Utc>,
    ) -> StoreResult<Message>;

    /// Persist a notification.
    async fn create_notification(&self, notification: NewNotification)
        -> StoreResult<Notification>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_resolution() {
        let full = Identity::new("u1")
            .with_handle("ally")
            .with_display_name("Alice Liddell");
        assert_eq!(full.username(), "ally");

        let display_only = Identity::new("u1").with_display_name("Alice Liddell");
        assert_eq!(display_only.username(), "Alice Liddell");

        let blank_handle = Identity::new("u1")
            .with_handle("   ")
            .with_display_name("Alice");
        assert_eq!(blank_handle.username(), "Alice");

        assert_eq!(Identity::new("u1").username(), ANONYMOUS_USERNAME);
    }
}
