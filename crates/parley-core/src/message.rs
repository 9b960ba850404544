//! Chat message records.
//!
//! Messages are created by the pipeline and only ever mutated by a soft
//! delete; the content of a deleted message is kept for audit.

use chrono::{DateTime, Utc};
use parley_protocol::{MessagePayload, MessageType};
use uuid::Uuid;

/// A unique message identifier.
pub type MessageId = Uuid;

/// A persisted message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Unique message identifier.
    pub id: MessageId,
    /// Room the message was posted to.
    pub room_id: String,
    /// Author of the message.
    pub sender_id: String,
    /// Sanitized content.
    pub content: String,
    /// Kind of content.
    pub message_type: MessageType,
    /// Optional attachment location.
    pub attachment_url: Option<String>,
    /// When the message was stored.
    pub created_at: DateTime<Utc>,
    /// Whether the message was soft-deleted.
    pub is_deleted: bool,
    /// When the message was soft-deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Whether the message may still be served as active content.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }

    /// Build the client-facing payload.
    #[must_use]
    pub fn to_payload(&self, sender_username: impl Into<String>) -> MessagePayload {
        MessagePayload {
            id: self.id.to_string(),
            room_id: self.room_id.clone(),
            sender_id: self.sender_id.clone(),
            sender_username: sender_username.into(),
            content: self.content.clone(),
            message_type: self.message_type,
            attachment_url: self.attachment_url.clone(),
            created_at: self.created_at,
        }
    }
}

/// A message about to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub room_id: String,
    pub sender_id: String,
    pub content: String,
    pub message_type: MessageType,
    pub attachment_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    /// Create a message stamped with the current time.
    #[must_use]
    pub fn new(
        room_id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
        message_type: MessageType,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            sender_id: sender_id.into(),
            content: content.into(),
            message_type,
            attachment_url: None,
            created_at: Utc::now(),
        }
    }

    /// Attach a file location.
    #[must_use]
    pub fn with_attachment(mut self, attachment_url: Option<String>) -> Self {
        self.attachment_url = attachment_url;
        self
    }

    /// Turn into a stored, active message with a fresh id.
    #[must_use]
    pub fn into_message(self) -> Message {
        Message {
            id: Uuid::new_v4(),
            room_id: self.room_id,
            sender_id: self.sender_id,
            content: self.content,
            message_type: self.message_type,
            attachment_url: self.attachment_url,
            created_at: self.created_at,
            is_deleted: false,
            deleted_at: None,
        }
    }
}

/// First `limit` characters of a text, for previews.
#[must_use]
pub fn preview(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
