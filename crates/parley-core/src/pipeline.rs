//! Message pipeline.
//!
//! A submitted message passes, in order:
//!
//! ```text
//! empty? ──▶ hard block? ──▶ sanitize ──▶ member? ──▶ persist ──▶ broadcast ──▶ notify
//!  (drop)   (signal sender)              (drop)      (abort on     (present    (queued,
//!                                                      failure)     users)     not awaited)
//! ```
//!
//! Blocked content is never sanitized, stored or broadcast. Broadcast only
//! happens after the store accepted the message.

use parley_protocol::{MessageType, ServerEvent};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::filter::{attachment_file_name, BlockReason, ContentFilter};
use crate::membership::MembershipAuthority;
use crate::message::{MessageId, NewMessage};
use crate::notify::{NotificationDispatcher, NotificationJob};
use crate::presence::PresenceTracker;
use crate::registry::ConnectionRegistry;
use crate::session::Session;
use crate::store::{ChatStore, StoreResult};

/// A message as submitted by a client.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub room_id: String,
    /// Raw content, not yet filtered.
    pub content: String,
    pub message_type: MessageType,
    pub attachment_url: Option<String>,
}

impl Submission {
    /// Create a plain-text submission.
    #[must_use]
    pub fn text(room_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            content: content.into(),
            message_type: MessageType::Text,
            attachment_url: None,
        }
    }

    /// Attach a file location.
    #[must_use]
    pub fn with_attachment(mut self, attachment_url: impl Into<String>) -> Self {
        self.attachment_url = Some(attachment_url.into());
        self
    }
}

/// What happened to a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Empty content; nothing happened.
    Ignored,
    /// Rejected by the filter; only the sender was told.
    Blocked(BlockReason),
    /// The sender is not a member of the room; nothing happened.
    Denied,
    /// Stored and broadcast.
    Delivered {
        message_id: MessageId,
        /// Sessions the new message was queued for.
        recipients: usize,
    },
}

/// Runs submissions through filtering, authorization, storage and fan-out.
pub struct MessagePipeline {
    filter: Arc<ContentFilter>,
    membership: MembershipAuthority,
    store: Arc<dyn ChatStore>,
    presence: Arc<PresenceTracker>,
    registry: Arc<ConnectionRegistry>,
    notifier: NotificationDispatcher,
}

impl MessagePipeline {
    /// Assemble a pipeline from its collaborators.
    pub fn new(
        filter: Arc<ContentFilter>,
        store: Arc<dyn ChatStore>,
        presence: Arc<PresenceTracker>,
        registry: Arc<ConnectionRegistry>,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            filter,
            membership: MembershipAuthority::new(Arc::clone(&store)),
            store,
            presence,
            registry,
            notifier,
        }
    }

    /// Submit a message on behalf of a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be stored. Nothing is
    /// broadcast in that case.
    pub async fn submit(
        &self,
        session: &Session,
        submission: Submission,
    ) -> StoreResult<SubmitOutcome> {
        let Submission {
            room_id,
            content,
            message_type,
            attachment_url,
        } = submission;

        if content.trim().is_empty() {
            return Ok(SubmitOutcome::Ignored);
        }

        let filename = attachment_url.as_deref().and_then(attachment_file_name);
        if let Some(reason) = self.filter.should_block_entirely(&content, filename.as_deref()) {
            debug!(
                session = %session.id(),
                room = %room_id,
                reason = %reason,
                "Message blocked"
            );
            let event = ServerEvent::MessageBlocked {
                reason: reason.to_string(),
                room_id,
            };
            self.registry.send_to_session(session.id(), Arc::new(event));
            return Ok(SubmitOutcome::Blocked(reason));
        }

        let verdict = self.filter.sanitize(&content);

        if !self.membership.authorize(session, &room_id).await {
            return Ok(SubmitOutcome::Denied);
        }

        let message = self
            .store
            .create_message(
                NewMessage::new(
                    room_id.as_str(),
                    session.user_id(),
                    verdict.sanitized_text,
                    message_type,
                )
                .with_attachment(attachment_url),
            )
            .await
            .map_err(|e| {
                warn!(
                    session = %session.id(),
                    room = %room_id,
                    error = %e,
                    "Failed to store message"
                );
                e
            })?;

        let present = self.presence.users(&room_id);
        let warnings = verdict.has_suspicious_content.then_some(verdict.warnings);
        let event = ServerEvent::NewMessage {
            message: message.to_payload(session.username()),
            warnings,
        };
        let recipients = self.registry.send_to_users(&present, &Arc::new(event), None);

        debug!(
            session = %session.id(),
            room = %room_id,
            message = %message.id,
            recipients,
            "Message delivered"
        );

        let message_id = message.id;
        self.notifier.enqueue(NotificationJob {
            message,
            sender_username: session.username().to_string(),
            present: present.into_iter().collect(),
        });

        Ok(SubmitOutcome::Delivered {
            message_id,
            recipients,
        })
    }
}
