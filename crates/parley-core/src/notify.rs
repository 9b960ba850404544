//! Notification dispatcher.
//!
//! After a message is broadcast, members of the room who were not present
//! get a stored notification. The work runs on a background task fed by a
//! bounded queue so the sender never waits on it; a full queue drops the job.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::message::{preview, Message};
use crate::store::{ChatStore, NewNotification};

/// Default capacity of the notification queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default number of characters of content copied into a notification body.
pub const DEFAULT_PREVIEW_CHARS: usize = 100;

/// Work item for the dispatcher.
#[derive(Debug, Clone)]
pub struct NotificationJob {
    /// The persisted message.
    pub message: Message,
    /// Username of the sender, for the notification title.
    pub sender_username: String,
    /// Users present in the room when the message was sent.
    pub present: HashSet<String>,
}

/// Handle for queueing notification jobs.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<NotificationJob>,
}

impl NotificationDispatcher {
    /// Start the background worker.
    ///
    /// Must be called from within a Tokio runtime. The worker stops once
    /// every handle has been dropped and the queue is drained.
    pub fn spawn(
        store: Arc<dyn ChatStore>,
        capacity: usize,
        preview_chars: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run(store, rx, preview_chars));
        (Self { tx }, worker)
    }

    /// Queue a job without waiting.
    ///
    /// Returns `false` if the job was dropped.
    pub fn enqueue(&self, job: NotificationJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                warn!(message = %job.message.id, "Notification queue full, dropping job");
                false
            }
            Err(TrySendError::Closed(job)) => {
                warn!(message = %job.message.id, "Notification worker stopped, dropping job");
                false
            }
        }
    }
}

async fn run(
    store: Arc<dyn ChatStore>,
    mut rx: mpsc::Receiver<NotificationJob>,
    preview_chars: usize,
) {
    debug!("Notification worker started");
    while let Some(job) = rx.recv().await {
        dispatch(store.as_ref(), &job, preview_chars).await;
    }
    debug!("Notification worker stopped");
}

/// Create notifications for every member of the room absent at send time.
///
/// The sender is never notified. A failed write is logged and the remaining
/// members are still processed. Returns the number of notifications created.
pub async fn dispatch(
    store: &dyn ChatStore,
    job: &NotificationJob,
    preview_chars: usize,
) -> usize {
    let message = &job.message;

    let members = match store.room_members(&message.room_id).await {
        Ok(members) => members,
        Err(e) => {
            warn!(room = %message.room_id, error = %e, "Failed to load room members");
            return 0;
        }
    };

    let room_name = match store.find_room(&message.room_id).await {
        Ok(Some(room)) => room.name,
        Ok(None) => message.room_id.clone(),
        Err(e) => {
            warn!(room = %message.room_id, error = %e, "Failed to load room");
            return 0;
        }
    };

    let title = format!("{} in {}", job.sender_username, room_name);
    let body = preview(&message.content, preview_chars);

    let mut created = 0;
    for member in members {
        if member.user_id == message.sender_id || job.present.contains(&member.user_id) {
            continue;
        }

        let notification = NewNotification {
            user_id: member.user_id,
            room_id: message.room_id.clone(),
            message_id: message.id,
            sender_id: message.sender_id.clone(),
            title: title.clone(),
            body: body.clone(),
        };

        match store.create_notification(notification).await {
            Ok(n) => {
                trace!(notification = %n.id, user = %n.user_id, "Created notification");
                created += 1;
            }
            Err(e) => {
                warn!(room = %message.room_id, error = %e, "Failed to create notification");
            }
        }
    }

    debug!(message = %message.id, created, "Notifications dispatched");
    created
}
