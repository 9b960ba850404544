//! Fault injection for unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};

use super::{
    ChatStore, Membership, MemoryStore, NewNotification, Notification, Room, StoreError,
    StoreResult,
};
use crate::message::{Message, MessageId, NewMessage};

/// A [`MemoryStore`] whose operations can be made to fail.
#[derive(Debug, Default)]
pub(crate) struct FaultyStore {
    pub inner: MemoryStore,
    pub fail_lookups: AtomicBool,
    pub fail_messages: AtomicBool,
    /// Notification writes for this user fail.
    pub fail_notifications_for: Option<String>,
}

impl FaultyStore {
    fn check(flag: &AtomicBool) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected fault".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChatStore for FaultyStore {
    async fn find_membership(
        &self,
        user_id: &str,
        room_id: &str,
    ) -> StoreResult<Option<Membership>> {
        Self::check(&self.fail_lookups)?;
        self.inner.find_membership(user_id, room_id).await
    }

    async fn room_members(&self, room_id: &str) -> StoreResult<Vec<Membership>> {
        Self::check(&self.fail_lookups)?;
        self.inner.room_members(room_id).await
    }

    async fn find_room(&self, room_id: &str) -> StoreResult<Option<Room>> {
        Self::check(&self.fail_lookups)?;
        self.inner.find_room(room_id).await
    }

    async fn create_message(&self, message: NewMessage) -> StoreResult<Message> {
        Self::check(&self.fail_messages)?;
        self.inner.create_message(message).await
    }

    async fn find_message(&self, id: MessageId) -> StoreResult<Option<Message>> {
        Self::check(&self.fail_lookups)?;
        self.inner.find_message(id).await
    }

    async fn soft_delete_message(
        &self,
        id: MessageId,
        deleted_at: DateTime<Utc>,
    ) -> StoreResult<Message> {
        Self::check(&self.fail_messages)?;
        self.inner.soft_delete_message(id, deleted_at).await
    }

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> StoreResult<Notification> {
        if self.fail_notifications_for.as_deref() == Some(notification.user_id.as_str()) {
            return Err(StoreError::Unavailable("injected fault".into()));
        }
        self.inner.create_notification(notification).await
    }
}
