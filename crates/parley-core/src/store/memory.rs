//! In-process store and identity resolver.
//!
//! Backed by `DashMap`s. Used by the server binary (seeded from its config)
//! and by tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use super::{
    ChatStore, Identity, IdentityResolver, Membership, NewNotification, Notification, Role,
    Room, StoreError, StoreResult,
};
use crate::message::{Message, MessageId, NewMessage};

/// An in-memory [`ChatStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    rooms: DashMap<String, Room>,
    /// Memberships keyed by room id.
    members: DashMap<String, Vec<Membership>>,
    messages: DashMap<MessageId, Message>,
    notifications: DashMap<Uuid, Notification>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or rename a room.
    pub fn add_room(&self, id: impl Into<String>, name: impl Into<String>) {
        let id = id.into();
        self.rooms.insert(
            id.clone(),
            Room {
                id,
                name: name.into(),
            },
        );
    }

    /// Grant a user membership of a room. Re-adding updates the role.
    pub fn add_member(&self, room_id: &str, user_id: &str, role: Role) {
        let mut members = self.members.entry(room_id.to_string()).or_default();
        match members.iter_mut().find(|m| m.user_id == user_id) {
            Some(existing) => existing.role = role,
            None => members.push(Membership {
                user_id: user_id.to_string(),
                room_id: room_id.to_string(),
                role,
            }),
        }
    }

    /// Revoke a user's membership of a room.
    pub fn remove_member(&self, room_id: &str, user_id: &str) -> bool {
        self.members
            .get_mut(room_id)
            .map(|mut members| {
                let before = members.len();
                members.retain(|m| m.user_id != user_id);
                before != members.len()
            })
            .unwrap_or(false)
    }

    /// All messages of a room, including deleted ones, oldest first.
    #[must_use]
    pub fn room_messages(&self, room_id: &str) -> Vec<Message> {
        let mut messages: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .map(|m| m.value().clone())
            .collect();
        messages.sort_by_key(|m| m.created_at);
        messages
    }

    /// Notifications addressed to a user.
    #[must_use]
    pub fn notifications_for(&self, user_id: &str) -> Vec<Notification> {
        self.notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .map(|n| n.value().clone())
            .collect()
    }

    /// Total number of stored messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn find_membership(
        &self,
        user_id: &str,
        room_id: &str,
    ) -> StoreResult<Option<Membership>> {
        Ok(self
            .members
            .get(room_id)
            .and_then(|members| members.iter().find(|m| m.user_id == user_id).cloned()))
    }

    async fn room_members(&self, room_id: &str) -> StoreResult<Vec<Membership>> {
        Ok(self
            .members
            .get(room_id)
            .map(|members| members.clone())
            .unwrap_or_default())
    }

    async fn find_room(&self, room_id: &str) -> StoreResult<Option<Room>> {
        Ok(self.rooms.get(room_id).map(|room| room.clone()))
    }

    async fn create_message(&self, message: NewMessage) -> StoreResult<Message> {
        let message = message.into_message();
        debug!(message = %message.id, room = %message.room_id, "Stored message");
        self.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn find_message(&self, id: MessageId) -> StoreResult<Option<Message>> {
        Ok(self.messages.get(&id).map(|m| m.clone()))
    }

    async fn soft_delete_message(
        &self,
        id: MessageId,
        deleted_at: DateTime<Utc>,
    ) -> StoreResult<Message> {
        let mut message = self
            .messages
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("message {}", id)))?;
        message.is_deleted = true;
        message.deleted_at = Some(deleted_at);
        Ok(message.clone())
    }

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> StoreResult<Notification> {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: notification.user_id,
            room_id: notification.room_id,
            message_id: notification.message_id,
            sender_id: notification.sender_id,
            title: notification.title,
            body: notification.body,
            created_at: Utc::now(),
            is_read: false,
        };
        self.notifications
            .insert(notification.id, notification.clone());
        Ok(notification)
    }
}

/// Resolves credentials from a fixed token table.
#[derive(Debug, Default)]
pub struct StaticIdentityResolver {
    tokens: DashMap<String, Identity>,
}

impl StaticIdentityResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token.
    pub fn insert(&self, token: impl Into<String>, identity: Identity) {
        self.tokens.insert(token.into(), identity);
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn resolve(&self, credential: &str) -> StoreResult<Option<Identity>> {
        Ok(self.tokens.get(credential).map(|identity| identity.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_protocol::MessageType;

    #[tokio::test]
    async fn test_membership_lookup() {
        let store = MemoryStore::new();
        store.add_room("r1", "General");
        store.add_member("r1", "alice", Role::Owner);
        store.add_member("r1", "bob", Role::Member);
        store.add_member("r1", "bob", Role::Admin);

        let bob = store.find_membership("bob", "r1").await.unwrap().unwrap();
        assert_eq!(bob.role, Role::Admin);
        assert!(store.find_membership("carol", "r1").await.unwrap().is_none());
        assert!(store.find_membership("alice", "r2").await.unwrap().is_none());
        assert_eq!(store.room_members("r1").await.unwrap().len(), 2);

        assert!(store.remove_member("r1", "bob"));
        assert!(!store.remove_member("r1", "bob"));
        assert_eq!(store.room_members("r1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_content() {
        let store = MemoryStore::new();
        let message = store
            .create_message(NewMessage::new("r1", "alice", "hello", MessageType::Text))
            .await
            .unwrap();

        let deleted = store
            .soft_delete_message(message.id, Utc::now())
            .await
            .unwrap();
        assert!(deleted.is_deleted);
        assert!(deleted.deleted_at.is_some());

        let reloaded = store.find_message(message.id).await.unwrap().unwrap();
        assert_eq!(reloaded.content, "hello");
        assert!(!reloaded.is_active());
        assert_eq!(store.room_messages("r1").len(), 1);

        assert!(matches!(
            store.soft_delete_message(Uuid::new_v4(), Utc::now()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_static_identity_resolver() {
        let resolver = StaticIdentityResolver::new();
        resolver.insert("token-a", Identity::new("alice").with_handle("ally"));

        let identity = resolver.resolve("token-a").await.unwrap().unwrap();
        assert_eq!(identity.username(), "ally");
        assert!(resolver.resolve("token-b").await.unwrap().is_none());
    }
}
