//! Connection gateway.
//!
//! The gateway is the single entry point for the transport layer. It turns a
//! handshake credential into a [`Session`], validates and dispatches every
//! inbound [`ClientEvent`], and cleans up presence when the connection goes
//! away. Outbound events reach the connection through the queue returned by
//! [`Gateway::admit`].

use parley_protocol::{error_codes, ClientEvent, ServerEvent, PROTOCOL_VERSION};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::deletion::{DeleteOutcome, DeletionAuthority};
use crate::error::GatewayError;
use crate::filter::ContentFilter;
use crate::membership::MembershipAuthority;
use crate::notify::{NotificationDispatcher, DEFAULT_PREVIEW_CHARS, DEFAULT_QUEUE_CAPACITY};
use crate::pipeline::{MessagePipeline, SubmitOutcome, Submission};
use crate::presence::PresenceTracker;
use crate::registry::{ConnectionRegistry, OutboundReceiver, DEFAULT_OUTBOUND_BUFFER};
use crate::room::validate_room_id;
use crate::session::Session;
use crate::store::{ChatStore, Identity, IdentityResolver};
use crate::typing::TypingRelay;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Maximum size of raw message content in bytes.
    pub max_content_bytes: usize,
    /// Maximum number of room ids in one join request.
    pub max_rooms_per_join: usize,
    /// Maximum length of an attachment URL.
    pub max_attachment_url_length: usize,
    /// Outbound queue capacity per session.
    pub outbound_buffer: usize,
    /// Notification queue capacity.
    pub notification_queue: usize,
    /// Characters of content copied into a notification body.
    pub notification_preview_chars: usize,
    /// Heartbeat interval advertised to clients, in milliseconds.
    pub heartbeat_interval_ms: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_content_bytes: 16 * 1024,
            max_rooms_per_join: 100,
            max_attachment_url_length: 2048,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            notification_queue: DEFAULT_QUEUE_CAPACITY,
            notification_preview_chars: DEFAULT_PREVIEW_CHARS,
            heartbeat_interval_ms: 30_000,
        }
    }
}

/// How an inbound event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The event took effect.
    Applied,
    /// Nothing to do (empty content, unknown message, absent typist, ...).
    Ignored,
    /// The session lacks membership; dropped silently.
    Denied,
    /// Content rejected by the filter; the sender was told.
    Blocked,
    /// Failed validation; the sender got an error event.
    Rejected,
}

impl Outcome {
    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Applied => "applied",
            Outcome::Ignored => "ignored",
            Outcome::Denied => "denied",
            Outcome::Blocked => "blocked",
            Outcome::Rejected => "rejected",
        }
    }
}

/// The connection gateway.
pub struct Gateway {
    identity: Arc<dyn IdentityResolver>,
    presence: Arc<PresenceTracker>,
    registry: Arc<ConnectionRegistry>,
    membership: MembershipAuthority,
    pipeline: MessagePipeline,
    typing: TypingRelay,
    deletion: DeletionAuthority,
    config: GatewayConfig,
    notifier: JoinHandle<()>,
}

impl Gateway {
    /// Create a gateway and start its notification worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        identity: Arc<dyn IdentityResolver>,
        store: Arc<dyn ChatStore>,
        filter: ContentFilter,
        config: GatewayConfig,
    ) -> Self {
        info!("Creating gateway with config: {:?}", config);

        let presence = Arc::new(PresenceTracker::new());
        let registry = Arc::new(ConnectionRegistry::with_capacity(config.outbound_buffer));
        let (dispatcher, notifier) = NotificationDispatcher::spawn(
            Arc::clone(&store),
            config.notification_queue,
            config.notification_preview_chars,
        );

        Self {
            identity,
            membership: MembershipAuthority::new(Arc::clone(&store)),
            pipeline: MessagePipeline::new(
                Arc::new(filter),
                Arc::clone(&store),
                Arc::clone(&presence),
                Arc::clone(&registry),
                dispatcher,
            ),
            typing: TypingRelay::new(Arc::clone(&presence), Arc::clone(&registry)),
            deletion: DeletionAuthority::new(store, Arc::clone(&presence), Arc::clone(&registry)),
            presence,
            registry,
            config,
            notifier,
        }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Get the presence tracker.
    #[must_use]
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Get the connection registry.
    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Check if the notification worker is still running.
    #[must_use]
    pub fn notifier_running(&self) -> bool {
        !self.notifier.is_finished()
    }

    /// Get gateway statistics.
    #[must_use]
    pub fn stats(&self) -> GatewayStats {
        let registry = self.registry.stats();
        GatewayStats {
            sessions: registry.session_count,
            users: registry.user_count,
            active_rooms: self.presence.room_count(),
        }
    }

    /// Resolve a handshake credential to an identity.
    ///
    /// Runs before the connection is upgraded, so a refused credential never
    /// becomes a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential is missing or unknown, or if the
    /// identity resolver fails.
    pub async fn resolve(&self, credential: Option<&str>) -> Result<Identity, GatewayError> {
        let credential = credential
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(GatewayError::MissingCredential)?;

        self.identity
            .resolve(credential)
            .await?
            .ok_or(GatewayError::InvalidCredential)
    }

    /// Open a session for a resolved identity.
    ///
    /// The session is registered, a `connected` event is already queued, and
    /// the returned receiver carries every event for it.
    pub fn admit(&self, identity: &Identity) -> (Session, OutboundReceiver) {
        let session = Session::new(identity.user_id.as_str(), identity.username());
        let rx = self.registry.register(&session);

        self.send(
            &session,
            ServerEvent::Connected {
                session_id: session.id().to_string(),
                user_id: session.user_id().to_string(),
                username: session.username().to_string(),
                version: PROTOCOL_VERSION,
                heartbeat: self.config.heartbeat_interval_ms,
            },
        );

        debug!(session = %session.id(), user = %session.user_id(), "Session admitted");
        (session, rx)
    }

    /// Resolve a credential and open a session for it.
    ///
    /// # Errors
    ///
    /// See [`Gateway::resolve`].
    pub async fn authenticate(
        &self,
        credential: Option<&str>,
    ) -> Result<(Session, OutboundReceiver), GatewayError> {
        let identity = self.resolve(credential).await?;
        Ok(self.admit(&identity))
    }

    /// Validate and dispatch one inbound event.
    ///
    /// Events on a disconnected session are ignored. Validation failures are
    /// answered with an `error` event and reported as [`Outcome::Rejected`].
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails while handling the event.
    pub async fn handle(
        &self,
        session: &mut Session,
        event: ClientEvent,
    ) -> Result<Outcome, GatewayError> {
        if !session.is_active() {
            return Ok(Outcome::Ignored);
        }

        if let Err(GatewayError::InvalidEvent { code, message }) = self.validate(&event) {
            debug!(
                session = %session.id(),
                event = event.kind().as_str(),
                %message,
                "Rejected event"
            );
            self.reject(session, code, message);
            return Ok(Outcome::Rejected);
        }

        let outcome = match event {
            ClientEvent::JoinRooms { room_ids } => self.join_rooms(session, &room_ids).await,
            ClientEvent::LeaveRoom { room_id } => self.leave_room(session, &room_id),
            ClientEvent::SendMessage {
                room_id,
                content,
                message_type,
                attachment_url,
            } => {
                let submission = Submission {
                    room_id,
                    content,
                    message_type,
                    attachment_url,
                };
                match self.pipeline.submit(session, submission).await? {
                    SubmitOutcome::Ignored => Outcome::Ignored,
                    SubmitOutcome::Blocked(_) => Outcome::Blocked,
                    SubmitOutcome::Denied => Outcome::Denied,
                    SubmitOutcome::Delivered { .. } => Outcome::Applied,
                }
            }
            ClientEvent::TypingStart { room_id } => self.relay_typing(session, &room_id, true),
            ClientEvent::TypingStop { room_id } => self.relay_typing(session, &room_id, false),
            ClientEvent::DeleteMessage {
                message_id,
                room_id,
            } => match self.deletion.delete(session, &message_id, &room_id).await? {
                DeleteOutcome::Deleted { .. } => Outcome::Applied,
                DeleteOutcome::Ignored => Outcome::Ignored,
            },
            ClientEvent::GetOnlineUsers { room_id } => self.online_users(session, room_id).await,
            ClientEvent::Ping { timestamp } => {
                self.send(session, ServerEvent::pong(timestamp));
                Outcome::Applied
            }
        };

        Ok(outcome)
    }

    /// Tell the session its last frame was rejected.
    pub fn reject(&self, session: &Session, code: u16, message: impl Into<String>) {
        self.send(session, ServerEvent::error(code, message));
    }

    /// Tear down a session: leave every joined room and unregister it.
    ///
    /// Presence is per user, not per session: if another session of the same
    /// user already left a room, this emits no `user-offline` for it.
    ///
    /// Idempotent.
    pub fn disconnect(&self, session: &mut Session) {
        if !session.is_active() {
            return;
        }

        self.registry.unregister(session.id());
        let rooms = session.close();
        for room_id in &rooms {
            self.release(session.user_id(), room_id);
        }

        debug!(session = %session.id(), rooms = rooms.len(), "Session disconnected");
    }

    fn validate(&self, event: &ClientEvent) -> Result<(), GatewayError> {
        match event {
            ClientEvent::JoinRooms { room_ids } => {
                if room_ids.len() > self.config.max_rooms_per_join {
                    return Err(GatewayError::invalid(
                        error_codes::TOO_MANY_ROOMS,
                        format!("At most {} rooms per join", self.config.max_rooms_per_join),
                    ));
                }
                room_ids.iter().try_for_each(|id| check_room(id))
            }
            ClientEvent::SendMessage {
                room_id,
                content,
                attachment_url,
                ..
            } => {
                check_room(room_id)?;
                if content.len() > self.config.max_content_bytes {
                    return Err(GatewayError::invalid(
                        error_codes::CONTENT_TOO_LARGE,
                        format!("Content exceeds {} bytes", self.config.max_content_bytes),
                    ));
                }
                match attachment_url {
                    Some(url) if url.len() > self.config.max_attachment_url_length => {
                        Err(GatewayError::invalid(
                            error_codes::INVALID_FIELD,
                            "Attachment URL too long",
                        ))
                    }
                    _ => Ok(()),
                }
            }
            ClientEvent::DeleteMessage {
                message_id,
                room_id,
            } => {
                check_room(room_id)?;
                if message_id.trim().is_empty() {
                    return Err(GatewayError::invalid(
                        error_codes::INVALID_FIELD,
                        "Message id cannot be empty",
                    ));
                }
                Ok(())
            }
            ClientEvent::LeaveRoom { room_id }
            | ClientEvent::TypingStart { room_id }
            | ClientEvent::TypingStop { room_id }
            | ClientEvent::GetOnlineUsers { room_id } => check_room(room_id),
            ClientEvent::Ping { .. } => Ok(()),
        }
    }

    async fn join_rooms(&self, session: &mut Session, room_ids: &[String]) -> Outcome {
        if room_ids.is_empty() {
            return Outcome::Ignored;
        }

        let authorized = self.membership.authorize_join(session, room_ids).await;
        if authorized.is_empty() {
            return Outcome::Denied;
        }

        for room_id in &authorized {
            session.join(room_id);
            if self.presence.insert(room_id, session.user_id()) {
                let event = ServerEvent::UserOnline {
                    user_id: session.user_id().to_string(),
                    username: session.username().to_string(),
                    room_id: room_id.clone(),
                };
                self.registry
                    .broadcast_to_room(&self.presence, room_id, event, Some(session.user_id()));
            }
        }

        debug!(
            session = %session.id(),
            requested = room_ids.len(),
            joined = authorized.len(),
            "Joined rooms"
        );
        Outcome::Applied
    }

    /// Presence is per user, so this also drops the user's other sessions
    /// from the room's fan-out even though they still list it as joined.
    fn leave_room(&self, session: &mut Session, room_id: &str) -> Outcome {
        if !session.leave(room_id) {
            return Outcome::Ignored;
        }
        self.release(session.user_id(), room_id);
        debug!(session = %session.id(), room = %room_id, "Left room");
        Outcome::Applied
    }

    /// Remove a user from a room's presence and tell whoever remains.
    fn release(&self, user_id: &str, room_id: &str) {
        if self.presence.remove(room_id, user_id) {
            let event = ServerEvent::UserOffline {
                user_id: user_id.to_string(),
                room_id: room_id.to_string(),
            };
            self.registry.broadcast_to_room(&self.presence, room_id, event, None);
        }
    }

    fn relay_typing(&self, session: &Session, room_id: &str, typing: bool) -> Outcome {
        match self.typing.relay(session, room_id, typing) {
            Some(_) => Outcome::Applied,
            None => Outcome::Ignored,
        }
    }

    async fn online_users(&self, session: &Session, room_id: String) -> Outcome {
        if !self.membership.authorize(session, &room_id).await {
            return Outcome::Denied;
        }

        let mut user_ids = self.presence.users(&room_id);
        user_ids.sort();
        self.send(session, ServerEvent::OnlineUsersList { room_id, user_ids });
        Outcome::Applied
    }

    fn send(&self, session: &Session, event: ServerEvent) {
        self.registry.send_to_session(session.id(), Arc::new(event));
    }
}

fn check_room(room_id: &str) -> Result<(), GatewayError> {
    validate_room_id(room_id)
        .map_err(|reason| GatewayError::invalid(error_codes::INVALID_ROOM, reason))
}

/// Gateway statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayStats {
    /// Live sessions.
    pub sessions: usize,
    /// Distinct connected users.
    pub users: usize,
    /// Rooms with at least one present user.
    pub active_rooms: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterConfig;
    use crate::store::testing::FaultyStore;
    use crate::store::{Identity, MemoryStore, Role, StaticIdentityResolver};
    use std::sync::atomic::Ordering;

    fn resolver() -> Arc<StaticIdentityResolver> {
        let resolver = StaticIdentityResolver::new();
        resolver.insert("token-alice", Identity::new("alice").with_handle("ally"));
        resolver.insert("token-bob", Identity::new("bob").with_display_name("Bob"));
        Arc::new(resolver)
    }

    fn gateway_with(store: Arc<dyn ChatStore>) -> Gateway {
        let filter = ContentFilter::new(&FilterConfig::default()).unwrap();
        Gateway::new(resolver(), store, filter, GatewayConfig::default())
    }

    fn gateway() -> (Gateway, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.add_room("r1", "General");
        store.add_member("r1", "alice", Role::Owner);
        store.add_member("r1", "bob", Role::Member);
        (gateway_with(store.clone()), store)
    }

    fn drain(rx: &mut OutboundReceiver) -> Vec<Arc<ServerEvent>> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[tokio::test]
    async fn test_authenticate() {
        let (gateway, _) = gateway();

        assert!(matches!(
            gateway.authenticate(None).await,
            Err(GatewayError::MissingCredential)
        ));
        assert!(matches!(
            gateway.authenticate(Some("  ")).await,
            Err(GatewayError::MissingCredential)
        ));
        assert!(matches!(
            gateway.authenticate(Some("forged")).await,
            Err(GatewayError::InvalidCredential)
        ));

        let identity = gateway.resolve(Some("token-alice")).await.unwrap();
        assert_eq!(identity.user_id, "alice");
        assert_eq!(gateway.stats().sessions, 0);

        let (session, mut rx) = gateway.admit(&identity);
        assert_eq!(session.user_id(), "alice");
        assert_eq!(session.username(), "ally");

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &*events[0],
            ServerEvent::Connected { user_id, heartbeat: 30_000, .. } if user_id == "alice"
        ));
        assert_eq!(gateway.stats().sessions, 1);
    }

    #[tokio::test]
    async fn test_join_announces_to_others_once() {
        let (gateway, _) = gateway();
        let (mut alice, mut alice_rx) = gateway.authenticate(Some("token-alice")).await.unwrap();
        let (mut bob, mut bob_rx) = gateway.authenticate(Some("token-bob")).await.unwrap();

        let join = ClientEvent::join_rooms(["r1"]);
        assert_eq!(gateway.handle(&mut bob, join.clone()).await.unwrap(), Outcome::Applied);
        assert_eq!(gateway.handle(&mut alice, join.clone()).await.unwrap(), Outcome::Applied);
        // Re-join is a no-op.
        assert_eq!(gateway.handle(&mut alice, join).await.unwrap(), Outcome::Applied);

        let bob_events = drain(&mut bob_rx);
        let online: Vec<_> = bob_events
            .iter()
            .filter(|e| e.name() == "user-online")
            .collect();
        assert_eq!(online.len(), 1);

        // Alice never hears about herself.
        assert!(drain(&mut alice_rx).iter().all(|e| e.name() != "user-online"));
        assert!(alice.has_joined("r1"));
        assert_eq!(gateway.presence().count("r1"), 2);
    }

    #[tokio::test]
    async fn test_validation_rejects_with_error_event() {
        let (gateway, _) = gateway();
        let (mut alice, mut rx) = gateway.authenticate(Some("token-alice")).await.unwrap();
        drain(&mut rx);

        let too_many = ClientEvent::join_rooms((0..101).map(|i| format!("room-{}", i)));
        assert_eq!(gateway.handle(&mut alice, too_many).await.unwrap(), Outcome::Rejected);

        let oversized = ClientEvent::send_text("r1", "a".repeat(16 * 1024 + 1));
        assert_eq!(gateway.handle(&mut alice, oversized).await.unwrap(), Outcome::Rejected);

        let bad_room = ClientEvent::TypingStart {
            room_id: String::new(),
        };
        assert_eq!(gateway.handle(&mut alice, bad_room).await.unwrap(), Outcome::Rejected);

        let codes: Vec<u16> = drain(&mut rx)
            .iter()
            .filter_map(|e| match &**e {
                ServerEvent::Error { code, .. } => Some(*code),
                _ => None,
            })
            .collect();
        assert_eq!(
            codes,
            vec![
                error_codes::TOO_MANY_ROOMS,
                error_codes::CONTENT_TOO_LARGE,
                error_codes::INVALID_ROOM
            ]
        );
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (gateway, _) = gateway();
        let (mut alice, mut rx) = gateway.authenticate(Some("token-alice")).await.unwrap();
        drain(&mut rx);

        let ping = ClientEvent::Ping {
            timestamp: Some(42),
        };
        assert_eq!(gateway.handle(&mut alice, ping).await.unwrap(), Outcome::Applied);
        assert_eq!(*rx.try_recv().unwrap(), ServerEvent::pong(Some(42)));
    }

    #[tokio::test]
    async fn test_leave_and_disconnect_cleanup() {
        let (gateway, _) = gateway();
        let (mut alice, _alice_rx) = gateway.authenticate(Some("token-alice")).await.unwrap();
        let (mut bob, mut bob_rx) = gateway.authenticate(Some("token-bob")).await.unwrap();

        gateway
            .handle(&mut alice, ClientEvent::join_rooms(["r1"]))
            .await
            .unwrap();
        gateway
            .handle(&mut bob, ClientEvent::join_rooms(["r1"]))
            .await
            .unwrap();
        drain(&mut bob_rx);

        let leave = ClientEvent::LeaveRoom {
            room_id: "r1".to_string(),
        };
        assert_eq!(gateway.handle(&mut alice, leave.clone()).await.unwrap(), Outcome::Applied);
        assert_eq!(gateway.handle(&mut alice, leave).await.unwrap(), Outcome::Ignored);
        assert!(!gateway.presence().contains("r1", "alice"));
        assert_eq!(
            *bob_rx.try_recv().unwrap(),
            ServerEvent::UserOffline {
                user_id: "alice".to_string(),
                room_id: "r1".to_string(),
            }
        );

        gateway.disconnect(&mut bob);
        gateway.disconnect(&mut bob);
        assert!(gateway.presence().is_empty());
        assert_eq!(gateway.stats().sessions, 1);

        // Events after disconnect are ignored.
        let ping = ClientEvent::Ping { timestamp: None };
        assert_eq!(gateway.handle(&mut bob, ping).await.unwrap(), Outcome::Ignored);
    }

    #[tokio::test]
    async fn test_presence_is_shared_between_sessions_of_a_user() {
        let (gateway, _) = gateway();
        let (mut phone, _phone_rx) = gateway.authenticate(Some("token-alice")).await.unwrap();
        let (mut laptop, mut laptop_rx) =
            gateway.authenticate(Some("token-alice")).await.unwrap();
        let (mut bob, mut bob_rx) = gateway.authenticate(Some("token-bob")).await.unwrap();

        for session in [&mut phone, &mut laptop, &mut bob] {
            gateway
                .handle(session, ClientEvent::join_rooms(["r1"]))
                .await
                .unwrap();
        }
        drain(&mut laptop_rx);
        drain(&mut bob_rx);

        let leave = ClientEvent::LeaveRoom {
            room_id: "r1".to_string(),
        };
        assert_eq!(gateway.handle(&mut phone, leave).await.unwrap(), Outcome::Applied);
        assert!(!gateway.presence().contains("r1", "alice"));
        assert!(laptop.has_joined("r1"));
        assert_eq!(drain(&mut bob_rx).len(), 1);

        // The laptop no longer receives room traffic.
        gateway
            .handle(&mut bob, ClientEvent::send_text("r1", "anyone there?"))
            .await
            .unwrap();
        assert!(drain(&mut laptop_rx).is_empty());

        // Nor does its disconnect announce anything.
        drain(&mut bob_rx);
        gateway.disconnect(&mut laptop);
        assert!(drain(&mut bob_rx).is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_without_rooms() {
        let (gateway, _) = gateway();
        let (mut alice, _rx) = gateway.authenticate(Some("token-alice")).await.unwrap();
        gateway.disconnect(&mut alice);
        assert_eq!(
            gateway.stats(),
            GatewayStats {
                sessions: 0,
                users: 0,
                active_rooms: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_online_users_requires_membership() {
        let (gateway, store) = gateway();
        store.add_room("r2", "Private");
        let (mut alice, mut rx) = gateway.authenticate(Some("token-alice")).await.unwrap();
        gateway
            .handle(&mut alice, ClientEvent::join_rooms(["r1"]))
            .await
            .unwrap();
        drain(&mut rx);

        let query = |room: &str| ClientEvent::GetOnlineUsers {
            room_id: room.to_string(),
        };
        assert_eq!(gateway.handle(&mut alice, query("r1")).await.unwrap(), Outcome::Applied);
        assert_eq!(
            *rx.try_recv().unwrap(),
            ServerEvent::OnlineUsersList {
                room_id: "r1".to_string(),
                user_ids: vec!["alice".to_string()],
            }
        );

        assert_eq!(gateway.handle(&mut alice, query("r2")).await.unwrap(), Outcome::Denied);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_store_failure_denies_join_and_aborts_send() {
        let store = Arc::new(FaultyStore::default());
        store.inner.add_room("r1", "General");
        store.inner.add_member("r1", "alice", Role::Member);
        let gateway = gateway_with(store.clone());
        let (mut alice, mut rx) = gateway.authenticate(Some("token-alice")).await.unwrap();

        gateway
            .handle(&mut alice, ClientEvent::join_rooms(["r1"]))
            .await
            .unwrap();
        drain(&mut rx);

        store.fail_messages.store(true, Ordering::SeqCst);
        let result = gateway
            .handle(&mut alice, ClientEvent::send_text("r1", "hello"))
            .await;
        assert!(matches!(result, Err(GatewayError::Store(_))));
        assert!(rx.try_recv().is_err());
        assert_eq!(store.inner.message_count(), 0);

        store.fail_lookups.store(true, Ordering::SeqCst);
        let (mut again, _rx) = gateway.authenticate(Some("token-alice")).await.unwrap();
        assert_eq!(
            gateway
                .handle(&mut again, ClientEvent::join_rooms(["r1"]))
                .await
                .unwrap(),
            Outcome::Denied
        );
    }
}
