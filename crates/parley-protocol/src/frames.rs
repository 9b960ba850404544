//! Event types for the Parley protocol.
//!
//! Every frame on the wire is exactly one event. Client and server events are
//! closed unions tagged by an `event` field, so a payload that does not match
//! one of the known shapes is rejected at decode time instead of being
//! dispatched with loosely-typed data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::version::Version;

/// Error codes carried by [`ServerEvent::Error`].
pub mod error_codes {
    /// The frame could not be decoded into a known event.
    pub const INVALID_FRAME: u16 = 1001;
    /// A room identifier failed validation.
    pub const INVALID_ROOM: u16 = 1002;
    /// Message content exceeds the configured size limit.
    pub const CONTENT_TOO_LARGE: u16 = 1003;
    /// Too many rooms requested in a single join.
    pub const TOO_MANY_ROOMS: u16 = 1004;
    /// Some other field of the event failed validation.
    pub const INVALID_FIELD: u16 = 1005;
}

/// Kind of message content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
}

impl MessageType {
    /// Wire name of the message type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::File => "file",
        }
    }
}

/// Inbound event kinds, used for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    JoinRooms,
    LeaveRoom,
    SendMessage,
    TypingStart,
    TypingStop,
    DeleteMessage,
    GetOnlineUsers,
    Ping,
}

impl EventKind {
    /// Wire name of the event.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::JoinRooms => "join-rooms",
            EventKind::LeaveRoom => "leave-room",
            EventKind::SendMessage => "send-message",
            EventKind::TypingStart => "typing-start",
            EventKind::TypingStop => "typing-stop",
            EventKind::DeleteMessage => "delete-message",
            EventKind::GetOnlineUsers => "get-online-users",
            EventKind::Ping => "ping",
        }
    }
}

/// An event sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Join one or more rooms.
    #[serde(rename_all = "camelCase")]
    JoinRooms {
        /// Candidate room ids; unauthorized ids are dropped silently.
        room_ids: Vec<String>,
    },

    /// Leave a single room.
    #[serde(rename_all = "camelCase")]
    LeaveRoom {
        /// Room to leave.
        room_id: String,
    },

    /// Submit a message to a room.
    #[serde(rename_all = "camelCase")]
    SendMessage {
        /// Target room.
        room_id: String,
        /// Raw, unsanitized content.
        content: String,
        /// Kind of content.
        #[serde(default)]
        message_type: MessageType,
        /// Optional attachment location.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attachment_url: Option<String>,
    },

    /// The user started typing.
    #[serde(rename_all = "camelCase")]
    TypingStart {
        /// Room the user is typing in.
        room_id: String,
    },

    /// The user stopped typing.
    #[serde(rename_all = "camelCase")]
    TypingStop {
        /// Room the user was typing in.
        room_id: String,
    },

    /// Soft-delete one of the user's own messages.
    #[serde(rename_all = "camelCase")]
    DeleteMessage {
        /// Message to delete.
        message_id: String,
        /// Room the message belongs to.
        room_id: String,
    },

    /// Ask who is currently present in a room.
    #[serde(rename_all = "camelCase")]
    GetOnlineUsers {
        /// Room to query.
        room_id: String,
    },

    /// Keepalive ping.
    Ping {
        /// Optional timestamp, echoed in the pong.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl ClientEvent {
    /// Get the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::JoinRooms { .. } => EventKind::JoinRooms,
            ClientEvent::LeaveRoom { .. } => EventKind::LeaveRoom,
            ClientEvent::SendMessage { .. } => EventKind::SendMessage,
            ClientEvent::TypingStart { .. } => EventKind::TypingStart,
            ClientEvent::TypingStop { .. } => EventKind::TypingStop,
            ClientEvent::DeleteMessage { .. } => EventKind::DeleteMessage,
            ClientEvent::GetOnlineUsers { .. } => EventKind::GetOnlineUsers,
            ClientEvent::Ping { .. } => EventKind::Ping,
        }
    }

    /// Create a new JoinRooms event.
    #[must_use]
    pub fn join_rooms<I, S>(room_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ClientEvent::JoinRooms {
            room_ids: room_ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a new plain-text SendMessage event.
    #[must_use]
    pub fn send_text(room_id: impl Into<String>, content: impl Into<String>) -> Self {
        ClientEvent::SendMessage {
            room_id: room_id.into(),
            content: content.into(),
            message_type: MessageType::Text,
            attachment_url: None,
        }
    }
}

/// A persisted message as delivered to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub content: String,
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An event pushed by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Handshake accepted; the session is live.
    #[serde(rename_all = "camelCase")]
    Connected {
        session_id: String,
        user_id: String,
        username: String,
        version: Version,
        /// Recommended heartbeat interval in milliseconds.
        heartbeat: u32,
    },

    /// A user became present in a room.
    #[serde(rename_all = "camelCase")]
    UserOnline {
        user_id: String,
        username: String,
        room_id: String,
    },

    /// A user is no longer present in a room.
    #[serde(rename_all = "camelCase")]
    UserOffline { user_id: String, room_id: String },

    /// A message was persisted in a room.
    #[serde(rename_all = "camelCase")]
    NewMessage {
        message: MessagePayload,
        /// Content warnings raised while sanitizing. Not persisted.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        warnings: Option<Vec<String>>,
    },

    /// The sender's message was rejected outright.
    #[serde(rename_all = "camelCase")]
    MessageBlocked { reason: String, room_id: String },

    /// A user started typing.
    #[serde(rename_all = "camelCase")]
    UserTyping {
        user_id: String,
        username: String,
        room_id: String,
    },

    /// A user stopped typing.
    #[serde(rename_all = "camelCase")]
    UserStopTyping {
        user_id: String,
        username: String,
        room_id: String,
    },

    /// A message was soft-deleted and should be redacted locally.
    #[serde(rename_all = "camelCase")]
    MessageDeleted { message_id: String },

    /// Answer to `get-online-users`.
    #[serde(rename_all = "camelCase")]
    OnlineUsersList {
        room_id: String,
        user_ids: Vec<String>,
    },

    /// Keepalive pong.
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// The last inbound frame was rejected.
    Error { code: u16, message: String },
}

impl ServerEvent {
    /// Wire name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::UserOnline { .. } => "user-online",
            ServerEvent::UserOffline { .. } => "user-offline",
            ServerEvent::NewMessage { .. } => "new-message",
            ServerEvent::MessageBlocked { .. } => "message-blocked",
            ServerEvent::UserTyping { .. } => "user-typing",
            ServerEvent::UserStopTyping { .. } => "user-stop-typing",
            ServerEvent::MessageDeleted { .. } => "message-deleted",
            ServerEvent::OnlineUsersList { .. } => "online-users-list",
            ServerEvent::Pong { .. } => "pong",
            ServerEvent::Error { .. } => "error",
        }
    }

    /// Create a new Error event.
    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code,
            message: message.into(),
        }
    }

    /// Create a new Pong event.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        ServerEvent::Pong { timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_event_wire_shape() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "send-message",
            "roomId": "r1",
            "content": "hello",
            "messageType": "image",
            "attachmentUrl": "https://cdn.example.com/cat.png"
        }))
        .unwrap();

        assert_eq!(event.kind(), EventKind::SendMessage);
        match event {
            ClientEvent::SendMessage {
                room_id,
                message_type,
                attachment_url,
                ..
            } => {
                assert_eq!(room_id, "r1");
                assert_eq!(message_type, MessageType::Image);
                assert!(attachment_url.is_some());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_send_message_defaults() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "send-message",
            "roomId": "r1",
            "content": "hi"
        }))
        .unwrap();

        assert_eq!(event, ClientEvent::send_text("r1", "hi"));
    }

    #[test]
    fn test_unknown_event_rejected() {
        let result: Result<ClientEvent, _> =
            serde_json::from_value(json!({"event": "drop-tables", "roomId": "r1"}));
        assert!(result.is_err());

        let missing_field: Result<ClientEvent, _> =
            serde_json::from_value(json!({"event": "typing-start"}));
        assert!(missing_field.is_err());
    }

    #[test]
    fn test_bare_ping() {
        let event: ClientEvent = serde_json::from_value(json!({"event": "ping"})).unwrap();
        assert_eq!(event, ClientEvent::Ping { timestamp: None });
    }

    #[test]
    fn test_server_event_tagging() {
        let event = ServerEvent::UserOnline {
            user_id: "u1".into(),
            username: "alice".into(),
            room_id: "r1".into(),
        };
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["event"], "user-online");
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["roomId"], "r1");
        assert_eq!(event.name(), "user-online");
    }

    #[test]
    fn test_new_message_omits_empty_warnings() {
        let event = ServerEvent::NewMessage {
            message: MessagePayload {
                id: "m1".into(),
                room_id: "r1".into(),
                sender_id: "u1".into(),
                sender_username: "alice".into(),
                content: "hello".into(),
                message_type: MessageType::Text,
                attachment_url: None,
                created_at: Utc::now(),
            },
            warnings: None,
        };
        let value = serde_json::to_value(&event).unwrap();

        assert!(value.get("warnings").is_none());
        assert_eq!(value["message"]["messageType"], "text");
        assert!(value["message"].get("attachmentUrl").is_none());
    }
}
