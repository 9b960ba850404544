//! # parley-core
//!
//! Presence, content filtering and message routing for the Parley chat
//! gateway.
//!
//! This crate provides the building blocks behind a connection:
//!
//! - **Gateway** - Authenticates connections and dispatches their events
//! - **Filter** - Masks profanity, defuses links, blocks hostile content
//! - **Presence** - Tracks which users are present in which rooms
//! - **Pipeline** - Filter, authorize, persist, broadcast, notify
//! - **Store** - The persisted collaborators, behind async traits
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Connection │────▶│   Gateway   │────▶│  Pipeline   │────▶│   Store     │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                   │                   │
//!        │                   ▼                   ▼
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Registry   │◀────│  Presence   │     │  Notifier   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```

pub mod deletion;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod membership;
pub mod message;
pub mod notify;
pub mod pipeline;
pub mod presence;
pub mod registry;
pub mod room;
pub mod session;
pub mod store;
pub mod typing;

pub use error::GatewayError;
pub use filter::{BlockReason, ContentFilter, FilterConfig, FilterError, SanitizeResult};
pub use gateway::{Gateway, GatewayConfig, GatewayStats, Outcome};
pub use message::{Message, MessageId};
pub use presence::PresenceTracker;
pub use registry::{ConnectionRegistry, OutboundReceiver};
pub use room::RoomId;
pub use session::{Session, SessionId, SessionState};
pub use store::{
    ChatStore, Identity, IdentityResolver, MemoryStore, Role, StaticIdentityResolver, StoreError,
};
