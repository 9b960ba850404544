//! # parley-protocol
//!
//! Wire protocol definitions for the Parley chat gateway.
//!
//! This crate defines the events exchanged between clients and the gateway,
//! the codecs used to put them on the wire, and protocol versioning.
//!
//! ## Events
//!
//! - [`ClientEvent`] - everything a client may send (join, send, typing, ...)
//! - [`ServerEvent`] - everything the gateway pushes back (presence, messages, ...)
//!
//! Both are closed, internally tagged unions: `{"event": "send-message", ...}`.
//!
//! ## Example
//!
//! ```rust
//! use parley_protocol::{codec, ClientEvent};
//!
//! let event = ClientEvent::join_rooms(["general", "random"]);
//!
//! let text = codec::encode_json(&event).unwrap();
//! let decoded: ClientEvent = codec::decode_json(&text).unwrap();
//! assert_eq!(event, decoded);
//! ```

pub mod codec;
pub mod frames;
pub mod version;

pub use codec::{decode, encode, Encoded, ProtocolError, WireFormat};
pub use frames::{error_codes, ClientEvent, EventKind, MessagePayload, MessageType, ServerEvent};
pub use version::{Version, PROTOCOL_VERSION};
