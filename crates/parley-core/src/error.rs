//! Gateway errors.

use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by the gateway to the connection layer.
///
/// Authorization denials are not errors; they are silent by design of the
/// protocol and show up as [`crate::Outcome::Denied`].
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No credential was presented.
    #[error("Missing credential")]
    MissingCredential,

    /// The credential did not resolve to a user.
    #[error("Invalid credential")]
    InvalidCredential,

    /// An inbound event failed boundary validation.
    #[error("Invalid event ({code}): {message}")]
    InvalidEvent {
        /// Protocol error code sent back to the client.
        code: u16,
        message: String,
    },

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GatewayError {
    /// Create an invalid-event error.
    pub fn invalid(code: u16, message: impl Into<String>) -> Self {
        GatewayError::InvalidEvent {
            code,
            message: message.into(),
        }
    }

    /// Whether this error means the handshake must be refused as unauthorized.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            GatewayError::MissingCredential | GatewayError::InvalidCredential
        )
    }
}
