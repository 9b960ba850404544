//! Room membership authority.
//!
//! Membership rows in the store are the only source of truth for whether a
//! user may act in a room. Denials are silent: callers get `false` or a
//! shorter list, never an error, so clients cannot discover rooms they do
//! not belong to.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::room::RoomId;
use crate::session::Session;
use crate::store::ChatStore;

/// Authorizes room access against stored memberships.
#[derive(Clone)]
pub struct MembershipAuthority {
    store: Arc<dyn ChatStore>,
}

impl MembershipAuthority {
    /// Create an authority backed by a store.
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    /// Check whether a user is a member of a room.
    ///
    /// A store failure counts as a denial.
    pub async fn is_member(&self, user_id: &str, room_id: &str) -> bool {
        match self.store.find_membership(user_id, room_id).await {
            Ok(membership) => membership.is_some(),
            Err(e) => {
                warn!(
                    user = %user_id,
                    room = %room_id,
                    error = %e,
                    "Membership lookup failed, denying"
                );
                false
            }
        }
    }

    /// Check whether a session may act in a room.
    pub async fn authorize(&self, session: &Session, room_id: &str) -> bool {
        let allowed = self.is_member(session.user_id(), room_id).await;
        if !allowed {
            debug!(session = %session.id(), room = %room_id, "Not a member, dropping");
        }
        allowed
    }

    /// Keep the candidate rooms the session is a member of.
    ///
    /// Duplicates are collapsed; the order of first appearance is kept.
    pub async fn authorize_join(&self, session: &Session, candidates: &[RoomId]) -> Vec<RoomId> {
        let mut seen = HashSet::new();
        let mut authorized = Vec::new();

        for room_id in candidates {
            if !seen.insert(room_id.as_str()) {
                continue;
            }
            if self.authorize(session, room_id).await {
                authorized.push(room_id.clone());
            }
        }

        authorized
    }
}
