//! Seed data for the in-memory store.
//!
//! The binary has no external database: rooms, memberships and the
//! credential table are declared in configuration and loaded at startup.

use anyhow::{bail, Result};
use parley_core::room::validate_room_id;
use parley_core::{Identity, MemoryStore, Role, StaticIdentityResolver};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

/// Rooms and users to load at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub rooms: Vec<SeedRoom>,
    pub users: Vec<SeedUser>,
}

/// A room and its members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRoom {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub members: Vec<SeedMember>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedMember {
    pub user_id: String,
    #[serde(default)]
    pub role: Role,
}

/// A credential and the identity it resolves to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedUser {
    pub token: String,
    pub user_id: String,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl SeedUser {
    fn identity(&self) -> Identity {
        let mut identity = Identity::new(self.user_id.as_str());
        if let Some(handle) = &self.handle {
            identity = identity.with_handle(handle.as_str());
        }
        if let Some(display_name) = &self.display_name {
            identity = identity.with_display_name(display_name.as_str());
        }
        identity
    }
}

/// Build the store and identity resolver described by `seed`.
///
/// # Errors
///
/// Returns an error on an invalid or duplicate room id, or a duplicate or
/// empty token.
pub fn build(seed: &SeedConfig) -> Result<(MemoryStore, StaticIdentityResolver)> {
    let store = MemoryStore::new();
    let mut room_ids = HashSet::new();

    for room in &seed.rooms {
        if let Err(reason) = validate_room_id(&room.id) {
            bail!("Invalid seed room {:?}: {}", room.id, reason);
        }
        if !room_ids.insert(room.id.as_str()) {
            bail!("Duplicate seed room {:?}", room.id);
        }

        store.add_room(room.id.as_str(), room.name.as_str());
        for member in &room.members {
            store.add_member(&room.id, &member.user_id, member.role);
        }
    }

    let identities = StaticIdentityResolver::new();
    let mut tokens = HashSet::new();

    for user in &seed.users {
        let token = user.token.trim();
        if token.is_empty() {
            bail!("Empty token for seed user {:?}", user.user_id);
        }
        if !tokens.insert(token) {
            bail!("Duplicate token for seed user {:?}", user.user_id);
        }
        identities.insert(token, user.identity());
    }

    info!(
        rooms = seed.rooms.len(),
        users = seed.users.len(),
        "Loaded seed data"
    );

    Ok((store, identities))
}
