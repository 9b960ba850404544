//! Room identifiers.
//!
//! Rooms themselves live in the store; the gateway only handles their ids.

/// Maximum room id length.
pub const MAX_ROOM_ID_LENGTH: usize = 128;

/// A room identifier.
pub type RoomId = String;

/// Validate a room id received from a client.
///
/// # Errors
///
/// Returns an error message if the room id is invalid.
pub fn validate_room_id(room_id: &str) -> Result<(), &'static str> {
    if room_id.is_empty() {
        return Err("Room id cannot be empty");
    }
    if room_id.len() > MAX_ROOM_ID_LENGTH {
        return Err("Room id too long");
    }
    if !room_id
        .chars()
        .all(|c| c.is_ascii() && !c.is_ascii_control() && !c.is_ascii_whitespace())
    {
        return Err("Room id contains invalid characters");
    }
    Ok(())
}
