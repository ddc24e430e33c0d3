//! ID generation utilities.

use uuid::Uuid;

/// Generate a new UUID v4.
pub fn uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a workspace identifier (`ws-` followed by 12 hex characters).
///
/// Safe to use as a directory name and as a container name.
pub fn workspace_id() -> String {
    let bytes: [u8; 6] = rand::random();
    format!("ws-{}", hex::encode(bytes))
}
