//! Shared utilities: ID generation and filesystem timestamp helpers.

use std::fs::Metadata;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new session token (UUID v4 without dashes).
///
/// # Examples
///
/// ```
/// use fsblob_core::utils::generate_session_token;
///
/// let token = generate_session_token();
/// assert_eq!(token.len(), 32);
/// assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
/// ```
#[must_use]
pub fn generate_session_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Generate a short unique suffix for in-flight temp files.
#[must_use]
pub fn generate_temp_suffix() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Modification time of a file, falling back to now when the platform does
/// not report one.
#[must_use]
pub fn modified_at(metadata: &Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map_or_else(|_| Utc::now(), DateTime::<Utc>::from)
}

/// Creation time of a file, falling back to its modification time.
#[must_use]
pub fn created_at(metadata: &Metadata) -> DateTime<Utc> {
    metadata
        .created()
        .map_or_else(|_| modified_at(metadata), DateTime::<Utc>::from)
}
