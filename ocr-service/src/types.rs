//! Common type definitions.
//!
//! Uploaded files are identified by UUIDs wrapped in the [`FileId`] alias. The
//! [`abbrev_uuid`] helper shortens them for log lines.

use uuid::Uuid;

pub type FileId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}
