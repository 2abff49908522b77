use chrono::{DateTime, Utc};
use tracing::warn;

use parley_types::models::{GroupId, Message};

/// Database row types — these map directly to SQLite rows.
/// Distinct from parley-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password: String,
}

pub struct MessageRow {
    pub id: i64,
    pub group_id: i64,
    pub username: String,
    pub sender_id: String,
    pub text: String,
    pub created_at: String,
}

impl MessageRow {
    /// Convert a stored row into the canonical API record. Timestamps are
    /// written as RFC 3339 on insert; a row that fails to parse is corrupt
    /// and gets the epoch default rather than poisoning the whole listing.
    pub fn into_message(self) -> Message {
        let timestamp = self
            .created_at
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|e| {
                warn!("Corrupt created_at '{}' on message {}: {}", self.created_at, self.id, e);
                DateTime::default()
            });

        Message {
            id: self.id,
            group_id: GroupId(self.group_id),
            username: self.username,
            sender_id: self.sender_id,
            text: self.text,
            timestamp,
        }
    }
}
