use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one chat group. Each group owns its own ordered message log
/// (a "partition" in the store); the id alone is not proof the partition
/// exists — parley-db resolves it to a `PartitionHandle` before any write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub i64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A stored chat message — immutable once persisted.
///
/// `id` and `timestamp` are server-assigned on insert; clients never supply
/// them. `username` is the sender's display name at send time and is not
/// updated if the account is later renamed; `sender_id` is the stable handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub group_id: GroupId,
    pub username: String,
    pub sender_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A registered account as exposed over the API. The stored password hash is
/// deliberately absent from this type so it can never be serialized out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub email: String,
}
