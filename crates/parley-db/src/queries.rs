use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;

use parley_types::models::GroupId;

use crate::models::{MessageRow, UserRow};
use crate::{Database, StoreError};

/// Proof that a group's partition is provisioned. Only `resolve_partition`
/// constructs one; every message operation takes the handle rather than a raw
/// group id, so an unprovisioned group can never reach the message log.
#[derive(Debug, Clone, Copy)]
pub struct PartitionHandle {
    group: GroupId,
}

impl PartitionHandle {
    pub fn group(&self) -> GroupId {
        self.group
    }
}

impl Database {
    // -- Partitions --

    pub fn resolve_partition(&self, group: GroupId) -> Result<PartitionHandle, StoreError> {
        self.with_conn(|conn| {
            let exists = conn
                .query_row(
                    "SELECT 1 FROM group_partitions WHERE group_id = ?1",
                    [group.0],
                    |_| Ok(()),
                )
                .optional()?;

            match exists {
                Some(()) => Ok(PartitionHandle { group }),
                None => Err(StoreError::MissingPartition(group)),
            }
        })
    }

    /// Provision a partition for a group. Idempotent; normally done out of
    /// band (migrations seed the default rooms).
    pub fn provision_group(&self, group: GroupId) -> Result<PartitionHandle, StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO group_partitions (group_id) VALUES (?1)",
                [group.0],
            )?;
            Ok(PartitionHandle { group })
        })
    }

    // -- Messages --

    /// Append a message to the partition's log. The id comes from the
    /// store-wide sequence and the timestamp from the server clock, so the
    /// returned row is the canonical record all recipients must see.
    pub fn append_message(
        &self,
        partition: PartitionHandle,
        username: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<MessageRow, StoreError> {
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        self.with_conn(|conn| {
            let id: i64 = conn.query_row(
                "INSERT INTO messages (group_id, username, sender_id, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 RETURNING id",
                rusqlite::params![partition.group.0, username, sender_id, text, created_at],
                |row| row.get(0),
            )?;

            Ok(MessageRow {
                id,
                group_id: partition.group.0,
                username: username.to_string(),
                sender_id: sender_id.to_string(),
                text: text.to_string(),
                created_at,
            })
        })
    }

    /// All messages in the partition, most recent first. Ties on timestamp
    /// fall back to id so the order is total.
    pub fn list_messages(&self, partition: PartitionHandle) -> Result<Vec<MessageRow>, StoreError> {
        self.with_conn(|conn| query_messages(conn, partition.group))
    }

    pub fn count_messages(&self, partition: PartitionHandle) -> Result<u64, StoreError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE group_id = ?1",
                [partition.group.0],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    /// Delete the `batch` oldest rows, but only while the partition holds
    /// more than `keep_cap` rows. The count condition is part of the DELETE
    /// predicate, so the check and the delete are one statement and a
    /// concurrent trim can never drag the partition below the cap.
    ///
    /// Returns the number of rows deleted.
    pub fn trim_oldest(
        &self,
        partition: PartitionHandle,
        keep_cap: u64,
        batch: u64,
    ) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM messages
                 WHERE id IN (
                     SELECT id FROM messages
                     WHERE group_id = ?1
                     ORDER BY created_at ASC, id ASC
                     LIMIT ?2
                 )
                 AND (SELECT COUNT(*) FROM messages WHERE group_id = ?1) > ?3",
                rusqlite::params![partition.group.0, batch, keep_cap],
            )?;
            Ok(deleted)
        })
    }

    // -- Users --

    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<i64, StoreError> {
        self.with_conn(|conn| {
            let id: i64 = conn.query_row(
                "INSERT INTO chat_users (username, email, password) VALUES (?1, ?2, ?3)
                 RETURNING id",
                rusqlite::params![username, email, password_hash],
                |row| row.get(0),
            )?;
            Ok(id)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| {
            query_user(conn, "SELECT id, username, email, password FROM chat_users WHERE email = ?1", email)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| {
            query_user(conn, "SELECT id, username, email, password FROM chat_users WHERE username = ?1", username)
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, username, email, password FROM chat_users ORDER BY id")?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns true when a row was actually deleted.
    pub fn delete_user_by_username(&self, username: &str) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM chat_users WHERE username = ?1", [username])?;
            Ok(deleted > 0)
        })
    }
}

fn query_messages(conn: &Connection, group: GroupId) -> Result<Vec<MessageRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, group_id, username, sender_id, text, created_at
         FROM messages
         WHERE group_id = ?1
         ORDER BY created_at DESC, id DESC",
    )?;

    let rows = stmt
        .query_map([group.0], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                group_id: row.get(1)?,
                username: row.get(2)?,
                sender_id: row.get(3)?,
                text: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_user(conn: &Connection, sql: &str, key: &str) -> Result<Option<UserRow>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let row = stmt.query_row([key], user_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &rusqlite::Row<'_>) -> Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, StoreError>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, StoreError> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
