use rusqlite::Connection;
use tracing::info;

use crate::StoreError;

pub fn run(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS chat_users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            username    TEXT NOT NULL UNIQUE,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Registry of provisioned group partitions. A group id must have a
        -- row here before any message can be appended under it.
        CREATE TABLE IF NOT EXISTS group_partitions (
            group_id    INTEGER PRIMARY KEY,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- One append-only log, partitioned by group_id. The AUTOINCREMENT
        -- rowid is the store-wide message sequence.
        CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id    INTEGER NOT NULL REFERENCES group_partitions(group_id),
            username    TEXT NOT NULL,
            sender_id   TEXT NOT NULL,
            text        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_group
            ON messages(group_id, created_at, id);

        -- Seed the default group rooms
        INSERT OR IGNORE INTO group_partitions (group_id) VALUES (1), (2), (3);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
