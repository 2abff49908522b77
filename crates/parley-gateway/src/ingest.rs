use std::sync::Arc;

use tracing::{info, warn};

use parley_db::queries::PartitionHandle;
use parley_db::{Database, StoreError};
use parley_types::events::GatewayEvent;
use parley_types::models::{GroupId, Message};

use crate::dispatcher::Dispatcher;

/// Partition size above which the oldest messages get trimmed.
pub const RETENTION_CAP: u64 = 1000;
/// How many messages one trim pass removes. The cap and batch give the
/// partition hysteresis: it oscillates between ~501 and ~1001 rows instead
/// of being serviced on every insert.
pub const TRIM_BATCH: u64 = 500;

/// A `send_message` payload as received from the client, before the server
/// has assigned id and timestamp.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub group_id: GroupId,
    pub username: String,
    pub sender_id: String,
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Validation failure: nothing was stored, nothing broadcast.
    #[error("message rejected: {0}")]
    Rejected(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Run one inbound message through validate -> persist -> retain ->
/// broadcast.
///
/// Validation short-circuits with `Rejected` before any store mutation.
/// Retention runs after a successful append and is best-effort: a failed
/// trim is logged and never fails the ingest — the message is already
/// durable and gets broadcast regardless. The broadcast always carries the
/// canonical stored record, never the raw input, so every recipient sees
/// the server-assigned id and timestamp.
pub async fn ingest_message(
    db: &Arc<Database>,
    dispatcher: &Dispatcher,
    input: InboundMessage,
) -> Result<Message, IngestError> {
    if input.text.is_empty() {
        return Err(IngestError::Rejected("empty text"));
    }
    if input.username.is_empty() {
        return Err(IngestError::Rejected("missing username"));
    }
    if input.sender_id.is_empty() {
        return Err(IngestError::Rejected("missing sender id"));
    }

    // Resolve, append and trim on one blocking task; rusqlite must stay off
    // the async runtime.
    let db = db.clone();
    let row = tokio::task::spawn_blocking(move || {
        let partition = match db.resolve_partition(input.group_id) {
            Ok(partition) => partition,
            Err(StoreError::MissingPartition(_)) => {
                return Err(IngestError::Rejected("unknown group"));
            }
            Err(e) => return Err(e.into()),
        };

        let row = db.append_message(partition, &input.username, &input.sender_id, &input.text)?;
        enforce_retention(&db, partition);
        Ok(row)
    })
    .await??;

    let message = row.into_message();
    dispatcher.broadcast(GatewayEvent::ReceiveMessage(message.clone()));

    Ok(message)
}

/// Trim the partition back under the cap if the append pushed it over.
/// Failures are logged, never propagated.
fn enforce_retention(db: &Database, partition: PartitionHandle) {
    let count = match db.count_messages(partition) {
        Ok(count) => count,
        Err(e) => {
            warn!("Retention count failed for group {}: {}", partition.group(), e);
            return;
        }
    };

    if count <= RETENTION_CAP {
        return;
    }

    match db.trim_oldest(partition, RETENTION_CAP, TRIM_BATCH) {
        Ok(0) => {} // a concurrent trim got there first
        Ok(trimmed) => info!(
            "Trimmed {} oldest messages from group {} ({} stored)",
            trimmed,
            partition.group(),
            count
        ),
        Err(e) => warn!("Retention trim failed for group {}: {}", partition.group(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound(group: i64, text: &str) -> InboundMessage {
        InboundMessage {
            group_id: GroupId(group),
            username: "alice".into(),
            sender_id: "u-1".into(),
            text: text.into(),
        }
    }

    fn setup() -> (Arc<Database>, Dispatcher) {
        (Arc::new(Database::open_in_memory().unwrap()), Dispatcher::new())
    }

    #[tokio::test]
    async fn test_accepted_message_is_stored_and_broadcast_canonically() {
        let (db, dispatcher) = setup();
        let mut rx = dispatcher.subscribe();

        let stored = ingest_message(&db, &dispatcher, inbound(1, "hello"))
            .await
            .unwrap();
        assert!(stored.id > 0);

        match rx.recv().await.unwrap() {
            GatewayEvent::ReceiveMessage(broadcast) => {
                // Recipients see the server-assigned record, not the raw input.
                assert_eq!(broadcast.id, stored.id);
                assert_eq!(broadcast.timestamp, stored.timestamp);
                assert_eq!(broadcast.text, "hello");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let partition = db.resolve_partition(GroupId(1)).unwrap();
        assert_eq!(db.count_messages(partition).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected_without_side_effects() {
        let (db, dispatcher) = setup();
        let mut rx = dispatcher.subscribe();

        let err = ingest_message(&db, &dispatcher, inbound(1, "")).await.unwrap_err();
        assert!(matches!(err, IngestError::Rejected("empty text")));

        let partition = db.resolve_partition(GroupId(1)).unwrap();
        assert_eq!(db.count_messages(partition).unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_group_is_rejected() {
        let (db, dispatcher) = setup();

        let err = ingest_message(&db, &dispatcher, inbound(999, "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Rejected("unknown group")));
    }

    #[tokio::test]
    async fn test_crossing_the_cap_trims_back_to_501() {
        let (db, dispatcher) = setup();

        let partition = db.resolve_partition(GroupId(1)).unwrap();
        for _ in 0..RETENTION_CAP {
            db.append_message(partition, "alice", "u-1", "x").unwrap();
        }

        // The 1001st message triggers the trim but survives it.
        let stored = ingest_message(&db, &dispatcher, inbound(1, "over the cap"))
            .await
            .unwrap();

        assert_eq!(db.count_messages(partition).unwrap(), 501);
        let newest = db.list_messages(partition).unwrap();
        assert_eq!(newest[0].id, stored.id);
    }
}
