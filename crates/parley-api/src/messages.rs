use axum::{Json, extract::Path, extract::State, http::StatusCode};
use tracing::error;

use parley_types::models::{GroupId, Message};

use crate::AppState;

/// GET /get-messages/{group_id} — the group's full log, most recent first.
/// Any store failure, including an unprovisioned group, is a 500.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
) -> Result<Json<Vec<Message>>, StatusCode> {
    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || {
        let partition = db.resolve_partition(GroupId(group_id))?;
        db.list_messages(partition)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|e| {
        error!("Listing messages for group {} failed: {}", group_id, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let messages: Vec<Message> = rows.into_iter().map(|row| row.into_message()).collect();
    Ok(Json(messages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppStateInner;
    use parley_db::Database;
    use parley_gateway::dispatcher::Dispatcher;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_history_is_most_recent_first() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let partition = db.resolve_partition(GroupId(1)).unwrap();
        for i in 0..3 {
            db.append_message(partition, "alice", "u-1", &format!("msg {i}"))
                .unwrap();
        }

        let state = Arc::new(AppStateInner {
            db,
            dispatcher: Dispatcher::new(),
        });

        let resp = get_messages(State(state), Path(1)).await.unwrap();
        let messages = resp.0;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].text, "msg 2");
        assert_eq!(messages[2].text, "msg 0");
    }

    #[tokio::test]
    async fn test_unknown_group_is_a_store_failure() {
        let state = Arc::new(AppStateInner {
            db: Arc::new(Database::open_in_memory().unwrap()),
            dispatcher: Dispatcher::new(),
        });

        let err = get_messages(State(state), Path(999)).await.unwrap_err();
        assert_eq!(err, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
