use axum::{Json, extract::State, http::StatusCode};
use tracing::{error, info};

use parley_types::api::{DeleteUserRequest, DeleteUserResponse};
use parley_types::models::PublicUser;

use crate::AppState;

/// GET /get-users — every registered account. The stored password hash
/// never leaves the DB layer here; `PublicUser` has no field for it.
pub async fn get_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<PublicUser>>, StatusCode> {
    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.list_users())
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Listing users failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let users = rows
        .into_iter()
        .map(|row| PublicUser {
            id: row.id,
            username: row.username,
            email: row.email,
        })
        .collect();

    Ok(Json(users))
}

/// POST /delete-user — drop the account row, then force-log-out whatever
/// live session holds that identity. The logout signal is best-effort: a
/// session that disconnected a moment ago just means there is nothing to
/// signal, never a failure.
pub async fn delete_user(
    State(state): State<AppState>,
    Json(req): Json<DeleteUserRequest>,
) -> Result<Json<DeleteUserResponse>, StatusCode> {
    let db = state.db.clone();
    let username = req.username.clone();
    let deleted = tokio::task::spawn_blocking(move || db.delete_user_by_username(&username))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Deleting user '{}' failed: {}", req.username, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let signaled = state.dispatcher.force_logout(&req.username).await;
    info!(
        "Deleted user '{}' (row existed: {}, live session signaled: {})",
        req.username, deleted, signaled
    );

    let message = if deleted {
        format!("User '{}' was deleted", req.username)
    } else {
        format!("No account named '{}' exists", req.username)
    };

    Ok(Json(DeleteUserResponse { message }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppStateInner;
    use parley_db::Database;
    use parley_gateway::dispatcher::Dispatcher;
    use parley_types::events::GatewayEvent;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn state() -> AppState {
        Arc::new(AppStateInner {
            db: Arc::new(Database::open_in_memory().unwrap()),
            dispatcher: Dispatcher::new(),
        })
    }

    #[tokio::test]
    async fn test_get_users_excludes_the_password_hash() {
        let state = state();
        state.db.create_user("alice", "a@example.com", "hash-a").unwrap();

        let resp = get_users(State(state)).await.unwrap();
        let json = serde_json::to_value(&resp.0).unwrap();
        assert_eq!(json[0]["username"], "alice");
        assert!(json[0].get("password").is_none());
    }

    #[tokio::test]
    async fn test_delete_user_signals_only_the_targeted_session() {
        let state = state();
        state.db.create_user("alice", "a@example.com", "hash-a").unwrap();

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        state.dispatcher.register_session("alice", s1, tx1).await;
        state.dispatcher.register_session("bob", s2, tx2).await;

        let resp = delete_user(
            State(state.clone()),
            Json(DeleteUserRequest {
                username: "alice".into(),
            }),
        )
        .await
        .unwrap();
        assert!(resp.0.message.contains("deleted"));

        assert!(matches!(rx1.try_recv(), Ok(GatewayEvent::ForceLogout)));
        assert!(rx2.try_recv().is_err());
        assert_eq!(state.dispatcher.lookup("alice").await, None);
        assert!(state.db.get_user_by_username("alice").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_user_tolerates_a_missing_session() {
        let state = state();
        state.db.create_user("alice", "a@example.com", "hash-a").unwrap();

        // No live session registered — deletion still succeeds.
        let resp = delete_user(
            State(state),
            Json(DeleteUserRequest {
                username: "alice".into(),
            }),
        )
        .await
        .unwrap();
        assert!(resp.0.message.contains("deleted"));
    }
}
