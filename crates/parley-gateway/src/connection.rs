use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, trace, warn};
use uuid::Uuid;

use parley_db::Database;
use parley_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;
use crate::ingest::{self, InboundMessage};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a single WebSocket connection.
///
/// The connection starts anonymous: it can post and receive messages right
/// away, and only gains a session registry entry (and with it targeted
/// `forceLogout` delivery) once it announces an identity via `register-user`.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, db: Arc<Database>) {
    let (mut sender, mut receiver) = socket.split();

    let conn_id = Uuid::new_v4();
    info!("Connection {} opened", conn_id);

    // Targeted events (forceLogout, send_message_failed) arrive on this
    // channel; broadcasts on the dispatcher's broadcast channel.
    let (targeted_tx, mut targeted_rx) = mpsc::unbounded_channel::<GatewayEvent>();
    let mut broadcast_rx = dispatcher.subscribe();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts + targeted events -> client, with heartbeat.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Connection {} lagged by {} events", conn_id, n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                result = targeted_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };

                    let is_logout = matches!(event, GatewayEvent::ForceLogout);
                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                    if is_logout {
                        // The client is told to terminate; close our half too.
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Connection {} heartbeat timeout, dropping", conn_id);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client.
    let dispatcher_recv = dispatcher.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&dispatcher_recv, &db, conn_id, &targeted_tx, cmd).await;
                    }
                    Err(e) => {
                        warn!(
                            "Connection {} bad command: {} -- raw: {}",
                            conn_id,
                            e,
                            truncate_for_log(&text, 200)
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.unregister_conn(conn_id).await;
    info!("Connection {} closed", conn_id);
}

/// Largest prefix of `text` that fits in `max` bytes and ends on a char
/// boundary. Raw client frames go through this before being logged; slicing
/// at a fixed byte offset would panic mid-character on multibyte input.
fn truncate_for_log(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

async fn handle_command(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    conn_id: Uuid,
    targeted_tx: &mpsc::UnboundedSender<GatewayEvent>,
    cmd: GatewayCommand,
) {
    match cmd {
        GatewayCommand::RegisterUser(identity) => {
            info!("Connection {} registered as '{}'", conn_id, identity);
            dispatcher
                .register_session(&identity, conn_id, targeted_tx.clone())
                .await;
        }

        GatewayCommand::SendMessage {
            group_id,
            username,
            sender_id,
            text,
        } => {
            let input = InboundMessage {
                group_id,
                username,
                sender_id,
                text,
            };

            match ingest::ingest_message(db, dispatcher, input).await {
                Ok(stored) => {
                    trace!("Connection {} stored message {} in group {}", conn_id, stored.id, stored.group_id);
                }
                Err(e) => {
                    // Everyone else sees nothing; the sender gets told.
                    warn!("Connection {} message dropped: {}", conn_id, e);
                    let _ = targeted_tx.send(GatewayEvent::SendMessageFailed {
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}
