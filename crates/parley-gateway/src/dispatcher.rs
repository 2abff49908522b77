use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use parley_types::events::GatewayEvent;

/// One live session: the connection that currently owns an identity.
/// `conn_id` disambiguates reconnects — a stale connection's cleanup must
/// not tear down the session its successor registered.
#[derive(Clone)]
struct SessionHandle {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

/// Owns the session registry and the fan-out channel. Created once at
/// startup and cloned into every connection task and HTTP handler.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for gateway events — all connected clients receive all events
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Session registry: identity -> currently owning connection.
    /// Rebuilt from nothing on restart; never persisted.
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                sessions: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients. Fire-and-forget: lagging
    /// or dead receivers are handled by their own connection tasks.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Bind an identity to a connection. A later registration for the same
    /// identity overwrites the previous handle (reconnect replaces the old
    /// session); entries the old connection holds under other identities
    /// are untouched.
    pub async fn register_session(
        &self,
        identity: &str,
        conn_id: Uuid,
        tx: mpsc::UnboundedSender<GatewayEvent>,
    ) {
        self.inner
            .sessions
            .write()
            .await
            .insert(identity.to_string(), SessionHandle { conn_id, tx });
    }

    /// Remove every registry entry owned by this connection. Called on
    /// disconnect, where only the handle is known — the identity may never
    /// have been announced.
    pub async fn unregister_conn(&self, conn_id: Uuid) {
        self.inner
            .sessions
            .write()
            .await
            .retain(|_, handle| handle.conn_id != conn_id);
    }

    /// The connection currently bound to an identity, if any.
    pub async fn lookup(&self, identity: &str) -> Option<Uuid> {
        self.inner
            .sessions
            .read()
            .await
            .get(identity)
            .map(|handle| handle.conn_id)
    }

    /// Deliver an event to the one connection bound to this identity.
    /// Silent no-op when the identity has no live session.
    pub async fn send_to(&self, identity: &str, event: GatewayEvent) {
        let sessions = self.inner.sessions.read().await;
        if let Some(handle) = sessions.get(identity) {
            let _ = handle.tx.send(event);
        }
    }

    /// Signal the identity's live session to log out and drop its registry
    /// entry, both under one write lock so a racing re-register cannot be
    /// half-signaled. Returns whether a live session was there to signal.
    pub async fn force_logout(&self, identity: &str) -> bool {
        let mut sessions = self.inner.sessions.write().await;
        match sessions.remove(identity) {
            Some(handle) => {
                let _ = handle.tx.send(GatewayEvent::ForceLogout);
                true
            }
            None => false,
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
