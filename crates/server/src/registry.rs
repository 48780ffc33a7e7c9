//! Socket Registry — the process-wide live connection manager.
//!
//! Owns room membership (session-id rooms and `user:{id}` rooms) and the
//! targeted-emit primitives. Rooms are mutated only by the connection
//! lifecycle in `websocket.rs`, never directly by callers.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use vitrine_protocol::ServerEvent;

use crate::error::GatewayError;

static REGISTRY: OnceLock<Arc<SocketRegistry>> = OnceLock::new();

/// Outbound sender for one live connection.
pub type ConnectionSender = mpsc::Sender<ServerEvent>;

pub struct SocketRegistry {
    /// room key → connection id → outbound sender
    rooms: DashMap<String, HashMap<u64, ConnectionSender>>,
}

impl SocketRegistry {
    fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Initialize the process-wide registry. Idempotent: a second call
    /// returns the existing instance without reconfiguring.
    pub fn initialize() -> Arc<SocketRegistry> {
        REGISTRY
            .get_or_init(|| Arc::new(SocketRegistry::new()))
            .clone()
    }

    /// The live registry. Fails if `initialize` has not run yet.
    pub fn instance() -> Result<Arc<SocketRegistry>, GatewayError> {
        REGISTRY
            .get()
            .cloned()
            .ok_or(GatewayError::UninitializedRegistry)
    }

    /// Join a connection to a room. Called only by the connection lifecycle.
    pub fn join(&self, room: &str, conn_id: u64, tx: ConnectionSender) {
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(conn_id, tx);
    }

    /// Remove a connection from a room; empty rooms are dropped.
    pub fn leave(&self, room: &str, conn_id: u64) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(&conn_id);
            let now_empty = members.is_empty();
            drop(members);
            if now_empty {
                self.rooms.remove_if(room, |_, members| members.is_empty());
            }
        }
    }

    /// Deliver an event to every connection joined to a session's room.
    /// No-op (not an error) when no connection is joined; returns the
    /// number of connections reached.
    pub async fn emit_to_session(&self, session_id: &str, event: ServerEvent) -> usize {
        self.emit_to_room(session_id, event).await
    }

    /// Deliver an event to every connection joined to a user's room.
    pub async fn emit_to_user(&self, user_id: &str, event: ServerEvent) -> usize {
        self.emit_to_room(&user_room(user_id), event).await
    }

    async fn emit_to_room(&self, room: &str, event: ServerEvent) -> usize {
        let members: Vec<(u64, ConnectionSender)> = match self.rooms.get(room) {
            Some(members) => members
                .iter()
                .map(|(id, tx)| (*id, tx.clone()))
                .collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for (conn_id, tx) in members {
            if tx.send(event.clone()).await.is_ok() {
                delivered += 1;
            } else {
                warn!(
                    component = "registry",
                    event = "registry.stale_member",
                    room = %room,
                    connection_id = conn_id,
                    "Dropping emit to closed connection"
                );
            }
        }

        debug!(
            component = "registry",
            event = "registry.emitted",
            room = %room,
            delivered,
            "Emitted event to room"
        );
        delivered
    }

    #[cfg(test)]
    fn room_size(&self, room: &str) -> usize {
        self.rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }
}

/// Room key for a user's connections.
pub fn user_room(user_id: &str) -> String {
    format!("user:{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> ServerEvent {
        ServerEvent::UserLogout
    }

    #[tokio::test]
    async fn emit_reaches_every_room_member() {
        let registry = SocketRegistry::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        registry.join("s1", 1, tx1);
        registry.join("s1", 2, tx2);

        let delivered = registry.emit_to_session("s1", event()).await;
        assert_eq!(delivered, 2);
        assert_eq!(rx1.recv().await, Some(ServerEvent::UserLogout));
        assert_eq!(rx2.recv().await, Some(ServerEvent::UserLogout));
    }

    #[tokio::test]
    async fn emit_to_empty_room_is_a_noop() {
        let registry = SocketRegistry::new();
        assert_eq!(registry.emit_to_session("nobody", event()).await, 0);
    }

    #[tokio::test]
    async fn leave_releases_membership() {
        let registry = SocketRegistry::new();
        let (tx, _rx) = mpsc::channel(8);
        registry.join("s1", 1, tx);
        assert_eq!(registry.room_size("s1"), 1);

        registry.leave("s1", 1);
        assert_eq!(registry.room_size("s1"), 0);
        assert_eq!(registry.emit_to_session("s1", event()).await, 0);
    }

    #[tokio::test]
    async fn user_room_scopes_by_user_id() {
        let registry = SocketRegistry::new();
        let (tx, mut rx) = mpsc::channel(8);
        registry.join(&user_room("u1"), 1, tx);

        assert_eq!(registry.emit_to_user("u1", event()).await, 1);
        assert_eq!(registry.emit_to_user("u2", event()).await, 0);
        assert_eq!(rx.recv().await, Some(ServerEvent::UserLogout));
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let first = SocketRegistry::initialize();
        let second = SocketRegistry::initialize();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(SocketRegistry::instance().is_ok());
    }
}
