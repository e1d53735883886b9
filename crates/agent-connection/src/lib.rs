//! Tracks the live connections of one agent instance and broadcasts frames
//! over them. Connections are represented as ids into a map owned by the
//! manager (per the "cyclic state" design note): a connection itself holds
//! only a back-index and a channel handle, never a pointer to the agent.

pub mod hooks;

pub use hooks::ConnectionHooks;

use std::sync::Arc;

use agent_common::{Broadcaster, ConnectionId, Props};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

/// Lifecycle state of one connection, mirroring the data model's
/// `connecting -> open -> closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

struct Connection {
    props: Option<Props>,
    state: ConnectionState,
    tx: mpsc::UnboundedSender<Value>,
}

/// Owns every live connection of one agent instance. Cheap to clone
/// (`Arc`-backed); implements `Broadcaster` so `agent-state` and
/// `agent-chat` can reach connections without depending on this crate
/// directly.
#[derive(Clone, Default)]
pub struct ConnectionManager {
    connections: Arc<DashMap<ConnectionId, Connection>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly-accepted connection and return its id. The
    /// connection starts in `Open` state — by the time the framework has
    /// a sender to hand over, the handshake (including the `connected`
    /// frame) has already completed.
    pub fn register(&self, props: Option<Props>, tx: mpsc::UnboundedSender<Value>) -> ConnectionId {
        let id = ConnectionId::new();
        self.connections.insert(
            id,
            Connection {
                props,
                state: ConnectionState::Open,
                tx,
            },
        );
        id
    }

    pub fn remove(&self, id: ConnectionId) {
        self.connections.remove(&id);
    }

    pub fn mark_closed(&self, id: ConnectionId) {
        if let Some(mut entry) = self.connections.get_mut(&id) {
            entry.state = ConnectionState::Closed;
        }
    }

    pub fn props(&self, id: ConnectionId) -> Option<Props> {
        self.connections.get(&id).and_then(|c| c.props.clone())
    }

    pub fn get_connections(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|e| *e.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn send_frame(&self, id: ConnectionId, frame: &Value) {
        if let Some(entry) = self.connections.get(&id) {
            if entry.tx.send(frame.clone()).is_err() {
                trace!(%id, "connection send failed, channel closed");
            }
        }
    }
}

#[async_trait]
impl Broadcaster for ConnectionManager {
    async fn broadcast(&self, frame: Value, except: Option<ConnectionId>) {
        for entry in self.connections.iter() {
            let id = *entry.key();
            if Some(id) == except {
                continue;
            }
            let _ = entry.tx.send(frame.clone());
        }
    }

    async fn send_to(&self, conn: ConnectionId, frame: Value) {
        self.send_frame(conn, &frame);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_excludes_origin_and_reaches_others() {
        let manager = ConnectionManager::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = manager.register(None, tx_a);
        let _b = manager.register(None, tx_b);

        manager
            .broadcast(serde_json::json!({"type": "state", "state": {"n": 2}}), Some(a))
            .await;

        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), serde_json::json!({"type": "state", "state": {"n": 2}}));
    }

    #[tokio::test]
    async fn remove_drops_connection_from_broadcast() {
        let manager = ConnectionManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = manager.register(None, tx);
        manager.remove(id);

        manager.broadcast(serde_json::json!({"type": "state", "state": 1}), None).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(manager.len(), 0);
    }

    #[tokio::test]
    async fn send_to_targets_a_single_connection() {
        let manager = ConnectionManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = manager.register(None, tx);

        manager.send_to(id, serde_json::json!({"type": "identity", "name": "a", "agent": "b"})).await;

        assert_eq!(rx.try_recv().unwrap(), serde_json::json!({"type": "identity", "name": "a", "agent": "b"}));
    }
}
