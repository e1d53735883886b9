//! The JSON state document: server-authoritative writes, client-proposed
//! updates, and broadcast to every other connection.

use std::sync::Arc;

use agent_common::{Broadcaster, ConnectionId, Error, Result};
use agent_store::AgentStore;
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Who originated a state write, passed to `on_state_update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    Server,
    ClientRemote(ConnectionId),
}

impl UpdateSource {
    pub fn label(self) -> &'static str {
        match self {
            UpdateSource::Server => "server",
            UpdateSource::ClientRemote(_) => "client-remote",
        }
    }
}

/// User-code hooks into the state replication algorithm. Both methods are
/// optional in the sense that `StateStore` is constructed without hooks at
/// all (`StateStore::new`); when present, `on_before_state_update` gates
/// client-proposed updates and `on_state_update` observes every accepted
/// write, server or client.
#[async_trait]
pub trait StateHooks: Send + Sync {
    async fn on_state_update(&self, _next: &Value, _source: UpdateSource) {}

    /// Decide whether a client-proposed `update{state}` may be applied.
    /// Returning `false` rejects the proposal with a `conflict` error
    /// instead of broadcasting it. Not called for server-side `setState`.
    async fn on_before_state_update(&self, _current: &Value, _proposed: &Value, _origin: ConnectionId) -> bool {
        true
    }
}

pub struct StateStore {
    current: RwLock<Value>,
    store: AgentStore,
    broadcaster: Arc<dyn Broadcaster>,
    hooks: Option<Arc<dyn StateHooks>>,
}

impl StateStore {
    /// Load the persisted state document (or `null` if none yet) and wire
    /// up the broadcaster. `hooks` is `None` when the agent declares
    /// neither `onStateUpdate` nor `onBeforeStateUpdate`.
    pub async fn load(
        store: AgentStore,
        broadcaster: Arc<dyn Broadcaster>,
        hooks: Option<Arc<dyn StateHooks>>,
    ) -> Result<Self> {
        let row: Option<(String,)> = sqlx::query_as("SELECT state FROM agent_state WHERE id = 0")
            .fetch_optional(store.pool())
            .await
            .map_err(agent_store::Error::from)?;
        let current = match row {
            Some((text,)) => serde_json::from_str(&text)?,
            None => Value::Null,
        };
        Ok(Self {
            current: RwLock::new(current),
            store,
            broadcaster,
            hooks,
        })
    }

    pub async fn get(&self) -> Value {
        self.current.read().await.clone()
    }

    async fn persist(&self, value: &Value) -> Result<()> {
        let text = serde_json::to_string(value)?;
        sqlx::query(
            "INSERT INTO agent_state (id, state) VALUES (0, ?1)
             ON CONFLICT(id) DO UPDATE SET state = excluded.state",
        )
        .bind(text)
        .execute(self.store.pool())
        .await
        .map_err(agent_store::Error::from)?;
        Ok(())
    }

    /// Server-initiated write. Always accepted, never gated by
    /// `on_before_state_update` (that hook only applies to client
    /// proposals).
    #[instrument(skip(self, next))]
    pub async fn set_state(&self, next: Value) -> Result<()> {
        {
            let mut guard = self.current.write().await;
            *guard = next.clone();
        }
        self.persist(&next).await?;
        if let Some(hooks) = &self.hooks {
            hooks.on_state_update(&next, UpdateSource::Server).await;
        }
        self.broadcaster
            .broadcast(json!({"type": "state", "state": next}), None)
            .await;
        Ok(())
    }

    /// Client-proposed `update{state}`. On acceptance, behaves like
    /// `set_state` except the origin connection is excluded from the
    /// broadcast (per the state-replication testable property) and
    /// `on_state_update` is labeled `client-remote`. On rejection, no
    /// mutation occurs and the caller should send an error frame to
    /// `origin` only.
    #[instrument(skip(self, proposed))]
    pub async fn handle_client_update(&self, proposed: Value, origin: ConnectionId) -> Result<()> {
        if let Some(hooks) = &self.hooks {
            let current = self.current.read().await.clone();
            if !hooks.on_before_state_update(&current, &proposed, origin).await {
                debug!(%origin, "client state proposal rejected by on_before_state_update");
                return Err(Error::conflict("state update rejected"));
            }
        }

        {
            let mut guard = self.current.write().await;
            *guard = proposed.clone();
        }
        self.persist(&proposed).await?;
        if let Some(hooks) = &self.hooks {
            hooks
                .on_state_update(&proposed, UpdateSource::ClientRemote(origin))
                .await;
        }
        self.broadcaster
            .broadcast(json!({"type": "state", "state": proposed}), Some(origin))
            .await;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::Mutex as AsyncMutex;

    #[derive(Default)]
    struct RecordingBroadcaster {
        sent: Mutex<Vec<(Value, Option<ConnectionId>)>>,
    }

    #[async_trait]
    impl Broadcaster for RecordingBroadcaster {
        async fn broadcast(&self, frame: Value, except: Option<ConnectionId>) {
            self.sent.lock().unwrap().push((frame, except));
        }

        async fn send_to(&self, _conn: ConnectionId, frame: Value) {
            self.sent.lock().unwrap().push((frame, None));
        }
    }

    #[derive(Default)]
    struct RejectingHooks {
        seen: AsyncMutex<Vec<String>>,
    }

    #[async_trait]
    impl StateHooks for RejectingHooks {
        async fn on_state_update(&self, _next: &Value, source: UpdateSource) {
            self.seen.lock().await.push(source.label().to_string());
        }

        async fn on_before_state_update(&self, _current: &Value, _proposed: &Value, _origin: ConnectionId) -> bool {
            false
        }
    }

    async fn fresh_store(broadcaster: Arc<dyn Broadcaster>, hooks: Option<Arc<dyn StateHooks>>) -> StateStore {
        let store = AgentStore::open_in_memory().await.unwrap();
        StateStore::load(store, broadcaster, hooks).await.unwrap()
    }

    #[tokio::test]
    async fn set_state_broadcasts_to_everyone() {
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let state = fresh_store(broadcaster.clone(), None).await;

        state.set_state(json!({"n": 1})).await.unwrap();

        assert_eq!(state.get().await, json!({"n": 1}));
        let sent = broadcaster.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, json!({"type": "state", "state": {"n": 1}}));
        assert_eq!(sent[0].1, None);
    }

    #[tokio::test]
    async fn client_update_excludes_origin_from_broadcast() {
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let state = fresh_store(broadcaster.clone(), None).await;
        let origin = ConnectionId::new();

        state.handle_client_update(json!({"n": 2}), origin).await.unwrap();

        let sent = broadcaster.sent.lock().unwrap();
        assert_eq!(sent[0].1, Some(origin));
    }

    #[tokio::test]
    async fn absent_hook_accepts_client_update() {
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let state = fresh_store(broadcaster, None).await;
        let origin = ConnectionId::new();

        state.handle_client_update(json!({"n": 3}), origin).await.unwrap();
        assert_eq!(state.get().await, json!({"n": 3}));
    }

    #[tokio::test]
    async fn present_hook_can_reject_client_update() {
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let hooks = Arc::new(RejectingHooks::default());
        let state = fresh_store(broadcaster.clone(), Some(hooks)).await;
        let origin = ConnectionId::new();

        let result = state.handle_client_update(json!({"n": 4}), origin).await;

        assert!(result.is_err());
        assert_eq!(state.get().await, Value::Null);
        assert!(broadcaster.sent.lock().unwrap().is_empty());
    }
}
