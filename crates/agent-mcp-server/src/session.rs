//! `mcp-session-id` tracking. `initialize` on an unknown session allocates
//! one; every other method requires an existing session.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Server-to-client notifications published on a session's GET stream.
#[derive(Clone)]
pub struct Notification(pub Value);

pub struct Session {
    pub id: String,
    tx: broadcast::Sender<Notification>,
}

impl Session {
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn publish(&self, payload: Value) {
        let _ = self.tx.send(Notification(payload));
    }
}

#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, std::sync::Arc<Session>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> std::sync::Arc<Session> {
        let (tx, _rx) = broadcast::channel(64);
        let session = std::sync::Arc::new(Session { id: Uuid::new_v4().to_string(), tx });
        self.sessions.write().unwrap().insert(session.id.clone(), session.clone());
        session
    }

    pub fn get(&self, id: &str) -> Option<std::sync::Arc<Session>> {
        self.sessions.read().unwrap().get(id).cloned()
    }

    pub fn remove(&self, id: &str) {
        self.sessions.write().unwrap().remove(id);
    }
}
