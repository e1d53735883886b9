//! Maps `(namespace, name)` to a lazily-started, running instance.

use std::sync::Arc;

use agent_common::AgentKey;
use dashmap::DashMap;

use crate::config::HostConfig;
use crate::error::{Error, Result};
use crate::instance::{AgentFactory, AgentInstance};

/// Owns every live instance. `get_agent_by_name` is idempotent: it
/// establishes identity without eagerly starting work beyond opening the
/// instance's store and background loops (scheduler, MCP reconnects) —
/// there is no further lazy "warm-up" stage to defer in this runtime.
pub struct InstanceRegistry {
    config: Arc<HostConfig>,
    agent_types: DashMap<String, Arc<dyn AgentFactory>>,
    instances: DashMap<AgentKey, Arc<AgentInstance>>,
}

impl InstanceRegistry {
    pub fn new(config: Arc<HostConfig>) -> Self {
        Self { config, agent_types: DashMap::new(), instances: DashMap::new() }
    }

    /// Register an agent type under a slug (see `agent_common::slugify`
    /// for how a declared class name becomes this path segment).
    pub fn register_agent_type(&self, slug: impl Into<String>, factory: Arc<dyn AgentFactory>) {
        self.agent_types.insert(slug.into(), factory);
    }

    pub async fn get_agent_by_name(&self, agent_type: &str, name: &str) -> Result<Arc<AgentInstance>> {
        let key = AgentKey::new(agent_type, name);
        if let Some(existing) = self.instances.get(&key) {
            return Ok(existing.clone());
        }
        let factory = self.agent_types.get(agent_type).ok_or_else(|| Error::UnknownAgentType(agent_type.to_string()))?.clone();
        let instance = AgentInstance::start(key.clone(), factory, &self.config).await?;
        self.instances.insert(key, instance.clone());
        Ok(instance)
    }

    /// `routeAgentRequest`: parse `/agents/<agent-type>/<instance-name>[/suffix]`
    /// and resolve the target instance. Returns `None` when the path
    /// doesn't match the routing shape at all (caller falls through);
    /// an unknown `agent-type` is a `not-found` error, not a fall-through.
    pub async fn route(&self, path: &str) -> Option<Result<(Arc<AgentInstance>, Option<String>)>> {
        let trimmed = path.strip_prefix("/agents/")?;
        let mut segments = trimmed.splitn(3, '/');
        let agent_type = segments.next()?;
        let instance_name = segments.next()?;
        if agent_type.is_empty() || instance_name.is_empty() {
            return None;
        }
        let suffix = segments.next().map(str::to_string);
        Some(self.get_agent_by_name(agent_type, instance_name).await.map(|instance| (instance, suffix)))
    }

    /// Every instance started so far, for fan-out operations (the MCP
    /// OAuth callback doesn't know which instance owns a given server id
    /// ahead of time).
    pub fn live_instances(&self) -> Vec<Arc<AgentInstance>> {
        self.instances.iter().map(|entry| entry.value().clone()).collect()
    }

    pub async fn shutdown_all(&self) {
        for entry in self.instances.iter() {
            entry.value().shutdown().await;
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use agent_chat::{Message, OnChatMessage};
    use agent_mcp_client::McpManager;
    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::sync::mpsc;

    struct EchoOnChatMessage;

    #[async_trait]
    impl OnChatMessage for EchoOnChatMessage {
        async fn handle(&self, _messages: Vec<Message>, _body: Value) -> agent_common::Result<mpsc::UnboundedReceiver<Value>> {
            let (_tx, rx) = mpsc::unbounded_channel();
            Ok(rx)
        }
    }

    struct EchoFactory;

    #[async_trait]
    impl AgentFactory for EchoFactory {
        async fn on_chat_message(&self, _key: &AgentKey, _store: agent_store::AgentStore, _mcp: Arc<McpManager>) -> Arc<dyn OnChatMessage> {
            Arc::new(EchoOnChatMessage)
        }
    }

    fn registry() -> (tempfile::TempDir, InstanceRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(HostConfig { data_dir: dir.path().to_path_buf(), ..Default::default() });
        let registry = InstanceRegistry::new(config);
        registry.register_agent_type("chat-agent", Arc::new(EchoFactory));
        (dir, registry)
    }

    #[tokio::test]
    async fn get_agent_by_name_is_idempotent() {
        let (_dir, registry) = registry();
        let a = registry.get_agent_by_name("chat-agent", "alice").await.unwrap();
        let b = registry.get_agent_by_name("chat-agent", "alice").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn unknown_agent_type_is_an_error() {
        let (_dir, registry) = registry();
        assert!(registry.get_agent_by_name("nope", "alice").await.is_err());
    }

    #[tokio::test]
    async fn route_parses_the_agents_path_shape() {
        let (_dir, registry) = registry();
        let (instance, suffix) = registry.route("/agents/chat-agent/alice/tools").await.unwrap().unwrap();
        assert_eq!(instance.key.name, "alice");
        assert_eq!(suffix.as_deref(), Some("tools"));
    }

    #[tokio::test]
    async fn route_falls_through_on_an_unrelated_path() {
        let (_dir, registry) = registry();
        assert!(registry.route("/webhooks/stripe").await.is_none());
    }
}
