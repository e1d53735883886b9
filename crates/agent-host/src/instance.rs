//! One running agent instance: the composition root binding a
//! `(namespace, name)` identity to its own store, connections, state,
//! RPC methods, chat engine, scheduler, and outbound MCP connections.

use std::sync::Arc;
use std::time::Duration;

use agent_chat::{ChatEngine, OnChatMessage, WaitForMcpConnections};
use agent_common::{AgentKey, Broadcaster};
use agent_connection::{ConnectionHooks, ConnectionManager};
use agent_mcp_client::McpManager;
use agent_rpc::MethodRegistry;
use agent_scheduler::{ScheduleCallback, Scheduler};
use agent_state::{StateHooks, StateStore};
use agent_store::AgentStore;
use async_trait::async_trait;
use serde_json::Value;

use crate::config::HostConfig;
use crate::error::Result;

/// Per-agent-type customization point. One `AgentFactory` is registered
/// per slug at host startup; it is asked to build the pieces a fixed
/// subsystem composition can't supply itself. Everything but
/// `on_chat_message` has a default so a minimal agent type only needs to
/// answer the one question every agent must: how to generate a reply.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn on_chat_message(&self, key: &AgentKey, store: AgentStore, mcp: Arc<McpManager>) -> Arc<dyn OnChatMessage>;

    fn connection_hooks(&self, _key: &AgentKey) -> Arc<dyn ConnectionHooks> {
        Arc::new(NoopConnectionHooks)
    }

    fn state_hooks(&self, _key: &AgentKey) -> Option<Arc<dyn StateHooks>> {
        None
    }

    fn schedule_callback(&self, _key: &AgentKey) -> Arc<dyn ScheduleCallback> {
        Arc::new(NoopScheduleCallback)
    }

    fn wait_for_mcp(&self, _key: &AgentKey) -> WaitForMcpConnections {
        WaitForMcpConnections::Disabled
    }

    /// Tools this agent type exposes on its own hosted MCP server. Empty
    /// by default: most agent types only consume upstream MCP servers,
    /// they don't host one.
    fn hosted_tools(&self, _key: &AgentKey) -> agent_chat::ToolRegistry {
        agent_chat::ToolRegistry::new()
    }
}

pub struct NoopConnectionHooks;

impl ConnectionHooks for NoopConnectionHooks {}

pub struct NoopScheduleCallback;

#[async_trait]
impl ScheduleCallback for NoopScheduleCallback {
    async fn call(&self, _callback_name: &str, _payload: Value, _schedule: &agent_scheduler::Schedule) {}
}

/// Bridges `agent-chat`'s `McpReadinessGate` seam onto a concrete
/// `McpManager`, polling `has_mcp_connection` until every declared
/// server is ready or the timeout elapses.
struct McpGate {
    mcp: Arc<McpManager>,
}

#[async_trait]
impl agent_chat::McpReadinessGate for McpGate {
    async fn wait_ready(&self, timeout: Option<Duration>) {
        let poll = async {
            loop {
                let states = self.mcp.server_states().await;
                let settled = states
                    .iter()
                    .all(|s| matches!(s, agent_mcp_client::McpServerState::Ready | agent_mcp_client::McpServerState::Failed));
                if settled {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        match timeout {
            Some(duration) => {
                let _ = tokio::time::timeout(duration, poll).await;
            }
            None => poll.await,
        }
    }
}

pub struct AgentInstance {
    pub key: AgentKey,
    pub connections: ConnectionManager,
    pub state: StateStore,
    pub methods: MethodRegistry,
    pub chat: Arc<ChatEngine>,
    pub scheduler: Arc<Scheduler>,
    pub mcp: Arc<McpManager>,
    pub hooks: Arc<dyn ConnectionHooks>,
    /// This instance's own hosted MCP server, answering `tools/list` and
    /// `tools/call` against `factory.hosted_tools`. One per instance, not
    /// shared across the host, since `agent-mcp-server`'s session ids
    /// carry no instance identity of their own.
    pub mcp_server: axum::Router,
}

impl AgentInstance {
    pub async fn start(key: AgentKey, factory: Arc<dyn AgentFactory>, config: &HostConfig) -> Result<Arc<Self>> {
        std::fs::create_dir_all(config.data_dir.join(&key.namespace))?;
        let database_url = config.instance_database_url(&key);
        let store = AgentStore::open(&database_url).await?;

        let connections = ConnectionManager::new();
        let broadcaster: Arc<dyn Broadcaster> = Arc::new(connections.clone());

        let state = StateStore::load(store.clone(), broadcaster.clone(), factory.state_hooks(&key)).await.map_err(crate::error::Error::Agent)?;
        let methods = MethodRegistry::new();

        let mcp = McpManager::new(store.clone());
        mcp.on_start().await?;

        let scheduler = Scheduler::new(agent_scheduler::ScheduleStore::new(store.clone()), factory.schedule_callback(&key));
        scheduler.start().await?;

        let on_chat_message = factory.on_chat_message(&key, store.clone(), mcp.clone()).await;
        let mcp_gate: Arc<dyn agent_chat::McpReadinessGate> = Arc::new(McpGate { mcp: mcp.clone() });
        let chat = ChatEngine::new(
            store.clone(),
            broadcaster.clone(),
            on_chat_message,
            Some(mcp_gate),
            factory.wait_for_mcp(&key),
            config.max_persisted_messages,
        )
        .await
        .map_err(crate::error::Error::Agent)?;

        let hosted_tools = Arc::new(factory.hosted_tools(&key));
        let dispatcher: Arc<dyn agent_mcp_server::McpDispatcher> = Arc::new(crate::mcp_bridge::HostedToolDispatcher::new(hosted_tools));
        let mcp_server = agent_mcp_server::router(agent_mcp_server::McpServerState::new(dispatcher));

        Ok(Arc::new(Self {
            key,
            connections,
            state,
            methods,
            chat: Arc::new(chat),
            scheduler,
            mcp,
            hooks: factory.connection_hooks(&key),
            mcp_server,
        }))
    }

    pub fn broadcaster(&self) -> Arc<dyn Broadcaster> {
        Arc::new(self.connections.clone())
    }

    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
        for conn in self.connections.get_connections() {
            self.connections.mark_closed(conn);
        }
    }
}
