//! Orchestrates message persistence, the resumable stream protocol, and
//! tool-call continuation into the single `chat-request` entry point.

use std::sync::Arc;
use std::time::Duration;

use agent_common::{Broadcaster, ConnectionId, Error, Result};
use agent_store::AgentStore;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{info, warn};

use crate::message::Message;
use crate::store::MessageStore;
use crate::stream::{StreamManager, StreamMeta};
use crate::tools::ToolResult;

/// `waitForMcpConnections` per-agent option.
#[derive(Debug, Clone, Copy)]
pub enum WaitForMcpConnections {
    Disabled,
    Enabled,
    WithTimeout(Duration),
}

impl Default for WaitForMcpConnections {
    fn default() -> Self {
        WaitForMcpConnections::Disabled
    }
}

/// Decouples the chat subsystem from the MCP client manager so neither
/// crate depends on the other; `agent-host` supplies the real
/// implementation backed by `agent-mcp-client`.
#[async_trait]
pub trait McpReadinessGate: Send + Sync {
    /// Resolve once every declared outbound MCP server reaches `ready`,
    /// or `timeout` elapses — whichever comes first. Must always
    /// eventually return (never hang forever).
    async fn wait_ready(&self, timeout: Option<Duration>);
}

/// User code's response to an inbound chat request: a channel of raw
/// frame bodies (teed to the requesting connection and the stream
/// buffer) that closes when generation finishes.
#[async_trait]
pub trait OnChatMessage: Send + Sync {
    async fn handle(&self, messages: Vec<Message>, body: Value) -> Result<mpsc::UnboundedReceiver<Value>>;
}

pub struct ChatEngine {
    messages: MessageStore,
    streams: StreamManager,
    store: AgentStore,
    broadcaster: Arc<dyn Broadcaster>,
    on_chat_message: Arc<dyn OnChatMessage>,
    mcp_gate: Option<Arc<dyn McpReadinessGate>>,
    wait_config: WaitForMcpConnections,
    cancel_handles: DashMap<String, AbortHandle>,
}

impl ChatEngine {
    pub async fn new(
        store: AgentStore,
        broadcaster: Arc<dyn Broadcaster>,
        on_chat_message: Arc<dyn OnChatMessage>,
        mcp_gate: Option<Arc<dyn McpReadinessGate>>,
        wait_config: WaitForMcpConnections,
        max_persisted_messages: Option<usize>,
    ) -> Result<Self> {
        let streams = StreamManager::load(store.clone(), broadcaster.clone()).await?;
        Ok(Self {
            messages: MessageStore::new(store.clone(), max_persisted_messages),
            streams,
            store,
            broadcaster,
            on_chat_message,
            mcp_gate,
            wait_config,
            cancel_handles: DashMap::new(),
        })
    }

    async fn store_custom_body(&self, body: &Value) -> Result<()> {
        let mut custom = body.clone();
        if let Some(obj) = custom.as_object_mut() {
            obj.remove("messages");
        }
        let text = serde_json::to_string(&custom)?;
        sqlx::query(
            "INSERT INTO agent_state (id, state, custom_body) VALUES (0, '{}', ?1)
             ON CONFLICT(id) DO UPDATE SET custom_body = excluded.custom_body",
        )
        .bind(text)
        .execute(self.store.pool())
        .await
        .map_err(agent_store::Error::from)?;
        Ok(())
    }

    async fn load_custom_body(&self) -> Result<Value> {
        let row: Option<(Option<String>,)> = sqlx::query_as("SELECT custom_body FROM agent_state WHERE id = 0")
            .fetch_optional(self.store.pool())
            .await
            .map_err(agent_store::Error::from)?;
        Ok(match row.and_then(|(v,)| v) {
            Some(text) => serde_json::from_str(&text)?,
            None => Value::Object(Default::default()),
        })
    }

    async fn wait_for_mcp(&self) {
        let (enabled, timeout) = match self.wait_config {
            WaitForMcpConnections::Disabled => (false, None),
            WaitForMcpConnections::Enabled => (true, None),
            WaitForMcpConnections::WithTimeout(d) => (true, Some(d)),
        };
        if !enabled {
            return;
        }
        if let Some(gate) = &self.mcp_gate {
            gate.wait_ready(timeout).await;
        }
    }

    /// `chat-request{id, init: {method, body}}`. `body.messages` are
    /// persisted, the remaining fields are stashed as the custom body,
    /// then `onChatMessage` runs (after any MCP wait) and its frames are
    /// teed to `conn` and the stream buffer.
    pub async fn handle_chat_request(self: &Arc<Self>, conn: ConnectionId, request_id: String, body: Value) -> Result<()> {
        let raw_messages = body.get("messages").and_then(Value::as_array).cloned().unwrap_or_default();
        let mut messages = Vec::new();
        for raw in &raw_messages {
            if let Some(message) = crate::migration::parse_and_migrate(raw) {
                messages.push(message);
            }
        }
        self.messages.persist(messages.clone()).await.map_err(Error::from)?;
        self.store_custom_body(&body).await?;

        self.wait_for_mcp().await;

        let meta = StreamMeta {
            request_id: request_id.clone(),
            body: body.clone(),
            client_tools: body.get("clientTools").cloned(),
        };
        self.streams.start_stream(request_id.clone(), &meta).await?;

        let mut receiver = self.on_chat_message.handle(messages, body).await?;

        let this = self.clone();
        let request_id_task = request_id.clone();
        let handle = tokio::spawn(async move {
            while let Some(frame) = receiver.recv().await {
                if let Err(err) = this.streams.push_chunk(conn, &request_id_task, frame).await {
                    warn!(%err, "failed to push stream chunk");
                    break;
                }
            }
            if let Err(err) = this.streams.finish_stream().await {
                warn!(%err, "failed to finish stream");
            }
            this.broadcaster
                .send_to(conn, serde_json::json!({"type": "chat-response", "id": request_id_task, "done": true}))
                .await;
            this.cancel_handles.remove(&request_id_task);
        });
        self.cancel_handles.insert(request_id, handle.abort_handle());
        Ok(())
    }

    pub fn handle_chat_cancel(&self, request_id: &str) {
        if let Some((_, handle)) = self.cancel_handles.remove(request_id) {
            handle.abort();
        }
    }

    /// `chat-clear`: wipe the log, chunks, metadata, and active stream
    /// markers, drop the custom-body snapshot, and broadcast to every
    /// other connection.
    pub async fn handle_chat_clear(&self, origin: ConnectionId) -> Result<()> {
        self.messages.clear().await.map_err(Error::from)?;
        self.streams.clear().await?;
        self.broadcaster
            .broadcast(serde_json::json!({"type": "chat-clear"}), Some(origin))
            .await;
        Ok(())
    }

    /// Bulk persist from a client (`chat-messages{messages[]}`).
    pub async fn handle_chat_messages(&self, raw_messages: Vec<Value>) -> Result<()> {
        let mut messages = Vec::new();
        for raw in &raw_messages {
            if let Some(message) = crate::migration::parse_and_migrate(raw) {
                messages.push(message);
            }
        }
        self.messages.persist(messages).await.map_err(Error::from)?;
        Ok(())
    }

    /// `tool-result{toolCallId, toolName, output, autoContinue?,
    /// clientTools?}`. When `autoContinue` is set, resumes generation
    /// using the stored custom body plus the message log, and adopts
    /// `clientTools` from the ACK (the agent may have lost its original
    /// tool set across a hibernation).
    pub async fn handle_tool_result(self: &Arc<Self>, conn: ConnectionId, result: ToolResult) -> Result<()> {
        info!(tool_call_id = %result.tool_call_id, tool = %result.tool_name, "tool result received");
        if !result.auto_continue {
            return Ok(());
        }

        let mut custom_body = self.load_custom_body().await?;
        if let Some(obj) = custom_body.as_object_mut() {
            if let Some(tools) = result.client_tools {
                obj.insert("clientTools".to_string(), Value::Array(tools));
            }
        }

        let messages = self.messages.load().await.map_err(Error::from)?;
        let request_id = uuid::Uuid::new_v4().to_string();
        let mut body_with_messages = custom_body.clone();
        if let Some(obj) = body_with_messages.as_object_mut() {
            obj.insert(
                "messages".to_string(),
                serde_json::to_value(&messages).unwrap_or(Value::Array(vec![])),
            );
        }

        self.handle_chat_request(conn, request_id, body_with_messages).await
    }
}
