//! `McpDispatcher` implementation that answers a hosted MCP server's
//! JSON-RPC methods from one agent instance's server-tool registry.

use std::sync::Arc;

use agent_chat::tools::ToolKind;
use agent_chat::ToolRegistry;
use agent_mcp_server::{DispatchOutcome, McpDispatcher};
use async_trait::async_trait;
use serde_json::{Value, json};

pub struct HostedToolDispatcher {
    tools: Arc<ToolRegistry>,
}

impl HostedToolDispatcher {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .filter_map(|(name, kind)| match kind {
                ToolKind::Server(_) => Some(json!({"name": name, "inputSchema": {"type": "object"}})),
                ToolKind::Client(_) => None,
            })
            .collect();
        json!({"tools": tools})
    }

    async fn call_tool(&self, params: Option<Value>) -> agent_common::Result<Value> {
        let params = params.ok_or_else(|| agent_common::Error::invalid_argument("tools/call requires params"))?;
        let name = params.get("name").and_then(Value::as_str).ok_or_else(|| agent_common::Error::invalid_argument("missing tool name"))?;
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        match self.tools.get(name) {
            Some(ToolKind::Server(tool)) => tool
                .execute(arguments)
                .await
                .map(|result| json!({"content": [{"type": "text", "text": result.to_string()}]}))
                .map_err(agent_common::Error::internal),
            Some(ToolKind::Client(_)) => Err(agent_common::Error::invalid_argument(format!("'{name}' is a client-only tool"))),
            None => Err(agent_common::Error::not_found(format!("unknown tool '{name}'"))),
        }
    }
}

#[async_trait]
impl McpDispatcher for HostedToolDispatcher {
    async fn dispatch(&self, _session_id: &str, method: &str, params: Option<Value>) -> agent_common::Result<DispatchOutcome> {
        let result = match method {
            "initialize" => json!({
                "protocolVersion": "2024-11-05",
                "serverInfo": {"name": "agent-host", "version": env!("CARGO_PKG_VERSION")},
                "capabilities": {"tools": {}},
            }),
            "tools/list" => self.list_tools(),
            "tools/call" => self.call_tool(params).await?,
            other => return Err(agent_common::Error::invalid_argument(format!("unsupported method '{other}'"))),
        };
        Ok(DispatchOutcome::Json(result))
    }
}
