//! Tool lifecycle: server tools execute in-process; client tools are
//! streamed as `input-available` and completed by an inbound
//! `tool-result` frame. A tool may require explicit approval before
//! executing.

use async_trait::async_trait;
use serde_json::Value;

/// A server-registered tool: `execute` runs in-process and its result
/// becomes the `tool-<name>{state: output-available}` part.
#[async_trait]
pub trait ServerTool: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, input: Value) -> Result<Value, String>;

    /// When `Some`, the framework waits for an explicit `approve`/`reject`
    /// from the client before calling `execute`.
    async fn needs_approval(&self, _input: &Value) -> bool {
        false
    }
}

/// A tool with no `execute` function: the server streams it as
/// `input-available` and waits for the client to run it and report back
/// via `tool-result`.
#[derive(Debug, Clone)]
pub struct ClientToolDef {
    pub name: String,
    pub description: Option<String>,
}

pub enum ToolKind {
    Server(std::sync::Arc<dyn ServerTool>),
    Client(ClientToolDef),
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: std::collections::HashMap<String, ToolKind>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_server_tool(&mut self, tool: std::sync::Arc<dyn ServerTool>) {
        self.tools.insert(tool.name().to_string(), ToolKind::Server(tool));
    }

    pub fn register_client_tool(&mut self, def: ClientToolDef) {
        self.tools.insert(def.name.clone(), ToolKind::Client(def));
    }

    pub fn get(&self, name: &str) -> Option<&ToolKind> {
        self.tools.get(name)
    }

    pub fn is_client_tool(&self, name: &str) -> bool {
        matches!(self.tools.get(name), Some(ToolKind::Client(_)))
    }

    /// Every registered tool, server and client alike — used to answer
    /// introspection requests (the AI-tool adapter, a hosted MCP server's
    /// `tools/list`).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ToolKind)> {
        self.tools.iter().map(|(name, kind)| (name.as_str(), kind))
    }
}

/// The inbound `tool-result` message body from a client that ran a
/// client tool.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub output: Value,
    pub auto_continue: bool,
    /// Present only on the ACK message; used to repopulate the agent's
    /// client-tool set after a hibernation where the original set was
    /// lost.
    pub client_tools: Option<Vec<Value>>,
}

/// A pending approval gate for a server tool whose `needs_approval`
/// returned true.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    Reject,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ServerTool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn execute(&self, input: Value) -> Result<Value, String> {
            Ok(input)
        }
    }

    struct ApprovalGated;

    #[async_trait]
    impl ServerTool for ApprovalGated {
        fn name(&self) -> &str {
            "dangerous"
        }

        async fn execute(&self, input: Value) -> Result<Value, String> {
            Ok(input)
        }

        async fn needs_approval(&self, _input: &Value) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn server_tool_executes_in_process() {
        let tool = Echo;
        let result = tool.execute(serde_json::json!({"x": 1})).await.unwrap();
        assert_eq!(result, serde_json::json!({"x": 1}));
    }

    #[tokio::test]
    async fn tool_without_approval_defaults_to_false() {
        let tool = Echo;
        assert!(!tool.needs_approval(&serde_json::json!({})).await);
    }

    #[tokio::test]
    async fn tool_can_declare_it_needs_approval() {
        let tool = ApprovalGated;
        assert!(tool.needs_approval(&serde_json::json!({})).await);
    }

    #[test]
    fn registry_distinguishes_client_and_server_tools() {
        let mut registry = ToolRegistry::new();
        registry.register_server_tool(std::sync::Arc::new(Echo));
        registry.register_client_tool(ClientToolDef {
            name: "browser".to_string(),
            description: None,
        });

        assert!(!registry.is_client_tool("echo"));
        assert!(registry.is_client_tool("browser"));
        assert!(registry.get("missing").is_none());
    }
}
