//! Method dispatch is delegated to the hosting agent so this crate never
//! depends on the tool registry or chat subsystem directly.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

/// A dispatched call's result: most methods answer with a single JSON
/// value; long-running tool calls may instead stream progress and a final
/// result as a sequence of values over the POST's SSE reply.
pub enum DispatchOutcome {
    Json(Value),
    Stream(mpsc::UnboundedReceiver<Value>),
}

#[async_trait]
pub trait McpDispatcher: Send + Sync {
    /// `session_id` is already allocated/validated by the router; `method`
    /// is `initialize`, `tools/list`, `tools/call`, or any other JSON-RPC
    /// method the host chooses to answer.
    async fn dispatch(&self, session_id: &str, method: &str, params: Option<Value>) -> agent_common::Result<DispatchOutcome>;
}
