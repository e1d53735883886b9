use agent_common::{ConnectionId, Error, Props};
use async_trait::async_trait;
use serde_json::Value;

/// Agent-level lifecycle hooks for connection events. The framework calls
/// these after the protocol-reserved frame types (`state`, `rpc`,
/// `chat-*`, ...) have already been dispatched internally — `on_message`
/// only sees frames that are not one of the reserved wire types.
#[async_trait]
pub trait ConnectionHooks: Send + Sync {
    async fn on_connect(&self, _conn: ConnectionId, _props: Option<Props>) {}

    async fn on_message(&self, _conn: ConnectionId, _frame: Value) {}

    async fn on_close(&self, _conn: ConnectionId, _code: u16, _reason: String, _was_clean: bool) {}

    async fn on_error(&self, _conn: ConnectionId, _err: &Error) {}
}
