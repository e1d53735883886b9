//! Shared types used across the agent host crates: the error taxonomy,
//! connection/agent identifiers, and the `Broadcaster` seam that lets the
//! state store and chat subsystem reach the connection manager without a
//! circular crate dependency.

pub mod error;
pub mod ids;

pub use error::{Error, ErrorKind, Result};
pub use ids::{AgentKey, ConnectionId};

use async_trait::async_trait;
use serde_json::Value;

/// Anything that can push a JSON frame to one or all connections of an
/// agent instance. `agent-connection` implements this; `agent-state` and
/// `agent-chat` depend only on the trait, not on the connection manager
/// itself.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Send `frame` to every connection except `except` (if any).
    async fn broadcast(&self, frame: Value, except: Option<ConnectionId>);

    /// Send `frame` to exactly one connection. No-op if the connection is
    /// gone by the time the send is attempted.
    async fn send_to(&self, conn: ConnectionId, frame: Value);
}

/// Opaque per-connection auth context delivered alongside RPCs and chat
/// requests (e.g. `username`, `userId`). The host never interprets this —
/// it is bound by whatever authenticates the inbound request.
pub type Props = Value;
