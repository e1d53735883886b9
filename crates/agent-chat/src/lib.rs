pub mod autoreply;
pub mod message;
pub mod migration;
pub mod sanitize;
pub mod service;
pub mod store;
pub mod stream;
pub mod tools;

pub use autoreply::is_auto_reply;
pub use message::{Message, Part, Role, ToolState};
pub use service::{ChatEngine, McpReadinessGate, OnChatMessage, WaitForMcpConnections};
pub use store::MessageStore;
pub use stream::{StreamManager, StreamMeta};
pub use tools::{ApprovalDecision, ClientToolDef, ServerTool, ToolKind, ToolRegistry, ToolResult};
