pub mod error;
pub mod manager;
pub mod oauth;
pub mod pkce;
pub mod server;
pub mod store;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use manager::{AddServerOptions, AddServerResult, McpManager};
pub use oauth::{OAuthConfig, OAuthFlow};
pub use server::{McpServerRecord, McpServerState};
pub use types::{AiTool, McpToolDef, OAuthTokens, ToolsCallResult};
