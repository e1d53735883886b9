//! Per-server state machine: `not-connected -> authenticating -> connecting
//! -> discovering -> ready`, with `failed` as a sink.

use serde::{Deserialize, Serialize};

use crate::oauth::OAuthConfig;
use crate::types::{McpToolDef, OAuthTokens};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum McpServerState {
    NotConnected,
    Authenticating,
    Connecting,
    Discovering,
    Ready,
    Failed,
}

impl McpServerState {
    pub fn as_str(self) -> &'static str {
        match self {
            McpServerState::NotConnected => "not-connected",
            McpServerState::Authenticating => "authenticating",
            McpServerState::Connecting => "connecting",
            McpServerState::Discovering => "discovering",
            McpServerState::Ready => "ready",
            McpServerState::Failed => "failed",
        }
    }
}

/// Cached per-server data the manager persists alongside the
/// `mcp_servers` row's normalized columns, serialized into
/// `server_options`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerOptions {
    #[serde(default)]
    pub tools: Vec<McpToolDef>,
    #[serde(default)]
    pub tokens: Option<OAuthTokens>,
    #[serde(default)]
    pub pkce_verifier: Option<String>,
    #[serde(default)]
    pub oauth_state: Option<String>,
    #[serde(default)]
    pub oauth_config: Option<OAuthConfig>,
}

#[derive(Debug, Clone)]
pub struct McpServerRecord {
    pub id: String,
    pub name: String,
    pub server_url: String,
    pub callback_url: Option<String>,
    pub client_id: Option<String>,
    pub auth_url: Option<String>,
    pub state: McpServerState,
    pub options: ServerOptions,
}
