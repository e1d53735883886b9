//! Lifecycle management for outbound MCP server connections: OAuth,
//! transparent reconnect on restart, and tool discovery/invocation.

use std::collections::HashMap;
use std::sync::Arc;

use agent_store::AgentStore;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::oauth::{OAuthConfig, OAuthFlow};
use crate::server::{McpServerRecord, McpServerState, ServerOptions};
use crate::store::McpServerStore;
use crate::transport::HttpJsonRpcTransport;
use crate::types::{AiTool, McpToolDef, ToolsCallResult, ToolsListResult};

pub struct AddServerOptions {
    pub oauth: Option<OAuthConfig>,
}

pub struct AddServerResult {
    pub id: String,
    pub auth_url: Option<String>,
}

pub struct McpManager {
    store: McpServerStore,
    servers: RwLock<HashMap<String, McpServerRecord>>,
}

impl McpManager {
    pub fn new(store: AgentStore) -> Arc<Self> {
        Arc::new(Self {
            store: McpServerStore::new(store),
            servers: RwLock::new(HashMap::new()),
        })
    }

    fn transport(url: &str) -> HttpJsonRpcTransport {
        HttpJsonRpcTransport::new(url)
    }

    fn bearer(record: &McpServerRecord) -> Option<String> {
        record.options.tokens.as_ref().map(|t| t.access_token.clone()).map(|s| {
            use secrecy::ExposeSecret;
            s.expose_secret().to_string()
        })
    }

    /// Discover tools against a server with no auth requirement yet
    /// established, or with the server's current access token.
    async fn discover(&self, record: &mut McpServerRecord) {
        record.state = McpServerState::Connecting;
        let transport = Self::transport(&record.server_url);
        let bearer = Self::bearer(record);

        record.state = McpServerState::Discovering;
        match transport.request("tools/list", None, bearer.as_deref()).await {
            Ok(result) => match serde_json::from_value::<ToolsListResult>(result) {
                Ok(list) => {
                    record.options.tools = list.tools;
                    record.state = McpServerState::Ready;
                }
                Err(err) => {
                    warn!(server = %record.name, %err, "malformed tools/list response");
                    record.state = McpServerState::Failed;
                }
            },
            Err(err) => {
                warn!(server = %record.name, %err, "failed to discover MCP tools");
                record.state = McpServerState::Failed;
            }
        }
    }

    /// `addMcpServer(name, url, opts?) -> {id, authUrl?}`.
    pub async fn add_server(&self, name: impl Into<String>, server_url: impl Into<String>, opts: Option<AddServerOptions>) -> Result<AddServerResult> {
        let id = Uuid::new_v4().to_string();
        let mut record = McpServerRecord {
            id: id.clone(),
            name: name.into(),
            server_url: server_url.into(),
            callback_url: None,
            client_id: opts.as_ref().and_then(|o| o.oauth.as_ref()).map(|c| c.client_id.clone()),
            auth_url: None,
            state: McpServerState::NotConnected,
            options: ServerOptions::default(),
        };

        let auth_url = if let Some(AddServerOptions { oauth: Some(oauth) }) = opts {
            let flow = OAuthFlow::new(oauth.clone());
            let authorization = flow.start()?;
            record.options.pkce_verifier = Some(authorization.pkce.verifier.clone());
            record.options.oauth_state = Some(authorization.state.clone());
            record.options.oauth_config = Some(oauth);
            record.auth_url = Some(authorization.url.clone());
            record.state = McpServerState::Authenticating;
            Some(authorization.url)
        } else {
            self.discover(&mut record).await;
            None
        };

        self.store.save(&record).await?;
        info!(server = %record.name, state = record.state.as_str(), "added MCP server");
        self.servers.write().await.insert(id.clone(), record);

        Ok(AddServerResult { id, auth_url })
    }

    /// `GET /callback/<serverId>?code&state`: completes the authorization
    /// code exchange. `state` is single-use and is cleared immediately so a
    /// replayed callback is rejected.
    pub async fn handle_callback(&self, server_id: &str, code: &str, state: &str) -> Result<()> {
        let mut servers = self.servers.write().await;
        let record = servers.get_mut(server_id).ok_or_else(|| Error::NotFound(server_id.to_string()))?;

        let expected_state = record.options.oauth_state.take();
        if expected_state.as_deref() != Some(state) {
            return Err(Error::OAuth("state mismatch or already used".to_string()));
        }
        let verifier = record.options.pkce_verifier.take().ok_or_else(|| Error::OAuth("no pending pkce verifier".to_string()))?;
        let oauth_config = record.options.oauth_config.clone().ok_or_else(|| Error::OAuth("no oauth config on record".to_string()))?;

        let flow = OAuthFlow::new(oauth_config);
        let tokens = flow.exchange(code, &verifier).await?;
        record.options.tokens = Some(tokens);
        record.auth_url = None;

        self.discover(record).await;
        self.store.save(record).await?;
        Ok(())
    }

    pub async fn remove_server(&self, id: &str) -> Result<()> {
        self.servers.write().await.remove(id);
        self.store.delete(id).await
    }

    pub async fn list_tools(&self) -> Vec<(String, McpToolDef)> {
        self.servers
            .read()
            .await
            .values()
            .filter(|record| record.state == McpServerState::Ready)
            .flat_map(|record| record.options.tools.iter().cloned().map(move |tool| (record.id.clone(), tool)))
            .collect()
    }

    pub async fn get_ai_tools(&self) -> Vec<AiTool> {
        self.servers
            .read()
            .await
            .values()
            .filter(|record| record.state == McpServerState::Ready)
            .flat_map(|record| {
                record.options.tools.iter().map(move |tool| AiTool {
                    server_id: record.id.clone(),
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    input_schema: tool.input_schema.clone(),
                })
            })
            .collect()
    }

    pub async fn has_mcp_connection(&self, id: &str) -> bool {
        self.servers.read().await.get(id).is_some_and(|r| r.state == McpServerState::Ready)
    }

    /// Every declared server's current state, used by the chat subsystem's
    /// MCP-readiness gate to decide whether all outbound servers are
    /// `ready` yet.
    pub async fn server_states(&self) -> Vec<McpServerState> {
        self.servers.read().await.values().map(|r| r.state).collect()
    }

    /// `callTool({serverId, name, arguments})`. Refreshes the access token
    /// best-effort before calling if a refresh token is on file and the
    /// current token is expired or absent.
    pub async fn call_tool(&self, server_id: &str, name: &str, arguments: serde_json::Value) -> Result<ToolsCallResult> {
        let mut servers = self.servers.write().await;
        let record = servers.get_mut(server_id).ok_or_else(|| Error::NotFound(server_id.to_string()))?;
        if record.state != McpServerState::Ready {
            return Err(Error::NotReady(record.name.clone(), record.state.as_str().to_string()));
        }

        self.refresh_if_needed(record).await;

        let transport = Self::transport(&record.server_url);
        let bearer = Self::bearer(record);
        let params = serde_json::json!({"name": name, "arguments": arguments});
        let result = transport.request("tools/call", Some(params), bearer.as_deref()).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn refresh_if_needed(&self, record: &mut McpServerRecord) {
        let Some(tokens) = record.options.tokens.clone() else {
            return;
        };
        let expired = tokens.expires_at.is_some_and(|exp| {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            now >= exp
        });
        if !expired {
            return;
        }
        let Some(refresh_token) = tokens.refresh_token else {
            return;
        };
        let Some(oauth_config) = record.options.oauth_config.clone() else {
            return;
        };
        use secrecy::ExposeSecret;
        let flow = OAuthFlow::new(oauth_config);
        match flow.refresh(refresh_token.expose_secret()).await {
            Ok(fresh) => record.options.tokens = Some(fresh),
            Err(err) => warn!(server = %record.name, %err, "best-effort token refresh failed"),
        }
    }

    /// `onStart`: rebuild every connection from durable rows. Pending
    /// OAuth rows remain `authenticating` until their callback completes.
    pub async fn on_start(&self) -> Result<()> {
        let records = self.store.load_all().await?;
        let mut servers = self.servers.write().await;
        for mut record in records {
            if record.state != McpServerState::Authenticating {
                self.discover(&mut record).await;
                self.store.save(&record).await?;
            }
            servers.insert(record.id.clone(), record);
        }
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    async fn fresh_manager() -> Arc<McpManager> {
        McpManager::new(AgentStore::open_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn adding_a_server_without_oauth_attempts_immediate_discovery() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[{"name":"search","inputSchema":{}}]}}"#)
            .create_async()
            .await;

        let manager = fresh_manager().await;
        let result = manager.add_server("docs", server.url(), None).await.unwrap();
        assert!(result.auth_url.is_none());
        assert!(manager.has_mcp_connection(&result.id).await);
        assert_eq!(manager.list_tools().await.len(), 1);
    }

    #[tokio::test]
    async fn adding_a_server_with_oauth_returns_an_authorization_url_and_stays_pending() {
        let manager = fresh_manager().await;
        let oauth = OAuthConfig {
            client_id: "client-1".to_string(),
            auth_url: "https://auth.example.com/authorize".to_string(),
            token_url: "https://auth.example.com/token".to_string(),
            redirect_uri: "https://agent.example.com/callback".to_string(),
            scopes: vec!["tools".to_string()],
        };
        let result = manager
            .add_server("secure", "https://mcp.example.com/rpc", Some(AddServerOptions { oauth: Some(oauth) }))
            .await
            .unwrap();

        assert!(result.auth_url.is_some());
        assert!(!manager.has_mcp_connection(&result.id).await);
    }

    #[tokio::test]
    async fn a_replayed_callback_state_is_rejected() {
        let manager = fresh_manager().await;
        let oauth = OAuthConfig {
            client_id: "client-1".to_string(),
            auth_url: "https://auth.example.com/authorize".to_string(),
            token_url: "https://auth.example.com/token".to_string(),
            redirect_uri: "https://agent.example.com/callback".to_string(),
            scopes: vec![],
        };
        let result = manager
            .add_server("secure", "https://mcp.example.com/rpc", Some(AddServerOptions { oauth: Some(oauth) }))
            .await
            .unwrap();

        let err = manager.handle_callback(&result.id, "some-code", "wrong-state").await.unwrap_err();
        assert!(matches!(err, Error::OAuth(_)));
    }

    #[tokio::test]
    async fn removing_a_server_drops_it_from_memory_and_storage() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#)
            .create_async()
            .await;
        let manager = fresh_manager().await;
        let result = manager.add_server("docs", server.url(), None).await.unwrap();

        manager.remove_server(&result.id).await.unwrap();
        assert!(!manager.has_mcp_connection(&result.id).await);
    }
}
