//! Persistence for `mcp_servers` rows: survives hibernation/restart so
//! `onStart` can rebuild every connection, including pending OAuth ones.

use agent_store::AgentStore;
use sqlx::Row;

use crate::error::Result;
use crate::server::{McpServerRecord, McpServerState, ServerOptions};

fn parse_state(raw: &str) -> McpServerState {
    match raw {
        "authenticating" => McpServerState::Authenticating,
        "connecting" => McpServerState::Connecting,
        "discovering" => McpServerState::Discovering,
        "ready" => McpServerState::Ready,
        "failed" => McpServerState::Failed,
        _ => McpServerState::NotConnected,
    }
}

pub struct McpServerStore {
    store: AgentStore,
}

impl McpServerStore {
    pub fn new(store: AgentStore) -> Self {
        Self { store }
    }

    pub async fn load_all(&self) -> Result<Vec<McpServerRecord>> {
        let rows = sqlx::query("SELECT id, name, server_url, callback_url, client_id, auth_url, server_options, state FROM mcp_servers")
            .fetch_all(self.store.pool())
            .await
            .map_err(agent_store::Error::from)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let options_text: Option<String> = row.try_get("server_options").map_err(agent_store::Error::from)?;
            let options = options_text
                .and_then(|text| serde_json::from_str(&text).ok())
                .unwrap_or_default();
            let state_text: String = row.try_get("state").map_err(agent_store::Error::from)?;
            out.push(McpServerRecord {
                id: row.try_get("id").map_err(agent_store::Error::from)?,
                name: row.try_get("name").map_err(agent_store::Error::from)?,
                server_url: row.try_get("server_url").map_err(agent_store::Error::from)?,
                callback_url: row.try_get("callback_url").map_err(agent_store::Error::from)?,
                client_id: row.try_get("client_id").map_err(agent_store::Error::from)?,
                auth_url: row.try_get("auth_url").map_err(agent_store::Error::from)?,
                state: parse_state(&state_text),
                options,
            });
        }
        Ok(out)
    }

    pub async fn save(&self, record: &McpServerRecord) -> Result<()> {
        let options_text = serde_json::to_string(&record.options)?;
        sqlx::query(
            "INSERT INTO mcp_servers (id, name, server_url, callback_url, client_id, auth_url, server_options, state)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name, server_url = excluded.server_url, callback_url = excluded.callback_url,
                client_id = excluded.client_id, auth_url = excluded.auth_url,
                server_options = excluded.server_options, state = excluded.state",
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.server_url)
        .bind(&record.callback_url)
        .bind(&record.client_id)
        .bind(&record.auth_url)
        .bind(options_text)
        .bind(record.state.as_str())
        .execute(self.store.pool())
        .await
        .map_err(agent_store::Error::from)?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM mcp_servers WHERE id = ?1")
            .bind(id)
            .execute(self.store.pool())
            .await
            .map_err(agent_store::Error::from)?;
        Ok(())
    }

    pub(crate) fn agent_store(&self) -> &AgentStore {
        &self.store
    }
}
