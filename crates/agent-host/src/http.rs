//! The axum router: `/agents/<agent-type>/<instance-name>[/suffix]`
//! (WS upgrade or plain HTTP), the per-instance hosted MCP server mounted
//! under the same prefix, and the MCP OAuth callback landing page.

use std::sync::Arc;

use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Redirect};
use axum::routing::{any, get};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use tower::util::ServiceExt;
use tracing::warn;

use crate::registry::InstanceRegistry;
use crate::ws;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<InstanceRegistry>,
}

pub fn router(registry: Arc<InstanceRegistry>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/callback/{server_id}", get(oauth_callback_handler))
        .route("/agents/{*rest}", any(agents_entry))
        .with_state(AppState { registry })
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
}

/// `GET /callback/<serverId>?code&state`: exchanges the OAuth code for
/// tokens on behalf of whichever instance owns that MCP server connection.
/// This host has no fixed success/error redirect configured per server, so
/// it reports completion directly rather than bouncing through a browser
/// redirect a caller never configured.
async fn oauth_callback_handler(Path(server_id): Path<String>, Query(query): Query<CallbackQuery>, State(state): State<AppState>) -> impl IntoResponse {
    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return (StatusCode::BAD_REQUEST, "missing code or state").into_response();
    };

    for instance in state.registry.live_instances() {
        match instance.mcp.handle_callback(&server_id, &code, &oauth_state).await {
            Ok(()) => return Redirect::to("/").into_response(),
            Err(agent_mcp_client::Error::NotFound(_)) => continue,
            Err(err) => {
                warn!(%err, server_id, "oauth callback failed");
                return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
            }
        }
    }
    (StatusCode::NOT_FOUND, "unknown mcp server").into_response()
}

/// Dispatches one `/agents/...` request: a WebSocket upgrade is handed to
/// the connection lifecycle; everything else (including a path ending in
/// `/mcp`) is routed to that instance's own hosted MCP server via
/// `tower::ServiceExt::oneshot`, mirroring the `oneshot`-over-`Router`
/// pattern the hosted MCP server's own tests use. The instance-scoped
/// prefix is stripped from the forwarded request's URI so the inner
/// router sees the plain `/mcp` path it declares.
async fn agents_entry(ws: Option<WebSocketUpgrade>, State(state): State<AppState>, mut request: axum::extract::Request) -> impl IntoResponse {
    let path = request.uri().path().to_string();
    let (instance, suffix) = match state.registry.route(&path).await {
        Some(Ok(resolved)) => resolved,
        Some(Err(crate::error::Error::UnknownAgentType(_))) => return (StatusCode::NOT_FOUND, "unknown agent type").into_response(),
        Some(Err(err)) => return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
        None => return (StatusCode::NOT_FOUND, "not found").into_response(),
    };

    if let Some(ws) = ws {
        let upgraded = instance.clone();
        return ws.on_upgrade(move |socket| ws::handle_connection(socket, upgraded, None)).into_response();
    }

    let forwarded_path = format!("/{}", suffix.unwrap_or_default());
    let mut parts = request.uri().clone().into_parts();
    parts.path_and_query = Some(forwarded_path.parse().unwrap_or_else(|_| "/".parse().unwrap()));
    *request.uri_mut() = axum::http::Uri::from_parts(parts).unwrap_or_else(|_| "/".parse().unwrap());

    match instance.mcp_server.clone().oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(err) => match err {},
    }
}
