//! Inbound streamable-HTTP MCP transport: `POST /mcp` answers with a
//! single JSON reply or an SSE stream depending on `Accept`; `GET /mcp`
//! opens a standing SSE stream of server-initiated notifications.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::sse::Event;
use axum::response::{IntoResponse, Response, Sse};
use axum::routing::post;
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::dispatch::{DispatchOutcome, McpDispatcher};
use crate::error::{Error, Result};
use crate::session::{Notification, Session, SessionManager};
use crate::types::JsonRpcRequest;

pub const SESSION_ID_HEADER: &str = "mcp-session-id";
const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct McpServerState {
    sessions: Arc<SessionManager>,
    dispatcher: Arc<dyn McpDispatcher>,
}

impl McpServerState {
    pub fn new(dispatcher: Arc<dyn McpDispatcher>) -> Self {
        Self {
            sessions: Arc::new(SessionManager::new()),
            dispatcher,
        }
    }
}

pub fn router(state: McpServerState) -> Router {
    Router::new().route("/mcp", post(handle_post).get(handle_get)).with_state(state)
}

fn accept_contains(headers: &HeaderMap, mime: &str) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.split(',').any(|part| part.trim().starts_with(mime) || part.trim() == "*/*"))
}

fn session_header(headers: &HeaderMap) -> Option<String> {
    headers.get(SESSION_ID_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// Resolve the session for an inbound request: `initialize` on an unknown
/// or absent id allocates a fresh one, everything else requires a session
/// already on file.
fn resolve_session(state: &McpServerState, headers: &HeaderMap, method: &str) -> Result<Arc<Session>> {
    let existing = session_header(headers).and_then(|id| state.sessions.get(&id));
    if let Some(session) = existing {
        return Ok(session);
    }
    if method == "initialize" {
        return Ok(state.sessions.create());
    }
    Err(Error::UnknownSession)
}

async fn handle_post(State(state): State<McpServerState>, headers: HeaderMap, body: axum::body::Bytes) -> Result<Response> {
    if !accept_contains(&headers, "application/json") && !accept_contains(&headers, "text/event-stream") {
        return Err(if headers.get(header::ACCEPT).is_none() { Error::MissingAccept } else { Error::UnacceptableAccept });
    }

    let request: JsonRpcRequest = serde_json::from_slice(&body).map_err(|e| Error::InvalidPayload(e.to_string()))?;
    let session = resolve_session(&state, &headers, &request.method)?;

    let outcome = state
        .dispatcher
        .dispatch(&session.id, &request.method, request.params)
        .await?;

    let wants_stream = accept_contains(&headers, "text/event-stream") && !accept_contains(&headers, "application/json");

    let response = match outcome {
        DispatchOutcome::Json(result) if !wants_stream => {
            let body = crate::types::JsonRpcResponse::success(request.id, result);
            let mut resp = Json(body).into_response();
            resp.headers_mut()
                .insert(SESSION_ID_HEADER, HeaderValue::from_str(&session.id).unwrap_or_else(|_| HeaderValue::from_static("")));
            resp
        }
        DispatchOutcome::Json(result) => {
            let frame = crate::types::JsonRpcResponse::success(request.id, result);
            let content = futures::stream::once(async move { json_event(&frame) });
            sse_response(content, &session.id)
        }
        DispatchOutcome::Stream(rx) => {
            let id = request.id;
            let content = receiver_stream(rx, id);
            sse_response(content, &session.id)
        }
    };
    Ok(response)
}

async fn handle_get(State(state): State<McpServerState>, headers: HeaderMap) -> Result<Response> {
    if !accept_contains(&headers, "text/event-stream") {
        return Err(if headers.get(header::ACCEPT).is_none() { Error::MissingAccept } else { Error::UnacceptableAccept });
    }
    let session_id = session_header(&headers).ok_or(Error::UnknownSession)?;
    let session = state.sessions.get(&session_id).ok_or(Error::UnknownSession)?;

    let content = notification_stream(session.clone());
    Ok(sse_response(content, &session.id))
}

fn json_event(frame: &crate::types::JsonRpcResponse) -> Event {
    Event::default().event("message").data(serde_json::to_string(frame).unwrap_or_default())
}

fn receiver_stream(mut rx: mpsc::UnboundedReceiver<Value>, id: Value) -> impl Stream<Item = Event> + Send + 'static {
    stream! {
        while let Some(value) = rx.recv().await {
            let frame = crate::types::JsonRpcResponse::success(id.clone(), value);
            yield json_event(&frame);
        }
    }
}

fn notification_stream(session: Arc<Session>) -> impl Stream<Item = Event> + Send + 'static {
    stream! {
        let mut rx = session.subscribe();
        loop {
            match rx.recv().await {
                Ok(Notification(value)) => {
                    yield Event::default().event("message").data(serde_json::to_string(&value).unwrap_or_default());
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

/// Interleaves `content` with a 30-second `event: ping` keepalive; the
/// interval is dropped (and so, cleared) the moment `content` ends or the
/// client disconnects and this future is dropped.
fn with_keepalive(mut content: impl Stream<Item = Event> + Unpin + Send + 'static) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    stream! {
        let mut ticker = tokio::time::interval(PING_INTERVAL);
        ticker.tick().await;
        loop {
            tokio::select! {
                next = content.next() => {
                    match next {
                        Some(event) => yield Ok(event),
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    yield Ok(Event::default().event("ping").data(""));
                }
            }
        }
    }
}

fn sse_response(content: impl Stream<Item = Event> + Send + 'static, session_id: &str) -> Response {
    let content = Box::pin(content);
    let sse = Sse::new(with_keepalive(content));
    let mut resp = sse.into_response();
    resp.headers_mut()
        .insert(SESSION_ID_HEADER, HeaderValue::from_str(session_id).unwrap_or_else(|_| HeaderValue::from_static("")));
    resp
}
