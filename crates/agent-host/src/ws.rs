//! One WebSocket connection's lifecycle: handshake, frame dispatch
//! (protocol-reserved types handled internally, everything else handed to
//! `ConnectionHooks::on_message`), and cleanup on close.

use std::sync::Arc;

use agent_chat::ToolResult;
use agent_common::{Broadcaster, Props};
use agent_protocol::{ErrorShape, frame::AgentFrame};
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::instance::AgentInstance;

pub async fn handle_connection(socket: WebSocket, instance: Arc<AgentInstance>, props: Option<Props>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<serde_json::Value>();

    let conn = instance.connections.register(props.clone(), tx);
    instance.hooks.on_connect(conn, props).await;

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = serde_json::to_string(&frame).unwrap_or_default();
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    instance
        .connections
        .send_to(conn, serde_json::json!({"type": "connected", "name": instance.key.name, "agent": instance.key.namespace}))
        .await;

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                instance.hooks.on_error(conn, &agent_common::Error::internal(err.to_string())).await;
                break;
            }
        };
        match message {
            Message::Text(text) => dispatch_frame(&instance, conn, &text).await,
            Message::Close(_) => break,
            _ => {}
        }
    }

    instance.methods.cancel_all_for_connection(conn);
    instance.connections.mark_closed(conn);
    instance.connections.remove(conn);
    instance.hooks.on_close(conn, 1000, "closed".to_string(), true).await;
    send_task.abort();
}

async fn dispatch_frame(instance: &Arc<AgentInstance>, conn: agent_common::ConnectionId, text: &str) {
    let raw: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            debug!(%err, "dropping malformed frame");
            return;
        }
    };

    let frame: Result<AgentFrame, _> = serde_json::from_value(raw.clone());
    let Ok(frame) = frame else {
        // Not one of the protocol-reserved shapes: pass through as-is.
        instance.hooks.on_message(conn, raw).await;
        return;
    };

    match frame {
        AgentFrame::State { state } | AgentFrame::Update { state } => {
            if let Err(err) = instance.state.handle_client_update(state, conn).await {
                let frame = AgentFrame::Error { error: ErrorShape::from(&err) };
                instance.connections.send_to(conn, serde_json::to_value(frame).unwrap_or_default()).await;
            }
        }
        AgentFrame::Rpc(body) => {
            if let (Some(method), Some(args)) = (body.method, body.args) {
                let ctx = agent_rpc::MethodContext {
                    request_id: body.id,
                    method,
                    args,
                    conn,
                    props: instance.connections.props(conn),
                };
                instance.methods.dispatch(ctx, instance.broadcaster()).await;
            }
        }
        AgentFrame::ChatRequest { id, init } => {
            if let Err(err) = instance.chat.handle_chat_request(conn, id, init.body).await {
                warn!(%err, "chat-request failed");
            }
        }
        AgentFrame::ChatCancel { id } => instance.chat.handle_chat_cancel(&id),
        AgentFrame::ChatClear => {
            if let Err(err) = instance.chat.handle_chat_clear(conn).await {
                warn!(%err, "chat-clear failed");
            }
        }
        AgentFrame::ChatMessages { messages } => {
            if let Err(err) = instance.chat.handle_chat_messages(messages).await {
                warn!(%err, "chat-messages failed");
            }
        }
        AgentFrame::ToolResult {
            tool_call_id,
            tool_name,
            output,
            auto_continue,
            client_tools,
        } => {
            let result = ToolResult {
                tool_call_id,
                tool_name,
                output,
                auto_continue: auto_continue.unwrap_or(false),
                client_tools,
            };
            if let Err(err) = instance.chat.handle_tool_result(conn, result).await {
                warn!(%err, "tool-result handling failed");
            }
        }
        other => {
            // `connected`, `identity`, `stream-resuming`, `stream-ack` are
            // server->client only (or handled inside the stream manager);
            // an inbound one of these is unexpected but not dispatched.
            debug!(?other, "ignoring server-originated frame type from client");
        }
    }
}
