//! Typed request/response and streaming method dispatch over a connection.

pub mod schema;

pub use schema::{MethodSchema, TypeShape, is_json_safe};

use std::sync::Arc;

use agent_common::{Broadcaster, ConnectionId, Props};
use agent_protocol::frame::{AgentFrame, RpcError, RpcFrameBody};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::task::AbortHandle;
use tracing::{instrument, warn};

/// Context handed to a method implementation for one invocation.
#[derive(Clone)]
pub struct MethodContext {
    pub request_id: String,
    pub method: String,
    pub args: Vec<Value>,
    pub conn: ConnectionId,
    pub props: Option<Props>,
}

/// A unary callable method.
#[async_trait]
pub trait Callable: Send + Sync {
    async fn call(&self, ctx: MethodContext) -> Result<Value, String>;
}

/// A streaming callable method: pushes zero or more chunks through `tx`
/// before returning the final result.
#[async_trait]
pub trait StreamingCallable: Send + Sync {
    async fn call(&self, ctx: MethodContext, tx: tokio::sync::mpsc::UnboundedSender<Value>) -> Result<Value, String>;
}

enum Handler {
    Unary(Arc<dyn Callable>),
    Streaming(Arc<dyn StreamingCallable>),
}

struct MethodDef {
    description: Option<String>,
    schema: Option<MethodSchema>,
    handler: Handler,
}

/// Introspection entry returned by `listMethods()`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MethodInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub streaming: bool,
}

/// The per-instance dispatch table: `name -> {fn, streaming, description}`,
/// populated once at agent construction time (design note 9).
#[derive(Default)]
pub struct MethodRegistry {
    methods: DashMap<String, MethodDef>,
    cancel_handles: DashMap<(ConnectionId, String), AbortHandle>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_unary(
        &self,
        name: impl Into<String>,
        description: Option<String>,
        schema: Option<MethodSchema>,
        handler: Arc<dyn Callable>,
    ) {
        self.methods.insert(
            name.into(),
            MethodDef {
                description,
                schema,
                handler: Handler::Unary(handler),
            },
        );
    }

    pub fn register_streaming(
        &self,
        name: impl Into<String>,
        description: Option<String>,
        schema: Option<MethodSchema>,
        handler: Arc<dyn StreamingCallable>,
    ) {
        self.methods.insert(
            name.into(),
            MethodDef {
                description,
                schema,
                handler: Handler::Streaming(handler),
            },
        );
    }

    /// Methods visible to clients: declared callable and, when a schema is
    /// attached, passing the serializable type filter. A method with no
    /// declared schema is assumed safe (the registrant vouches for it).
    pub fn list_methods(&self) -> Vec<MethodInfo> {
        self.methods
            .iter()
            .filter(|entry| entry.schema.as_ref().is_none_or(MethodSchema::is_json_safe))
            .map(|entry| MethodInfo {
                name: entry.key().clone(),
                description: entry.description.clone(),
                streaming: matches!(entry.handler, Handler::Streaming(_)),
            })
            .collect()
    }

    /// Cancel every in-flight invocation registered for `conn` (called when
    /// its connection closes).
    pub fn cancel_all_for_connection(&self, conn: ConnectionId) {
        let keys: Vec<_> = self
            .cancel_handles
            .iter()
            .filter(|e| e.key().0 == conn)
            .map(|e| e.key().clone())
            .collect();
        for key in keys {
            if let Some((_, handle)) = self.cancel_handles.remove(&key) {
                handle.abort();
            }
        }
    }

    pub fn cancel(&self, conn: ConnectionId, request_id: &str) {
        if let Some((_, handle)) = self.cancel_handles.remove(&(conn, request_id.to_string())) {
            handle.abort();
        }
    }

    /// Dispatch one `rpc{...}` request frame, sending response frame(s)
    /// back over `broadcaster` to `ctx.conn` only. Unknown or
    /// non-callable methods yield a structured `{success:false,
    /// error:{message}}` reply (never a panic).
    #[instrument(skip(self, ctx, broadcaster))]
    pub async fn dispatch(&self, ctx: MethodContext, broadcaster: Arc<dyn Broadcaster>) {
        let request_id = ctx.request_id.clone();
        let conn = ctx.conn;

        let Some(def) = self.methods.get(&ctx.method) else {
            warn!(method = %ctx.method, "rpc dispatch: unknown method");
            let frame = AgentFrame::Rpc(RpcFrameBody::failure(
                request_id,
                RpcError {
                    message: format!("unknown method: {}", ctx.method),
                },
            ));
            broadcaster.send_to(conn, serde_json::to_value(frame).unwrap()).await;
            return;
        };

        match &def.handler {
            Handler::Unary(callable) => {
                let callable = callable.clone();
                let request_id_task = request_id.clone();
                let broadcaster_task = broadcaster.clone();
                let handle = tokio::spawn(async move {
                    let frame = match callable.call(ctx).await {
                        Ok(result) => AgentFrame::Rpc(RpcFrameBody::success(request_id_task.clone(), result)),
                        Err(message) => {
                            AgentFrame::Rpc(RpcFrameBody::failure(request_id_task.clone(), RpcError { message }))
                        }
                    };
                    broadcaster_task
                        .send_to(conn, serde_json::to_value(frame).unwrap())
                        .await;
                });
                self.cancel_handles.insert((conn, request_id), handle.abort_handle());
            }
            Handler::Streaming(callable) => {
                let callable = callable.clone();
                let request_id_task = request_id.clone();
                let broadcaster_task = broadcaster.clone();
                let handle = tokio::spawn(async move {
                    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
                    let forward_id = request_id_task.clone();
                    let forward_broadcaster = broadcaster_task.clone();
                    let forward = tokio::spawn(async move {
                        while let Some(chunk) = rx.recv().await {
                            let frame = AgentFrame::Rpc(RpcFrameBody::chunk(forward_id.clone(), chunk));
                            forward_broadcaster
                                .send_to(conn, serde_json::to_value(frame).unwrap())
                                .await;
                        }
                    });
                    let frame = match callable.call(ctx, tx).await {
                        Ok(result) => AgentFrame::Rpc(RpcFrameBody::done(request_id_task.clone(), result)),
                        Err(message) => {
                            AgentFrame::Rpc(RpcFrameBody::failure(request_id_task.clone(), RpcError { message }))
                        }
                    };
                    let _ = forward.await;
                    broadcaster_task
                        .send_to(conn, serde_json::to_value(frame).unwrap())
                        .await;
                });
                self.cancel_handles.insert((conn, request_id), handle.abort_handle());
            }
        }
    }
}
