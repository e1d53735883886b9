use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorShape;

/// Every frame type named in the external interfaces section, tagged by
/// `type` exactly as it appears on the wire. Frames not listed here (an
/// unrecognized `type`) are rejected before reaching user code — the
/// connection manager suppresses dispatch of protocol-reserved types and
/// passes anything else through to `onMessage` as a raw value instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentFrame {
    /// Server -> client, sent once immediately on connect.
    #[serde(rename = "connected")]
    Connected { name: String, agent: String },

    /// Both directions: client proposal or server-authoritative update.
    #[serde(rename = "state")]
    State { state: Value },

    /// Client -> server: alias for a proposed state replacement.
    #[serde(rename = "update")]
    Update { state: Value },

    /// Both directions, with body interpreted by field presence: a
    /// request carries `method`/`args`; a unary success carries
    /// `success: true` + `result`; a streaming chunk carries `chunk`; a
    /// streaming completion carries `done: true` + `result`; a failure
    /// carries `success: false` + `error`.
    #[serde(rename = "rpc")]
    Rpc(RpcFrameBody),

    #[serde(rename = "chat-request")]
    ChatRequest { id: String, init: ChatRequestInit },

    #[serde(rename = "chat-response")]
    ChatResponse {
        id: String,
        #[serde(flatten)]
        body: ChatResponseBody,
    },

    #[serde(rename = "chat-cancel")]
    ChatCancel { id: String },

    #[serde(rename = "chat-clear")]
    ChatClear,

    #[serde(rename = "chat-messages")]
    ChatMessages { messages: Vec<Value> },

    #[serde(rename = "tool-result")]
    ToolResult {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        output: Value,
        #[serde(rename = "autoContinue", default, skip_serializing_if = "Option::is_none")]
        auto_continue: Option<bool>,
        #[serde(rename = "clientTools", default, skip_serializing_if = "Option::is_none")]
        client_tools: Option<Vec<Value>>,
    },

    #[serde(rename = "stream-resuming")]
    StreamResuming {
        #[serde(rename = "streamId")]
        stream_id: String,
        #[serde(rename = "requestId")]
        request_id: String,
    },

    #[serde(rename = "stream-ack")]
    StreamAck {
        #[serde(rename = "streamId")]
        stream_id: String,
        #[serde(rename = "lastSeq")]
        last_seq: u64,
    },

    /// Server -> client, sent after a `basePath`-routed connect so the
    /// client learns the effective instance name it was routed to.
    #[serde(rename = "identity")]
    Identity { name: String, agent: String },

    /// Server -> client: reports a failure that isn't scoped to a
    /// particular RPC or chat request, e.g. a rejected state proposal.
    #[serde(rename = "error")]
    Error { error: ErrorShape },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RpcFrameBody {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcFrameBody {
    pub fn request(id: impl Into<String>, method: impl Into<String>, args: Vec<Value>, stream: bool) -> Self {
        Self {
            id: id.into(),
            method: Some(method.into()),
            args: Some(args),
            stream: if stream { Some(true) } else { None },
            ..Default::default()
        }
    }

    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            success: Some(true),
            result: Some(result),
            ..Default::default()
        }
    }

    pub fn chunk(id: impl Into<String>, chunk: Value) -> Self {
        Self {
            id: id.into(),
            chunk: Some(chunk),
            ..Default::default()
        }
    }

    pub fn done(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            done: Some(true),
            result: Some(result),
            ..Default::default()
        }
    }

    pub fn failure(id: impl Into<String>, error: RpcError) -> Self {
        Self {
            id: id.into(),
            success: Some(false),
            error: Some(error),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequestInit {
    pub method: String,
    pub body: Value,
}

/// `chat-response{id, frame}` while streaming, `chat-response{id, done:
/// true}` (with an optional `error`) on completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponseBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ChatResponseBody {
    pub fn frame(frame: Value) -> Self {
        Self {
            frame: Some(frame),
            done: None,
            error: None,
        }
    }

    pub fn finished(error: Option<ErrorShape>) -> Self {
        Self {
            frame: None,
            done: Some(true),
            error,
        }
    }
}

/// A single buffered stream chunk as stored in `stream_chunks`: the raw
/// `chat-response` frame body plus its sequence number within the active
/// stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamFrameEnvelope {
    pub seq: u64,
    pub body: Value,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_frame_round_trips() {
        let frame = AgentFrame::State {
            state: serde_json::json!({"n": 1}),
        };
        let text = serde_json::to_string(&frame).unwrap();
        assert_eq!(text, r#"{"type":"state","state":{"n":1}}"#);
        let back: AgentFrame = serde_json::from_str(&text).unwrap();
        match back {
            AgentFrame::State { state } => assert_eq!(state, serde_json::json!({"n": 1})),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn rpc_request_matches_wire_shape_from_scenario() {
        let frame = AgentFrame::Rpc(RpcFrameBody::request(
            "1",
            "add",
            vec![serde_json::json!(2), serde_json::json!(3)],
            false,
        ));
        let text = serde_json::to_string(&frame).unwrap();
        assert_eq!(text, r#"{"type":"rpc","id":"1","method":"add","args":[2,3]}"#);
    }

    #[test]
    fn rpc_success_matches_scenario_2() {
        let frame = AgentFrame::Rpc(RpcFrameBody::success("1", serde_json::json!(5)));
        let text = serde_json::to_string(&frame).unwrap();
        assert_eq!(text, r#"{"type":"rpc","id":"1","success":true,"result":5}"#);
    }

    #[test]
    fn rpc_failure_matches_scenario_3() {
        let frame = AgentFrame::Rpc(RpcFrameBody::failure(
            "2",
            RpcError {
                message: "boom".to_string(),
            },
        ));
        let text = serde_json::to_string(&frame).unwrap();
        assert_eq!(
            text,
            r#"{"type":"rpc","id":"2","success":false,"error":{"message":"boom"}}"#
        );
    }

    #[test]
    fn error_frame_matches_the_bare_error_wire_shape() {
        let frame = AgentFrame::Error { error: ErrorShape::with_kind("state update rejected", agent_common::ErrorKind::Conflict) };
        let text = serde_json::to_string(&frame).unwrap();
        assert_eq!(text, r#"{"type":"error","error":{"message":"state update rejected","kind":"Conflict"}}"#);
    }

    #[test]
    fn unknown_type_fails_to_deserialize() {
        let result: Result<AgentFrame, _> = serde_json::from_str(r#"{"type":"bogus"}"#);
        assert!(result.is_err());
    }
}
