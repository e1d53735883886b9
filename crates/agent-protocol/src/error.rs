use agent_common::ErrorKind;
use serde::{Deserialize, Serialize};

/// The shape of an error reported back to a client, whether inside an RPC
/// failure, a chat-response `done` frame, or a bare error frame. Only
/// `message` is guaranteed present on the wire; `kind` is attached when the
/// originating error carries one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorShape {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ErrorShape {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
        }
    }

    pub fn with_kind(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind: Some(format!("{kind:?}")),
        }
    }
}

impl From<&agent_common::Error> for ErrorShape {
    fn from(err: &agent_common::Error) -> Self {
        ErrorShape::with_kind(err.client_message(), err.kind())
    }
}
