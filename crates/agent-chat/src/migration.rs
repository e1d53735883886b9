//! Legacy message format migration: messages stored before the
//! `parts`-array shape used a string `content`, a top-level `reasoning`
//! field, a `toolInvocations` array, or an array-shaped `content`.

use serde_json::Value;

use crate::message::{Message, Part, Role, ToolState};

fn tool_invocation_state(state: &str) -> ToolState {
    match state {
        "partial-call" => ToolState::InputStreaming,
        "call" => ToolState::InputAvailable,
        "result" => ToolState::OutputAvailable,
        "error" => ToolState::OutputError,
        _ => ToolState::InputAvailable,
    }
}

/// Returns `Some(parts)` if `raw` matches one of the recognized legacy
/// shapes, `None` if it is already in the current `parts`-array shape (or
/// unrecognizable, in which case the caller falls through to normal
/// structural validation and likely drops the row).
pub fn migrate_legacy_parts(raw: &Value) -> Option<Vec<Part>> {
    if raw.get("parts").and_then(Value::as_array).is_some() {
        return None;
    }

    let mut parts = Vec::new();

    match raw.get("content") {
        Some(Value::String(text)) => parts.push(Part::Text { text: text.clone() }),
        Some(Value::Array(blocks)) => {
            for block in blocks {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    parts.push(Part::Text { text: text.to_string() });
                }
            }
        }
        _ => {}
    }

    if let Some(reasoning) = raw.get("reasoning").and_then(Value::as_str) {
        if !reasoning.trim().is_empty() {
            parts.push(Part::Reasoning {
                text: reasoning.to_string(),
                state: None,
            });
        }
    }

    if let Some(invocations) = raw.get("toolInvocations").and_then(Value::as_array) {
        for inv in invocations {
            let tool_name = inv.get("toolName").and_then(Value::as_str).unwrap_or_default().to_string();
            let tool_call_id = inv.get("toolCallId").and_then(Value::as_str).unwrap_or_default().to_string();
            let state_raw = inv.get("state").and_then(Value::as_str).unwrap_or("call");
            parts.push(Part::Tool {
                tool_name,
                tool_call_id,
                state: tool_invocation_state(state_raw),
                input: inv.get("args").cloned().unwrap_or(Value::Null),
                output: inv.get("result").cloned(),
                call_provider_metadata: None,
            });
        }
    }

    if parts.is_empty() && raw.get("content").is_none() && raw.get("reasoning").is_none() && raw.get("toolInvocations").is_none() {
        None
    } else {
        Some(parts)
    }
}

/// Parse a raw JSON row into a `Message`, applying legacy migration and
/// the `data -> system` role rename. Returns `None` when the row fails
/// structural validation (missing id, non-array parts, unrecognized
/// role) — such rows are dropped on load, never surfaced to the agent.
pub fn parse_and_migrate(raw: &Value) -> Option<Message> {
    let id = raw.get("id").and_then(Value::as_str)?.to_string();
    if id.trim().is_empty() {
        return None;
    }

    let role_raw = raw.get("role").and_then(Value::as_str)?;
    let role = Role::parse(role_raw)?;

    let parts = match migrate_legacy_parts(raw) {
        Some(migrated) => migrated,
        None => {
            let parts_value = raw.get("parts")?;
            serde_json::from_value(parts_value.clone()).ok()?
        }
    };

    let metadata = raw.get("metadata").cloned();

    Some(Message {
        id,
        role,
        parts,
        metadata,
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_content_migrates_to_text_part() {
        let raw = serde_json::json!({"id": "m1", "role": "user", "content": "hello"});
        let message = parse_and_migrate(&raw).unwrap();
        assert_eq!(message.parts, vec![Part::Text { text: "hello".to_string() }]);
    }

    #[test]
    fn tool_invocations_migrate_with_state_mapping() {
        let raw = serde_json::json!({
            "id": "m1",
            "role": "assistant",
            "toolInvocations": [
                {"toolName": "search", "toolCallId": "c1", "state": "partial-call", "args": {}},
                {"toolName": "search", "toolCallId": "c2", "state": "result", "args": {}, "result": {"ok": true}},
            ],
        });
        let message = parse_and_migrate(&raw).unwrap();
        assert_eq!(message.parts.len(), 2);
        match &message.parts[0] {
            Part::Tool { state, .. } => assert_eq!(*state, ToolState::InputStreaming),
            _ => panic!("expected tool part"),
        }
        match &message.parts[1] {
            Part::Tool { state, output, .. } => {
                assert_eq!(*state, ToolState::OutputAvailable);
                assert_eq!(output, &Some(serde_json::json!({"ok": true})));
            }
            _ => panic!("expected tool part"),
        }
    }

    #[test]
    fn data_role_renames_to_system() {
        let raw = serde_json::json!({"id": "m1", "role": "data", "content": "x"});
        let message = parse_and_migrate(&raw).unwrap();
        assert_eq!(message.role, Role::System);
    }

    #[test]
    fn missing_id_is_rejected() {
        let raw = serde_json::json!({"role": "user", "content": "x"});
        assert!(parse_and_migrate(&raw).is_none());
    }

    #[test]
    fn unknown_role_is_rejected() {
        let raw = serde_json::json!({"id": "m1", "role": "bogus", "content": "x"});
        assert!(parse_and_migrate(&raw).is_none());
    }

    #[test]
    fn already_current_shape_is_not_migrated() {
        let raw = serde_json::json!({
            "id": "m1",
            "role": "user",
            "parts": [{"type": "text", "text": "hi"}],
        });
        let message = parse_and_migrate(&raw).unwrap();
        assert_eq!(message.parts, vec![Part::Text { text: "hi".to_string() }]);
    }
}
