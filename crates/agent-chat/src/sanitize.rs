//! Byte-accurate sanitization: provider metadata stripping, empty
//! reasoning removal, and the row-size guard (1.8 MB UTF-8 cap per
//! persisted message).

use agent_protocol::MAX_MESSAGE_BYTES;
use serde_json::{Value, json};

use crate::message::{Message, Part, Role, ToolState};

/// Strip provider-specific metadata (`itemId`, `reasoningEncryptedContent`,
/// and any `callProviderMetadata` on tool parts) and drop empty/
/// whitespace-only reasoning parts. Symmetric: whatever is stripped from
/// one sub-object removes that key entirely if it becomes empty.
pub fn sanitize(message: &mut Message) {
    message.parts.retain(|part| !part.is_empty_reasoning());

    for part in &mut message.parts {
        if let Part::Tool {
            call_provider_metadata,
            ..
        } = part
        {
            if let Some(meta) = call_provider_metadata {
                strip_provider_keys(meta);
                if meta.as_object().is_some_and(serde_json::Map::is_empty) {
                    *call_provider_metadata = None;
                }
            }
        }
    }

    if let Some(metadata) = &mut message.metadata {
        strip_provider_keys(metadata);
    }
}

fn strip_provider_keys(value: &mut Value) {
    const PROVIDER_KEYS: &[&str] = &["itemId", "reasoningEncryptedContent"];
    if let Some(obj) = value.as_object_mut() {
        for key in PROVIDER_KEYS {
            obj.remove(*key);
        }
        obj.retain(|_, v| !(v.is_object() && v.as_object().is_some_and(serde_json::Map::is_empty)));
    }
}

fn utf8_len(message: &Message) -> usize {
    serde_json::to_string(message).map(|s| s.len()).unwrap_or(usize::MAX)
}

/// Apply the row-size guard in place. Returns the list of compacted
/// `toolCallId`s (empty if the message was already under the cap).
/// Compaction order: tool outputs first (by position), then text
/// truncation as a last resort. CJK text that exceeds the byte cap but
/// not a character-count cap still gets compacted/truncated — the guard
/// is always byte-based, never character-based.
pub fn enforce_row_size_cap(message: &mut Message) -> Vec<String> {
    let mut compacted = Vec::new();

    if utf8_len(message) <= MAX_MESSAGE_BYTES {
        return compacted;
    }

    for index in 0..message.parts.len() {
        if utf8_len(message) <= MAX_MESSAGE_BYTES {
            break;
        }
        if let Part::Tool {
            tool_call_id,
            state,
            output,
            ..
        } = &mut message.parts[index]
        {
            if *state == ToolState::OutputAvailable && output.is_some() {
                let original_bytes = output
                    .as_ref()
                    .map(|o| serde_json::to_string(o).unwrap_or_default().len())
                    .unwrap_or(0);
                let id = tool_call_id.clone();
                *output = Some(json!({
                    "_compacted": true,
                    "originalBytes": original_bytes,
                }));
                compacted.push(id);
            }
        }
    }

    if utf8_len(message) > MAX_MESSAGE_BYTES {
        for index in 0..message.parts.len() {
            if utf8_len(message) <= MAX_MESSAGE_BYTES {
                break;
            }
            if let Part::Text { text } = &mut message.parts[index] {
                truncate_to_byte_budget(text, 4096);
            }
        }
    }

    if !compacted.is_empty() {
        let metadata = message.metadata.get_or_insert_with(|| json!({}));
        if let Some(obj) = metadata.as_object_mut() {
            obj.insert("compactedToolOutputs".to_string(), json!(compacted));
        }
    }

    compacted
}

/// Truncate `text` to at most `budget` UTF-8 bytes, respecting char
/// boundaries (never splitting inside a multi-byte codepoint — this is
/// what makes the guard correct for CJK-heavy payloads).
fn truncate_to_byte_budget(text: &mut String, budget: usize) {
    if text.len() <= budget {
        return;
    }
    let mut cut = budget;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

/// Applies to non-assistant messages, which typically have no tool parts
/// to compact: go straight to text truncation.
pub fn truncate_non_assistant_message(message: &mut Message) -> bool {
    if message.role == Role::Assistant {
        return false;
    }
    if utf8_len(message) <= MAX_MESSAGE_BYTES {
        return false;
    }
    for part in &mut message.parts {
        if let Part::Text { text } = part {
            truncate_to_byte_budget(text, MAX_MESSAGE_BYTES / 2);
        }
    }
    true
}
