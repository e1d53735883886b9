//! The chat part/message shape: `{id, role, parts, metadata?}` with
//! `parts` a tagged union (`text`, `reasoning`, `tool-<name>`, `file`).
//! `tool-<name>` carries the tool's own name in its wire tag, which rules
//! out a plain `#[serde(tag = "type")]` derive — its `Serialize`/
//! `Deserialize` impls are hand-written below.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            // legacy role, renamed to `system` on load (format migration).
            "data" => Some(Role::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolState {
    InputStreaming,
    InputAvailable,
    OutputAvailable,
    OutputError,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text {
        text: String,
    },
    Reasoning {
        text: String,
        state: Option<String>,
    },
    File {
        media_type: String,
        url: String,
        filename: Option<String>,
    },
    Tool {
        tool_name: String,
        tool_call_id: String,
        state: ToolState,
        input: Value,
        output: Option<Value>,
        call_provider_metadata: Option<Value>,
    },
}

impl Part {
    pub fn is_empty_reasoning(&self) -> bool {
        matches!(self, Part::Reasoning { text, .. } if text.trim().is_empty())
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Part::Tool { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }
}

impl Serialize for Part {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        match self {
            Part::Text { text } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "text")?;
                map.serialize_entry("text", text)?;
                map.end()
            }
            Part::Reasoning { text, state } => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("type", "reasoning")?;
                map.serialize_entry("text", text)?;
                if let Some(state) = state {
                    map.serialize_entry("state", state)?;
                }
                map.end()
            }
            Part::File {
                media_type,
                url,
                filename,
            } => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("type", "file")?;
                map.serialize_entry("mediaType", media_type)?;
                map.serialize_entry("url", url)?;
                if let Some(filename) = filename {
                    map.serialize_entry("filename", filename)?;
                }
                map.end()
            }
            Part::Tool {
                tool_name,
                tool_call_id,
                state,
                input,
                output,
                call_provider_metadata,
            } => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("type", &format!("tool-{tool_name}"))?;
                map.serialize_entry("toolCallId", tool_call_id)?;
                map.serialize_entry("state", state)?;
                map.serialize_entry("input", input)?;
                if let Some(output) = output {
                    map.serialize_entry("output", output)?;
                }
                if let Some(meta) = call_provider_metadata {
                    map.serialize_entry("callProviderMetadata", meta)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Part {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error as _;
        let value = Value::deserialize(deserializer)?;
        let ty = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| D::Error::custom("part missing `type`"))?
            .to_string();

        match ty.as_str() {
            "text" => {
                let text = value
                    .get("text")
                    .and_then(Value::as_str)
                    .ok_or_else(|| D::Error::custom("text part missing `text`"))?
                    .to_string();
                Ok(Part::Text { text })
            }
            "reasoning" => {
                let text = value
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let state = value.get("state").and_then(Value::as_str).map(str::to_string);
                Ok(Part::Reasoning { text, state })
            }
            "file" => {
                let media_type = value
                    .get("mediaType")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let url = value
                    .get("url")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let filename = value.get("filename").and_then(Value::as_str).map(str::to_string);
                Ok(Part::File {
                    media_type,
                    url,
                    filename,
                })
            }
            other if other.starts_with("tool-") => {
                let tool_name = other.strip_prefix("tool-").unwrap_or_default().to_string();
                let tool_call_id = value
                    .get("toolCallId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| D::Error::custom("tool part missing toolCallId"))?
                    .to_string();
                let state_raw = value
                    .get("state")
                    .and_then(Value::as_str)
                    .ok_or_else(|| D::Error::custom("tool part missing state"))?;
                let state = match state_raw {
                    "input-streaming" => ToolState::InputStreaming,
                    "input-available" => ToolState::InputAvailable,
                    "output-available" => ToolState::OutputAvailable,
                    "output-error" => ToolState::OutputError,
                    other => return Err(D::Error::custom(format!("unknown tool part state: {other}"))),
                };
                let input = value.get("input").cloned().unwrap_or(Value::Null);
                let output = value.get("output").cloned();
                let call_provider_metadata = value.get("callProviderMetadata").cloned();
                Ok(Part::Tool {
                    tool_name,
                    tool_call_id,
                    state,
                    input,
                    output,
                    call_provider_metadata,
                })
            }
            other => Err(D::Error::custom(format!("unknown part type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Message {
    pub fn text(role: Role, id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            parts: vec![Part::Text { text: text.into() }],
            metadata: None,
        }
    }

    /// Validity per the message log invariants: non-empty unique id
    /// (uniqueness is enforced by the store, not here), `parts` an array,
    /// role one of the three recognized values. Structural validation
    /// failures (not this check) cause the row to be dropped on load.
    pub fn is_structurally_valid(&self) -> bool {
        !self.id.trim().is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_part_round_trips() {
        let part = Part::Text {
            text: "hello".to_string(),
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json, serde_json::json!({"type": "text", "text": "hello"}));
        let back: Part = serde_json::from_value(json).unwrap();
        assert_eq!(back, part);
    }

    #[test]
    fn tool_part_uses_dynamic_type_tag() {
        let part = Part::Tool {
            tool_name: "search".to_string(),
            tool_call_id: "call_1".to_string(),
            state: ToolState::OutputAvailable,
            input: serde_json::json!({"q": "rust"}),
            output: Some(serde_json::json!({"results": []})),
            call_provider_metadata: None,
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "tool-search");
        assert_eq!(json["toolCallId"], "call_1");
        let back: Part = serde_json::from_value(json).unwrap();
        assert_eq!(back, part);
    }

    #[test]
    fn empty_reasoning_part_is_flagged_empty() {
        let part = Part::Reasoning {
            text: "   ".to_string(),
            state: None,
        };
        assert!(part.is_empty_reasoning());
    }

    #[test]
    fn unknown_part_type_fails_to_deserialize() {
        let value = serde_json::json!({"type": "unknown-part"});
        let result: Result<Part, _> = serde_json::from_value(value);
        assert!(result.is_err());
    }

    #[test]
    fn role_data_migrates_to_system() {
        assert_eq!(Role::parse("data"), Some(Role::System));
    }
}
