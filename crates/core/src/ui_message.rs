//! Client-facing structured messages.
//!
//! A [`StructuredMessage`] is what the gateway streams to clients: an
//! assistant message made of ordered parts. Text parts carry the full
//! cumulative text of a response (not a delta). Tool parts describe one tool
//! invocation at one point of its lifecycle and go on the wire with a
//! `tool-<name>` type tag.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Streaming state of a text part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextState {
    Streaming,
    Done,
}

/// Lifecycle state of a tool invocation.
///
/// States only move forward; `OutputAvailable` and `OutputError` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolState {
    InputStreaming,
    InputAvailable,
    ApprovalRequested,
    OutputAvailable,
    OutputError,
}

impl ToolState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::OutputAvailable | Self::OutputError)
    }

    /// Position in the lifecycle. Terminal states share the last rank.
    pub fn rank(self) -> u8 {
        match self {
            Self::InputStreaming => 0,
            Self::InputAvailable => 1,
            Self::ApprovalRequested => 2,
            Self::OutputAvailable | Self::OutputError => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InputStreaming => "input-streaming",
            Self::InputAvailable => "input-available",
            Self::ApprovalRequested => "approval-requested",
            Self::OutputAvailable => "output-available",
            Self::OutputError => "output-error",
        }
    }
}

impl std::fmt::Display for ToolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextPart {
    pub text: String,
    pub state: TextState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolPart {
    pub tool_call_id: String,
    /// Tool name; serialized as the `tool-<name>` type tag.
    pub tool_name: String,
    pub state: ToolState,
    pub input: Value,
    pub output: Option<Value>,
    pub error_text: Option<String>,
}

/// One ordered element of a [`StructuredMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WirePart", into = "WirePart")]
pub enum Part {
    Text(TextPart),
    Tool(ToolPart),
}

const TOOL_TYPE_PREFIX: &str = "tool-";

/// Flat wire shape shared by every part kind.
#[derive(Serialize, Deserialize)]
struct WirePart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "toolCallId", default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    state: String,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    input: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    output: Option<Value>,
    #[serde(rename = "errorText", default, skip_serializing_if = "Option::is_none")]
    error_text: Option<String>,
}

/// Keeps an explicit JSON `null` as `Some(Value::Null)`; a missing key stays `None`.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

fn parse_state<T: for<'de> Deserialize<'de>>(state: &str) -> Result<T, String> {
    serde_json::from_value(Value::String(state.to_string())).map_err(|_| format!("unknown part state '{state}'"))
}

impl TryFrom<WirePart> for Part {
    type Error = String;

    fn try_from(wire: WirePart) -> Result<Self, Self::Error> {
        if wire.kind == "text" {
            return Ok(Part::Text(TextPart {
                text: wire.text.unwrap_or_default(),
                state: parse_state(&wire.state)?,
            }));
        }
        let Some(tool_name) = wire.kind.strip_prefix(TOOL_TYPE_PREFIX) else {
            return Err(format!("unknown part type '{}'", wire.kind));
        };
        Ok(Part::Tool(ToolPart {
            tool_call_id: wire.tool_call_id.ok_or("tool part without toolCallId")?,
            tool_name: tool_name.to_string(),
            state: parse_state(&wire.state)?,
            input: wire.input.unwrap_or(Value::Null),
            output: wire.output,
            error_text: wire.error_text,
        }))
    }
}

impl From<Part> for WirePart {
    fn from(part: Part) -> Self {
        match part {
            Part::Text(TextPart { text, state }) => WirePart {
                kind: "text".into(),
                text: Some(text),
                tool_call_id: None,
                state: match state {
                    TextState::Streaming => "streaming".into(),
                    TextState::Done => "done".into(),
                },
                input: None,
                output: None,
                error_text: None,
            },
            Part::Tool(tool) => WirePart {
                kind: format!("{TOOL_TYPE_PREFIX}{}", tool.tool_name),
                text: None,
                tool_call_id: Some(tool.tool_call_id),
                state: tool.state.as_str().into(),
                input: Some(tool.input),
                output: tool.output,
                error_text: tool.error_text,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiRole {
    System,
    User,
    #[default]
    Assistant,
}

/// A message in the client-facing stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredMessage {
    /// Stable across all streaming revisions of one response.
    pub id: String,
    pub role: UiRole,
    pub parts: Vec<Part>,
}

impl StructuredMessage {
    /// An assistant message with a single text part.
    pub fn text(id: impl Into<String>, text: impl Into<String>, state: TextState) -> Self {
        Self {
            id: id.into(),
            role: UiRole::Assistant,
            parts: vec![Part::Text(TextPart {
                text: text.into(),
                state,
            })],
        }
    }

    /// An assistant message with a single tool part, under a fresh id.
    pub fn tool(part: ToolPart) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: UiRole::Assistant,
            parts: vec![Part::Tool(part)],
        }
    }

    /// Concatenated text of all text parts, or `None` when there are none.
    pub fn text_content(&self) -> Option<String> {
        let mut texts = self.parts.iter().filter_map(|part| match part {
            Part::Text(t) => Some(t.text.as_str()),
            Part::Tool(_) => None,
        });
        let first = texts.next()?;
        Some(texts.fold(first.to_string(), |mut acc, t| {
            acc.push_str(t);
            acc
        }))
    }

    pub fn tool_parts(&self) -> impl Iterator<Item = &ToolPart> {
        self.parts.iter().filter_map(|part| match part {
            Part::Tool(t) => Some(t),
            Part::Text(_) => None,
        })
    }

    /// Interpret an arbitrary JSON value as a structured message.
    ///
    /// Returns `None` unless the value is an object with a string `id`, a
    /// string `role` and a `parts` array that all decode.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let shaped = obj.get("id").is_some_and(Value::is_string)
            && obj.get("role").is_some_and(Value::is_string)
            && obj.get("parts").is_some_and(Value::is_array);
        if !shaped {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}
