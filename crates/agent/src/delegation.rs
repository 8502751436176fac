//! Sub-agent delegation.
//!
//! [`SubAgentTool`] exposes a set of independently configured reasoning loops
//! to a parent loop as one tool, `subAgentCall`. The nested run completes
//! before the tool returns; only its lifecycle events (not its partial text)
//! reach the parent's stream.

use crate::lifecycle::{EventSink, ToolCallRecord};
use agentwire_core::agent::{OutputSender, ReasoningLoop};
use agentwire_core::error::ToolError;
use agentwire_core::tool::{Tool, required_str};
use agentwire_core::ui_message::{Part, StructuredMessage, TextState, ToolState};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const SUB_AGENT_TOOL_NAME: &str = "subAgentCall";

/// Named reasoning loops available for delegation.
#[derive(Clone, Default)]
pub struct SubAgentRegistry {
    agents: BTreeMap<String, Arc<dyn ReasoningLoop>>,
}

impl SubAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, agent: Arc<dyn ReasoningLoop>) {
        self.agents.insert(name.into(), agent);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ReasoningLoop>> {
        self.agents.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

pub struct SubAgentTool {
    agents: SubAgentRegistry,
    description: String,
    sink: EventSink,
}

impl SubAgentTool {
    pub fn new(agents: SubAgentRegistry) -> Self {
        let description = format!(
            "Delegate a task to a named sub-agent and return its answer. Available sub-agents: {}.",
            agents.names().join(", ")
        );
        Self {
            agents,
            description,
            sink: EventSink::new(),
        }
    }

    pub fn attach_sink(&self, sender: OutputSender) {
        self.sink.attach(sender);
    }

    /// Run sub-agent `name` on `message` and return its answer as text.
    ///
    /// An unknown name is not an error: the returned text says so and an
    /// `output-error` event is reported. A failed nested run is returned as
    /// [`ToolError::SubAgent`] after its `output-error` event.
    pub async fn delegate(&self, name: &str, message: &str, description: &str) -> Result<String, ToolError> {
        let description = if description.trim().is_empty() {
            format!("Call sub-agent {name}")
        } else {
            description.to_string()
        };
        let mut record = ToolCallRecord::new(
            SUB_AGENT_TOOL_NAME,
            json!({ "name": name, "message": message, "description": description }),
        );

        let Some(agent) = self.agents.get(name) else {
            let text = format!("Unknown sub-agent: {name}");
            warn!(sub_agent = name, "Delegation to unknown sub-agent");
            self.sink.report(&mut record, ToolState::OutputError, None, Some(text.clone()));
            return Ok(text);
        };

        self.sink.report(&mut record, ToolState::InputAvailable, None, None);
        info!(sub_agent = name, call_id = %record.call_id, "Delegating to sub-agent");

        agent.handle().output().clear();
        let result = match agent.run(message).await {
            Ok(result) => result,
            Err(e) => {
                let reason = e.to_string();
                warn!(sub_agent = name, error = %reason, "Sub-agent run failed");
                self.sink
                    .report(&mut record, ToolState::OutputError, None, Some(reason.clone()));
                return Err(ToolError::SubAgent {
                    name: name.to_string(),
                    reason,
                });
            }
        };

        let answer = coerce_structured_message(result);
        let payload = serde_json::to_value(&answer).unwrap_or_default();
        self.sink
            .report(&mut record, ToolState::OutputAvailable, Some(payload), None);
        Ok(extract_text(&answer))
    }
}

#[async_trait]
impl Tool for SubAgentTool {
    fn name(&self) -> &str {
        SUB_AGENT_TOOL_NAME
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Sub-agent to call",
                    "enum": self.agents.names(),
                },
                "message": { "type": "string", "description": "Task or question for the sub-agent" },
                "description": { "type": "string", "description": "Short label shown to the user" }
            },
            "required": ["name", "message", "description"]
        })
    }

    fn skip_call_wrap(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let name = required_str(&arguments, "name")?;
        let message = required_str(&arguments, "message")?;
        let description = arguments["description"].as_str().unwrap_or_default();
        self.delegate(name, message, description).await.map(Value::String)
    }
}

/// Interpret a loop result as a structured message.
///
/// Message-shaped values (or strings holding one) pass through; anything else
/// becomes a single finished text part.
pub fn coerce_structured_message(result: Option<Value>) -> StructuredMessage {
    let text = match result {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => {
            if let Some(message) = serde_json::from_str::<Value>(&s)
                .ok()
                .and_then(|v| StructuredMessage::from_value(&v))
            {
                return message;
            }
            s
        }
        Some(other) => {
            if let Some(message) = StructuredMessage::from_value(&other) {
                return message;
            }
            other.to_string()
        }
    };
    StructuredMessage::text(Uuid::new_v4().to_string(), text, TextState::Done)
}

/// Trimmed concatenation of the message's text parts, or the serialized
/// message when it has no text.
pub fn extract_text(message: &StructuredMessage) -> String {
    let text: String = message
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::Text(t) => Some(t.text.as_str()),
            Part::Tool(_) => None,
        })
        .collect();
    let text = text.trim();
    if text.is_empty() {
        return serde_json::to_string(message).unwrap_or_default();
    }
    text.to_string()
}
