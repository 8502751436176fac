//! Deterministic tools for exercising the streaming pipeline end to end.
//!
//! They echo, render JSON, sleep, fail on demand and report the injected
//! session id, which is everything a client needs to check how tool
//! lifecycle events are rendered.

use agentwire_core::error::ToolError;
use agentwire_core::tool::{Tool, required_str};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;

/// Longest sleep `test_delay` will honour.
const MAX_DELAY_SECS: f64 = 30.0;

pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "test_echo"
    }
    fn description(&self) -> &str {
        "Echo the given text back unchanged."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }
    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        Ok(json!(required_str(&arguments, "text")?))
    }
}

pub struct JsonRenderTool;

#[async_trait]
impl Tool for JsonRenderTool {
    fn name(&self) -> &str {
        "test_json_render"
    }
    fn description(&self) -> &str {
        "Return a structured JSON object built from a title, content and optional metadata."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "content": { "type": "string" },
                "meta": { "type": "object" }
            },
            "required": ["title", "content"]
        })
    }
    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let title = required_str(&arguments, "title")?;
        let content = required_str(&arguments, "content")?;
        let meta = match arguments.get("meta") {
            None | Some(Value::Null) => json!({}),
            Some(meta @ Value::Object(_)) => meta.clone(),
            Some(_) => return Err(ToolError::InvalidInput("'meta' must be an object".into())),
        };
        Ok(json!({ "title": title, "content": content, "meta": meta }))
    }
}

pub struct DelayTool;

#[async_trait]
impl Tool for DelayTool {
    fn name(&self) -> &str {
        "test_delay"
    }
    fn description(&self) -> &str {
        "Sleep for the given number of seconds, then report completion."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "seconds": { "type": "number", "minimum": 0 } },
            "required": ["seconds"]
        })
    }
    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let seconds = arguments["seconds"]
            .as_f64()
            .filter(|s| (0.0..=MAX_DELAY_SECS).contains(s))
            .ok_or_else(|| ToolError::InvalidInput(format!("'seconds' must be a number in 0..={MAX_DELAY_SECS}")))?;
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        Ok(json!(format!("delayed:{seconds}")))
    }
}

pub struct ErrorTool;

#[async_trait]
impl Tool for ErrorTool {
    fn name(&self) -> &str {
        "test_error"
    }
    fn description(&self) -> &str {
        "Always fail with the given message."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "message": { "type": "string" } },
            "required": ["message"]
        })
    }
    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let message = arguments["message"].as_str().unwrap_or("test_error triggered");
        Err(ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: message.into(),
        })
    }
}

/// Reports the session it was invoked under.
pub struct SessionTool;

#[async_trait]
impl Tool for SessionTool {
    fn name(&self) -> &str {
        "test_session"
    }
    fn description(&self) -> &str {
        "Report the current session id, with an optional note."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "note": { "type": "string" } }
        })
    }
    fn accepts_session_id(&self) -> bool {
        true
    }
    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        Ok(json!({
            "session_id": arguments.get("session_id").cloned().unwrap_or(Value::Null),
            "note": arguments.get("note").cloned().unwrap_or(Value::Null),
        }))
    }
}
