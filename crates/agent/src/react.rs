//! ReAct loop: Thought → Action → Observation over a streaming provider.
//!
//! Each step streams one model turn. Text deltas go straight to the loop's
//! output queue; tool calls are executed in order and their results fed back
//! as observations. The loop ends on the first turn without tool calls, or
//! when the step limit is reached.

use agentwire_core::agent::{LoopHandle, OutputSender, ReasoningLoop};
use agentwire_core::error::{Error, ProviderError, Result};
use agentwire_core::message::{Message, MessageToolCall};
use agentwire_core::provider::{Provider, ProviderRequest};
use agentwire_core::tool::{Tool, ToolCall, ToolRegistry};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Inserted between the streamed text of two consecutive steps.
const STEP_SEPARATOR: &str = "\n\n";

pub struct ReactLoop {
    name: String,
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_steps: usize,
    system_prompt: Option<String>,
    history: Vec<Message>,
    tools: ToolRegistry,
    handle: LoopHandle,
}

/// What one streamed model turn produced.
#[derive(Debug, Default)]
struct StepOutput {
    content: String,
    tool_calls: Vec<MessageToolCall>,
}

impl ReactLoop {
    pub fn new(name: impl Into<String>, provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            max_steps: 8,
            system_prompt: None,
            history: Vec::new(),
            tools: ToolRegistry::new(),
            handle: LoopHandle::new(),
        }
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        for tool in tools {
            self.tools.register(tool);
        }
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the step limit. Zero is treated as one.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Prior conversation turns, placed between the system prompt and the request.
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_handle(mut self, handle: LoopHandle) -> Self {
        self.handle = handle;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    fn initial_messages(&self, request: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(prompt));
        }
        messages.extend(self.history.iter().cloned());
        messages.push(Message::user(request));
        messages
    }

    /// Stream one model turn, forwarding text deltas as they arrive.
    ///
    /// `separate` asks for [`STEP_SEPARATOR`] ahead of the first delta.
    async fn stream_step(&self, messages: &[Message], sender: &OutputSender, separate: bool) -> Result<StepOutput> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: self.tools.definitions(),
            stream: true,
        };
        let mut rx = self.provider.stream(request).await?;

        let mut step = StepOutput::default();
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(delta) = chunk.content.filter(|d| !d.is_empty()) {
                if step.content.is_empty() && separate {
                    sender.send_delta(STEP_SEPARATOR);
                }
                sender.send_delta(delta.as_str());
                step.content.push_str(&delta);
            }
            merge_tool_calls(&mut step.tool_calls, chunk.tool_calls);
            if chunk.done {
                break;
            }
        }
        Ok(step)
    }

    async fn observe(&self, call: &MessageToolCall) -> String {
        let arguments = if call.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str::<Value>(&call.arguments) {
                Ok(arguments) => arguments,
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Model sent malformed tool arguments");
                    return format!("Error: invalid JSON arguments for {}: {e}", call.name);
                }
            }
        };
        let call = ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments,
        };
        match self.tools.execute(&call).await {
            Ok(Value::String(text)) => text,
            Ok(value) => value.to_string(),
            Err(e) => format!("Error: {e}"),
        }
    }
}

/// Extend `transcript` the same way the step's deltas extended the stream.
fn append_step_text(transcript: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !transcript.is_empty() {
        transcript.push_str(STEP_SEPARATOR);
    }
    transcript.push_str(text);
}

/// Fold streamed tool calls into `acc`, merging entries that share an id.
///
/// Calls without an id get a generated one.
fn merge_tool_calls(acc: &mut Vec<MessageToolCall>, incoming: Vec<MessageToolCall>) {
    for mut call in incoming {
        if call.id.is_empty() {
            call.id = format!("call_{}", Uuid::new_v4().simple());
        }
        match acc.iter_mut().find(|c| c.id == call.id) {
            Some(existing) => {
                if !call.name.is_empty() {
                    existing.name = call.name;
                }
                existing.arguments.push_str(&call.arguments);
            }
            None => acc.push(call),
        }
    }
}

#[async_trait]
impl ReasoningLoop for ReactLoop {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self) -> &LoopHandle {
        &self.handle
    }

    async fn run(&self, request: &str) -> Result<Option<Value>> {
        let sender = self.handle.sender();
        let cancel = self.handle.cancellation().clone();
        let mut messages = self.initial_messages(request);
        // Everything sent as deltas so far, separators included
        let mut transcript = String::new();

        info!(agent = %self.name, model = %self.model, max_steps = self.max_steps, "ReAct loop starting");

        for step_no in 1..=self.max_steps {
            let timeout = self.handle.step_timeout();
            debug!(agent = %self.name, step = step_no, "ReAct step");

            let step = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                step = tokio::time::timeout(timeout, self.stream_step(&messages, &sender, !transcript.is_empty())) => {
                    step.map_err(|_| ProviderError::Timeout(format!("step exceeded {}s", timeout.as_secs())))??
                }
            };
            append_step_text(&mut transcript, &step.content);

            if step.tool_calls.is_empty() {
                info!(agent = %self.name, steps = step_no, "ReAct loop completed");
                return Ok(Some(Value::String(transcript)));
            }

            let mut assistant = Message::assistant(step.content);
            assistant.tool_calls = step.tool_calls.clone();
            messages.push(assistant);

            for call in &step.tool_calls {
                let observation = tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    observation = self.observe(call) => observation,
                };
                debug!(agent = %self.name, tool = %call.name, "Observation recorded");
                messages.push(Message::tool_result(&call.id, observation));
            }
        }

        warn!(agent = %self.name, max_steps = self.max_steps, "ReAct loop hit its step limit");
        let notice = format!("Stopped after {} steps without reaching a final answer.", self.max_steps);
        if !transcript.is_empty() {
            sender.send_delta(STEP_SEPARATOR);
        }
        sender.send_delta(notice.as_str());
        append_step_text(&mut transcript, &notice);
        Ok(Some(Value::String(transcript)))
    }
}
