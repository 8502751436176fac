//! Shared fixtures for agent tests.

use agentwire_core::agent::{LoopHandle, OutputQueue, QueueItem, ReasoningLoop};
use agentwire_core::error::{Error, ProviderError, Result, ToolError};
use agentwire_core::message::{Message, MessageToolCall};
use agentwire_core::provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk};
use agentwire_core::tool::Tool;
use agentwire_core::ui_message::StructuredMessage;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

enum Behaviour {
    Echo,
    Failing(String),
    SessionAware,
    Sleeping(Duration),
}

/// A tool that counts its executions.
pub struct CountingTool {
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl CountingTool {
    fn with(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns its `text` argument.
    pub fn echo() -> Self {
        Self::with(Behaviour::Echo)
    }

    pub fn failing(reason: &str) -> Self {
        Self::with(Behaviour::Failing(reason.into()))
    }

    /// Accepts an injected session id and returns it with its `note`.
    pub fn session_aware() -> Self {
        Self::with(Behaviour::SessionAware)
    }

    pub fn sleeping(duration: Duration) -> Self {
        Self::with(Behaviour::Sleeping(duration))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for CountingTool {
    fn name(&self) -> &str {
        "counting_echo"
    }

    fn description(&self) -> &str {
        "Echo and count"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": { "text": { "type": "string" } } })
    }

    fn accepts_session_id(&self) -> bool {
        matches!(self.behaviour, Behaviour::SessionAware)
    }

    async fn execute(&self, arguments: Value) -> std::result::Result<Value, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Echo => Ok(arguments.get("text").cloned().unwrap_or(Value::Null)),
            Behaviour::Failing(reason) => Err(ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: reason.clone(),
            }),
            Behaviour::SessionAware => Ok(json!({
                "session_id": arguments.get("session_id").cloned().unwrap_or(Value::Null),
                "note": arguments.get("note").cloned().unwrap_or(Value::Null),
            })),
            Behaviour::Sleeping(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(json!("woke"))
            }
        }
    }
}

/// Everything currently queued, in order.
pub async fn drain_items(queue: &OutputQueue) -> Vec<QueueItem> {
    let mut rx = queue.take_receiver().await;
    let mut items = Vec::new();
    while let Ok(item) = rx.try_recv() {
        items.push(item);
    }
    items
}

/// The structured messages currently queued, in order.
pub async fn drain_messages(queue: &OutputQueue) -> Vec<StructuredMessage> {
    drain_items(queue)
        .await
        .into_iter()
        .filter_map(|item| match item {
            QueueItem::Message(message) => Some(message),
            QueueItem::Delta(_) => None,
        })
        .collect()
}

/// One scripted model turn.
#[derive(Debug, Clone, Default)]
pub struct Turn {
    deltas: Vec<String>,
    tool_calls: Vec<MessageToolCall>,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl Turn {
    pub fn text(deltas: &[&str]) -> Self {
        Self {
            deltas: deltas.iter().map(|d| d.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn tool_call(id: &str, name: &str, arguments: &str) -> Self {
        Self::default().with_tool_call(id, name, arguments)
    }

    pub fn with_tool_call(mut self, id: &str, name: &str, arguments: &str) -> Self {
        self.tool_calls.push(MessageToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        });
        self
    }

    pub fn failure(message: &str) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Wait this long before the stream opens.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// A streaming provider that plays back scripted turns and records requests.
pub struct ScriptedProvider {
    turns: Mutex<VecDeque<Turn>>,
    repeat: Option<Turn>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers every request with the same turn.
    pub fn repeating(turn: Turn) -> Self {
        Self {
            repeat: Some(turn),
            ..Self::new(Vec::new())
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_turn(&self, request: ProviderRequest) -> std::result::Result<Turn, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.repeat.clone())
            .ok_or_else(|| ProviderError::NotConfigured("script exhausted".into()))
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError> {
        let turn = self.next_turn(request)?;
        if let Some(failure) = turn.failure {
            return Err(ProviderError::ApiError {
                status_code: 500,
                message: failure,
            });
        }
        let mut message = Message::assistant(turn.deltas.concat());
        message.tool_calls = turn.tool_calls;
        Ok(ProviderResponse {
            message,
            usage: None,
            model: "scripted-model".into(),
        })
    }

    async fn stream(&self, request: ProviderRequest) -> std::result::Result<ChunkReceiver, ProviderError> {
        let turn = self.next_turn(request)?;
        if let Some(delay) = turn.delay {
            tokio::time::sleep(delay).await;
        }
        let (tx, rx) = tokio::sync::mpsc::channel(turn.deltas.len() + 2);
        if let Some(failure) = turn.failure {
            let _ = tx.send(Err(ProviderError::StreamInterrupted(failure))).await;
            return Ok(rx);
        }
        for delta in turn.deltas {
            let _ = tx
                .send(Ok(StreamChunk {
                    content: Some(delta),
                    ..StreamChunk::default()
                }))
                .await;
        }
        let _ = tx
            .send(Ok(StreamChunk {
                tool_calls: turn.tool_calls,
                done: true,
                ..StreamChunk::default()
            }))
            .await;
        Ok(rx)
    }
}

/// A reasoning loop that replays queued items, then returns or fails.
pub struct ScriptedLoop {
    name: String,
    handle: LoopHandle,
    items: Vec<QueueItem>,
    result: Option<Value>,
    failure: Option<String>,
    hold: Option<Duration>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedLoop {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            handle: LoopHandle::new(),
            items: Vec::new(),
            result: None,
            failure: None,
            hold: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delta(mut self, delta: &str) -> Self {
        self.items.push(QueueItem::Delta(delta.into()));
        self
    }

    pub fn with_message(mut self, message: StructuredMessage) -> Self {
        self.items.push(QueueItem::Message(message));
        self
    }

    pub fn returning(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn failing(mut self, reason: &str) -> Self {
        self.failure = Some(reason.into());
        self
    }

    /// Stay running this long after emitting, unless cancelled.
    pub fn holding(mut self, hold: Duration) -> Self {
        self.hold = Some(hold);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningLoop for ScriptedLoop {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self) -> &LoopHandle {
        &self.handle
    }

    async fn run(&self, request: &str) -> Result<Option<Value>> {
        self.requests.lock().unwrap().push(request.to_string());
        let sender = self.handle.sender();
        for item in &self.items {
            sender.send(item.clone());
        }
        if let Some(hold) = self.hold {
            tokio::select! {
                _ = self.handle.cancellation().cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(hold) => {}
            }
        }
        if let Some(reason) = &self.failure {
            return Err(Error::Internal(reason.clone()));
        }
        Ok(self.result.clone())
    }
}
