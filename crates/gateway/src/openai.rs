//! OpenAI-compatible endpoint: `POST /v1/chat/completions`.
//!
//! Structured messages are re-encoded as `chat.completion.chunk` objects.
//! The bridge sends cumulative text; [`ChunkEncoder`] turns it back into the
//! incremental deltas OpenAI clients expect. Tool calls surface once as
//! `tool_calls` deltas, and their results as plain content.

use crate::run::{ChatMessage, RunRequest, start_run};
use crate::{ErrorResponse, SharedState, bad_request, internal_error};
use agentwire_agent::{BridgeError, SubAgentSpec};
use agentwire_core::ui_message::{Part, StructuredMessage, ToolPart, ToolState};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::convert::Infallible;
use tracing::{info, trace, warn};
use uuid::Uuid;

pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    // Extensions
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub toolkits: Option<Vec<String>>,
    #[serde(default)]
    pub sub_agents: Vec<SubAgentSpec>,
    #[serde(default)]
    pub timeout: Option<f64>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDelta {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallDelta {
    pub index: u32,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionDelta,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

/// Stateful structured-message → chunk encoder for one response.
pub struct ChunkEncoder {
    id: String,
    created: i64,
    model: String,
    last_text_sent: String,
    sent_role: bool,
    seen_tool_calls: HashSet<String>,
    next_index: u32,
}

impl ChunkEncoder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
            created: chrono::Utc::now().timestamp(),
            model: model.into(),
            last_text_sent: String::new(),
            sent_role: false,
            seen_tool_calls: HashSet::new(),
            next_index: 0,
        }
    }

    fn chunk(&mut self, mut delta: ChunkDelta, finish_reason: Option<&'static str>) -> ChatCompletionChunk {
        if !self.sent_role && (delta.content.is_some() || delta.tool_calls.is_some()) {
            delta.role = Some("assistant");
            self.sent_role = true;
        }
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk",
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        }
    }

    fn content(&mut self, text: String) -> ChatCompletionChunk {
        self.chunk(
            ChunkDelta {
                content: Some(text),
                ..ChunkDelta::default()
            },
            None,
        )
    }

    /// The part of `text` not yet sent: its suffix when it extends what was
    /// sent, else all of it.
    fn text_delta(&mut self, text: &str) -> Option<String> {
        let delta = match text.strip_prefix(self.last_text_sent.as_str()) {
            Some(suffix) => suffix.to_string(),
            None => text.to_string(),
        };
        self.last_text_sent = text.to_string();
        (!delta.is_empty()).then_some(delta)
    }

    fn tool_chunk(&mut self, part: &ToolPart) -> Option<ChatCompletionChunk> {
        match part.state {
            ToolState::OutputAvailable => {
                let output = match &part.output {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                (!output.is_empty()).then(|| self.content(output))
            }
            ToolState::OutputError => {
                let text = part.error_text.clone().unwrap_or_default();
                (!text.is_empty()).then(|| self.content(text))
            }
            _ => {
                if !self.seen_tool_calls.insert(part.tool_call_id.clone()) {
                    return None;
                }
                let index = self.next_index;
                self.next_index += 1;
                let call = ToolCallDelta {
                    index,
                    id: part.tool_call_id.clone(),
                    kind: "function",
                    function: FunctionDelta {
                        name: part.tool_name.clone(),
                        arguments: part.input.to_string(),
                    },
                };
                Some(self.chunk(
                    ChunkDelta {
                        tool_calls: Some(vec![call]),
                        ..ChunkDelta::default()
                    },
                    None,
                ))
            }
        }
    }

    /// Chunks for one structured message; possibly none.
    pub fn encode(&mut self, message: &StructuredMessage) -> Vec<ChatCompletionChunk> {
        let mut chunks = Vec::new();
        if let Some(text) = message.text_content()
            && let Some(delta) = self.text_delta(&text)
        {
            chunks.push(self.content(delta));
        }
        for part in &message.parts {
            if let Part::Tool(tool) = part
                && let Some(chunk) = self.tool_chunk(tool)
            {
                chunks.push(chunk);
            }
        }
        chunks
    }

    pub fn finish(&mut self) -> ChatCompletionChunk {
        self.chunk(ChunkDelta::default(), Some("stop"))
    }

    pub fn last_text(&self) -> &str {
        &self.last_text_sent
    }
}

fn error_frame(error: &BridgeError) -> String {
    json!({ "error": { "message": error.to_string(), "type": "server_error" } }).to_string()
}

fn encode_frame(chunk: &ChatCompletionChunk) -> Option<String> {
    match serde_json::to_string(chunk) {
        Ok(frame) => {
            trace!(frame = %frame, "Chunk frame");
            Some(frame)
        }
        Err(e) => {
            warn!(error = %e, "Skipping unencodable chunk");
            None
        }
    }
}

/// SSE `data:` payloads for a run: chunks, a stop chunk, then `[DONE]`.
///
/// A failed run ends with an error frame and `[DONE]` instead of the stop chunk.
pub fn chunk_frames<S>(messages: S, encoder: ChunkEncoder) -> impl Stream<Item = String> + Send
where
    S: Stream<Item = Result<StructuredMessage, BridgeError>> + Send + 'static,
{
    let messages = Box::pin(messages);
    futures::stream::unfold(Some((messages, encoder)), |state| async move {
        let (mut messages, mut encoder) = state?;
        match messages.next().await {
            Some(Ok(message)) => {
                let frames: Vec<String> = encoder.encode(&message).iter().filter_map(encode_frame).collect();
                Some((frames, Some((messages, encoder))))
            }
            Some(Err(e)) => {
                warn!(error = %e, "Run failed mid-stream");
                Some((vec![error_frame(&e), DONE_SENTINEL.to_string()], None))
            }
            None => {
                let mut frames: Vec<String> = encode_frame(&encoder.finish()).into_iter().collect();
                frames.push(DONE_SENTINEL.to_string());
                Some((frames, None))
            }
        }
    })
    .flat_map(futures::stream::iter)
}

#[derive(Debug, Serialize)]
struct CompletionMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct CompletionChoice {
    index: u32,
    message: CompletionMessage,
    finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletion {
    id: String,
    object: &'static str,
    created: i64,
    model: String,
    choices: Vec<CompletionChoice>,
}

fn completion(model: String, text: String) -> ChatCompletion {
    ChatCompletion {
        id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
        object: "chat.completion",
        created: chrono::Utc::now().timestamp(),
        model,
        choices: vec![CompletionChoice {
            index: 0,
            message: CompletionMessage {
                role: "assistant",
                content: text,
            },
            finish_reason: "stop",
        }],
    }
}

/// `POST /v1/chat/completions`
pub async fn chat_completions_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatCompletionRequest>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    if payload.messages.is_empty() {
        return Err(bad_request("'messages' must not be empty"));
    }
    let response_model = payload
        .model
        .clone()
        .unwrap_or_else(|| state.config.gateway.model_alias.clone());
    let stream = payload.stream;
    info!(model = %response_model, stream, "chat/completions request");

    let run = RunRequest {
        session_id: payload.session_id,
        messages: payload.messages.iter().filter_map(ChatMessage::to_message).collect(),
        system_prompt: None,
        provider: payload.provider,
        model: payload.model,
        toolkits: payload.toolkits,
        sub_agents: payload.sub_agents,
        temperature: payload.temperature,
        max_tokens: payload.max_tokens,
        timeout: payload.timeout,
    };
    let run = start_run(&state, run).await?;

    if stream {
        let frames = chunk_frames(run.into_stream(), ChunkEncoder::new(response_model));
        let events = frames.map(|frame| Ok::<_, Infallible>(Event::default().data(frame)));
        return Ok(Sse::new(events).keep_alive(KeepAlive::default()).into_response());
    }

    let mut messages = Box::pin(run.into_stream());
    let mut text = String::new();
    while let Some(item) = messages.next().await {
        let message = item.map_err(|e| internal_error(e.to_string()))?;
        if let Some(latest) = message.text_content() {
            text = latest;
        }
    }
    Ok(Json(completion(response_model, text)).into_response())
}
