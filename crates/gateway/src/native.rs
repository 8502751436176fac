//! Native streaming endpoint: `POST /v1/agent/stream`.
//!
//! Every structured message is sent as-is, one per frame, either as SSE
//! (`data: <json>\n\n`) or as newline-delimited JSON. A failed run ends the
//! stream with an `{"type":"error","errorText":...}` frame.

use crate::run::{ChatMessage, RunRequest, start_run};
use crate::{ErrorResponse, SharedState, bad_request};
use agentwire_agent::{BridgeError, SubAgentSpec};
use agentwire_core::message::Message;
use agentwire_core::ui_message::StructuredMessage;
use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use tracing::{info, trace, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    #[default]
    Sse,
    Raw,
}

#[derive(Debug, Deserialize)]
pub struct AgentStreamRequest {
    /// A single user message; appended after `messages` when both are given
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub toolkits: Option<Vec<String>>,
    #[serde(default)]
    pub sub_agents: Vec<SubAgentSpec>,
    #[serde(default)]
    pub stream_mode: StreamMode,
    /// Step timeout in seconds
    #[serde(default)]
    pub timeout: Option<f64>,
}

impl AgentStreamRequest {
    fn into_run(self) -> RunRequest {
        let mut messages: Vec<Message> = self.messages.iter().filter_map(ChatMessage::to_message).collect();
        if let Some(message) = self.message {
            messages.push(Message::user(message));
        }
        RunRequest {
            session_id: self.session_id,
            messages,
            system_prompt: self.system_prompt,
            provider: self.provider,
            model: self.model,
            toolkits: self.toolkits,
            sub_agents: self.sub_agents,
            temperature: None,
            max_tokens: None,
            timeout: self.timeout,
        }
    }
}

pub fn error_frame(error: &BridgeError) -> String {
    json!({ "type": "error", "errorText": error.to_string() }).to_string()
}

/// One JSON frame per message; the error, if any, comes last.
///
/// Messages that fail to serialize are skipped.
pub fn frames<S>(messages: S) -> impl Stream<Item = String> + Send
where
    S: Stream<Item = Result<StructuredMessage, BridgeError>> + Send,
{
    messages.filter_map(|item| async move {
        match item {
            Ok(message) => match serde_json::to_string(&message) {
                Ok(frame) => {
                    trace!(message_id = %message.id, "Native frame");
                    Some(frame)
                }
                Err(e) => {
                    warn!(message_id = %message.id, error = %e, "Skipping unencodable message");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "Run failed mid-stream");
                Some(error_frame(&e))
            }
        }
    })
}

/// `POST /v1/agent/stream`
pub async fn agent_stream_handler(
    State(state): State<SharedState>,
    Json(payload): Json<AgentStreamRequest>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let mode = payload.stream_mode;
    if payload.message.is_none() && payload.messages.is_empty() {
        return Err(bad_request("Either 'message' or 'messages' is required"));
    }
    info!(mode = ?mode, session_id = ?payload.session_id, "agent/stream request");

    let run = start_run(&state, payload.into_run()).await?;
    let frames = frames(run.into_stream());

    Ok(match mode {
        StreamMode::Sse => {
            let events = frames.map(|frame| Ok::<_, Infallible>(Event::default().data(frame)));
            Sse::new(events).keep_alive(KeepAlive::default()).into_response()
        }
        StreamMode::Raw => {
            let lines = frames.map(|frame| Ok::<_, Infallible>(format!("{frame}\n")));
            (
                [(header::CONTENT_TYPE, "application/x-ndjson")],
                Body::from_stream(lines),
            )
                .into_response()
        }
    })
}
