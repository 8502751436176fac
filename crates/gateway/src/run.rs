//! Request plumbing shared by both protocol adapters.
//!
//! Turns an incoming request into a started [`EventBridge`]: session merge,
//! tool cache selection, agent build, and the per-request step timeout.

use crate::sessions::SessionStore;
use crate::{AppState, ErrorResponse, bad_request, internal_error};
use agentwire_agent::{AgentRequest, BridgeError, EventBridge, SubAgentSpec, ToolCache, ToolContext};
use agentwire_config::CacheScope;
use agentwire_core::error::{Error, ProviderError};
use agentwire_core::message::{Message, Role};
use agentwire_core::ui_message::{StructuredMessage, TextState};
use axum::Json;
use axum::http::StatusCode;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// A chat message as clients send it.
///
/// `content` may be a string or a list of `{type: "text", text}` parts.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Value,
}

impl ChatMessage {
    pub fn text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            Value::Array(parts) => parts
                .iter()
                .filter(|p| p["type"] == "text")
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join(""),
            _ => String::new(),
        }
    }

    /// Conversation roles only; tool and unknown roles are dropped.
    pub fn to_message(&self) -> Option<Message> {
        let text = self.text();
        match self.role.as_str() {
            "user" => Some(Message::user(text)),
            "assistant" => Some(Message::assistant(text)),
            "system" | "developer" => Some(Message::system(text)),
            _ => None,
        }
    }
}

/// Protocol-independent description of one run.
#[derive(Debug, Default)]
pub struct RunRequest {
    pub session_id: Option<String>,
    pub messages: Vec<Message>,
    pub system_prompt: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub toolkits: Option<Vec<String>>,
    pub sub_agents: Vec<SubAgentSpec>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Step timeout override, in seconds; fractions allowed
    pub timeout: Option<f64>,
}

/// A started run plus what is needed to record its reply.
pub struct StartedRun {
    pub bridge: EventBridge,
    pub recorder: ReplyRecorder,
}

/// Map agent build failures to HTTP errors: request problems are 400s.
fn build_error(e: Error) -> (StatusCode, Json<ErrorResponse>) {
    match e {
        Error::InvalidRequest(_) | Error::Provider(ProviderError::NotConfigured(_)) | Error::Config { .. } => {
            bad_request(e.to_string())
        }
        other => internal_error(other.to_string()),
    }
}

fn tool_context(state: &AppState, session_id: Option<&str>) -> ToolContext {
    let mut context = ToolContext::new();
    if let Some(id) = session_id {
        context = context.with_session(id);
    }
    let cache = &state.config.tool_cache;
    match (cache.scope, session_id) {
        (CacheScope::Disabled, _) => context,
        (CacheScope::Session, Some(id)) => context.with_cache(state.sessions.cache_for(id)),
        _ => context.with_cache(Arc::new(ToolCache::with_ttl(cache.ttl()))),
    }
}

/// A client-supplied timeout in seconds. Must be positive and finite.
fn step_timeout(seconds: Option<f64>) -> Result<Option<Duration>, (StatusCode, Json<ErrorResponse>)> {
    let Some(seconds) = seconds else { return Ok(None) };
    if seconds <= 0.0 {
        return Err(bad_request(format!("timeout must be positive, got {seconds}")));
    }
    Duration::try_from_secs_f64(seconds)
        .map(Some)
        .map_err(|_| bad_request(format!("Invalid timeout: {seconds}")))
}

pub async fn start_run(state: &AppState, run: RunRequest) -> Result<StartedRun, (StatusCode, Json<ErrorResponse>)> {
    let timeout = step_timeout(run.timeout)?;
    let session_id = run.session_id.filter(|s| !s.trim().is_empty());

    let (system, conversation): (Vec<Message>, Vec<Message>) =
        run.messages.into_iter().partition(|m| m.role == Role::System);
    let turn = state
        .sessions
        .begin(session_id.as_deref(), conversation)
        .ok_or_else(|| bad_request("No user message provided"))?;

    let system_prompt = run.system_prompt.or_else(|| {
        let joined: Vec<String> = system.into_iter().map(|m| m.content).collect();
        (!joined.is_empty()).then(|| joined.join("\n\n"))
    });
    let request = AgentRequest {
        system_prompt,
        provider: run.provider,
        model: run.model,
        toolkits: run.toolkits,
        sub_agents: run.sub_agents,
        history: turn.history,
        temperature: run.temperature,
        max_tokens: run.max_tokens,
    };

    let context = tool_context(state, session_id.as_deref());
    let agent = state.factory.build(&request, context).map_err(build_error)?;

    info!(
        session_id = session_id.as_deref().unwrap_or("-"),
        history = request.history.len(),
        "Starting run"
    );

    let mut bridge = EventBridge::new(agent);
    bridge
        .start(&turn.request, timeout)
        .await
        .map_err(|e| internal_error(e.to_string()))?;

    Ok(StartedRun {
        bridge,
        recorder: ReplyRecorder {
            sessions: state.sessions.clone(),
            session_id,
            request: turn.request,
        },
    })
}

/// Stores a run's request and final text in its session.
#[derive(Clone)]
pub struct ReplyRecorder {
    sessions: Arc<SessionStore>,
    session_id: Option<String>,
    request: String,
}

impl ReplyRecorder {
    pub fn observe(&self, message: &StructuredMessage) {
        let Some(session_id) = &self.session_id else { return };
        let finished = message.parts.first().is_some_and(|part| {
            matches!(part, agentwire_core::ui_message::Part::Text(t) if t.state == TextState::Done)
        });
        if finished && let Some(text) = message.text_content() {
            self.sessions.record_reply(session_id, &self.request, &text);
        }
    }
}

impl StartedRun {
    /// The bridge's messages, with the final reply recorded on the way past.
    pub fn into_stream(self) -> impl Stream<Item = Result<StructuredMessage, BridgeError>> + Send {
        let recorder = self.recorder;
        self.bridge.into_stream().inspect(move |item| {
            if let Ok(message) = item {
                recorder.observe(message);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chat(value: Value) -> ChatMessage {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn content_parts_are_joined() {
        let msg = chat(json!({"role": "user", "content": [
            {"type": "text", "text": "a"},
            {"type": "image_url", "image_url": {"url": "x"}},
            {"type": "text", "text": "b"}
        ]}));
        assert_eq!(msg.text(), "ab");
    }

    #[test]
    fn timeouts_must_be_positive_and_finite() {
        assert_eq!(step_timeout(None).unwrap(), None);
        assert_eq!(step_timeout(Some(30.5)).unwrap(), Some(Duration::from_millis(30_500)));
        assert_eq!(step_timeout(Some(0.0)).unwrap_err().0, StatusCode::BAD_REQUEST);
        assert_eq!(step_timeout(Some(-1.0)).unwrap_err().0, StatusCode::BAD_REQUEST);
        assert!(step_timeout(Some(f64::INFINITY)).is_err());
    }

    #[test]
    fn roles_are_mapped() {
        assert_eq!(chat(json!({"role": "developer", "content": "x"})).to_message().unwrap().role, Role::System);
        assert!(chat(json!({"role": "tool", "content": "x"})).to_message().is_none());
        assert_eq!(chat(json!({"role": "user"})).text(), "");
    }
}
