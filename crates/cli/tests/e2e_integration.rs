//! End-to-end integration tests for the agentwire runtime.
//!
//! These tests drive full requests from the HTTP surface (or the event
//! bridge directly) through agent assembly, tool execution and delegation,
//! using a scripted provider in place of a real model.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use agentwire_agent::{AgentFactory, EventBridge, SUB_AGENT_TOOL_NAME};
use agentwire_config::AppConfig;
use agentwire_core::agent::{LoopHandle, ReasoningLoop};
use agentwire_core::error::ProviderError;
use agentwire_core::message::MessageToolCall;
use agentwire_core::provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk};
use agentwire_core::ui_message::{StructuredMessage, TextState, ToolState};
use agentwire_gateway::{AppState, build_router};
use agentwire_providers::ProviderRouter;
use agentwire_tools::ToolkitRegistry;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

// ── Scripted provider ────────────────────────────────────────────────────

/// One model turn: streamed text deltas, then optional tool calls.
struct Step {
    deltas: Vec<String>,
    tool_calls: Vec<MessageToolCall>,
}

fn say(deltas: &[&str]) -> Step {
    Step {
        deltas: deltas.iter().map(|d| d.to_string()).collect(),
        tool_calls: vec![],
    }
}

fn call(id: &str, name: &str, arguments: Value) -> Step {
    Step {
        deltas: vec![],
        tool_calls: vec![MessageToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.to_string(),
        }],
    }
}

/// A provider that streams scripted steps in sequence.
struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::NotConfigured("streaming only".into()))
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider exhausted after {} calls", self.calls()));
        let (tx, rx) = tokio::sync::mpsc::channel(step.deltas.len() + 1);
        for delta in step.deltas {
            tx.send(Ok(StreamChunk {
                content: Some(delta),
                ..StreamChunk::default()
            }))
            .await
            .unwrap();
        }
        tx.send(Ok(StreamChunk {
            tool_calls: step.tool_calls,
            done: true,
            ..StreamChunk::default()
        }))
        .await
        .unwrap();
        Ok(rx)
    }
}

fn factory_with(provider: Arc<ScriptedProvider>) -> (Arc<AppConfig>, AgentFactory) {
    let mut config = AppConfig::default();
    config.llm.provider = "e2e".into();
    config.llm.model = "e2e-model".into();
    config.toolkits.default_toolkits = vec!["utility".into(), "test".into()];
    let config = Arc::new(config);
    let mut providers = ProviderRouter::new("e2e");
    providers.register("e2e", provider);
    let factory = AgentFactory::new(config.clone(), providers, ToolkitRegistry::builtin());
    (config, factory)
}

fn app_with(provider: Arc<ScriptedProvider>) -> axum::Router {
    let (config, factory) = factory_with(provider);
    build_router(Arc::new(AppState::new(config, factory)))
}

async fn post(app: axum::Router, uri: &str, body: Value) -> (StatusCode, String) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

fn ndjson_messages(body: &str) -> Vec<StructuredMessage> {
    body.lines().map(|line| serde_json::from_str(line).unwrap()).collect()
}

// ── Bridge ───────────────────────────────────────────────────────────────

/// A loop that emits fixed deltas and returns nothing.
struct DeltaLoop {
    deltas: Vec<&'static str>,
    handle: LoopHandle,
}

#[async_trait::async_trait]
impl ReasoningLoop for DeltaLoop {
    fn name(&self) -> &str {
        "delta"
    }

    fn handle(&self) -> &LoopHandle {
        &self.handle
    }

    async fn run(&self, _request: &str) -> agentwire_core::error::Result<Option<Value>> {
        for delta in &self.deltas {
            self.handle.sender().send_delta(*delta);
        }
        Ok(None)
    }
}

#[tokio::test]
async fn bridge_folds_deltas_into_cumulative_text() {
    let agent = Arc::new(DeltaLoop {
        deltas: vec!["A", "B", "C"],
        handle: LoopHandle::new(),
    });
    let mut bridge = EventBridge::new(agent);
    bridge.start("go", None).await.unwrap();
    let id = bridge.message_id().to_string();
    let messages = bridge.collect().await.unwrap();

    let texts: Vec<String> = messages.iter().map(|m| m.text_content().unwrap()).collect();
    assert_eq!(texts, vec!["A", "AB", "ABC", "ABC"]);
    assert!(messages.iter().all(|m| m.id == id));
    assert_eq!(
        messages.last().unwrap(),
        &StructuredMessage::text(id, "ABC", TextState::Done)
    );
}

// ── Native endpoint ──────────────────────────────────────────────────────

#[tokio::test]
async fn calculator_round_trip_over_native_stream() {
    let provider = ScriptedProvider::new(vec![
        call("c1", "calculator", json!({"expression": "6 * 7"})),
        say(&["The answer ", "is 42."]),
    ]);
    let (status, body) = post(
        app_with(provider.clone()),
        "/v1/agent/stream",
        json!({"message": "what is 6 * 7?", "stream_mode": "raw"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let messages = ndjson_messages(&body);
    let tool_states: Vec<ToolState> = messages.iter().flat_map(|m| m.tool_parts()).map(|p| p.state).collect();
    assert_eq!(tool_states, vec![ToolState::InputAvailable, ToolState::OutputAvailable]);
    assert_eq!(messages.last().unwrap().text_content().as_deref(), Some("The answer is 42."));

    // The tool observation reached the model on the second step.
    let requests = provider.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].messages.iter().any(|m| m.content.contains("42")));
}

#[tokio::test]
async fn delegation_to_unknown_sub_agent_is_reported_not_fatal() {
    let provider = ScriptedProvider::new(vec![
        call(
            "c1",
            SUB_AGENT_TOOL_NAME,
            json!({"name": "ghost", "message": "boo", "description": "Ask ghost"}),
        ),
        say(&["No such helper."]),
    ]);
    let (status, body) = post(
        app_with(provider),
        "/v1/agent/stream",
        json!({"message": "ask ghost", "sub_agents": [{"name": "researcher"}], "stream_mode": "raw"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let messages = ndjson_messages(&body);
    let parts: Vec<_> = messages.iter().flat_map(|m| m.tool_parts()).collect();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].state, ToolState::OutputError);
    assert_eq!(parts[0].error_text.as_deref(), Some("Unknown sub-agent: ghost"));
    assert_eq!(messages.last().unwrap().text_content().as_deref(), Some("No such helper."));
}

#[tokio::test]
async fn sub_agent_answer_flows_back_to_main_agent() {
    let provider = ScriptedProvider::new(vec![
        call(
            "c1",
            SUB_AGENT_TOOL_NAME,
            json!({"name": "researcher", "message": "find X", "description": "Research X"}),
        ),
        say(&["X is ", "found"]),
        say(&["Researcher says: X is found"]),
    ]);
    let (_, body) = post(
        app_with(provider.clone()),
        "/v1/agent/stream",
        json!({"message": "what is X?", "sub_agents": [{"name": "researcher"}], "stream_mode": "raw"}),
    )
    .await;

    let messages = ndjson_messages(&body);
    let parts: Vec<_> = messages.iter().flat_map(|m| m.tool_parts()).collect();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[1].state, ToolState::OutputAvailable);
    let answer = StructuredMessage::from_value(parts[1].output.as_ref().unwrap()).unwrap();
    assert_eq!(answer.text_content().as_deref(), Some("X is found"));

    // Sub-agent text stays inside the tool output; the main stream only carries the final answer.
    let texts: Vec<String> = messages.iter().filter_map(|m| m.text_content()).collect();
    assert_eq!(texts.last().map(String::as_str), Some("Researcher says: X is found"));
    assert!(texts.iter().all(|t| !t.starts_with("X is")));
    assert_eq!(provider.calls(), 3);
}

// ── OpenAI-compatible endpoint ───────────────────────────────────────────

#[tokio::test]
async fn openai_stream_matches_chunk_protocol() {
    let provider = ScriptedProvider::new(vec![say(&["Hi", " there"])]);
    let (status, body) = post(
        app_with(provider),
        "/v1/chat/completions",
        json!({"model": "agentwire", "stream": true, "messages": [{"role": "user", "content": "hello"}]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let frames: Vec<&str> = body.lines().filter_map(|l| l.strip_prefix("data: ")).collect();
    assert_eq!(frames.last(), Some(&"[DONE]"));
    let chunks: Vec<Value> = frames[..frames.len() - 1]
        .iter()
        .map(|f| serde_json::from_str(f).unwrap())
        .collect();
    let text: String = chunks
        .iter()
        .filter_map(|c| c["choices"][0]["delta"]["content"].as_str())
        .collect();
    assert_eq!(text, "Hi there");
    assert!(chunks.iter().all(|c| c["object"] == "chat.completion.chunk"));
    let ids: Vec<&Value> = chunks.iter().map(|c| &c["id"]).collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
}

/// A step that says something and then calls a tool.
fn say_then_call(text: &str, id: &str, name: &str, arguments: Value) -> Step {
    Step {
        deltas: vec![text.to_string()],
        ..call(id, name, arguments)
    }
}

#[tokio::test]
async fn multi_step_answer_is_never_repeated_in_openai_stream() {
    let provider = ScriptedProvider::new(vec![
        say_then_call("Let me check.", "c1", "test_echo", json!({"text": "ping"})),
        say(&["Done."]),
    ]);
    let (status, body) = post(
        app_with(provider),
        "/v1/chat/completions",
        json!({"stream": true, "messages": [{"role": "user", "content": "check"}]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let contents: Vec<String> = body
        .lines()
        .filter_map(|l| l.strip_prefix("data: "))
        .filter(|f| *f != "[DONE]")
        .map(|f| serde_json::from_str::<Value>(f).unwrap())
        .filter_map(|c| c["choices"][0]["delta"]["content"].as_str().map(String::from))
        .collect();
    assert_eq!(contents, vec!["Let me check.", "ping", "\n\n", "Done."]);
}

#[tokio::test]
async fn multi_step_done_message_keeps_all_streamed_text() {
    let provider = ScriptedProvider::new(vec![
        say_then_call("Let me check.", "c1", "test_echo", json!({"text": "ping"})),
        say(&["Done."]),
    ]);
    let (_, body) = post(
        app_with(provider),
        "/v1/agent/stream",
        json!({"message": "check", "stream_mode": "raw"}),
    )
    .await;

    let texts: Vec<String> = ndjson_messages(&body).iter().filter_map(|m| m.text_content()).collect();
    assert_eq!(
        texts,
        vec!["Let me check.", "Let me check.\n\n", "Let me check.\n\nDone.", "Let me check.\n\nDone."]
    );
    assert!(texts.windows(2).all(|w| w[1].starts_with(w[0].as_str())));
}

#[tokio::test]
async fn openai_tool_call_is_announced_once() {
    let provider = ScriptedProvider::new(vec![
        call("c1", "test_echo", json!({"text": "ping"})),
        say(&["pong"]),
    ]);
    let (_, body) = post(
        app_with(provider),
        "/v1/chat/completions",
        json!({"stream": true, "messages": [{"role": "user", "content": "echo"}]}),
    )
    .await;

    let chunks: Vec<Value> = body
        .lines()
        .filter_map(|l| l.strip_prefix("data: "))
        .filter(|f| *f != "[DONE]")
        .map(|f| serde_json::from_str(f).unwrap())
        .collect();
    let announced: Vec<&Value> = chunks
        .iter()
        .filter_map(|c| c["choices"][0]["delta"]["tool_calls"].as_array())
        .flatten()
        .collect();
    assert_eq!(announced.len(), 1);
    assert_eq!(announced[0]["index"], 0);
    assert_eq!(announced[0]["function"]["name"], "test_echo");
}
