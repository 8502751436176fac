//! Call tracking for tools.
//!
//! [`ToolCallWrapper`] sits between a reasoning loop and a tool. Every call
//! is reported to clients as an `input-available` event followed by
//! `output-available` or `output-error`, identical calls are answered from a
//! [`ToolCache`], and failures never reach the loop: they come back as an
//! `{"error": ...}` value the model can read.

use crate::lifecycle::EventSink;
use crate::lifecycle::ToolCallRecord;
use agentwire_core::agent::OutputSender;
use agentwire_core::error::ToolError;
use agentwire_core::tool::Tool;
use agentwire_core::ui_message::ToolState;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Argument name under which the host passes the session id to tools that
/// accept it.
pub const SESSION_ID_ARG: &str = "session_id";

struct CacheEntry {
    value: Value,
    stored_at: Instant,
}

/// Tool results keyed by tool name and arguments.
///
/// Its lifetime is the scope of reuse: one per request, or one per session.
#[derive(Default)]
pub struct ToolCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Option<Duration>,
}

impl ToolCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache whose entries expire after `ttl`; `None` keeps them forever.
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            entries: Mutex::default(),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().ok()?;
        let fresh = match (entries.get(key), self.ttl) {
            (None, _) => return None,
            (Some(entry), Some(ttl)) => entry.stored_at.elapsed() < ttl,
            (Some(_), None) => true,
        };
        if !fresh {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: String, value: Value) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key,
                CacheEntry {
                    value,
                    stored_at: Instant::now(),
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-request context handed to wrapped tools.
#[derive(Clone, Default)]
pub struct ToolContext {
    pub session_id: Option<String>,
    pub cache: Option<Arc<ToolCache>>,
}

impl ToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_cache(mut self, cache: Arc<ToolCache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

/// Rebuild `value` with every object's keys in sorted order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let sorted: Map<String, Value> = keys
                .into_iter()
                .map(|k| (k.clone(), canonicalize(&map[k])))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Cache key for a call: canonical JSON of the tool name and its arguments,
/// leaving out the injected session id.
pub fn cache_key(tool_name: &str, arguments: &Value) -> String {
    let mut kwargs = arguments.clone();
    if let Value::Object(map) = &mut kwargs {
        map.remove(SESSION_ID_ARG);
    }
    canonicalize(&json!({ "tool": tool_name, "kwargs": kwargs })).to_string()
}

/// A tool plus lifecycle reporting, caching and error recovery.
pub struct ToolCallWrapper {
    inner: Arc<dyn Tool>,
    context: ToolContext,
    inject_session: bool,
    timeout: Option<Duration>,
    sink: EventSink,
}

impl ToolCallWrapper {
    pub fn new(inner: Arc<dyn Tool>, context: ToolContext) -> Self {
        let inject_session = inner.accepts_session_id();
        Self {
            inner,
            context,
            inject_session,
            timeout: None,
            sink: EventSink::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn attach_sink(&self, sender: OutputSender) {
        self.sink.attach(sender);
    }

    /// The `input` shown to clients: the tool description plus its arguments.
    fn input_payload(&self, arguments: &Value) -> Value {
        let mut payload = Map::new();
        payload.insert("description".into(), json!(self.inner.description()));
        match arguments {
            Value::Object(args) => payload.extend(args.clone()),
            Value::Null => {}
            other => {
                payload.insert("arguments".into(), other.clone());
            }
        }
        Value::Object(payload)
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, ToolError> {
        let Some(timeout) = self.timeout else {
            return self.inner.execute(arguments).await;
        };
        tokio::time::timeout(timeout, self.inner.execute(arguments))
            .await
            .map_err(|_| ToolError::Timeout {
                tool_name: self.inner.name().to_string(),
                timeout_secs: timeout.as_secs(),
            })?
    }
}

#[async_trait]
impl Tool for ToolCallWrapper {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn parameters_schema(&self) -> Value {
        self.inner.parameters_schema()
    }

    fn skip_call_wrap(&self) -> bool {
        true
    }

    /// Never fails: tool errors are reported and returned as `{"error": ...}`.
    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let mut arguments = match arguments {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        if self.inject_session
            && let Some(session_id) = &self.context.session_id
            && let Value::Object(args) = &mut arguments
            && !args.contains_key(SESSION_ID_ARG)
        {
            args.insert(SESSION_ID_ARG.into(), json!(session_id));
        }

        let tool = self.inner.name();
        let key = cache_key(tool, &arguments);
        let mut record = ToolCallRecord::new(tool, self.input_payload(&arguments));

        if let Some(cache) = &self.context.cache
            && let Some(cached) = cache.get(&key)
        {
            debug!(tool, call_id = %record.call_id, "Tool cache hit");
            self.sink.report(&mut record, ToolState::InputAvailable, None, None);
            self.sink
                .report(&mut record, ToolState::OutputAvailable, Some(cached.clone()), None);
            return Ok(cached);
        }

        self.sink.report(&mut record, ToolState::InputAvailable, None, None);
        debug!(tool, call_id = %record.call_id, "Executing tool");

        match self.invoke(arguments).await {
            Ok(value) => {
                self.sink
                    .report(&mut record, ToolState::OutputAvailable, Some(value.clone()), None);
                if let Some(cache) = &self.context.cache
                    && !value.is_null()
                {
                    cache.insert(key, value.clone());
                }
                Ok(value)
            }
            Err(e) => {
                let message = e.to_string();
                warn!(tool, call_id = %record.call_id, error = %message, "Tool call failed");
                self.sink
                    .report(&mut record, ToolState::OutputError, None, Some(message.clone()));
                Ok(json!({ "error": message }))
            }
        }
    }
}

/// Tools after wrapping, with handles to the wrappers for sink attachment.
#[derive(Default)]
pub struct WrappedTools {
    pub tools: Vec<Arc<dyn Tool>>,
    wrappers: Vec<Arc<ToolCallWrapper>>,
}

impl WrappedTools {
    /// Route every wrapper's lifecycle events to `sender`.
    pub fn attach_sink(&self, sender: &OutputSender) {
        for wrapper in &self.wrappers {
            wrapper.attach_sink(sender.clone());
        }
    }
}

/// Wrap every tool that does not opt out via [`Tool::skip_call_wrap`].
pub fn wrap_tools_for_calls(
    tools: Vec<Arc<dyn Tool>>,
    context: &ToolContext,
    timeout: Option<Duration>,
) -> WrappedTools {
    let mut wrapped = WrappedTools::default();
    for tool in tools {
        if tool.skip_call_wrap() {
            wrapped.tools.push(tool);
            continue;
        }
        let wrapper = Arc::new(ToolCallWrapper::new(tool, context.clone()).with_timeout(timeout));
        wrapped.tools.push(wrapper.clone());
        wrapped.wrappers.push(wrapper);
    }
    wrapped
}
