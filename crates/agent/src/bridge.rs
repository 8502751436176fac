//! Streaming event bridge.
//!
//! [`EventBridge`] runs a [`ReasoningLoop`] in a background task and turns
//! its output queue into an ordered stream of [`StructuredMessage`]s for one
//! client response. Text deltas are folded into a cumulative text message
//! under a single message id; tool lifecycle messages pass through as-is.
//!
//! ```text
//! Idle ──start──▶ Running ──run ends──▶ Draining ──▶ Completed | Failed
//! ```

use agentwire_core::agent::{OutputReceiver, QueueItem, ReasoningLoop};
use agentwire_core::error::{Error, Result};
use agentwire_core::ui_message::{StructuredMessage, TextState};
use futures::Stream;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge was not started")]
    NotStarted,

    #[error("bridge was already started")]
    AlreadyStarted,

    #[error("{0}")]
    Run(#[from] Error),

    #[error("agent task failed: {0}")]
    Join(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Running,
    Draining,
    Completed,
    Failed,
}

/// Puts the loop's previous step timeout back when dropped.
struct StepTimeoutGuard {
    agent: Arc<dyn ReasoningLoop>,
    previous: Option<Duration>,
}

impl StepTimeoutGuard {
    fn install(agent: Arc<dyn ReasoningLoop>, timeout: Option<Duration>) -> Self {
        let previous = timeout.map(|t| agent.handle().set_step_timeout(t));
        Self { agent, previous }
    }
}

impl Drop for StepTimeoutGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous {
            self.agent.handle().set_step_timeout(previous);
        }
    }
}

/// Sets the loop's completion flag when dropped, so a panicking run still
/// marks itself done.
struct CompletionGuard(Arc<dyn ReasoningLoop>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.0.handle().task_done().set();
    }
}

enum Wake {
    Item(Option<QueueItem>),
    Finished(std::result::Result<Result<Option<Value>>, JoinError>),
}

pub struct EventBridge {
    agent: Arc<dyn ReasoningLoop>,
    state: BridgeState,
    message_id: String,
    buffer: String,
    receiver: Option<OutputReceiver>,
    task: Option<JoinHandle<Result<Option<Value>>>>,
    outcome: Option<std::result::Result<Option<Value>, BridgeError>>,
}

impl EventBridge {
    pub fn new(agent: Arc<dyn ReasoningLoop>) -> Self {
        Self {
            agent,
            state: BridgeState::Idle,
            message_id: Uuid::new_v4().to_string(),
            buffer: String::new(),
            receiver: None,
            task: None,
            outcome: None,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// Id shared by every text message of this run.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Start the loop on `request` in the background.
    ///
    /// Anything left in the loop's queue from earlier runs is discarded.
    /// `step_timeout` overrides the loop's step timeout for this run only.
    pub async fn start(&mut self, request: &str, step_timeout: Option<Duration>) -> std::result::Result<(), BridgeError> {
        if self.state != BridgeState::Idle {
            return Err(BridgeError::AlreadyStarted);
        }
        let handle = self.agent.handle();
        let stale = handle.output().clear();
        if stale > 0 {
            debug!(agent = self.agent.name(), stale, "Discarded stale queue items");
        }
        handle.task_done().clear();
        self.receiver = Some(handle.output().take_receiver().await);

        let restore = StepTimeoutGuard::install(self.agent.clone(), step_timeout);
        let done = CompletionGuard(self.agent.clone());
        let agent = self.agent.clone();
        let request = request.to_string();
        self.task = Some(tokio::spawn(async move {
            let _restore = restore;
            let _done = done;
            agent.run(&request).await
        }));
        self.state = BridgeState::Running;
        debug!(agent = self.agent.name(), message_id = %self.message_id, "Bridge started");
        Ok(())
    }

    /// The next message of the run, or `None` once it has ended.
    ///
    /// A failed run yields its error once, then `None`.
    pub async fn next(&mut self) -> Option<std::result::Result<StructuredMessage, BridgeError>> {
        loop {
            match self.state {
                BridgeState::Idle => {
                    self.state = BridgeState::Failed;
                    return Some(Err(BridgeError::NotStarted));
                }
                BridgeState::Completed | BridgeState::Failed => return None,
                BridgeState::Running => {
                    let wake = {
                        let (Some(rx), Some(task)) = (self.receiver.as_mut(), self.task.as_mut()) else {
                            self.state = BridgeState::Draining;
                            continue;
                        };
                        tokio::select! {
                            biased;
                            item = rx.recv() => Wake::Item(item),
                            joined = task => Wake::Finished(joined),
                        }
                    };
                    match wake {
                        Wake::Item(Some(item)) => return Some(Ok(self.render(item))),
                        Wake::Item(None) => {
                            if let Some(task) = self.task.as_mut() {
                                let joined = task.await;
                                self.finish(joined);
                            }
                            self.state = BridgeState::Draining;
                        }
                        Wake::Finished(joined) => self.finish(joined),
                    }
                }
                BridgeState::Draining => {
                    if let Some(item) = self.receiver.as_mut().and_then(|rx| rx.try_recv().ok()) {
                        return Some(Ok(self.render(item)));
                    }
                    return match self.outcome.take() {
                        Some(Err(e)) => {
                            self.state = BridgeState::Failed;
                            Some(Err(e))
                        }
                        Some(Ok(result)) => {
                            self.state = BridgeState::Completed;
                            self.done_message(result).map(Ok)
                        }
                        None => {
                            self.state = BridgeState::Completed;
                            None
                        }
                    };
                }
            }
        }
    }

    fn finish(&mut self, joined: std::result::Result<Result<Option<Value>>, JoinError>) {
        self.task = None;
        self.state = BridgeState::Draining;
        self.outcome = Some(match joined {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => {
                warn!(agent = self.agent.name(), error = %e, "Agent run failed");
                Err(BridgeError::Run(e))
            }
            Err(e) => {
                warn!(agent = self.agent.name(), error = %e, "Agent task died");
                Err(BridgeError::Join(e.to_string()))
            }
        });
    }

    fn render(&mut self, item: QueueItem) -> StructuredMessage {
        match item {
            QueueItem::Message(message) => message,
            QueueItem::Delta(delta) => {
                self.buffer.push_str(&delta);
                StructuredMessage::text(self.message_id.clone(), self.buffer.clone(), TextState::Streaming)
            }
        }
    }

    /// Final `done` text message, only when any text was streamed.
    fn done_message(&self, result: Option<Value>) -> Option<StructuredMessage> {
        if self.buffer.is_empty() {
            return None;
        }
        let text = match result {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(Value::String(_)) | Some(Value::Null) | None => self.buffer.clone(),
            Some(other) => match StructuredMessage::from_value(&other) {
                Some(message) => message.text_content().unwrap_or_default(),
                None => other.to_string(),
            },
        };
        Some(StructuredMessage::text(self.message_id.clone(), text, TextState::Done))
    }

    /// Drain the whole run.
    pub async fn collect(mut self) -> std::result::Result<Vec<StructuredMessage>, BridgeError> {
        let mut messages = Vec::new();
        while let Some(message) = self.next().await {
            messages.push(message?);
        }
        Ok(messages)
    }

    pub fn into_stream(self) -> impl Stream<Item = std::result::Result<StructuredMessage, BridgeError>> + Send {
        futures::stream::unfold(self, |mut bridge| async move {
            let item = bridge.next().await?;
            Some((item, bridge))
        })
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        if let Some(task) = self.task.take()
            && !task.is_finished()
        {
            debug!(agent = self.agent.name(), "Bridge dropped mid-run, cancelling");
            self.agent.handle().cancellation().cancel();
            task.abort();
        }
    }
}
