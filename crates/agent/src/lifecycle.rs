//! Tool call lifecycle records and the sink their events are reported to.

use agentwire_core::agent::OutputSender;
use agentwire_core::ui_message::{StructuredMessage, ToolPart, ToolState};
use serde_json::Value;
use std::sync::RwLock;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq)]
pub enum LifecycleError {
    #[error("tool call {call_id}: cannot move from {from} to {to}")]
    InvalidTransition {
        call_id: String,
        from: ToolState,
        to: ToolState,
    },
}

/// One tool invocation as seen by clients.
///
/// The state only moves forward and never leaves a terminal state.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub call_id: String,
    pub input: Value,
    state: Option<ToolState>,
}

impl ToolCallRecord {
    /// A record under a fresh call id, before its first event.
    pub fn new(tool_name: impl Into<String>, input: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            call_id: Uuid::new_v4().to_string(),
            input,
            state: None,
        }
    }

    pub fn state(&self) -> Option<ToolState> {
        self.state
    }

    pub fn advance(&mut self, next: ToolState) -> Result<(), LifecycleError> {
        if let Some(current) = self.state
            && (current.is_terminal() || next.rank() <= current.rank())
        {
            return Err(LifecycleError::InvalidTransition {
                call_id: self.call_id.clone(),
                from: current,
                to: next,
            });
        }
        self.state = Some(next);
        Ok(())
    }

    /// Advance to `next` and render the event message for it.
    pub fn transition(
        &mut self,
        next: ToolState,
        output: Option<Value>,
        error_text: Option<String>,
    ) -> Result<StructuredMessage, LifecycleError> {
        self.advance(next)?;
        Ok(StructuredMessage::tool(ToolPart {
            tool_call_id: self.call_id.clone(),
            tool_name: self.tool_name.clone(),
            state: next,
            input: self.input.clone(),
            output: if next == ToolState::OutputAvailable { output } else { None },
            error_text,
        }))
    }
}

/// Attachable destination for lifecycle events.
///
/// Tools are built before the loop whose queue they report to, so the sender
/// is attached afterwards. Reports made while detached are dropped.
#[derive(Debug, Default)]
pub struct EventSink {
    slot: RwLock<Option<OutputSender>>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, sender: OutputSender) {
        match self.slot.write() {
            Ok(mut slot) => *slot = Some(sender),
            Err(poisoned) => *poisoned.into_inner() = Some(sender),
        }
    }

    /// Move `record` to `next` and send the resulting event, if attached.
    ///
    /// Invalid transitions are logged and not sent.
    pub fn report(
        &self,
        record: &mut ToolCallRecord,
        next: ToolState,
        output: Option<Value>,
        error_text: Option<String>,
    ) {
        let message = match record.transition(next, output, error_text) {
            Ok(message) => message,
            Err(e) => {
                warn!(tool = %record.tool_name, error = %e, "Dropping out-of-order lifecycle event");
                return;
            }
        };
        if let Ok(slot) = self.slot.read()
            && let Some(sender) = slot.as_ref()
        {
            sender.send_message(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentwire_core::agent::{OutputQueue, QueueItem};
    use agentwire_core::ui_message::Part;
    use serde_json::json;

    #[test]
    fn forward_transitions_are_accepted() {
        let mut record = ToolCallRecord::new("calc", json!({}));
        assert!(record.advance(ToolState::InputStreaming).is_ok());
        assert!(record.advance(ToolState::InputAvailable).is_ok());
        assert!(record.advance(ToolState::OutputAvailable).is_ok());
        assert_eq!(record.state(), Some(ToolState::OutputAvailable));
    }

    #[test]
    fn terminal_state_is_final() {
        let mut record = ToolCallRecord::new("calc", json!({}));
        record.advance(ToolState::OutputError).unwrap();
        let err = record.advance(ToolState::OutputAvailable).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
        assert_eq!(record.state(), Some(ToolState::OutputError));
    }

    #[test]
    fn backwards_and_repeated_transitions_are_rejected() {
        let mut record = ToolCallRecord::new("calc", json!({}));
        record.advance(ToolState::InputAvailable).unwrap();
        assert!(record.advance(ToolState::InputAvailable).is_err());
        assert!(record.advance(ToolState::InputStreaming).is_err());
    }

    #[test]
    fn transition_only_carries_output_when_available() {
        let mut record = ToolCallRecord::new("calc", json!({"expression": "1"}));
        let msg = record
            .transition(ToolState::InputAvailable, Some(json!("ignored")), None)
            .unwrap();
        let Part::Tool(part) = &msg.parts[0] else { panic!("expected tool part") };
        assert_eq!(part.output, None);
        assert_eq!(part.tool_call_id, record.call_id);
    }

    #[tokio::test]
    async fn detached_sink_drops_events() {
        let sink = EventSink::new();
        let mut record = ToolCallRecord::new("calc", json!({}));
        sink.report(&mut record, ToolState::InputAvailable, None, None);
        assert_eq!(record.state(), Some(ToolState::InputAvailable));

        let queue = OutputQueue::new();
        sink.attach(queue.sender());
        sink.report(&mut record, ToolState::OutputAvailable, Some(json!(1)), None);
        let mut rx = queue.take_receiver().await;
        let Ok(QueueItem::Message(msg)) = rx.try_recv() else { panic!("expected one event") };
        assert_eq!(msg.tool_parts().next().unwrap().state, ToolState::OutputAvailable);
        assert!(rx.try_recv().is_err());
    }
}
