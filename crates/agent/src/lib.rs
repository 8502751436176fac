//! Agent runtime for agentwire.
//!
//! A request is served by a [`ReactLoop`] built by the [`AgentFactory`]:
//!
//! 1. **Build**: resolve provider, model and toolkits; wrap every tool for
//!    call tracking; add the delegation tool when sub-agents are requested
//! 2. **Run**: the [`EventBridge`] starts the loop in a background task
//! 3. **Stream**: text deltas and tool lifecycle events come out of the
//!    bridge as structured messages, ready for a protocol adapter
//!
//! The run ends when the model answers without calling tools, the step
//! limit is reached, the run fails, or the client goes away.

pub mod bridge;
pub mod delegation;
pub mod factory;
pub mod lifecycle;
pub mod react;
pub mod tool_call;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use bridge::{BridgeError, BridgeState, EventBridge};
pub use delegation::{SUB_AGENT_TOOL_NAME, SubAgentRegistry, SubAgentTool};
pub use factory::{AgentFactory, AgentRequest, DEFAULT_SYSTEM_PROMPT, SubAgentSpec};
pub use lifecycle::{EventSink, LifecycleError, ToolCallRecord};
pub use react::ReactLoop;
pub use tool_call::{SESSION_ID_ARG, ToolCache, ToolCallWrapper, ToolContext, WrappedTools, wrap_tools_for_calls};
