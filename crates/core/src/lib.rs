//! # agentwire core
//!
//! Domain types, traits, and error definitions shared by every agentwire crate.
//!
//! The crate defines three seams that the rest of the workspace implements
//! against:
//! - [`Provider`]: a chat-completion backend
//! - [`Tool`]: a named capability a reasoning loop may invoke
//! - [`ReasoningLoop`]: a background run that reports progress through a
//!   [`LoopHandle`]
//!
//! It also owns the wire-level [`StructuredMessage`] model that the gateway
//! streams to clients.

pub mod agent;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod ui_message;

// Re-export key types at crate root for ergonomics
pub use agent::{CompletionFlag, LoopHandle, OutputQueue, OutputSender, QueueItem, ReasoningLoop};
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolDefinition};
pub use tool::{Tool, ToolCall, ToolRegistry};
pub use ui_message::{Part, StructuredMessage, TextPart, TextState, ToolPart, ToolState, UiRole};
