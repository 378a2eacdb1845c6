//! Chat-model layer: wire types, streaming decode, and the HTTP client.
//!
//! Everything the reasoning loop needs to talk to an OpenAI-compatible
//! streaming chat endpoint lives here. Provider output is normalized to
//! [`ChatEvent`] so the rest of the crate never sees SSE or vendor JSON.

pub mod chat;
pub mod error;
pub mod events;
pub mod message;
pub mod sse;

pub use chat::{ChatBackend, ChatEventStream, OpenAiChatClient, ToolDescriptor};
pub use error::LlmError;
pub use events::{ChatEvent, FinishReason};
pub use message::{AssistantToolCall, Message, Role};
