//! Reasoning loop: multi-round tool calling against the chat model,
//! streaming assistant text into the TTS pipeline as it arrives.

pub mod accumulator;
pub mod engine;

pub use accumulator::{CompletedToolCall, RoundAccumulator, RoundOutcome};
pub use engine::{APOLOGY, ReasoningConfig, ReasoningLoop, ToolCallLog, TurnOutcome, TurnReport};
