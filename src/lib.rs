//! Brio: real-time spoken-dialog agent core.
//!
//! Turns a streaming LLM token feed into ordered speech through a
//! bounded, interruptible pipeline:
//!
//! ```text
//! user turn -> reasoning loop -> sentence splitter -> synth workers -> ordered player -> speaker
//! ```
//!
//! The pieces:
//! - **Reasoning loop**: multi-round tool calling against an
//!   OpenAI-compatible streaming chat endpoint, forwarding assistant
//!   text to the splitter as it arrives
//! - **Pipeline**: sentence splitter, bounded queues, a synth worker
//!   pool, and a strictly-ordered player with barge-in support
//! - **Supervisor**: per-turn deadlines that preserve conversational
//!   memory, transcript persistence, and cleanup on every exit path
//!
//! Microphone capture, voice-activity detection, and speech recognition
//! live outside the core; the [`synth::Transcriber`] trait is the seam.

pub mod audio;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod reasoning;
pub mod session;
pub mod synth;
pub mod test_utils;
pub mod tools;

pub use config::Config;
pub use error::{AgentError, Result};
pub use session::{SessionState, Supervisor, TurnSummary};
pub use reasoning::TurnOutcome;
