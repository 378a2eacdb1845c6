//! Error types for the dialog-agent core.

/// Top-level error type for the spoken-dialog system.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Audio device or playback error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech synthesis error.
    #[error("synthesis error: {0}")]
    Synth(String),

    /// Transcription error.
    #[error("transcription error: {0}")]
    Transcribe(String),

    /// Chat model error.
    #[error("chat error: {0}")]
    Chat(#[from] crate::llm::LlmError),

    /// Tool lookup, validation, or execution error.
    #[error("tool error: {0}")]
    Tool(String),

    /// Pipeline coordination error.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Session persistence error.
    #[error("session error: {0}")]
    Session(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AgentError>;
