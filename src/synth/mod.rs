//! Speech synthesis and transcription interfaces.
//!
//! The core never parses audio: a [`Synthesizer`] turns text into an
//! opaque decodable blob in its declared [`AudioFormat`], and the OS
//! audio layer plays it. Concrete adapters are thin HTTP shims over a
//! shared connection pool; vendors stay replaceable.

mod http;
mod transcribe;

pub use http::{AzureSynthesizer, EdgeSynthesizer, OpenAiSynthesizer, build_synthesizer};
pub use transcribe::{OpenAiTranscriber, Transcriber, Transcription};

use async_trait::async_trait;

/// Audio container format a synthesizer produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// MPEG audio (typically mono 24 kHz).
    Mp3,
    /// RIFF WAV, 16-bit PCM.
    Wav,
}

/// Errors from a synthesis adapter.
#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    /// Transport-level failure (connect, reset, DNS).
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP response.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Status code returned.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The text cannot be synthesized (empty, too long, bad SSML).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl SynthError {
    /// Whether the single-retry policy applies: transport failures and
    /// 5xx responses are transient; 4xx and malformed input are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => *status >= 500,
            Self::InvalidInput(_) => false,
        }
    }
}

/// Text-to-speech capability consumed by the synth worker pool.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// The container format of blobs this synthesizer returns.
    fn format(&self) -> AudioFormat;

    /// Synthesize `text` with the given voice, returning the audio blob.
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, SynthError>;
}
