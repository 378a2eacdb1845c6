//! Transcription interface, invoked once per user utterance before the
//! reasoning loop. Capture and voice-activity detection live outside
//! the core; this only defines the seam and one thin HTTP adapter.

use async_trait::async_trait;

use crate::error::{AgentError, Result};

/// A transcribed user utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcription {
    /// The recognized text.
    pub text: String,
    /// Detected language, when the service reports one.
    pub language: Option<String>,
}

/// Speech-to-text capability.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe an audio blob, optionally biased by a language hint.
    async fn transcribe(&self, audio: Vec<u8>, hint: Option<&str>) -> Result<Transcription>;
}

/// OpenAI-compatible `/v1/audio/transcriptions` adapter.
pub struct OpenAiTranscriber {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiTranscriber {
    /// Create an adapter over a shared HTTP client.
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: "https://api.openai.com".into(),
            api_key: api_key.into(),
            model: "whisper-1".into(),
        }
    }

    /// Override the base URL (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(&self, audio: Vec<u8>, hint: Option<&str>) -> Result<Transcription> {
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| AgentError::Transcribe(e.to_string()))?;
        let mut form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .part("file", part);
        if let Some(hint) = hint {
            form = form.text("language", hint.to_owned());
        }

        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| AgentError::Transcribe(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Transcribe(format!("HTTP {status}: {body}")));
        }

        let parsed: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AgentError::Transcribe(format!("bad response body: {e}")))?;
        Ok(Transcription {
            text: parsed
                .get("text")
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_owned(),
            language: parsed
                .get("language")
                .and_then(|l| l.as_str())
                .map(str::to_owned),
        })
    }
}
