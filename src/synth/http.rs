//! Thin HTTP adapters for the supported TTS providers.
//!
//! Each adapter maps `(text, voice_id)` onto one vendor request shape
//! and returns the raw audio bytes. All of them share the process-wide
//! reqwest client for connection pooling.

use async_trait::async_trait;

use crate::config::{TtsConfig, TtsProvider};
use crate::error::{AgentError, Result};

use super::{AudioFormat, SynthError, Synthesizer};

/// Build the configured synthesizer over a shared HTTP client.
pub fn build_synthesizer(
    config: &TtsConfig,
    client: reqwest::Client,
) -> Result<std::sync::Arc<dyn Synthesizer>> {
    match config.provider {
        TtsProvider::Edge => Ok(std::sync::Arc::new(EdgeSynthesizer::new(config, client))),
        TtsProvider::Azure => {
            if config.api_key.is_empty() {
                return Err(AgentError::Config(
                    "tts.api_key is required for the azure provider".into(),
                ));
            }
            Ok(std::sync::Arc::new(AzureSynthesizer::new(config, client)))
        }
        TtsProvider::OpenAi => {
            if config.api_key.is_empty() {
                return Err(AgentError::Config(
                    "tts.api_key is required for the openai provider".into(),
                ));
            }
            Ok(std::sync::Arc::new(OpenAiSynthesizer::new(config, client)))
        }
    }
}

fn check_text(text: &str) -> std::result::Result<(), SynthError> {
    if text.trim().is_empty() {
        return Err(SynthError::InvalidInput("empty text".into()));
    }
    Ok(())
}

/// Escape the five XML-special characters for SSML bodies.
fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn ssml_body(text: &str, voice_id: &str, rate: &str, volume: &str) -> String {
    format!(
        "<speak version='1.0' xml:lang='en-US'>\
         <voice name='{voice_id}'>\
         <prosody rate='{rate}' volume='{volume}'>{}</prosody>\
         </voice></speak>",
        xml_escape(text)
    )
}

async fn read_audio_response(
    response: std::result::Result<reqwest::Response, reqwest::Error>,
) -> std::result::Result<Vec<u8>, SynthError> {
    let response = response.map_err(|e| SynthError::Transport(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(SynthError::Http {
            status: status.as_u16(),
            message,
        });
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| SynthError::Transport(e.to_string()))?;
    Ok(bytes.to_vec())
}

// ── Edge ──────────────────────────────────────────────────────

/// Edge speech endpoint adapter. No API key; SSML in, MP3 out.
pub struct EdgeSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    rate: String,
    volume: String,
}

impl EdgeSynthesizer {
    /// Create an adapter from config.
    pub fn new(config: &TtsConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: "https://speech.platform.bing.com/consumer/speech/synthesize/\
                       readaloud/edge/v1"
                .into(),
            rate: config.rate.clone(),
            volume: config.volume.clone(),
        }
    }

    /// Override the endpoint (tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Synthesizer for EdgeSynthesizer {
    fn format(&self) -> AudioFormat {
        AudioFormat::Mp3
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> std::result::Result<Vec<u8>, SynthError> {
        check_text(text)?;
        let body = ssml_body(text, voice_id, &self.rate, &self.volume);
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", "audio-24khz-48kbitrate-mono-mp3")
            .body(body)
            .send()
            .await;
        read_audio_response(response).await
    }
}

// ── Azure ─────────────────────────────────────────────────────

/// Azure Cognitive Services speech adapter.
pub struct AzureSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    rate: String,
    volume: String,
}

impl AzureSynthesizer {
    /// Create an adapter from config; the endpoint derives from the region.
    pub fn new(config: &TtsConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: format!(
                "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
                config.region
            ),
            api_key: config.api_key.clone(),
            rate: config.rate.clone(),
            volume: config.volume.clone(),
        }
    }

    /// Override the endpoint (tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Synthesizer for AzureSynthesizer {
    fn format(&self) -> AudioFormat {
        AudioFormat::Mp3
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> std::result::Result<Vec<u8>, SynthError> {
        check_text(text)?;
        let body = ssml_body(text, voice_id, &self.rate, &self.volume);
        let response = self
            .client
            .post(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", "audio-24khz-48kbitrate-mono-mp3")
            .body(body)
            .send()
            .await;
        read_audio_response(response).await
    }
}

// ── OpenAI ────────────────────────────────────────────────────

/// OpenAI `/v1/audio/speech` adapter.
pub struct OpenAiSynthesizer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiSynthesizer {
    /// Create an adapter from config.
    pub fn new(config: &TtsConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: "https://api.openai.com".into(),
            api_key: config.api_key.clone(),
        }
    }

    /// Override the base URL (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Synthesizer for OpenAiSynthesizer {
    fn format(&self) -> AudioFormat {
        AudioFormat::Mp3
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> std::result::Result<Vec<u8>, SynthError> {
        check_text(text)?;
        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": "tts-1",
                "input": text,
                "voice": voice_id,
                "response_format": "mp3",
            }))
            .send()
            .await;
        read_audio_response(response).await
    }
}
