//! Configuration types for the dialog-agent core.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AgentError, Result};

/// Top-level configuration for the agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat model endpoint settings.
    pub chat: ChatConfig,
    /// Text-to-speech settings.
    pub tts: TtsConfig,
    /// Streaming pipeline settings.
    pub pipeline: PipelineConfig,
    /// Session lifecycle settings.
    pub session: SessionConfig,
    /// Prompt file locations.
    pub prompts: PromptsConfig,
}

/// Chat model endpoint configuration (OpenAI-compatible).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Base URL of the chat endpoint (e.g. `https://api.openai.com`).
    pub base_url: String,
    /// API key. Overridden by `BRIO_CHAT_API_KEY` when set.
    pub api_key: String,
    /// Model identifier sent with each request.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Per-request timeout in seconds.
    pub timeout_s: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".into(),
            api_key: String::new(),
            model: "gpt-4o-mini".into(),
            temperature: 0.0,
            timeout_s: 60,
        }
    }
}

/// Which TTS provider adapter to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    /// Edge speech endpoint (no API key).
    #[default]
    Edge,
    /// Azure Cognitive Services speech endpoint.
    Azure,
    /// OpenAI `/v1/audio/speech` endpoint.
    OpenAi,
}

/// Text-to-speech configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Provider adapter selection.
    pub provider: TtsProvider,
    /// Default voice identifier.
    pub voice: String,
    /// Speaking rate adjustment (e.g. `"+0%"`).
    pub rate: String,
    /// Volume adjustment (e.g. `"+0%"`).
    pub volume: String,
    /// API key for providers that need one. Overridden by `BRIO_TTS_API_KEY`.
    pub api_key: String,
    /// Service region for providers that need one (Azure).
    pub region: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: TtsProvider::Edge,
            voice: "en-US-AriaNeural".into(),
            rate: "+0%".into(),
            volume: "+0%".into(),
            api_key: String::new(),
            region: String::new(),
        }
    }
}

/// Streaming pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Capacity of the text segment queue.
    pub text_q_size: usize,
    /// Capacity of the synthesized audio queue.
    pub audio_q_size: usize,
    /// Maximum concurrent in-flight synthesis requests.
    pub max_tasks: usize,
    /// Minimum segment length in characters (below this, segments merge
    /// into the following one except at turn end).
    pub min_chunk: usize,
    /// Maximum segment length in characters before a forced split.
    pub max_chunk: usize,
    /// Per-segment synthesis timeout in seconds.
    pub gen_timeout_s: u64,
    /// Per-chunk playback timeout in seconds.
    pub play_timeout_s: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            text_q_size: 15,
            audio_q_size: 10,
            max_tasks: 50,
            min_chunk: 3,
            max_chunk: 150,
            gen_timeout_s: 15,
            play_timeout_s: 30,
        }
    }
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Deadline in seconds for the reasoning loop to produce its last
    /// assistant character.
    pub reasoning_timeout_s: u64,
    /// Deadline in seconds for the pipeline to drain after the reasoning
    /// loop returns.
    pub tts_wait_timeout_s: u64,
    /// Directory for persisted session records.
    pub persist_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reasoning_timeout_s: 60,
            tts_wait_timeout_s: 30,
            persist_dir: PathBuf::from("sessions/"),
        }
    }
}

/// Prompt file locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Path to the system prompt file. Empty means the built-in default.
    pub system_prompt_path: PathBuf,
}

impl Config {
    /// Load configuration from a TOML file, then apply environment
    /// overrides for the API keys.
    ///
    /// A missing file yields the defaults; a malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)?;
            toml::from_str(&text)
                .map_err(|e| AgentError::Config(format!("{}: {e}", path.display())))?
        } else {
            Self::default()
        };
        if let Ok(key) = std::env::var("BRIO_CHAT_API_KEY") {
            config.chat.api_key = key;
        }
        if let Ok(key) = std::env::var("BRIO_TTS_API_KEY") {
            config.tts.api_key = key;
        }
        Ok(config)
    }

    /// Check that required options are present. Fails fast before any
    /// network resource is acquired.
    pub fn validate(&self) -> Result<()> {
        if self.chat.base_url.is_empty() {
            return Err(AgentError::Config("chat.base_url must not be empty".into()));
        }
        if self.chat.model.is_empty() {
            return Err(AgentError::Config("chat.model must not be empty".into()));
        }
        if self.tts.provider == TtsProvider::Azure && self.tts.region.is_empty() {
            return Err(AgentError::Config(
                "tts.region is required for the azure provider".into(),
            ));
        }
        if self.pipeline.min_chunk >= self.pipeline.max_chunk {
            return Err(AgentError::Config(
                "pipeline.min_chunk must be smaller than pipeline.max_chunk".into(),
            ));
        }
        if self.pipeline.text_q_size == 0 || self.pipeline.audio_q_size == 0 {
            return Err(AgentError::Config("pipeline queue sizes must be > 0".into()));
        }
        Ok(())
    }

    /// Read the system prompt, falling back to the built-in default when
    /// no path is configured or the file is unreadable.
    pub fn system_prompt(&self) -> String {
        if !self.prompts.system_prompt_path.as_os_str().is_empty()
            && let Ok(text) = std::fs::read_to_string(&self.prompts.system_prompt_path)
        {
            return text;
        }
        DEFAULT_SYSTEM_PROMPT.to_owned()
    }
}

/// Built-in system prompt used when no prompt file is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful voice assistant. \
Answer briefly and conversationally; your replies are spoken aloud. \
Avoid markdown, code blocks, and URLs. \
When the user switches language, call the detectLanguageAndSelectVoice tool.";
