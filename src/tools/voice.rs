//! Voice selection: the shared voice state and the language-switch tool.
//!
//! The voice id is the only mutable state shared between tools and synth
//! workers. It is written here and read by each worker at the moment of
//! synthesis, so a switch takes effect from the next segment without
//! flushing in-flight audio.

use std::sync::{Arc, RwLock};

use crate::error::{AgentError, Result};

use super::Tool;

/// Language to voice-id mapping.
const VOICE_TABLE: &[(&str, &str)] = &[
    ("chinese", "zh-CN-XiaoxiaoNeural"),
    ("english", "en-US-AriaNeural"),
    ("japanese", "ja-JP-NanamiNeural"),
    ("spanish", "es-ES-ElviraNeural"),
    ("french", "fr-FR-DeniseNeural"),
    ("vietnamese", "vi-VN-HoaiMyNeural"),
];

/// An immutable voice selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// Language name in lowercase (e.g. "english").
    pub language: String,
    /// Vendor voice identifier (e.g. "en-US-AriaNeural").
    pub voice_id: String,
}

impl Voice {
    /// Look up the voice for a language name, case-insensitive.
    pub fn for_language(language: &str) -> Option<Self> {
        let key = language.trim().to_lowercase();
        VOICE_TABLE
            .iter()
            .find(|(lang, _)| *lang == key)
            .map(|(lang, id)| Self {
                language: (*lang).to_owned(),
                voice_id: (*id).to_owned(),
            })
    }
}

/// Shared, atomically-replaceable voice selection.
#[derive(Debug, Clone)]
pub struct VoiceState {
    inner: Arc<RwLock<Voice>>,
}

impl VoiceState {
    /// Create from an explicit voice id (language unknown).
    pub fn new(voice_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Voice {
                language: String::new(),
                voice_id: voice_id.into(),
            })),
        }
    }

    /// The current selection.
    pub fn current(&self) -> Voice {
        self.inner.read().expect("voice lock poisoned").clone()
    }

    /// The current voice id.
    pub fn voice_id(&self) -> String {
        self.current().voice_id
    }

    /// Replace the selection.
    pub fn set(&self, voice: Voice) {
        *self.inner.write().expect("voice lock poisoned") = voice;
    }
}

/// First-class tool the model calls to switch speaking language.
///
/// The name is deliberately camelCase with no underscores so it
/// survives the splitter's markdown cleaning if ever echoed as text.
pub struct SelectVoiceTool {
    state: VoiceState,
}

impl SelectVoiceTool {
    /// Create a selector over the shared voice state.
    pub fn new(state: VoiceState) -> Self {
        Self { state }
    }
}

impl Tool for SelectVoiceTool {
    fn name(&self) -> &str {
        "detectLanguageAndSelectVoice"
    }

    fn description(&self) -> &str {
        "Switch the assistant's speaking voice to match the conversation \
         language. Call this when the user speaks or requests a different \
         language. Supported: chinese, english, japanese, spanish, french, \
         vietnamese."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "language": {
                    "type": "string",
                    "description": "Detected conversation language, lowercase"
                },
                "reason": {
                    "type": "string",
                    "description": "Why the switch is needed"
                }
            },
            "required": ["language"]
        })
    }

    fn invoke(&self, args: serde_json::Value) -> Result<String> {
        let language = args
            .get("language")
            .and_then(|l| l.as_str())
            .unwrap_or_default();
        let voice = Voice::for_language(language).ok_or_else(|| {
            AgentError::Tool(format!(
                "unsupported language '{language}'; supported: chinese, english, \
                 japanese, spanish, french, vietnamese"
            ))
        })?;
        let voice_id = voice.voice_id.clone();
        self.state.set(voice);
        Ok(format!("voice switched to {voice_id}"))
    }
}
