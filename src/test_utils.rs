//! Shared test doubles used by unit and integration tests.
//!
//! Scripted stand-ins for the three external seams: the chat endpoint,
//! the synthesizer, and the speaker. Each records what it was asked to
//! do so tests can assert on call order and arguments.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::audio::Player;
use crate::error::Result;
use crate::llm::{
    ChatBackend, ChatEvent, ChatEventStream, FinishReason, LlmError, Message, ToolDescriptor,
};
use crate::synth::{AudioFormat, SynthError, Synthesizer};

// ── Chat ──────────────────────────────────────────────────────

/// Chat backend that replays scripted rounds of events.
pub struct ScriptedChat {
    rounds: Mutex<VecDeque<Vec<ChatEvent>>>,
    event_delay: Duration,
    requests: Mutex<Vec<Vec<Message>>>,
    fail_next: AtomicU64,
}

impl ScriptedChat {
    /// Create a backend that replays `rounds` in order.
    pub fn new(rounds: Vec<Vec<ChatEvent>>) -> Self {
        Self {
            rounds: Mutex::new(rounds.into()),
            event_delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            fail_next: AtomicU64::new(0),
        }
    }

    /// Sleep this long before each event (simulates a slow model).
    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = delay;
        self
    }

    /// Fail the next `n` send() calls with a retryable error.
    pub fn fail_next_sends(&self, n: u64) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Message lists of every request received, in order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Number of chat rounds performed.
    pub fn round_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

#[async_trait]
impl ChatBackend for ScriptedChat {
    async fn send(
        &self,
        messages: &[Message],
        _tools: &[ToolDescriptor],
    ) -> std::result::Result<ChatEventStream, LlmError> {
        if self.fail_next.load(Ordering::SeqCst) > 0 {
            self.fail_next.fetch_sub(1, Ordering::SeqCst);
            return Err(LlmError::Request("scripted connection reset".into()));
        }
        self.requests
            .lock()
            .expect("requests lock")
            .push(messages.to_vec());
        let round = self
            .rounds
            .lock()
            .expect("rounds lock")
            .pop_front()
            .unwrap_or_else(|| {
                vec![ChatEvent::StreamEnd {
                    finish_reason: FinishReason::Stop,
                }]
            });
        let delay = self.event_delay;
        let stream = futures_util::stream::unfold(
            (round.into_iter(), delay),
            |(mut events, delay)| async move {
                let next = events.next()?;
                if delay > Duration::ZERO {
                    tokio::time::sleep(delay).await;
                }
                Some((next, (events, delay)))
            },
        );
        Ok(Box::pin(stream))
    }
}

/// A round that streams `chunks` as text and stops.
pub fn text_round(chunks: &[&str]) -> Vec<ChatEvent> {
    let mut events: Vec<ChatEvent> = chunks
        .iter()
        .map(|c| ChatEvent::TextDelta {
            text: (*c).to_owned(),
        })
        .collect();
    events.push(ChatEvent::StreamEnd {
        finish_reason: FinishReason::Stop,
    });
    events
}

/// A round that requests a single tool call.
pub fn tool_round(call_id: &str, name: &str, args: &str) -> Vec<ChatEvent> {
    vec![
        ChatEvent::ToolCallStart {
            call_id: call_id.to_owned(),
            name: name.to_owned(),
        },
        ChatEvent::ToolCallArgsDelta {
            call_id: call_id.to_owned(),
            args: args.to_owned(),
        },
        ChatEvent::ToolCallEnd {
            call_id: call_id.to_owned(),
        },
        ChatEvent::StreamEnd {
            finish_reason: FinishReason::ToolCalls,
        },
    ]
}

// ── Synthesizer ───────────────────────────────────────────────

/// Synthesizer double: records `(text, voice_id)` calls, returns small
/// fake blobs, and can be told to fail or dawdle.
pub struct MockSynth {
    calls: Mutex<Vec<(String, String)>>,
    delay: Duration,
    fail_text: Option<String>,
}

impl MockSynth {
    /// A synthesizer that always succeeds instantly.
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            fail_text: None,
        }
    }

    /// Sleep this long per synthesis call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail (non-transiently) whenever the exact text is synthesized.
    pub fn with_failure(mut self, text: &str) -> Self {
        self.fail_text = Some(text.to_owned());
        self
    }

    /// Every `(text, voice_id)` synthesized so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl Default for MockSynth {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Synthesizer for MockSynth {
    fn format(&self) -> AudioFormat {
        AudioFormat::Mp3
    }

    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
    ) -> std::result::Result<Vec<u8>, SynthError> {
        if self.delay > Duration::ZERO {
            tokio::time::sleep(self.delay).await;
        }
        self.calls
            .lock()
            .expect("calls lock")
            .push((text.to_owned(), voice_id.to_owned()));
        if self.fail_text.as_deref() == Some(text) {
            return Err(SynthError::Http {
                status: 400,
                message: "scripted failure".into(),
            });
        }
        Ok(text.as_bytes().to_vec())
    }
}

// ── Player ────────────────────────────────────────────────────

/// Player double: records every blob, optionally blocks until stopped.
pub struct MockPlayer {
    played: Mutex<Vec<Vec<u8>>>,
    blocking: AtomicBool,
    stop_requested: AtomicBool,
    playing: AtomicBool,
}

impl MockPlayer {
    /// A player that finishes instantly.
    pub fn new() -> Self {
        Self {
            played: Mutex::new(Vec::new()),
            blocking: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            playing: AtomicBool::new(false),
        }
    }

    /// When true, `play` blocks until `stop` (or blocking is unset).
    pub fn set_blocking(&self, blocking: bool) {
        self.blocking.store(blocking, Ordering::SeqCst);
    }

    /// Every blob handed to `play`, in call order.
    pub fn played(&self) -> Vec<Vec<u8>> {
        self.played.lock().expect("played lock").clone()
    }
}

impl Default for MockPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Player for MockPlayer {
    fn play(&self, samples: &[u8]) -> Result<()> {
        self.played
            .lock()
            .expect("played lock")
            .push(samples.to_vec());
        self.playing.store(true, Ordering::SeqCst);
        loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                break;
            }
            if !self.blocking.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        self.stop_requested.store(false, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        if self.playing.load(Ordering::SeqCst) {
            self.stop_requested.store(true, Ordering::SeqCst);
        }
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}
