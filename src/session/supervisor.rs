//! Session supervisor: owns the reasoning loop and pipeline for one
//! conversation, enforces per-turn deadlines, and persists transcripts.
//!
//! Lifecycle: `idle -> started -> turn_in_progress -> started -> ... ->
//! ended`. Every exit from a turn returns to `started` (or `ended` when
//! the model asked to stop), success or failure. Deadlines never
//! destroy conversational memory: a reasoning timeout keeps history up
//! to the last completed assistant text, a TTS drain timeout keeps the
//! assistant message verbatim.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::audio::Player;
use crate::config::Config;
use crate::error::Result;
use crate::llm::{ChatBackend, Message};
use crate::pipeline::{Interrupt, PipelineHandle, SentenceSplitter, SplitterConfig, StatsSnapshot};
use crate::reasoning::{APOLOGY, ReasoningConfig, ReasoningLoop, TurnOutcome};
use crate::session::record::SessionRecord;
use crate::session::store::SessionStore;
use crate::synth::Synthesizer;
use crate::tools::builtin::{CalculatorTool, ClockTool};
use crate::tools::voice::SelectVoiceTool;
use crate::tools::{ToolRegistry, VoiceState};

/// Bounded wait for barge-in drains and notice playback.
const FLUSH_WAIT: Duration = Duration::from_millis(500);
const NOTICE_WAIT: Duration = Duration::from_secs(5);

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed but not yet started.
    Idle,
    /// Ready for the next user utterance.
    Started,
    /// A turn is running.
    TurnInProgress,
    /// The conversation is over; no further turns are accepted.
    Ended,
}

/// What the caller learns about a finished turn.
#[derive(Debug, Clone)]
pub struct TurnSummary {
    /// Unique turn id.
    pub turn_id: String,
    /// How the turn resolved.
    pub outcome: TurnOutcome,
    /// All assistant text the turn produced.
    pub assistant_text: String,
    /// Wall-clock duration including audio drain.
    pub duration_ms: u64,
    /// Number of tool invocations.
    pub tool_call_count: usize,
    /// The session is over after this turn.
    pub session_ended: bool,
}

/// Owns one chat session end to end.
pub struct Supervisor {
    config: Config,
    history: Vec<Message>,
    splitter: SentenceSplitter,
    engine: ReasoningLoop,
    pipeline: PipelineHandle,
    interrupt: Interrupt,
    voice: VoiceState,
    store: SessionStore,
    record: SessionRecord,
    state: SessionState,
}

impl Supervisor {
    /// Build the tool set, reasoning loop, and pipeline, then resume the
    /// newest persisted session if one exists.
    pub async fn start(
        config: Config,
        chat: Arc<dyn ChatBackend>,
        synthesizer: Arc<dyn Synthesizer>,
        player: Arc<dyn Player>,
    ) -> Result<Self> {
        config.validate()?;

        let interrupt = Interrupt::new();
        let voice = VoiceState::new(&config.tts.voice);

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ClockTool));
        registry.register(Arc::new(CalculatorTool));
        registry.register(Arc::new(SelectVoiceTool::new(voice.clone())));
        let registry = Arc::new(registry);

        let engine = ReasoningLoop::new(
            chat,
            registry,
            ReasoningConfig::default(),
            interrupt.clone(),
        );
        let pipeline = PipelineHandle::start(
            &config.pipeline,
            synthesizer,
            player,
            voice.clone(),
            interrupt.clone(),
        );
        let splitter = SentenceSplitter::new(SplitterConfig::from_pipeline(&config.pipeline));
        let store = SessionStore::new(&config.session.persist_dir)?;

        let mut history = vec![Message::system(config.system_prompt())];
        let record = match store.load_latest()? {
            Some(previous) => {
                info!(
                    session_id = %previous.session_id,
                    turns = previous.turns,
                    "resuming persisted session"
                );
                history.extend(previous.to_messages());
                previous
            }
            None => SessionRecord::new(&config.chat.model),
        };

        Ok(Self {
            config,
            history,
            splitter,
            engine,
            pipeline,
            interrupt,
            voice,
            store,
            record,
            state: SessionState::Started,
        })
    }

    /// Run one user turn through reasoning and playback.
    pub async fn run_turn(&mut self, user_text: &str) -> TurnSummary {
        if self.state == SessionState::Ended {
            return TurnSummary {
                turn_id: uuid::Uuid::new_v4().to_string(),
                outcome: TurnOutcome::Cancelled,
                assistant_text: String::new(),
                duration_ms: 0,
                tool_call_count: 0,
                session_ended: true,
            };
        }

        let started = Instant::now();
        self.state = SessionState::TurnInProgress;
        // A barge-in from the previous turn is consumed here; the new
        // turn starts with a clean flag and fresh sequences.
        self.interrupt.clear();

        let deadline = started + Duration::from_secs(self.config.session.reasoning_timeout_s);
        let report = self
            .engine
            .run_turn(
                &mut self.history,
                &mut self.splitter,
                &self.pipeline,
                user_text,
                deadline,
            )
            .await;

        let mut outcome = report.outcome;
        match outcome {
            TurnOutcome::Completed | TurnOutcome::Failed => {
                let drain = Duration::from_secs(self.config.session.tts_wait_timeout_s);
                if !self.pipeline.wait_drained(drain).await {
                    warn!(
                        turn_id = %report.turn_id,
                        "pipeline did not drain within {}s; interrupting",
                        drain.as_secs()
                    );
                    self.flush_pipeline().await;
                    if outcome == TurnOutcome::Completed {
                        // Assistant text is already in history and stays.
                        outcome = TurnOutcome::TimedOut;
                        self.speak_notice().await;
                    }
                }
            }
            TurnOutcome::TimedOut => {
                self.flush_pipeline().await;
                self.speak_notice().await;
            }
            TurnOutcome::Cancelled => {
                // Barge-in: the raiser's flag is still up; make sure the
                // stages drained, then get ready for the next turn.
                self.flush_pipeline().await;
            }
        }

        if matches!(outcome, TurnOutcome::Completed | TurnOutcome::TimedOut) {
            self.record.turns += 1;
            self.record.set_history(&self.history);
            if let Err(e) = self.store.save(&self.record) {
                // A save failure never fails a turn.
                warn!("session persist failed: {e}");
            }
        }

        let session_ended = report.should_end;
        self.state = if session_ended {
            SessionState::Ended
        } else {
            SessionState::Started
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let stats = self.pipeline.snapshot();
        info!(
            turn_id = %report.turn_id,
            outcome = %outcome,
            duration_ms,
            tool_calls = report.tool_calls.len(),
            rounds = report.rounds,
            text_received = stats.text_received,
            text_dropped = stats.text_dropped,
            audio_played = stats.audio_played,
            audio_failed = stats.audio_failed,
            "turn complete"
        );

        TurnSummary {
            turn_id: report.turn_id,
            outcome,
            assistant_text: report.assistant_text,
            duration_ms,
            tool_call_count: report.tool_calls.len(),
            session_ended,
        }
    }

    /// Raise-and-drain: stop playback, empty both queues and the
    /// splitter, then lower the flag so the pipeline is ready again.
    async fn flush_pipeline(&mut self) {
        self.interrupt.raise();
        self.splitter.clear();
        let deadline = Instant::now() + FLUSH_WAIT;
        loop {
            let stats = self.pipeline.snapshot();
            if stats.text_q_depth == 0 && stats.audio_q_depth == 0 && stats.active_workers == 0 {
                break;
            }
            if Instant::now() >= deadline {
                warn!("pipeline flush incomplete after {}ms", FLUSH_WAIT.as_millis());
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.interrupt.clear();
    }

    /// Speak the fixed apology so a failed or timed-out turn never ends
    /// in dead air.
    async fn speak_notice(&mut self) {
        for segment in self.splitter.ingest(APOLOGY, true) {
            self.pipeline.submit(segment).await;
        }
        let _ = self.pipeline.wait_drained(NOTICE_WAIT).await;
    }

    /// A clonable handle for external barge-in (VAD, push-to-talk).
    pub fn interrupt_handle(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current voice selection.
    pub fn voice(&self) -> VoiceState {
        self.voice.clone()
    }

    /// Pipeline counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.pipeline.snapshot()
    }

    /// The conversation as it stands (system prompt included).
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Stop playback, stop the stages, and persist one last time.
    pub async fn shutdown(mut self) -> Result<()> {
        self.interrupt.raise();
        let grace = Duration::from_secs(self.config.pipeline.play_timeout_s);
        self.pipeline.shutdown(grace).await;
        if self.record.turns > 0 {
            self.record.set_history(&self.history);
            if let Err(e) = self.store.save(&self.record) {
                warn!("final session persist failed: {e}");
            }
        }
        info!("session ended");
        Ok(())
    }
}
