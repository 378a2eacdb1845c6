//! Streaming TTS pipeline: splitter, bounded queues, synth workers, and
//! the ordered player, wired together behind [`PipelineHandle`].
//!
//! ```text
//! reasoning loop ─segments─▶ text_q ─▶ synth workers ─chunks─▶ audio_q ─▶ player ─▶ speaker
//! ```
//!
//! Backpressure: a full `text_q` never blocks the reasoning loop for
//! more than ~100 ms; the segment is dropped and counted instead. A
//! full `audio_q` throttles workers to playback rate.

pub mod interrupt;
pub mod messages;
pub mod player;
pub mod splitter;
pub mod synth;

pub use interrupt::Interrupt;
pub use messages::{AudioChunk, ChunkStatus, PipelineStats, StatsSnapshot, TextSegment};
pub use splitter::{SentenceSplitter, SplitterConfig};

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::audio::Player;
use crate::config::PipelineConfig;
use crate::synth::Synthesizer;
use crate::tools::VoiceState;

use player::PlayerStage;
use synth::SynthStage;

/// How long a non-final segment may wait for queue space before being
/// dropped.
const SUBMIT_TIMEOUT: Duration = Duration::from_millis(100);

/// Poll interval for drain checks.
const DRAIN_POLL: Duration = Duration::from_millis(25);

/// Handle to a running pipeline: the submit side, counters, and the
/// shared interrupt token.
pub struct PipelineHandle {
    text_tx: mpsc::Sender<TextSegment>,
    /// Held only for the depth gauge.
    audio_gauge: mpsc::Sender<AudioChunk>,
    stats: Arc<PipelineStats>,
    interrupt: Interrupt,
    cancel: CancellationToken,
    final_seq: Arc<AtomicI64>,
    dropped: Arc<Mutex<HashSet<u64>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Construct the queues and start the worker and player stages.
    pub fn start(
        config: &PipelineConfig,
        synthesizer: Arc<dyn Synthesizer>,
        player: Arc<dyn Player>,
        voice: VoiceState,
        interrupt: Interrupt,
    ) -> Self {
        let (text_tx, text_rx) = mpsc::channel::<TextSegment>(config.text_q_size);
        let (audio_tx, audio_rx) = mpsc::channel::<AudioChunk>(config.audio_q_size);
        let stats = Arc::new(PipelineStats::default());
        let cancel = CancellationToken::new();
        let final_seq = Arc::new(AtomicI64::new(-1));
        let dropped = Arc::new(Mutex::new(HashSet::new()));

        let synth_stage = SynthStage {
            synth: synthesizer,
            voice,
            stats: Arc::clone(&stats),
            interrupt: interrupt.clone(),
            cancel: cancel.clone(),
            gen_timeout: Duration::from_secs(config.gen_timeout_s),
            max_tasks: config.max_tasks,
        };
        let player_stage = PlayerStage {
            player,
            stats: Arc::clone(&stats),
            interrupt: interrupt.clone(),
            cancel: cancel.clone(),
            final_seq: Arc::clone(&final_seq),
            dropped: Arc::clone(&dropped),
            play_timeout: Duration::from_secs(config.play_timeout_s),
        };

        let tasks = vec![
            tokio::spawn(synth::run_synth_stage(synth_stage, text_rx, audio_tx.clone())),
            tokio::spawn(player::run_player_stage(player_stage, audio_rx)),
        ];

        Self {
            text_tx,
            audio_gauge: audio_tx,
            stats,
            interrupt,
            cancel,
            final_seq,
            dropped,
            tasks,
        }
    }

    /// Hand a segment to the text queue.
    ///
    /// Non-final segments wait at most [`SUBMIT_TIMEOUT`] for space and
    /// are dropped (and counted) on overflow, so the reasoning loop is
    /// never stalled by slow synthesis. The end-of-turn segment always
    /// goes through: the player needs it to close out the turn.
    pub async fn submit(&self, segment: TextSegment) {
        PipelineStats::inc(&self.stats.text_received);
        if segment.is_final {
            self.final_seq
                .store(segment.sequence as i64, Ordering::SeqCst);
            if self.text_tx.send(segment).await.is_err() {
                warn!("text queue closed; final segment lost");
            }
            return;
        }
        let sequence = segment.sequence;
        if self.text_tx.send_timeout(segment, SUBMIT_TIMEOUT).await.is_err() {
            PipelineStats::inc(&self.stats.text_dropped);
            self.dropped
                .lock()
                .expect("dropped set lock")
                .insert(sequence);
            debug!(sequence, "text queue full; segment dropped");
        }
    }

    /// Wait until the current turn has fully played out (or `deadline`
    /// elapses). Returns whether the pipeline drained in time.
    pub async fn wait_drained(&self, deadline: Duration) -> bool {
        let poll = async {
            loop {
                if self.is_drained() {
                    return;
                }
                tokio::time::sleep(DRAIN_POLL).await;
            }
        };
        tokio::time::timeout(deadline, poll).await.is_ok()
    }

    fn is_drained(&self) -> bool {
        self.final_seq.load(Ordering::SeqCst) == -1
            && self.text_q_depth() == 0
            && self.audio_q_depth() == 0
            && PipelineStats::get(&self.stats.active_workers) == 0
    }

    fn text_q_depth(&self) -> usize {
        self.text_tx.max_capacity() - self.text_tx.capacity()
    }

    fn audio_q_depth(&self) -> usize {
        self.audio_gauge.max_capacity() - self.audio_gauge.capacity()
    }

    /// The shared barge-in token.
    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// Current counters and queue depths.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            text_received: PipelineStats::get(&self.stats.text_received),
            text_dropped: PipelineStats::get(&self.stats.text_dropped),
            audio_generated: PipelineStats::get(&self.stats.audio_generated),
            audio_failed: PipelineStats::get(&self.stats.audio_failed),
            audio_played: PipelineStats::get(&self.stats.audio_played),
            text_q_depth: self.text_q_depth(),
            audio_q_depth: self.audio_q_depth(),
            active_workers: PipelineStats::get(&self.stats.active_workers),
        }
    }

    /// Stop both stages and wait for them, bounded by `grace`.
    pub async fn shutdown(mut self, grace: Duration) {
        self.interrupt.raise();
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if tokio::time::timeout(grace, task).await.is_err() {
                warn!("pipeline stage did not exit within {}s", grace.as_secs());
            }
        }
    }
}
