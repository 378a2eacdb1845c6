//! Synthesis worker stage: text segments in, audio chunks out.
//!
//! A single dispatcher pulls from the text queue and spawns one task per
//! segment, bounded by a semaphore of `max_tasks` permits. Tasks finish
//! in arbitrary order; the player reorders. A failed or timed-out
//! synthesis still enqueues a placeholder chunk with the same sequence
//! so playback never stalls waiting on a gap.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::synth::Synthesizer;
use crate::tools::VoiceState;

use super::interrupt::Interrupt;
use super::messages::{AudioChunk, ChunkStatus, PipelineStats, TextSegment};

/// Backoff before the single transient-error retry.
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Estimated playback time per character, for chunk duration estimates.
const MS_PER_CHAR: u64 = 70;

/// Everything the synthesis stage needs, bundled to keep the spawn site
/// readable.
pub(crate) struct SynthStage {
    pub synth: Arc<dyn Synthesizer>,
    pub voice: VoiceState,
    pub stats: Arc<PipelineStats>,
    pub interrupt: Interrupt,
    pub cancel: CancellationToken,
    pub gen_timeout: Duration,
    pub max_tasks: usize,
}

pub(crate) async fn run_synth_stage(
    stage: SynthStage,
    mut rx: mpsc::Receiver<TextSegment>,
    audio_tx: mpsc::Sender<AudioChunk>,
) {
    let permits = Arc::new(Semaphore::new(stage.max_tasks));

    loop {
        tokio::select! {
            () = stage.cancel.cancelled() => break,
            () = stage.interrupt.raised() => {
                // Barge-in: drop everything queued, then wait for the
                // supervisor to clear the flag.
                let mut dropped = 0usize;
                while rx.try_recv().is_ok() {
                    dropped += 1;
                }
                if dropped > 0 {
                    debug!("synth stage dropped {dropped} queued segments on interrupt");
                }
                tokio::select! {
                    () = stage.cancel.cancelled() => break,
                    () = stage.interrupt.cleared() => {}
                }
            }
            segment = rx.recv() => {
                let Some(segment) = segment else { break };
                let permit = tokio::select! {
                    () = stage.cancel.cancelled() => break,
                    () = stage.interrupt.raised() => continue,
                    permit = permits.clone().acquire_owned() => {
                        match permit {
                            Ok(p) => p,
                            Err(_) => break,
                        }
                    }
                };

                let synth = Arc::clone(&stage.synth);
                let voice = stage.voice.clone();
                let stats = Arc::clone(&stage.stats);
                let interrupt = stage.interrupt.clone();
                let audio_tx = audio_tx.clone();
                let gen_timeout = stage.gen_timeout;

                tokio::spawn(async move {
                    PipelineStats::inc(&stats.active_workers);
                    let chunk =
                        synthesize_segment(&*synth, &voice, &segment, gen_timeout, &interrupt)
                            .await;
                    match chunk.status {
                        ChunkStatus::Ok => PipelineStats::inc(&stats.audio_generated),
                        ChunkStatus::Failed => PipelineStats::inc(&stats.audio_failed),
                    }
                    if !interrupt.is_raised() {
                        // audio_q full throttles workers to playback rate;
                        // the wait is bounded by the generation timeout and
                        // aborted outright on barge-in.
                        tokio::select! {
                            () = interrupt.raised() => {}
                            sent = audio_tx.send_timeout(chunk, gen_timeout) => {
                                if sent.is_err() {
                                    warn!(
                                        sequence = segment.sequence,
                                        "audio queue stayed full; chunk dropped"
                                    );
                                }
                            }
                        }
                    }
                    PipelineStats::dec(&stats.active_workers);
                    drop(permit);
                });
            }
        }
    }
}

/// Synthesize one segment, with the single-retry policy.
async fn synthesize_segment(
    synth: &dyn Synthesizer,
    voice: &VoiceState,
    segment: &TextSegment,
    gen_timeout: Duration,
    interrupt: &Interrupt,
) -> AudioChunk {
    // End-of-turn marker: nothing to say, but the player must still see
    // the sequence to close out the turn.
    if segment.text.is_empty() {
        return AudioChunk {
            sequence: segment.sequence,
            samples: Vec::new(),
            duration_ms: 0,
            status: ChunkStatus::Ok,
        };
    }

    // Voice is read at the moment of synthesis; a selector-tool switch
    // earlier in the turn applies from this segment on.
    let voice_id = voice.voice_id();

    let attempt = async {
        match synth.synthesize(&segment.text, &voice_id).await {
            Ok(samples) => Ok(samples),
            Err(e) if e.is_transient() => {
                debug!(sequence = segment.sequence, "transient synth error, retrying: {e}");
                tokio::time::sleep(RETRY_BACKOFF).await;
                synth.synthesize(&segment.text, &voice_id).await
            }
            Err(e) => Err(e),
        }
    };

    let outcome = tokio::select! {
        () = interrupt.raised() => {
            return AudioChunk::failed(segment.sequence);
        }
        outcome = tokio::time::timeout(gen_timeout, attempt) => outcome,
    };

    match outcome {
        Ok(Ok(samples)) => AudioChunk {
            sequence: segment.sequence,
            duration_ms: segment.text.chars().count() as u64 * MS_PER_CHAR,
            samples,
            status: ChunkStatus::Ok,
        },
        Ok(Err(e)) => {
            warn!(sequence = segment.sequence, "synthesis failed: {e}");
            AudioChunk::failed(segment.sequence)
        }
        Err(_) => {
            warn!(
                sequence = segment.sequence,
                "synthesis timed out after {}s",
                gen_timeout.as_secs()
            );
            AudioChunk::failed(segment.sequence)
        }
    }
}
