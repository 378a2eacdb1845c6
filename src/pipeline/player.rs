//! Ordered playback stage.
//!
//! Chunks arrive out of order from the worker pool; this stage holds
//! them in a reorder map and plays strictly ascending sequences. Failed
//! chunks are skipped without stalling. On barge-in the current chunk is
//! stopped immediately, everything pending is discarded, and sequences
//! restart at 0 so the pipeline is ready for the next turn.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::audio::Player;

use super::interrupt::Interrupt;
use super::messages::{AudioChunk, ChunkStatus, PipelineStats};

/// Control state shared with the playback stage.
pub(crate) struct PlayerStage {
    pub player: Arc<dyn Player>,
    pub stats: Arc<PipelineStats>,
    pub interrupt: Interrupt,
    pub cancel: CancellationToken,
    /// Sequence of the turn's final segment, -1 while unknown. Written
    /// by the submit path, cleared here when the turn finishes.
    pub final_seq: Arc<AtomicI64>,
    /// Sequences dropped on text-queue overflow; skipped, not awaited.
    pub dropped: Arc<Mutex<HashSet<u64>>>,
    pub play_timeout: Duration,
}

pub(crate) async fn run_player_stage(stage: PlayerStage, mut rx: mpsc::Receiver<AudioChunk>) {
    let mut next_seq: u64 = 0;
    let mut pending: BTreeMap<u64, AudioChunk> = BTreeMap::new();

    loop {
        tokio::select! {
            () = stage.cancel.cancelled() => break,
            () = stage.interrupt.raised() => {
                stage.player.stop();
                pending.clear();
                while rx.try_recv().is_ok() {}
                next_seq = 0;
                stage.final_seq.store(-1, Ordering::SeqCst);
                stage.dropped.lock().expect("dropped set lock").clear();
                debug!("player drained on interrupt");
                tokio::select! {
                    () = stage.cancel.cancelled() => break,
                    () = stage.interrupt.cleared() => {
                        // Stragglers that slipped in while the flag was up
                        // belong to the aborted turn.
                        while rx.try_recv().is_ok() {}
                    }
                }
            }
            chunk = rx.recv() => {
                let Some(chunk) = chunk else { break };
                if chunk.sequence < next_seq {
                    // Duplicate or straggler from an aborted turn.
                    continue;
                }
                pending.insert(chunk.sequence, chunk);
                play_ready(&stage, &mut next_seq, &mut pending).await;
            }
        }
    }
}

/// Play every chunk that is now in order, skipping failed and dropped
/// sequences, until the next gap (or an interrupt).
async fn play_ready(
    stage: &PlayerStage,
    next_seq: &mut u64,
    pending: &mut BTreeMap<u64, AudioChunk>,
) {
    loop {
        // Sequences dropped upstream will never arrive; step over them.
        while stage
            .dropped
            .lock()
            .expect("dropped set lock")
            .remove(next_seq)
        {
            advance(stage, next_seq, pending);
        }

        let Some(chunk) = pending.remove(next_seq) else {
            return;
        };

        if chunk.status == ChunkStatus::Ok && !chunk.samples.is_empty() {
            let player = Arc::clone(&stage.player);
            let mut play_task = tokio::task::spawn_blocking(move || player.play(&chunk.samples));

            let interrupted = tokio::select! {
                () = stage.interrupt.raised() => {
                    stage.player.stop();
                    let _ = play_task.await;
                    true
                }
                outcome = tokio::time::timeout(stage.play_timeout, &mut play_task) => {
                    match outcome {
                        Ok(Ok(Ok(()))) => {
                            PipelineStats::inc(&stage.stats.audio_played);
                        }
                        Ok(Ok(Err(e))) => warn!(sequence = *next_seq, "playback failed: {e}"),
                        Ok(Err(e)) => warn!(sequence = *next_seq, "playback task panicked: {e}"),
                        Err(_) => {
                            stage.player.stop();
                            warn!(
                                sequence = *next_seq,
                                "playback timed out after {}s; continuing with next chunk",
                                stage.play_timeout.as_secs()
                            );
                        }
                    }
                    false
                }
            };
            if interrupted {
                // The outer loop's interrupt arm performs the full reset.
                return;
            }
        } else if chunk.status == ChunkStatus::Failed {
            debug!(sequence = *next_seq, "skipping failed chunk");
        }

        advance(stage, next_seq, pending);
    }
}

/// Step past `next_seq`; when it was the turn's final sequence, close
/// out the turn and restart numbering.
fn advance(stage: &PlayerStage, next_seq: &mut u64, pending: &mut BTreeMap<u64, AudioChunk>) {
    let finished_turn = stage.final_seq.load(Ordering::SeqCst) == *next_seq as i64;
    *next_seq += 1;
    if finished_turn {
        *next_seq = 0;
        pending.clear();
        stage.dropped.lock().expect("dropped set lock").clear();
        stage.final_seq.store(-1, Ordering::SeqCst);
        debug!("turn playback complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockPlayer;

    fn chunk(sequence: u64, byte: u8) -> AudioChunk {
        AudioChunk {
            sequence,
            samples: vec![byte],
            duration_ms: 10,
            status: ChunkStatus::Ok,
        }
    }

    struct Fixture {
        tx: mpsc::Sender<AudioChunk>,
        player: Arc<MockPlayer>,
        stats: Arc<PipelineStats>,
        interrupt: Interrupt,
        cancel: CancellationToken,
        final_seq: Arc<AtomicI64>,
        dropped: Arc<Mutex<HashSet<u64>>>,
        task: tokio::task::JoinHandle<()>,
    }

    fn start_stage() -> Fixture {
        let (tx, rx) = mpsc::channel(10);
        let player = Arc::new(MockPlayer::new());
        let stats = Arc::new(PipelineStats::default());
        let interrupt = Interrupt::new();
        let cancel = CancellationToken::new();
        let final_seq = Arc::new(AtomicI64::new(-1));
        let dropped = Arc::new(Mutex::new(HashSet::new()));
        let stage = PlayerStage {
            player: player.clone(),
            stats: stats.clone(),
            interrupt: interrupt.clone(),
            cancel: cancel.clone(),
            final_seq: final_seq.clone(),
            dropped: dropped.clone(),
            play_timeout: Duration::from_secs(1),
        };
        let task = tokio::spawn(run_player_stage(stage, rx));
        Fixture {
            tx,
            player,
            stats,
            interrupt,
            cancel,
            final_seq,
            dropped,
            task,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn plays_out_of_order_arrivals_in_sequence() {
        let f = start_stage();
        f.final_seq.store(2, Ordering::SeqCst);
        f.tx.send(chunk(2, 12)).await.unwrap();
        f.tx.send(chunk(0, 10)).await.unwrap();
        f.tx.send(chunk(1, 11)).await.unwrap();
        settle().await;

        let played = f.player.played();
        assert_eq!(played, vec![vec![10], vec![11], vec![12]]);
        assert_eq!(PipelineStats::get(&f.stats.audio_played), 3);
        // Turn closed: final_seq reset for the next turn.
        assert_eq!(f.final_seq.load(Ordering::SeqCst), -1);
        f.cancel.cancel();
        let _ = f.task.await;
    }

    #[tokio::test]
    async fn failed_chunk_is_skipped_without_stalling() {
        let f = start_stage();
        f.final_seq.store(2, Ordering::SeqCst);
        f.tx.send(AudioChunk::failed(1)).await.unwrap();
        f.tx.send(chunk(0, 10)).await.unwrap();
        f.tx.send(chunk(2, 12)).await.unwrap();
        settle().await;

        assert_eq!(f.player.played(), vec![vec![10], vec![12]]);
        assert_eq!(PipelineStats::get(&f.stats.audio_played), 2);
        f.cancel.cancel();
        let _ = f.task.await;
    }

    #[tokio::test]
    async fn dropped_sequences_are_stepped_over() {
        let f = start_stage();
        f.final_seq.store(2, Ordering::SeqCst);
        f.dropped.lock().unwrap().insert(1);
        f.tx.send(chunk(0, 10)).await.unwrap();
        f.tx.send(chunk(2, 12)).await.unwrap();
        settle().await;

        assert_eq!(f.player.played(), vec![vec![10], vec![12]]);
        assert_eq!(f.final_seq.load(Ordering::SeqCst), -1);
        f.cancel.cancel();
        let _ = f.task.await;
    }

    #[tokio::test]
    async fn sequences_restart_after_turn_completes() {
        let f = start_stage();
        f.final_seq.store(0, Ordering::SeqCst);
        f.tx.send(chunk(0, 1)).await.unwrap();
        settle().await;

        f.final_seq.store(0, Ordering::SeqCst);
        f.tx.send(chunk(0, 2)).await.unwrap();
        settle().await;

        assert_eq!(f.player.played(), vec![vec![1], vec![2]]);
        f.cancel.cancel();
        let _ = f.task.await;
    }

    #[tokio::test]
    async fn interrupt_stops_current_and_discards_pending() {
        let f = start_stage();
        f.player.set_blocking(true);
        f.final_seq.store(3, Ordering::SeqCst);
        f.tx.send(chunk(0, 10)).await.unwrap();
        f.tx.send(chunk(1, 11)).await.unwrap();
        f.tx.send(chunk(2, 12)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(f.player.is_playing());

        f.interrupt.raise();
        settle().await;

        // Only the first chunk ever started; nothing else plays.
        assert_eq!(f.player.played().len(), 1);
        assert_eq!(PipelineStats::get(&f.stats.audio_played), 0);
        assert_eq!(f.final_seq.load(Ordering::SeqCst), -1);

        // After clearing, a fresh turn plays from sequence 0.
        f.player.set_blocking(false);
        f.interrupt.clear();
        f.final_seq.store(0, Ordering::SeqCst);
        f.tx.send(chunk(0, 99)).await.unwrap();
        settle().await;
        assert_eq!(f.player.played().last().unwrap(), &vec![99]);
        f.cancel.cancel();
        let _ = f.task.await;
    }

    #[tokio::test]
    async fn playback_timeout_skips_to_next_chunk() {
        let (tx, rx) = mpsc::channel(10);
        let player = Arc::new(MockPlayer::new());
        player.set_blocking(true);
        let stats = Arc::new(PipelineStats::default());
        let cancel = CancellationToken::new();
        let final_seq = Arc::new(AtomicI64::new(1));
        let stage = PlayerStage {
            player: player.clone(),
            stats: stats.clone(),
            interrupt: Interrupt::new(),
            cancel: cancel.clone(),
            final_seq: final_seq.clone(),
            dropped: Arc::new(Mutex::new(HashSet::new())),
            play_timeout: Duration::from_millis(50),
        };
        let task = tokio::spawn(run_player_stage(stage, rx));

        tx.send(chunk(0, 1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        // First chunk timed out; unblock and send the final one.
        player.set_blocking(false);
        tx.send(chunk(1, 2)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(PipelineStats::get(&stats.audio_played), 1);
        assert_eq!(final_seq.load(Ordering::SeqCst), -1);
        cancel.cancel();
        let _ = task.await;
    }
}
