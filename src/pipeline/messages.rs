//! Message types passed between pipeline stages, and the shared counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// A synthesizable unit of text emitted by the splitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    /// Position within the turn; dense from 0.
    pub sequence: u64,
    /// Cleaned text. May be empty only for the end-of-turn marker.
    pub text: String,
    /// Marks the last segment of a turn. Appears exactly once per turn.
    pub is_final: bool,
}

/// Synthesis outcome for one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    /// Samples are playable.
    Ok,
    /// Synthesis failed; the chunk is a placeholder so playback ordering
    /// never stalls on a gap.
    Failed,
}

/// Synthesized audio for one [`TextSegment`].
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Sequence of the source segment.
    pub sequence: u64,
    /// Opaque audio bytes in the synthesizer's declared format.
    pub samples: Vec<u8>,
    /// Estimated duration.
    pub duration_ms: u64,
    /// Whether synthesis succeeded.
    pub status: ChunkStatus,
}

impl AudioChunk {
    /// A placeholder for a failed or skipped synthesis.
    pub fn failed(sequence: u64) -> Self {
        Self {
            sequence,
            samples: Vec::new(),
            duration_ms: 0,
            status: ChunkStatus::Failed,
        }
    }
}

/// Running pipeline counters. Monotonic except the depth gauges.
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Segments handed to the text queue (including dropped ones).
    pub text_received: AtomicU64,
    /// Segments dropped because the text queue stayed full.
    pub text_dropped: AtomicU64,
    /// Chunks synthesized successfully.
    pub audio_generated: AtomicU64,
    /// Chunks that failed synthesis.
    pub audio_failed: AtomicU64,
    /// Chunks played to completion.
    pub audio_played: AtomicU64,
    /// Synthesis tasks currently in flight.
    pub active_workers: AtomicU64,
}

impl PipelineStats {
    /// Bump a counter by one.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement a gauge by one.
    pub fn dec(counter: &AtomicU64) {
        counter.fetch_sub(1, Ordering::Relaxed);
    }

    /// Read a counter.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of [`PipelineStats`] plus queue depths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Segments handed to the text queue.
    pub text_received: u64,
    /// Segments dropped on overflow.
    pub text_dropped: u64,
    /// Chunks synthesized successfully.
    pub audio_generated: u64,
    /// Chunks that failed synthesis.
    pub audio_failed: u64,
    /// Chunks played to completion.
    pub audio_played: u64,
    /// Current text queue depth.
    pub text_q_depth: usize,
    /// Current audio queue depth.
    pub audio_q_depth: usize,
    /// Synthesis tasks in flight.
    pub active_workers: u64,
}
