//! Playback status reporting
//!
//! Two monotone counters drive the status: `produced_samples` (written by
//! the producer thread) and `played_samples` (written by the audio
//! callback). Each has exactly one writer; readers load with acquire. The
//! two loads are not an atomic pair, so a reader can transiently observe
//! played ahead of produced — the buffered figure is therefore clamped at
//! zero and never exposed as a raw subtraction.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Per-session sample counters shared between producer, callback and
/// status readers.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    /// Samples decoded and buffered (producer-written, monotone)
    pub produced_samples: AtomicU64,

    /// Samples delivered to the output (callback-written, monotone)
    pub played_samples: AtomicU64,

    /// Callback invocations that had to fill silence (callback-written)
    pub underruns: AtomicU64,
}

impl Counters {
    /// Zero all counters for a new session.
    ///
    /// Only valid between sessions, while neither writer is active.
    pub fn reset(&self) {
        self.produced_samples.store(0, Ordering::Relaxed);
        self.played_samples.store(0, Ordering::Relaxed);
        self.underruns.store(0, Ordering::Relaxed);
    }

    /// Consistent (played, buffered) pair.
    ///
    /// Buffered is clamped at zero: the two acquire loads are independent,
    /// so `played` may momentarily be newer than `produced`.
    pub fn played_and_buffered(&self) -> (u64, u64) {
        let played = self.played_samples.load(Ordering::Acquire);
        let produced = self.produced_samples.load(Ordering::Acquire);
        (played, produced.saturating_sub(played))
    }
}

/// Snapshot of a playback session.
///
/// Safe to request from any thread at any time.
#[derive(Debug, Clone)]
pub struct PlaybackStatus {
    /// Base name of the currently playing file (or stream label)
    pub file_name: String,

    /// Session sample rate in Hz
    pub sample_rate: u32,

    /// Session channel count
    pub channels: u8,

    /// Session bit depth
    pub bits_per_sample: u8,

    /// Frames delivered per output callback
    pub frames_per_buffer: usize,

    /// Samples delivered to the output so far
    pub played_samples: u64,

    /// Samples decoded but not yet played; never negative
    pub buffered_samples: u64,

    /// Callback invocations that filled silence
    pub underruns: u64,

    /// Wall-clock time since playback started
    pub elapsed: Duration,
}

impl PlaybackStatus {
    /// Played audio time, derived from the sample counter.
    pub fn played_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.played_samples as f64 / self.sample_rate as f64
    }

    /// Buffered audio time, derived from the sample counter.
    pub fn buffered_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.buffered_samples as f64 / self.sample_rate as f64
    }
}
