//! Streaming decoder over a byte ring
//!
//! The byte-oriented pipeline: any source able to produce raw interleaved
//! PCM (a network peer, another process, a test harness) writes into the
//! producer half of a [`ByteRing`] and the player pulls samples out through
//! the standard [`AudioDecoder`] contract.
//!
//! The format is fixed at construction; a format change means a new
//! source/decoder pair and a new playback session.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::decoder::AudioDecoder;
use crate::error::Result;
use crate::frame::FrameFormat;
use crate::ring::ByteRing;

/// How long the decoder naps while the ring is empty and the source is
/// still live. Bounds end-of-stream detection latency.
const EMPTY_POLL: Duration = Duration::from_micros(500);

struct Shared {
    ring: ByteRing,
    finished: AtomicBool,
}

/// Producer half: feeds raw PCM bytes into the stream.
pub struct StreamSource {
    shared: Arc<Shared>,
}

impl StreamSource {
    /// Write a chunk of interleaved PCM, all-or-nothing.
    ///
    /// Surfaces [`InsufficientSpace`](crate::Error::InsufficientSpace) when
    /// the ring cannot take the whole chunk; the caller retries later.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        self.shared.ring.write(data)
    }

    /// Write a chunk, sleeping briefly between retries until it fits.
    pub fn write_all(&self, data: &[u8]) -> Result<()> {
        while self.shared.ring.write(data).is_err() {
            std::thread::sleep(EMPTY_POLL);
        }
        Ok(())
    }

    /// Bytes the ring can currently accept.
    pub fn available_write(&self) -> u64 {
        self.shared.ring.available_write()
    }

    /// Declare the stream complete. No further writes may follow.
    pub fn finish(&self) {
        self.shared.finished.store(true, Ordering::Release);
    }
}

/// Consumer half: an [`AudioDecoder`] that drains the stream.
pub struct StreamDecoder {
    shared: Arc<Shared>,
    format: FrameFormat,
}

/// Create a connected source/decoder pair over a fresh byte ring.
///
/// `capacity_bytes` is rounded up to the next power of two.
pub fn stream_pair(capacity_bytes: u64, format: FrameFormat) -> (StreamSource, StreamDecoder) {
    let shared = Arc::new(Shared {
        ring: ByteRing::new(capacity_bytes),
        finished: AtomicBool::new(false),
    });

    (
        StreamSource {
            shared: Arc::clone(&shared),
        },
        StreamDecoder { shared, format },
    )
}

impl AudioDecoder for StreamDecoder {
    /// No-op: the stream is already initialized at construction.
    fn open(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn format(&self) -> FrameFormat {
        self.format
    }

    /// Block until at least one whole sample is available or the source
    /// finished, then drain up to `samples` whole samples.
    fn decode_samples(&mut self, samples: usize, out: &mut [u8]) -> Result<usize> {
        let sample_bytes = self.format.frame_bytes();
        let wanted = samples * sample_bytes;

        loop {
            let available = self.shared.ring.available_read();
            let usable = available - available % sample_bytes as u64;

            if usable > 0 {
                let take = wanted.min(usable as usize);
                let n = self.shared.ring.read(&mut out[..take])?;
                return Ok(n / sample_bytes);
            }

            // A trailing partial sample after finish is discarded.
            if self.shared.finished.load(Ordering::Acquire) {
                return Ok(0);
            }

            std::thread::sleep(EMPTY_POLL);
        }
    }
}
