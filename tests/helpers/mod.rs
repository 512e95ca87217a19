//! Shared helpers for integration tests
//!
//! A synthetic decoder with a fixed call budget and an output backend that
//! drives the player's callback from a plain thread, so full playback
//! sessions run headless.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tonearm::decoder::AudioDecoder;
use tonearm::error::{Error, Result};
use tonearm::frame::FrameFormat;
use tonearm::output::{OutputBackend, OutputCallback, OutputStream, StreamFlow, StreamParams};

/// Decoder yielding a fixed number of full decode calls, then end-of-stream.
///
/// Each call fills the requested samples with a rolling byte pattern, so
/// consumers can verify data made it through unmangled.
pub struct SyntheticDecoder {
    format: FrameFormat,
    calls_remaining: usize,
    next_byte: u8,
    closes: Arc<AtomicUsize>,
}

impl SyntheticDecoder {
    pub fn new(format: FrameFormat, calls: usize) -> Self {
        Self {
            format,
            calls_remaining: calls,
            next_byte: 0,
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of close() invocations, for teardown assertions.
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }
}

impl AudioDecoder for SyntheticDecoder {
    fn open(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn format(&self) -> FrameFormat {
        self.format
    }

    fn decode_samples(&mut self, samples: usize, out: &mut [u8]) -> Result<usize> {
        if self.calls_remaining == 0 {
            return Ok(0);
        }
        self.calls_remaining -= 1;

        let bytes = samples * self.format.frame_bytes();
        for slot in out[..bytes].iter_mut() {
            *slot = self.next_byte;
            self.next_byte = self.next_byte.wrapping_add(1);
        }

        Ok(samples)
    }
}

/// Decoder that fails mid-stream after a number of good calls.
pub struct FailingDecoder {
    inner: SyntheticDecoder,
    good_calls: usize,
}

impl FailingDecoder {
    pub fn new(format: FrameFormat, good_calls: usize) -> Self {
        Self {
            inner: SyntheticDecoder::new(format, usize::MAX),
            good_calls,
        }
    }
}

impl AudioDecoder for FailingDecoder {
    fn open(&mut self, path: &Path) -> Result<()> {
        self.inner.open(path)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    fn format(&self) -> FrameFormat {
        self.inner.format()
    }

    fn decode_samples(&mut self, samples: usize, out: &mut [u8]) -> Result<usize> {
        if self.good_calls == 0 {
            return Err(Error::Decode("synthetic mid-stream failure".into()));
        }
        self.good_calls -= 1;
        self.inner.decode_samples(samples, out)
    }
}

/// Output backend whose streams invoke the callback from a plain thread.
pub struct ManualBackend {
    /// Delay between callback invocations; keep tiny for fast tests.
    pace: Duration,
    closes: Arc<AtomicUsize>,
}

impl ManualBackend {
    pub fn new() -> Self {
        Self::with_pace(Duration::from_micros(200))
    }

    pub fn with_pace(pace: Duration) -> Self {
        Self {
            pace,
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of stream close() teardowns.
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }
}

impl OutputBackend for ManualBackend {
    fn devices(&self) -> Result<Vec<String>> {
        Ok(vec!["manual".to_string()])
    }

    fn open_stream(
        &self,
        params: &StreamParams,
        mut callback: OutputCallback,
    ) -> Result<Box<dyn OutputStream>> {
        let running = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));

        let bytes_per_callback = params.bytes_per_callback();
        let frames_per_callback = params.frames_per_callback;
        let pace = self.pace;

        let run_flag = Arc::clone(&running);
        let stop_flag = Arc::clone(&shutdown);

        let handle = std::thread::spawn(move || {
            let mut buffer = vec![0u8; bytes_per_callback];
            loop {
                if stop_flag.load(Ordering::Acquire) {
                    return;
                }
                if !run_flag.load(Ordering::Acquire) {
                    std::thread::sleep(Duration::from_micros(100));
                    continue;
                }

                let flow = callback(&mut buffer, frames_per_callback);
                if flow != StreamFlow::Continue {
                    // The host stops dispatching once the stream completes.
                    return;
                }

                std::thread::sleep(pace);
            }
        });

        Ok(Box::new(ManualStream {
            running,
            shutdown,
            handle: Some(handle),
            closes: Arc::clone(&self.closes),
        }))
    }
}

pub struct ManualStream {
    running: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    closes: Arc<AtomicUsize>,
}

impl OutputStream for ManualStream {
    fn start(&mut self) -> Result<()> {
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            self.shutdown.store(true, Ordering::Release);
            let _ = handle.join();
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for ManualStream {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Standard CD-style session format used across the tests.
pub fn cd_format() -> FrameFormat {
    FrameFormat {
        sample_rate: 44100,
        channels: 2,
        bits_per_sample: 16,
    }
}
