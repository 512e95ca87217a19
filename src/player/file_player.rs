//! File player: decoder → producer thread → frame ring → audio callback
//!
//! [`FilePlayer`] bridges two execution domains with incompatible rules: a
//! decoder that allocates and blocks on file I/O, running on an ordinary
//! thread, and an audio callback that must never allocate, block or take a
//! lock, running on the host's real-time thread. The bridge is the
//! lock-free frame ring.
//!
//! Thread safety model:
//! - the producer thread is the ring's only writer
//! - the host audio thread (the callback) is the ring's only reader
//! - shared flags and counters are atomics with single writers
//! - the one mutex on the playback path guards the one-time transition
//!   through `stop`; the remaining mutexes are control-plane slots for
//!   owned resources (decoder, stream, join handle) and are never touched
//!   from the callback

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::decoder::{new_decoder, AudioDecoder};
use crate::error::{Error, Result};
use crate::frame::{AudioFrame, FrameFormat};
use crate::output::{
    CpalBackend, OutputBackend, OutputStream, SampleFormat, StreamFlow, StreamParams,
};
use crate::ring::FrameRing;

use super::status::Counters;
use super::PlaybackStatus;

/// Sleep between ring-write retries when the ring is full. Bounds both
/// cancellation latency and scheduler load; the ring drains at audio rate,
/// so 1 ms is far below the drain period of a single frame.
const WRITE_RETRY_WAIT: Duration = Duration::from_millis(1);

/// Immutable per-session format snapshot plus bookkeeping.
#[derive(Default)]
struct Session {
    file_name: String,
    format: Option<FrameFormat>,
    started: Option<Instant>,
}

/// Plays audio files through a callback-mode output stream.
///
/// A session is `open_file` → `play` → (`wait` | `stop`); sessions are
/// sequential. `stop` and `playback_status` are safe from any thread at
/// any time.
pub struct FilePlayer {
    backend: Box<dyn OutputBackend>,
    ring: Arc<FrameRing>,

    device_index: usize,
    frames_per_callback: usize,
    samples_per_frame: usize,

    counters: Arc<Counters>,

    /// Cooperative cancellation latch for the producer
    stop_signal: Arc<AtomicBool>,

    /// Set by the producer when it exits
    producer_done: Arc<AtomicBool>,

    /// Set by the callback once the ring has drained after producer_done
    playback_complete: Arc<AtomicBool>,

    /// Decoder slot: owned by the producer thread during a session,
    /// returned here when the producer exits
    decoder: Arc<Mutex<Option<Box<dyn AudioDecoder>>>>,

    stream: Mutex<Option<Box<dyn OutputStream>>>,
    producer: Mutex<Option<JoinHandle<()>>>,
    session: Mutex<Session>,

    /// One-shot wake for wait(); re-created per session
    complete_tx: Mutex<Option<Sender<()>>>,
    complete_rx: Mutex<Option<Receiver<()>>>,

    /// Guards the one-time transition through stop
    stopped: Mutex<bool>,
}

impl FilePlayer {
    /// Create a player over the default cpal backend.
    ///
    /// `ring_capacity_frames` is rounded up to the next power of two;
    /// `samples_per_frame` is how many interleaved samples the producer
    /// decodes into each frame (capped at the frame field's u16 range).
    pub fn new(
        device_index: usize,
        ring_capacity_frames: u64,
        frames_per_callback: usize,
        samples_per_frame: usize,
    ) -> Self {
        Self::with_backend(
            Box::new(CpalBackend::new()),
            device_index,
            ring_capacity_frames,
            frames_per_callback,
            samples_per_frame,
        )
    }

    /// Create a player over a caller-supplied output backend.
    pub fn with_backend(
        backend: Box<dyn OutputBackend>,
        device_index: usize,
        ring_capacity_frames: u64,
        frames_per_callback: usize,
        samples_per_frame: usize,
    ) -> Self {
        Self {
            backend,
            ring: Arc::new(FrameRing::new(ring_capacity_frames)),
            device_index,
            frames_per_callback: frames_per_callback.max(1),
            // samples_count is a u16 field on the wire
            samples_per_frame: samples_per_frame.clamp(1, u16::MAX as usize),
            counters: Arc::new(Counters::default()),
            stop_signal: Arc::new(AtomicBool::new(false)),
            producer_done: Arc::new(AtomicBool::new(false)),
            playback_complete: Arc::new(AtomicBool::new(false)),
            decoder: Arc::new(Mutex::new(None)),
            stream: Mutex::new(None),
            producer: Mutex::new(None),
            session: Mutex::new(Session::default()),
            complete_tx: Mutex::new(None),
            complete_rx: Mutex::new(None),
            stopped: Mutex::new(false),
        }
    }

    /// Open an audio file, selecting a decoder from its extension.
    ///
    /// Closes any previously opened decoder first. On failure no decoder
    /// is held.
    pub fn open_file(&self, path: &Path) -> Result<()> {
        let mut slot = self.decoder.lock().unwrap();

        if let Some(mut old) = slot.take() {
            if let Err(e) = old.close() {
                warn!("failed to close previous decoder: {e}");
            }
        }

        let decoder = new_decoder(path)?;
        let format = decoder.format();

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        info!(
            file = %file_name,
            sample_rate = format.sample_rate,
            channels = format.channels,
            bits_per_sample = format.bits_per_sample,
            "audio file opened"
        );

        *slot = Some(decoder);
        drop(slot);

        let mut session = self.session.lock().unwrap();
        session.file_name = file_name;
        session.format = Some(format);

        Ok(())
    }

    /// Install an already-open decoder (e.g. a byte-ring stream decoder).
    ///
    /// Takes the place of `open_file` for non-file sources; `label` stands
    /// in for the file name in status reports.
    pub fn open_decoder(&self, decoder: Box<dyn AudioDecoder>, label: &str) -> Result<()> {
        let format = decoder.format();

        let mut slot = self.decoder.lock().unwrap();
        if let Some(mut old) = slot.take() {
            if let Err(e) = old.close() {
                warn!("failed to close previous decoder: {e}");
            }
        }
        *slot = Some(decoder);
        drop(slot);

        info!(
            source = %label,
            sample_rate = format.sample_rate,
            channels = format.channels,
            bits_per_sample = format.bits_per_sample,
            "audio decoder opened"
        );

        let mut session = self.session.lock().unwrap();
        session.file_name = label.to_string();
        session.format = Some(format);

        Ok(())
    }

    /// Start playing the currently opened source.
    ///
    /// Resets all per-session state, opens the output stream in callback
    /// mode, spawns the producer thread and starts the stream. Use
    /// [`wait`](Self::wait) to block until playback completes, or
    /// [`stop`](Self::stop) to interrupt.
    pub fn play(&self) -> Result<()> {
        let decoder = self
            .decoder
            .lock()
            .unwrap()
            .take()
            .ok_or(Error::NoFileOpen)?;

        let format = decoder.format();

        // Errors past this point must hand the decoder back.
        let sample_format = match SampleFormat::from_bits(format.bits_per_sample) {
            Ok(f) => f,
            Err(e) => {
                *self.decoder.lock().unwrap() = Some(decoder);
                return Err(e);
            }
        };

        // Reset per-session state while neither producer nor callback runs.
        self.stop_signal.store(false, Ordering::Release);
        self.producer_done.store(false, Ordering::Release);
        self.playback_complete.store(false, Ordering::Release);
        self.ring.reset();
        self.counters.reset();
        *self.stopped.lock().unwrap() = false;

        // The one-shot is installed only once the session actually starts;
        // a failed play must not leave a wait() with a signal nobody fires.
        let (tx, rx) = bounded::<()>(1);

        let params = StreamParams {
            device_index: self.device_index,
            channels: format.channels,
            sample_rate: format.sample_rate,
            sample_format,
            frames_per_callback: self.frames_per_callback,
        };

        let callback = build_callback(
            Arc::clone(&self.ring),
            Arc::clone(&self.counters),
            Arc::clone(&self.producer_done),
            Arc::clone(&self.playback_complete),
            tx.clone(),
            format.frame_bytes(),
        );

        let mut stream = match self.backend.open_stream(&params, callback) {
            Ok(stream) => stream,
            Err(e) => {
                *self.decoder.lock().unwrap() = Some(decoder);
                return Err(e);
            }
        };

        let handle = self.spawn_producer(decoder, format);

        if let Err(e) = stream.start() {
            // Unwind in acquisition order: producer first, then stream.
            self.stop_signal.store(true, Ordering::Release);
            let _ = handle.join();
            if let Err(close_err) = stream.close() {
                warn!("failed to close stream after failed start: {close_err}");
            }
            return Err(e);
        }

        *self.stream.lock().unwrap() = Some(stream);
        *self.producer.lock().unwrap() = Some(handle);
        *self.complete_tx.lock().unwrap() = Some(tx);
        *self.complete_rx.lock().unwrap() = Some(rx);
        self.session.lock().unwrap().started = Some(Instant::now());

        debug!("playback started");
        Ok(())
    }

    fn spawn_producer(
        &self,
        decoder: Box<dyn AudioDecoder>,
        format: FrameFormat,
    ) -> JoinHandle<()> {
        let ring = Arc::clone(&self.ring);
        let counters = Arc::clone(&self.counters);
        let stop = Arc::clone(&self.stop_signal);
        let producer_done = Arc::clone(&self.producer_done);
        let decoder_slot = Arc::clone(&self.decoder);
        let samples_per_frame = self.samples_per_frame;

        thread::Builder::new()
            .name("tonearm-producer".into())
            .spawn(move || {
                let decoder = produce(decoder, &ring, &counters, &stop, samples_per_frame, format);
                producer_done.store(true, Ordering::Release);
                *decoder_slot.lock().unwrap() = Some(decoder);
            })
            .expect("failed to spawn producer thread")
    }

    /// Block until the current source has played out.
    ///
    /// Waits first for the producer to finish decoding, then for the
    /// callback to drain the ring and raise the completion signal.
    pub fn wait(&self) {
        if let Some(handle) = self.producer.lock().unwrap().take() {
            let _ = handle.join();
        }

        let rx = self.complete_rx.lock().unwrap().clone();
        if let Some(rx) = rx {
            // Returns on the completion message, or with an error once
            // every sender is gone (session torn down) — either way the
            // session is over.
            if rx.recv().is_ok() {
                // Re-arm the one-shot so additional waiters parked on the
                // same session are released too.
                if let Some(tx) = self.complete_tx.lock().unwrap().as_ref() {
                    let _ = tx.try_send(());
                }
            }
        }
    }

    /// Stop playback.
    ///
    /// Safe to call any number of times from any number of threads; the
    /// teardown sequence runs exactly once. Diagnostics from individual
    /// teardown steps are logged, never fatal.
    pub fn stop(&self) -> Result<()> {
        {
            let mut stopped = self.stopped.lock().unwrap();
            if *stopped {
                return Ok(());
            }
            *stopped = true;
        }

        // Teardown order matters: signal the producer and join it before
        // touching the stream (it may be mid-publish into the ring), and
        // only close the decoder after the producer can no longer use it.
        self.stop_signal.store(true, Ordering::Release);

        if let Some(handle) = self.producer.lock().unwrap().take() {
            let _ = handle.join();
        }

        if let Some(mut stream) = self.stream.lock().unwrap().take() {
            if let Err(e) = stream.stop() {
                warn!("failed to stop stream: {e}");
            }
            if let Err(e) = stream.close() {
                warn!("failed to close stream: {e}");
            }
        }

        if let Some(mut decoder) = self.decoder.lock().unwrap().take() {
            if let Err(e) = decoder.close() {
                warn!("failed to close decoder: {e}");
            }
        }

        // Release wait() even when the session was cancelled before the
        // ring drained; the bounded(1) one-shot delivers at most once no
        // matter which side fires first.
        if let Some(tx) = self.complete_tx.lock().unwrap().as_ref() {
            let _ = tx.try_send(());
        }

        debug!("playback stopped");
        Ok(())
    }

    /// Whether the callback has reported the session complete.
    pub fn is_complete(&self) -> bool {
        self.playback_complete.load(Ordering::Acquire)
    }

    /// Current playback status. Safe from any thread at any time.
    pub fn playback_status(&self) -> PlaybackStatus {
        let session = self.session.lock().unwrap();
        let format = session.format.unwrap_or(FrameFormat {
            sample_rate: 0,
            channels: 0,
            bits_per_sample: 0,
        });

        let (played, buffered) = self.counters.played_and_buffered();

        PlaybackStatus {
            file_name: session.file_name.clone(),
            sample_rate: format.sample_rate,
            channels: format.channels,
            bits_per_sample: format.bits_per_sample,
            frames_per_buffer: self.frames_per_callback,
            played_samples: played,
            buffered_samples: buffered,
            underruns: self.counters.underruns.load(Ordering::Relaxed),
            elapsed: session
                .started
                .map(|s| s.elapsed())
                .unwrap_or_default(),
        }
    }
}

impl Drop for FilePlayer {
    fn drop(&mut self) {
        // Ensure the producer is joined and the stream released.
        let _ = self.stop();
    }
}

/// Producer loop: decode, frame, publish, repeat.
///
/// Any decode error is treated as end-of-stream; the distinction between
/// clean EOF and a mid-stream failure is visible only in the logs. Returns
/// the decoder so the player can close it during teardown.
fn produce(
    mut decoder: Box<dyn AudioDecoder>,
    ring: &FrameRing,
    counters: &Counters,
    stop: &AtomicBool,
    samples_per_frame: usize,
    format: FrameFormat,
) -> Box<dyn AudioDecoder> {
    let frame_bytes = format.frame_bytes();
    // One decode buffer for the whole session.
    let mut buffer = vec![0u8; samples_per_frame * frame_bytes];
    let mut frames_produced: u64 = 0;

    'session: loop {
        if stop.load(Ordering::Acquire) {
            debug!(
                frames = frames_produced,
                undrained = ring.stats().occupied,
                "producer stopped"
            );
            break;
        }

        let decoded = match decoder.decode_samples(samples_per_frame, &mut buffer) {
            Ok(0) => {
                debug!(frames = frames_produced, "producer finished: end of stream");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                debug!(frames = frames_produced, "producer finished: {e}");
                break;
            }
        };

        let byte_len = decoded * frame_bytes;
        let frame = AudioFrame {
            format,
            samples_count: decoded as u16,
            audio: buffer[..byte_len].to_vec(),
        };

        // Publish, retrying under back-pressure until the ring accepts the
        // frame or the session is cancelled.
        loop {
            match ring.write(std::slice::from_ref(&frame)) {
                Ok(n) if n > 0 => {
                    counters
                        .produced_samples
                        .fetch_add(decoded as u64, Ordering::Relaxed);
                    frames_produced += 1;
                    break;
                }
                _ => {
                    if stop.load(Ordering::Acquire) {
                        debug!(frames = frames_produced, "producer stopped while ring full");
                        break 'session;
                    }
                    thread::sleep(WRITE_RETRY_WAIT);
                }
            }
        }
    }

    decoder
}

/// Build the real-time output callback for one session.
///
/// The partial-consumption cursor (current frame + byte offset) lives
/// inside the closure: it is created empty by `play` and only ever touched
/// by the host audio thread. Every path through the closure is free of
/// allocation, locks and blocking.
fn build_callback(
    ring: Arc<FrameRing>,
    counters: Arc<Counters>,
    producer_done: Arc<AtomicBool>,
    playback_complete: Arc<AtomicBool>,
    complete_tx: Sender<()>,
    frame_bytes: usize,
) -> Box<dyn FnMut(&mut [u8], usize) -> StreamFlow + Send> {
    let mut current: Option<AudioFrame> = None;
    let mut offset: usize = 0;

    Box::new(move |out: &mut [u8], frame_count: usize| {
        let bytes_needed = frame_count * frame_bytes;

        // Termination: producer gone, ring drained, no partial frame held.
        if producer_done.load(Ordering::Acquire)
            && ring.available_read() == 0
            && current.is_none()
        {
            playback_complete.store(true, Ordering::Release);
            // bounded(1) try_send: non-blocking, delivers at most once.
            let _ = complete_tx.try_send(());
            return StreamFlow::Complete;
        }

        let mut written = 0;
        while written < bytes_needed {
            if current.is_none() {
                match ring.pop() {
                    Some(frame) => {
                        current = Some(frame);
                        offset = 0;
                    }
                    None => break,
                }
            }

            let mut drained = false;
            if let Some(frame) = current.as_ref() {
                let n = (frame.audio.len() - offset).min(bytes_needed - written);
                out[written..written + n].copy_from_slice(&frame.audio[offset..offset + n]);
                written += n;
                offset += n;
                drained = offset >= frame.audio.len();
            }
            if drained {
                current = None;
                offset = 0;
            }
        }

        // Underrun: silence for the missing tail, keep the stream alive so
        // the producer can catch up.
        if written < bytes_needed {
            out[written..bytes_needed].fill(0);
            counters.underruns.fetch_add(1, Ordering::Relaxed);
        }

        let samples_played = (written / frame_bytes) as u64;
        counters
            .played_samples
            .fetch_add(samples_played, Ordering::Relaxed);

        StreamFlow::Continue
    })
}
