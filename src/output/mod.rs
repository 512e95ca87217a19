//! Host audio output boundary
//!
//! The player drives audio through a callback-mode output stream owned by a
//! host audio library. This module pins down that boundary as a pair of
//! traits so the player core stays independent of the concrete host:
//! [`CpalBackend`] talks to real hardware, and tests drive the same
//! callback from a plain thread.
//!
//! The callback contract mirrors callback-mode audio hosts: the host calls
//! user code with an output byte buffer and a frame count, and the user
//! code answers with a [`StreamFlow`] verdict.

mod cpal_backend;

pub use cpal_backend::CpalBackend;

use crate::error::{Error, Result};

/// Verdict returned by the output callback to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFlow {
    /// Keep the stream running and call again.
    Continue,

    /// The stream has drained; the host may stop invoking the callback.
    Complete,

    /// Abort the stream immediately.
    Abort,
}

/// Output sample format negotiated at stream open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Int16,
    Int24,
    Int32,
}

impl SampleFormat {
    /// Map a PCM bit depth to its output sample format.
    ///
    /// Only 16, 24 and 32 have native formats; anything else fails with
    /// [`Error::UnsupportedBitDepth`].
    pub fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            16 => Ok(SampleFormat::Int16),
            24 => Ok(SampleFormat::Int24),
            32 => Ok(SampleFormat::Int32),
            _ => Err(Error::UnsupportedBitDepth { bits }),
        }
    }

    /// Payload bytes per sample on one channel.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::Int16 => 2,
            SampleFormat::Int24 => 3,
            SampleFormat::Int32 => 4,
        }
    }
}

/// Parameters for opening a callback-mode output stream.
#[derive(Debug, Clone)]
pub struct StreamParams {
    /// Output device index, as enumerated by the backend
    pub device_index: usize,

    /// Interleaved channel count
    pub channels: u8,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Negotiated sample format
    pub sample_format: SampleFormat,

    /// Frames delivered per callback invocation
    pub frames_per_callback: usize,
}

impl StreamParams {
    /// Output buffer size in bytes for one full callback invocation.
    pub fn bytes_per_callback(&self) -> usize {
        self.frames_per_callback * self.channels as usize * self.sample_format.bytes_per_sample()
    }
}

/// The output callback.
///
/// Invoked on the host's real-time audio thread with an output buffer of
/// exactly `frame_count * channels * bytes_per_sample` bytes. Every path
/// through the callback must avoid heap allocation, locks and any blocking
/// synchronization; atomic loads/stores, plain memory moves and arithmetic
/// only, with work bounded by `frame_count`.
pub type OutputCallback = Box<dyn FnMut(&mut [u8], usize) -> StreamFlow + Send + 'static>;

/// An open callback-mode output stream.
pub trait OutputStream: Send {
    /// Begin invoking the callback.
    fn start(&mut self) -> Result<()>;

    /// Stop invoking the callback. Returns after the last in-flight
    /// invocation has completed.
    fn stop(&mut self) -> Result<()>;

    /// Release the stream. Idempotent.
    fn close(&mut self) -> Result<()>;
}

/// A host audio backend able to enumerate devices and open streams.
pub trait OutputBackend: Send + Sync {
    /// Names of the available output devices, indexable by position.
    fn devices(&self) -> Result<Vec<String>>;

    /// Open (but do not start) a callback-mode stream.
    fn open_stream(
        &self,
        params: &StreamParams,
        callback: OutputCallback,
    ) -> Result<Box<dyn OutputStream>>;
}
