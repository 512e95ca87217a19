//! Audio decoder contract and format-detection factory
//!
//! A decoder turns an audio source into interleaved PCM samples on demand.
//! The producer task is a decoder's exclusive user; decoders are
//! single-threaded and may block on I/O.

mod file;
mod stream;

pub use file::FileDecoder;
pub use stream::{stream_pair, StreamDecoder, StreamSource};

use std::path::Path;

use crate::error::{Error, Result};
use crate::frame::FrameFormat;

/// Common interface for all audio decoders.
///
/// All decoders yield raw interleaved PCM bytes through `decode_samples`
/// and describe that PCM through `format`.
pub trait AudioDecoder: Send {
    /// Open a named source for decoding.
    ///
    /// Any previously open source is closed first.
    fn open(&mut self, path: &Path) -> Result<()>;

    /// Release decoder resources. Idempotent.
    fn close(&mut self) -> Result<()>;

    /// Format of the decoded PCM. Valid only after a successful `open`.
    fn format(&self) -> FrameFormat;

    /// Decode up to `samples` interleaved samples into `out`.
    ///
    /// `out` must hold at least `samples * channels * bits_per_sample / 8`
    /// bytes. Returns the number of samples actually decoded; zero signals
    /// end-of-stream.
    fn decode_samples(&mut self, samples: usize, out: &mut [u8]) -> Result<usize>;
}

/// Create and open the decoder matching a file's extension.
///
/// Extension matching is case-insensitive: `.mp3`, `.flac`, `.fla` and
/// `.wav` are recognized; anything else fails with
/// [`Error::UnsupportedFormat`]. The returned decoder is already open.
pub fn new_decoder(path: &Path) -> Result<Box<dyn AudioDecoder>> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "mp3" | "flac" | "fla" | "wav" => {
            let mut decoder = Box::new(FileDecoder::new());
            decoder.open(path)?;
            Ok(decoder)
        }
        _ => Err(Error::UnsupportedFormat { extension }),
    }
}
