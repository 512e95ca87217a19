//! File decoder backed by symphonia
//!
//! One decoder covers MP3, FLAC and WAV through symphonia's probe. Decoded
//! packets are converted to interleaved integer PCM and carried over in a
//! pending byte queue, so `decode_samples` can serve exactly the requested
//! sample count regardless of the codec's packet sizing.
//!
//! Output depth: 16-bit for lossy and 16-bit sources, 32-bit when the
//! source carries more than 16 bits per sample. `format()` reports the
//! emitted depth, not the on-disk one.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::{AudioBufferRef, RawSampleBuffer, SignalSpec};
use symphonia::core::codecs::{Decoder as SymphoniaDecoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::frame::FrameFormat;

use super::AudioDecoder;

/// Emitted PCM depth, chosen from the source's declared bits per sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Depth {
    S16,
    S32,
}

struct OpenState {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn SymphoniaDecoder>,
    track_id: u32,
    format: FrameFormat,
    depth: Depth,

    /// Decoded-but-undelivered interleaved bytes
    pending: Vec<u8>,
    eof: bool,
}

/// Symphonia-backed decoder for MP3, FLAC and WAV files.
pub struct FileDecoder {
    state: Option<OpenState>,
    last_format: FrameFormat,
}

impl FileDecoder {
    pub fn new() -> Self {
        Self {
            state: None,
            last_format: FrameFormat {
                sample_rate: 0,
                channels: 0,
                bits_per_sample: 0,
            },
        }
    }
}

impl Default for FileDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDecoder for FileDecoder {
    fn open(&mut self, path: &Path) -> Result<()> {
        self.close()?;

        let open_err = |message: String| Error::DecoderOpen {
            path: path.to_path_buf(),
            message,
        };

        let file = File::open(path).map_err(|e| open_err(e.to_string()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension() {
            hint.with_extension(ext.to_str().unwrap_or(""));
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| open_err(format!("probe failed: {e}")))?;

        let reader = probed.format;

        let track = reader
            .default_track()
            .ok_or_else(|| open_err("no audio track found".to_string()))?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| open_err("source reports no sample rate".to_string()))?;
        let channels = codec_params
            .channels
            .map(|c| c.count())
            .ok_or_else(|| open_err("source reports no channel layout".to_string()))?;

        // Emit 32-bit PCM only when the source actually carries the extra
        // depth; everything else plays as 16-bit.
        let depth = match codec_params.bits_per_sample {
            Some(bits) if bits > 16 => Depth::S32,
            _ => Depth::S16,
        };

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| open_err(format!("no codec: {e}")))?;

        let format = FrameFormat {
            sample_rate,
            channels: channels as u8,
            bits_per_sample: match depth {
                Depth::S16 => 16,
                Depth::S32 => 32,
            },
        };

        debug!(
            path = %path.display(),
            sample_rate = format.sample_rate,
            channels = format.channels,
            bits_per_sample = format.bits_per_sample,
            "audio file opened"
        );

        self.last_format = format;
        self.state = Some(OpenState {
            reader,
            decoder,
            track_id,
            format,
            depth,
            pending: Vec::new(),
            eof: false,
        });

        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.state.take().is_some() {
            trace!("decoder closed");
        }
        Ok(())
    }

    fn format(&self) -> FrameFormat {
        self.last_format
    }

    fn decode_samples(&mut self, samples: usize, out: &mut [u8]) -> Result<usize> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| Error::Decode("decoder not open".to_string()))?;

        let sample_bytes = state.format.frame_bytes();
        let wanted = samples * sample_bytes;

        // Refill the pending queue until we can serve the request or the
        // stream ends.
        while state.pending.len() < wanted && !state.eof {
            match next_pcm(state) {
                Ok(true) => {}
                Ok(false) => state.eof = true,
                Err(e) => return Err(e),
            }
        }

        let take = wanted.min(state.pending.len());
        let take = take - take % sample_bytes;
        if take == 0 {
            return Ok(0);
        }

        out[..take].copy_from_slice(&state.pending[..take]);
        state.pending.drain(..take);

        Ok(take / sample_bytes)
    }
}

/// Decode the next packet of the selected track into `state.pending`.
///
/// Returns Ok(false) at end-of-stream.
fn next_pcm(state: &mut OpenState) -> Result<bool> {
    loop {
        let packet = match state.reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                return Ok(false);
            }
            // A reset means new stream parameters; this session ends here
            // and the caller re-opens for the new format.
            Err(SymphoniaError::ResetRequired) => return Ok(false),
            Err(e) => return Err(Error::Decode(e.to_string())),
        };

        if packet.track_id() != state.track_id {
            continue;
        }

        let decoded = match state.decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Malformed packet: skip it and keep decoding.
            Err(SymphoniaError::DecodeError(e)) => {
                trace!("skipping undecodable packet: {e}");
                continue;
            }
            Err(e) => return Err(Error::Decode(e.to_string())),
        };

        append_interleaved(&mut state.pending, state.depth, &decoded);
        return Ok(true);
    }
}

/// Convert a decoded buffer to interleaved PCM bytes and append to pending.
fn append_interleaved(pending: &mut Vec<u8>, depth: Depth, decoded: &AudioBufferRef) {
    let spec: SignalSpec = *decoded.spec();
    let frames = decoded.frames() as u64;

    match depth {
        Depth::S16 => {
            let mut buf = RawSampleBuffer::<i16>::new(frames, spec);
            buf.copy_interleaved_ref(decoded.clone());
            pending.extend_from_slice(buf.as_bytes());
        }
        Depth::S32 => {
            let mut buf = RawSampleBuffer::<i32>::new(frames, spec);
            buf.copy_interleaved_ref(decoded.clone());
            pending.extend_from_slice(buf.as_bytes());
        }
    }
}
