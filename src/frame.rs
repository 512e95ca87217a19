//! Audio frame type and its binary wire format
//!
//! An [`AudioFrame`] is one quantum of decoded audio: a format descriptor, a
//! sample count, and an owned payload of interleaved PCM bytes. Frames are
//! the unit the producer publishes into the frame ring and the unit the
//! audio callback drains.
//!
//! Frames also have a stable serialized form for crossing process or storage
//! boundaries: a tightly packed little-endian 12-byte header followed by the
//! raw payload.
//!
//! ```text
//! offset  size  field
//!      0     4  sample_rate (u32)
//!      4     1  channels (u8)
//!      5     1  bits_per_sample (u8)
//!      6     2  samples_count (u16)
//!      8     4  payload length (u32)
//!     12     N  payload
//! ```

use crate::error::{Error, Result};

/// Size of the serialized frame header in bytes.
pub const HEADER_LEN: usize = 12;

/// Per-frame audio format descriptor.
///
/// Immutable for the lifetime of a frame. All frames of one playback session
/// share the same format; the stream is re-opened on format change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    /// Sample rate in Hz (up to 384000)
    pub sample_rate: u32,

    /// Number of interleaved channels (1..=10)
    pub channels: u8,

    /// Bit depth of one sample: 8, 16, 24 or 32
    pub bits_per_sample: u8,
}

impl FrameFormat {
    /// Bytes occupied by a single sample on one channel.
    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// Bytes occupied by one interleaved sample across all channels.
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * self.bytes_per_sample()
    }
}

/// One quantum of decoded audio.
///
/// The payload holds `samples_count` interleaved samples per channel, so
/// `audio.len() == samples_count * channels * bits_per_sample / 8`.
///
/// Ownership: built by the producer, deep-copied into the frame ring on
/// write, owned by the consumer after read until fully drained into the
/// output buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Format of the payload
    pub format: FrameFormat,

    /// Interleaved samples per channel in this frame
    pub samples_count: u16,

    /// Raw interleaved PCM bytes
    pub audio: Vec<u8>,
}

impl AudioFrame {
    /// Serialize into the packed little-endian wire form.
    ///
    /// Allocates a single buffer of `HEADER_LEN + audio.len()` bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN + self.audio.len()];

        buf[0..4].copy_from_slice(&self.format.sample_rate.to_le_bytes());
        buf[4] = self.format.channels;
        buf[5] = self.format.bits_per_sample;
        buf[6..8].copy_from_slice(&self.samples_count.to_le_bytes());
        buf[8..12].copy_from_slice(&(self.audio.len() as u32).to_le_bytes());
        buf[HEADER_LEN..].copy_from_slice(&self.audio);

        buf
    }

    /// Deserialize a frame from its wire form.
    ///
    /// Fails with [`Error::TruncatedHeader`] when the input is shorter than
    /// the fixed header, and with [`Error::TruncatedPayload`] when the input
    /// is shorter than the header plus the declared payload length. The
    /// payload is copied into a fresh allocation.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::TruncatedHeader {
                got: data.len(),
                need: HEADER_LEN,
            });
        }

        let sample_rate = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let channels = data[4];
        let bits_per_sample = data[5];
        let samples_count = u16::from_le_bytes([data[6], data[7]]);
        let audio_len = u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize;

        if data.len() < HEADER_LEN + audio_len {
            return Err(Error::TruncatedPayload {
                got: data.len(),
                need: HEADER_LEN + audio_len,
            });
        }

        Ok(AudioFrame {
            format: FrameFormat {
                sample_rate,
                channels,
                bits_per_sample,
            },
            samples_count,
            audio: data[HEADER_LEN..HEADER_LEN + audio_len].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frame() -> AudioFrame {
        AudioFrame {
            format: FrameFormat {
                sample_rate: 44100,
                channels: 2,
                bits_per_sample: 16,
            },
            samples_count: 4,
            audio: vec![
                0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D,
                0x0E, 0x0F, 0x10,
            ],
        }
    }

    #[test]
    fn test_marshal_layout() {
        let frame = test_frame();
        let bytes = frame.to_bytes();

        assert_eq!(bytes.len(), HEADER_LEN + 16);

        // 44100 = 0xAC44 little-endian, then channels, bits, count, length
        let expected_header = [
            0x44, 0xAC, 0x00, 0x00, 0x02, 0x10, 0x04, 0x00, 0x10, 0x00, 0x00, 0x00,
        ];
        assert_eq!(&bytes[..HEADER_LEN], &expected_header);
        assert_eq!(&bytes[HEADER_LEN..], &frame.audio[..]);
    }

    #[test]
    fn test_round_trip() {
        let frame = test_frame();
        let decoded = AudioFrame::from_bytes(&frame.to_bytes()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_round_trip_empty_payload() {
        let frame = AudioFrame {
            format: FrameFormat {
                sample_rate: 48000,
                channels: 1,
                bits_per_sample: 8,
            },
            samples_count: 0,
            audio: Vec::new(),
        };

        let bytes = frame.to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN);

        let decoded = AudioFrame::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_truncated_header() {
        let err = AudioFrame::from_bytes(&[0x01, 0x02, 0x03]).unwrap_err();
        assert!(matches!(err, Error::TruncatedHeader { got: 3, need: 12 }));
    }

    #[test]
    fn test_truncated_payload() {
        let mut bytes = test_frame().to_bytes();
        bytes.truncate(HEADER_LEN + 7);

        let err = AudioFrame::from_bytes(&bytes).unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedPayload { got: 19, need: 28 }
        ));
    }

    #[test]
    fn test_unmarshal_ignores_trailing_bytes() {
        let mut bytes = test_frame().to_bytes();
        bytes.extend_from_slice(&[0xFF, 0xFF, 0xFF]);

        let decoded = AudioFrame::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, test_frame());
    }

    #[test]
    fn test_format_byte_math() {
        let format = FrameFormat {
            sample_rate: 44100,
            channels: 2,
            bits_per_sample: 24,
        };
        assert_eq!(format.bytes_per_sample(), 3);
        assert_eq!(format.frame_bytes(), 6);
    }
}
