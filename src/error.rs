//! Error types for tonearm
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for the tonearm crate
#[derive(Error, Debug)]
pub enum Error {
    /// Ring buffer cannot accept the write (back-pressure signal)
    ///
    /// Recoverable: the producer retries once the consumer has drained.
    #[error("insufficient space in ring buffer")]
    InsufficientSpace,

    /// Ring buffer has no data for the read (underrun signal)
    ///
    /// Recoverable: the consumer retries, or fills with silence.
    #[error("insufficient data in ring buffer")]
    InsufficientData,

    /// Serialized frame shorter than the fixed header
    #[error("truncated frame header: got {got} bytes, need at least {need}")]
    TruncatedHeader { got: usize, need: usize },

    /// Serialized frame shorter than header + declared payload length
    #[error("truncated frame payload: got {got} bytes, need {need}")]
    TruncatedPayload { got: usize, need: usize },

    /// File extension does not map to a known decoder
    #[error("unsupported file format: {extension:?} (supported: .mp3, .flac, .fla, .wav)")]
    UnsupportedFormat { extension: String },

    /// Bit depth has no corresponding output sample format
    #[error("unsupported bit depth: {bits}")]
    UnsupportedBitDepth { bits: u8 },

    /// Decoder failed to open a source
    #[error("decoder open failed: {path}: {message}")]
    DecoderOpen {
        path: std::path::PathBuf,
        message: String,
    },

    /// Decoder failed mid-stream
    #[error("decode error: {0}")]
    Decode(String),

    /// Operation requires an open decoder
    #[error("no file opened")]
    NoFileOpen,

    /// Host audio backend failed to open a stream
    #[error("stream open failed: {0}")]
    StreamOpen(String),

    /// Host audio backend failed to start a stream
    #[error("stream start failed: {0}")]
    StreamStart(String),

    /// Host audio backend failed to stop a stream
    #[error("stream stop failed: {0}")]
    StreamStop(String),

    /// Host audio backend failed to close a stream
    #[error("stream close failed: {0}")]
    StreamClose(String),

    /// Audio device enumeration or lookup failed
    #[error("audio device error: {0}")]
    Device(String),

    /// File I/O errors
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using the tonearm Error
pub type Result<T> = std::result::Result<T, Error>;
