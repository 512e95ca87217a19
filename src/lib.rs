//! # tonearm
//!
//! Real-time audio file player built on a lock-free single-producer /
//! single-consumer streaming pipeline.
//!
//! **Purpose:** Decode audio files on an ordinary thread, stream decoded
//! frames through a lock-free ring, and drain them from a host-driven
//! real-time audio callback — preserving audio continuity, detecting
//! end-of-stream exactly once, and shutting down deterministically.
//!
//! **Architecture:** symphonia decoders → producer thread → SPSC frame
//! ring → cpal output callback. The byte ring plus the stream decoder form
//! the simpler byte-oriented pipeline for non-file PCM sources.

pub mod decoder;
pub mod error;
pub mod frame;
pub mod output;
pub mod player;
pub mod ring;

pub use error::{Error, Result};
pub use frame::{AudioFrame, FrameFormat};
pub use player::{FilePlayer, PlaybackStatus};
