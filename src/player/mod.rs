//! Playback engine
//!
//! [`FilePlayer`] owns the whole pipeline: decoder → producer thread →
//! frame ring → real-time callback → output device.

mod file_player;
mod status;

pub use file_player::FilePlayer;
pub use status::PlaybackStatus;
