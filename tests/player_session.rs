//! End-to-end playback sessions over a headless output backend
//!
//! Full pipeline runs: synthetic decoder → producer thread → frame ring →
//! callback driven by the manual backend. Covers drain-to-completion
//! accounting, stop idempotence under contention, the byte-ring stream
//! pipeline and mid-stream decoder failure.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tonearm::decoder::stream_pair;
use tonearm::FilePlayer;

mod helpers;

use helpers::{cd_format, FailingDecoder, ManualBackend, SyntheticDecoder};

fn player_with_backend(backend: ManualBackend) -> FilePlayer {
    FilePlayer::with_backend(Box::new(backend), 0, 16, 512, 4096)
}

#[test]
fn test_playback_completes_with_exact_counters() {
    // 10 decode calls of 4096 samples, then end-of-stream.
    let backend = ManualBackend::new();
    let player = player_with_backend(backend);

    let decoder = SyntheticDecoder::new(cd_format(), 10);
    player.open_decoder(Box::new(decoder), "synthetic").unwrap();

    player.play().unwrap();
    player.wait();

    let status = player.playback_status();
    assert_eq!(status.played_samples, 40_960);
    assert_eq!(status.buffered_samples, 0);
    assert!(player.is_complete());

    player.stop().unwrap();

    // Counters are untouched by teardown.
    let status = player.playback_status();
    assert_eq!(status.played_samples, 40_960);
    assert_eq!(status.buffered_samples, 0);
}

#[test]
fn test_wait_returns_exactly_once_per_session() {
    let backend = ManualBackend::new();
    let player = Arc::new(player_with_backend(backend));

    let decoder = SyntheticDecoder::new(cd_format(), 4);
    player.open_decoder(Box::new(decoder), "synthetic").unwrap();
    player.play().unwrap();

    // Two waiters: both must return, one consuming the signal and the
    // other observing the drained session.
    let waiter = {
        let player = Arc::clone(&player);
        thread::spawn(move || player.wait())
    };
    player.wait();
    waiter.join().unwrap();

    assert!(player.is_complete());
    player.stop().unwrap();
}

#[test]
fn test_stop_idempotent_from_ten_threads() {
    // Long stream, slow pace: stop lands mid-playback.
    let backend = ManualBackend::with_pace(Duration::from_millis(1));
    let stream_closes = backend.close_counter();
    let player = Arc::new(player_with_backend(backend));

    let decoder = SyntheticDecoder::new(cd_format(), usize::MAX);
    let decoder_closes = decoder.close_counter();
    player.open_decoder(Box::new(decoder), "synthetic").unwrap();
    player.play().unwrap();

    // Let playback actually run before tearing it down.
    thread::sleep(Duration::from_millis(20));

    let stoppers: Vec<_> = (0..10)
        .map(|_| {
            let player = Arc::clone(&player);
            thread::spawn(move || player.stop())
        })
        .collect();

    for stopper in stoppers {
        assert!(stopper.join().unwrap().is_ok());
    }

    // Exactly one teardown: one stream close, one decoder close.
    assert_eq!(stream_closes.load(Ordering::SeqCst), 1);
    assert_eq!(decoder_closes.load(Ordering::SeqCst), 1);

    // Stop after stop is still a success and still no second teardown.
    player.stop().unwrap();
    assert_eq!(decoder_closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_wait_after_stop_does_not_hang() {
    let backend = ManualBackend::with_pace(Duration::from_millis(1));
    let player = Arc::new(player_with_backend(backend));

    let decoder = SyntheticDecoder::new(cd_format(), usize::MAX);
    player.open_decoder(Box::new(decoder), "synthetic").unwrap();
    player.play().unwrap();

    thread::sleep(Duration::from_millis(10));
    player.stop().unwrap();

    // The session was cancelled before draining; wait must still return.
    player.wait();
}

#[test]
fn test_status_counters_monotone_during_playback() {
    let backend = ManualBackend::new();
    let player = player_with_backend(backend);

    let decoder = SyntheticDecoder::new(cd_format(), 20);
    player.open_decoder(Box::new(decoder), "synthetic").unwrap();
    player.play().unwrap();

    let mut last_played = 0u64;
    loop {
        let status = player.playback_status();
        assert!(
            status.played_samples >= last_played,
            "played_samples went backwards: {} -> {}",
            last_played,
            status.played_samples
        );
        last_played = status.played_samples;

        if player.is_complete() {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }

    player.wait();
    player.stop().unwrap();
}

#[test]
fn test_stream_decoder_pipeline() {
    // Byte-ring pipeline: feeder thread → stream decoder → player.
    let format = cd_format();
    let (source, decoder) = stream_pair(64 * 1024, format);

    let backend = ManualBackend::new();
    let player = player_with_backend(backend);
    player.open_decoder(Box::new(decoder), "pcm-stream").unwrap();

    // Feed 25 chunks of 1024 samples (4096 bytes each), then finish.
    const CHUNKS: usize = 25;
    const CHUNK_SAMPLES: usize = 1024;
    let chunk_bytes = CHUNK_SAMPLES * format.frame_bytes();

    let feeder = thread::spawn(move || {
        for i in 0..CHUNKS {
            let chunk = vec![i as u8; chunk_bytes];
            source.write_all(&chunk).unwrap();
        }
        source.finish();
    });

    player.play().unwrap();
    player.wait();
    feeder.join().unwrap();

    let status = player.playback_status();
    assert_eq!(status.played_samples, (CHUNKS * CHUNK_SAMPLES) as u64);
    assert_eq!(status.buffered_samples, 0);

    player.stop().unwrap();
}

#[test]
fn test_mid_stream_decode_error_drains_and_completes() {
    // A decoder failure mid-stream is end-of-stream: the session drains
    // what was produced and completes normally.
    let backend = ManualBackend::new();
    let player = player_with_backend(backend);

    let decoder = FailingDecoder::new(cd_format(), 3);
    player.open_decoder(Box::new(decoder), "flaky").unwrap();

    player.play().unwrap();
    player.wait();

    let status = player.playback_status();
    assert_eq!(status.played_samples, 3 * 4096);
    assert_eq!(status.buffered_samples, 0);
    assert!(player.is_complete());

    player.stop().unwrap();
}

#[test]
fn test_sequential_sessions_reuse_player() {
    let backend = ManualBackend::new();
    let player = player_with_backend(backend);

    for round in 1..=3u64 {
        let decoder = SyntheticDecoder::new(cd_format(), 2);
        player.open_decoder(Box::new(decoder), "round").unwrap();
        player.play().unwrap();
        player.wait();

        // Counters are per-session, not cumulative.
        let status = player.playback_status();
        assert_eq!(
            status.played_samples, 8192,
            "round {round}: stale counters leaked across sessions"
        );

        player.stop().unwrap();
    }
}
