//! tonearm — play audio files through a lock-free streaming pipeline
//!
//! Plays the given files sequentially, re-opening the output stream per
//! file, with a periodic status line while playback runs.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tonearm::output::{CpalBackend, OutputBackend};
use tonearm::{FilePlayer, PlaybackStatus};

/// Interval between playback status log lines.
const STATUS_INTERVAL: Duration = Duration::from_secs(2);

/// tonearm - audio file player (MP3, FLAC, WAV)
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Audio files to play, in order
    #[arg(value_name = "FILE", required_unless_present = "list_devices")]
    files: Vec<PathBuf>,

    /// Audio output device index
    #[arg(short, long, default_value_t = 0)]
    device: usize,

    /// Ring buffer capacity in frames (rounded up to a power of two)
    #[arg(short = 'c', long, default_value_t = 256)]
    capacity: u64,

    /// Output frames per callback
    #[arg(short = 'p', long, default_value_t = 512)]
    frames_per_buffer: usize,

    /// Samples decoded per frame
    #[arg(short = 's', long, default_value_t = 4096)]
    samples_per_frame: usize,

    /// List available output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("tonearm={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if args.list_devices {
        let backend = CpalBackend::new();
        for (index, name) in backend.devices()?.iter().enumerate() {
            println!("{index}: {name}");
        }
        return Ok(());
    }

    info!(
        device_index = args.device,
        frame_capacity = args.capacity,
        frames_per_buffer = args.frames_per_buffer,
        samples_per_frame = args.samples_per_frame,
        file_count = args.files.len(),
        "starting playback"
    );

    let player = Arc::new(FilePlayer::new(
        args.device,
        args.capacity,
        args.frames_per_buffer,
        args.samples_per_frame,
    ));

    for (index, file) in args.files.iter().enumerate() {
        info!(
            index = index + 1,
            total = args.files.len(),
            file = %file.display(),
            "playing file"
        );

        if let Err(e) = player.open_file(file) {
            error!(file = %file.display(), "failed to open file: {e}");
            continue;
        }

        if let Err(e) = player.play() {
            error!(file = %file.display(), "failed to start playback: {e}");
            continue;
        }

        let monitor = spawn_monitor(Arc::clone(&player));

        player.wait();
        monitor.finish();

        info!(file = %file.display(), "file completed");
        if let Err(e) = player.stop() {
            error!("failed to stop player: {e}");
        }
    }

    info!(total = args.files.len(), "all files completed");
    Ok(())
}

struct Monitor {
    done: Arc<AtomicBool>,
    handle: std::thread::JoinHandle<()>,
}

impl Monitor {
    fn finish(self) {
        self.done.store(true, Ordering::Release);
        let _ = self.handle.join();
    }
}

/// Log playback status every couple of seconds until told to stop.
fn spawn_monitor(player: Arc<FilePlayer>) -> Monitor {
    let done = Arc::new(AtomicBool::new(false));
    let done_flag = Arc::clone(&done);

    let handle = std::thread::spawn(move || {
        let mut next_report = std::time::Instant::now() + STATUS_INTERVAL;
        while !done_flag.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(50));
            if std::time::Instant::now() >= next_report {
                log_status(&player.playback_status());
                next_report += STATUS_INTERVAL;
            }
        }
    });

    Monitor { done, handle }
}

fn log_status(status: &PlaybackStatus) {
    info!(
        file = %status.file_name,
        format = %format!(
            "{}Hz:{}bit:{}ch:{}frames",
            status.sample_rate,
            status.bits_per_sample,
            status.channels,
            status.frames_per_buffer
        ),
        played = %format_clock(Duration::from_secs_f64(status.played_seconds())),
        buffered = %format!("{:.3}s", status.buffered_seconds()),
        elapsed = %format_clock(status.elapsed),
        underruns = status.underruns,
        "playback status"
    );
}

/// hh:mm:ss.msec
fn format_clock(d: Duration) -> String {
    let total_ms = d.as_millis();
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        total_ms / 3_600_000,
        (total_ms % 3_600_000) / 60_000,
        (total_ms % 60_000) / 1000,
        total_ms % 1000
    )
}
