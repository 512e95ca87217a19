//! cpal-backed output streams
//!
//! cpal's `Stream` is not `Send`, so each open stream gets a keeper thread
//! that builds and owns the stream and executes start/stop/close commands
//! on its behalf. The handle returned to the player is just a command
//! sender, which keeps the player shareable across threads.
//!
//! The byte-oriented callback contract is adapted onto cpal's typed sample
//! buffers here: a staging byte buffer (allocated once at build time) is
//! filled by the user callback and converted into the stream's native
//! samples. 24-bit payloads ride an int32 stream, widened by one byte.

use std::sync::mpsc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

use super::{OutputBackend, OutputCallback, OutputStream, SampleFormat, StreamFlow, StreamParams};

/// Host audio backend over cpal.
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        CpalBackend
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBackend for CpalBackend {
    fn devices(&self) -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices = host
            .output_devices()
            .map_err(|e| Error::Device(format!("failed to enumerate devices: {e}")))?
            .map(|d| d.name().unwrap_or_else(|_| "Unknown".to_string()))
            .collect::<Vec<_>>();

        debug!("found {} output devices", devices.len());
        Ok(devices)
    }

    fn open_stream(
        &self,
        params: &StreamParams,
        callback: OutputCallback,
    ) -> Result<Box<dyn OutputStream>> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Cmd>();
        let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<(), String>>();
        let params = params.clone();

        thread::Builder::new()
            .name("cpal-output".into())
            .spawn(move || keeper(params, callback, cmd_rx, ready_tx))
            .map_err(|e| Error::StreamOpen(format!("failed to spawn stream thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalStream {
                cmd_tx,
                closed: false,
            })),
            Ok(Err(message)) => Err(Error::StreamOpen(message)),
            Err(_) => Err(Error::StreamOpen("stream thread died during open".into())),
        }
    }
}

enum Cmd {
    Start(mpsc::Sender<std::result::Result<(), String>>),
    Stop(mpsc::Sender<std::result::Result<(), String>>),
    Close(mpsc::Sender<std::result::Result<(), String>>),
}

/// Handle to a stream owned by its keeper thread.
struct CpalStream {
    cmd_tx: mpsc::Sender<Cmd>,
    closed: bool,
}

impl CpalStream {
    fn roundtrip(
        &self,
        make: impl FnOnce(mpsc::Sender<std::result::Result<(), String>>) -> Cmd,
        wrap: impl Fn(String) -> Error,
    ) -> Result<()> {
        let (ack_tx, ack_rx) = mpsc::channel();
        self.cmd_tx
            .send(make(ack_tx))
            .map_err(|_| wrap("stream thread gone".into()))?;
        match ack_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(wrap(message)),
            Err(_) => Err(wrap("stream thread gone".into())),
        }
    }
}

impl OutputStream for CpalStream {
    fn start(&mut self) -> Result<()> {
        self.roundtrip(Cmd::Start, Error::StreamStart)
    }

    fn stop(&mut self) -> Result<()> {
        self.roundtrip(Cmd::Stop, Error::StreamStop)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.roundtrip(Cmd::Close, Error::StreamClose)
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                warn!("failed to close stream on drop: {e}");
            }
        }
    }
}

/// Keeper thread body: build the stream, report readiness, serve commands.
fn keeper(
    params: StreamParams,
    callback: OutputCallback,
    cmd_rx: mpsc::Receiver<Cmd>,
    ready_tx: mpsc::Sender<std::result::Result<(), String>>,
) {
    let stream = match build_stream(&params, callback) {
        Ok(stream) => stream,
        Err(message) => {
            let _ = ready_tx.send(Err(message));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));

    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            Cmd::Start(ack) => {
                let _ = ack.send(stream.play().map_err(|e| e.to_string()));
            }
            Cmd::Stop(ack) => {
                let _ = ack.send(stream.pause().map_err(|e| e.to_string()));
            }
            Cmd::Close(ack) => {
                drop(stream);
                let _ = ack.send(Ok(()));
                return;
            }
        }
    }
    // Command sender dropped without Close: the stream falls out of scope
    // here and is released.
}

fn build_stream(
    params: &StreamParams,
    callback: OutputCallback,
) -> std::result::Result<cpal::Stream, String> {
    let host = cpal::default_host();

    let device = host
        .output_devices()
        .map_err(|e| format!("failed to enumerate devices: {e}"))?
        .nth(params.device_index)
        .ok_or_else(|| format!("no output device at index {}", params.device_index))?;

    debug!(
        device = %device.name().unwrap_or_else(|_| "Unknown".to_string()),
        sample_rate = params.sample_rate,
        channels = params.channels,
        format = ?params.sample_format,
        frames_per_callback = params.frames_per_callback,
        "opening output stream"
    );

    let config = cpal::StreamConfig {
        channels: params.channels as u16,
        sample_rate: cpal::SampleRate(params.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(params.frames_per_callback as u32),
    };

    match params.sample_format {
        SampleFormat::Int16 => build_i16(&device, &config, params, callback),
        SampleFormat::Int24 | SampleFormat::Int32 => {
            build_i32(&device, &config, params, callback)
        }
    }
}

fn build_i16(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    params: &StreamParams,
    mut callback: OutputCallback,
) -> std::result::Result<cpal::Stream, String> {
    let channels = params.channels as usize;
    let samples_per_callback = params.frames_per_callback * channels;
    // Staging buffer allocated once; the audio thread never grows it.
    let mut staging = vec![0u8; samples_per_callback * 2];
    let mut finished = false;

    device
        .build_output_stream(
            config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                for chunk in data.chunks_mut(samples_per_callback) {
                    if finished {
                        chunk.fill(0);
                        continue;
                    }

                    let frame_count = chunk.len() / channels;
                    let bytes = &mut staging[..frame_count * channels * 2];
                    let flow = callback(bytes, frame_count);

                    for (sample, raw) in chunk.iter_mut().zip(bytes.chunks_exact(2)) {
                        *sample = i16::from_ne_bytes([raw[0], raw[1]]);
                    }

                    if flow != StreamFlow::Continue {
                        finished = true;
                    }
                }
            },
            |err| error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| format!("failed to build stream: {e}"))
}

fn build_i32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    params: &StreamParams,
    mut callback: OutputCallback,
) -> std::result::Result<cpal::Stream, String> {
    let channels = params.channels as usize;
    let bytes_per_sample = params.sample_format.bytes_per_sample();
    let samples_per_callback = params.frames_per_callback * channels;
    let mut staging = vec![0u8; samples_per_callback * bytes_per_sample];
    let mut finished = false;

    device
        .build_output_stream(
            config,
            move |data: &mut [i32], _: &cpal::OutputCallbackInfo| {
                for chunk in data.chunks_mut(samples_per_callback) {
                    if finished {
                        chunk.fill(0);
                        continue;
                    }

                    let frame_count = chunk.len() / channels;
                    let bytes = &mut staging[..frame_count * channels * bytes_per_sample];
                    let flow = callback(bytes, frame_count);

                    match bytes_per_sample {
                        3 => {
                            // 24-bit payload widened into the i32 stream.
                            for (sample, raw) in chunk.iter_mut().zip(bytes.chunks_exact(3)) {
                                let value = (raw[0] as i32)
                                    | ((raw[1] as i32) << 8)
                                    | ((raw[2] as i8 as i32) << 16);
                                *sample = value << 8;
                            }
                        }
                        _ => {
                            for (sample, raw) in chunk.iter_mut().zip(bytes.chunks_exact(4)) {
                                *sample = i32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]);
                            }
                        }
                    }

                    if flow != StreamFlow::Continue {
                        finished = true;
                    }
                }
            },
            |err| error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| format!("failed to build stream: {e}"))
}
