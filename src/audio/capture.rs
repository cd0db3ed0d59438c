//! Microphone capture and monitor playback via `cpal`.
//!
//! [`AudioCapture`] wraps the cpal host/device/stream lifecycle for the
//! input side.  Call [`AudioCapture::start`] to begin streaming
//! [`AudioChunk`]s to the studio controller.  [`AudioPlayback`] plays the
//! effects graph output from a [`SharedRingBuffer`].  Both return a
//! [`StreamHandle`] RAII guard: dropping it stops the underlying stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::audio::buffer::SharedRingBuffer;

// ---------------------------------------------------------------------------
// StreamInfo / AudioChunk
// ---------------------------------------------------------------------------

/// Format of a live input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    /// Native sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

/// A single buffer of raw audio as delivered by the input callback.
///
/// Samples are interleaved `f32` in the range `[-1.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved PCM samples.
    pub samples: Vec<f32>,
    /// Sample rate of this chunk in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

impl AudioChunk {
    /// A mono chunk, mostly useful for feeding the studio without a device.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// StreamHandle
// ---------------------------------------------------------------------------

/// RAII guard that keeps a cpal stream alive.
pub struct StreamHandle {
    _stream: cpal::Stream,
    dropped: Option<Arc<AtomicU64>>,
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        let dropped = self.dropped.as_ref().map_or(0, |d| d.load(Ordering::Relaxed));
        if dropped > 0 {
            log::warn!("{dropped} input blocks were dropped while the controller was behind");
        }
    }
}

// ---------------------------------------------------------------------------
// ChunkSender
// ---------------------------------------------------------------------------

/// Hands input blocks to the controller without blocking the audio thread.
/// Blocks that find the channel full are dropped and counted.
struct ChunkSender {
    tx: mpsc::Sender<AudioChunk>,
    dropped: Arc<AtomicU64>,
}

impl ChunkSender {
    fn new(tx: mpsc::Sender<AudioChunk>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    fn send(&self, chunk: AudioChunk) {
        match self.tx.try_send(chunk) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                if self.dropped.fetch_add(1, Ordering::Relaxed) == 0 {
                    log::warn!("input channel full; dropping audio (takes will have gaps)");
                }
            }
            // Controller gone; the stream is about to be dropped.
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while opening or running an audio stream.
///
/// On the input side every variant means the microphone could not be
/// acquired; the studio reports them as permission failures.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("no output device found on the default audio host")]
    NoOutputDevice,

    #[error("audio device `{0}` not found")]
    DeviceNotFound(String),

    #[error("failed to enumerate audio devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default stream config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Microphone capture device wrapper built on top of `cpal`.
///
/// # Example
///
/// ```rust,no_run
/// use take_studio::audio::{AudioCapture, AudioChunk};
///
/// let (tx, mut rx) = tokio::sync::mpsc::channel::<AudioChunk>(64);
/// let capture = AudioCapture::new(None).unwrap();
/// let _handle = capture.start(tx).unwrap();
/// // `_handle` keeps the stream alive; drop it to stop capturing.
/// ```
pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    info: StreamInfo,
}

impl AudioCapture {
    /// Open the input device named `device_name`, or the system default.
    ///
    /// Queries the device's preferred stream configuration so no manual
    /// configuration is required.
    pub fn new(device_name: Option<&str>) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .input_devices()?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceNotFound(name.to_string()))?,
            None => host.default_input_device().ok_or(CaptureError::NoDevice)?,
        };

        let supported = device.default_input_config()?;
        let info = StreamInfo {
            sample_rate: supported.sample_rate().0,
            channels: supported.channels(),
        };
        let config: cpal::StreamConfig = supported.into();

        Ok(Self {
            device,
            config,
            info,
        })
    }

    /// Start capturing and send [`AudioChunk`]s to `tx`.
    ///
    /// The callback runs on cpal's audio thread and never blocks: when the
    /// channel is full the chunk is dropped, counted and reported.
    pub fn start(&self, tx: mpsc::Sender<AudioChunk>) -> Result<StreamHandle, CaptureError> {
        let StreamInfo {
            sample_rate,
            channels,
        } = self.info;
        let sender = ChunkSender::new(tx);
        let dropped = Arc::clone(&sender.dropped);

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                sender.send(AudioChunk {
                    samples: data.to_vec(),
                    sample_rate,
                    channels,
                });
            },
            |err: cpal::StreamError| {
                log::error!("cpal input stream error: {err}");
            },
            None,
        )?;

        stream.play()?;
        Ok(StreamHandle {
            _stream: stream,
            dropped: Some(dropped),
        })
    }

    /// Format of the stream this device delivers.
    pub fn stream_info(&self) -> StreamInfo {
        self.info
    }
}

// ---------------------------------------------------------------------------
// AudioPlayback
// ---------------------------------------------------------------------------

/// Monitor output: plays mono samples pulled from a ring buffer.
pub struct AudioPlayback {
    device: cpal::Device,
    config: cpal::StreamConfig,
}

impl AudioPlayback {
    /// Open the default output device at `sample_rate`, keeping the
    /// device's preferred channel count.
    pub fn new(sample_rate: u32) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(CaptureError::NoOutputDevice)?;

        let supported = device.default_output_config()?;
        let config = cpal::StreamConfig {
            channels: supported.channels(),
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        Ok(Self { device, config })
    }

    /// Start playback.  Underruns (and a contended buffer) play silence.
    pub fn start(&self, source: SharedRingBuffer) -> Result<StreamHandle, CaptureError> {
        let channels = self.config.channels.max(1) as usize;
        let mut mono = Vec::new();

        let stream = self.device.build_output_stream(
            &self.config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                mono.clear();
                mono.resize(frames, 0.0);
                if let Ok(mut buf) = source.try_lock() {
                    buf.read_into(&mut mono);
                }
                for (frame, &s) in data.chunks_exact_mut(channels).zip(mono.iter()) {
                    frame.fill(s);
                }
            },
            |err: cpal::StreamError| {
                log::error!("cpal output stream error: {err}");
            },
            None,
        )?;

        stream.play()?;
        Ok(StreamHandle {
            _stream: stream,
            dropped: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
