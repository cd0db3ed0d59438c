//! Audio I/O: microphone capture, monitor playback and format helpers.
//!
//! # Flow
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc) → StudioController
//!           → downmix → SignalGraph → RingBuffer → cpal output (monitor)
//!                     └→ TakeEncoder → CaptureSession
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use take_studio::audio::{AudioCapture, AudioChunk};
//!
//! # async fn demo() {
//! let (tx, mut rx) = tokio::sync::mpsc::channel::<AudioChunk>(64);
//! let capture = AudioCapture::new(None).unwrap();
//! let _handle = capture.start(tx).unwrap(); // drops handle → stops stream
//!
//! while let Some(chunk) = rx.recv().await {
//!     println!("received {} samples @ {}Hz", chunk.samples.len(), chunk.sample_rate);
//! }
//! # }
//! ```

pub mod buffer;
pub mod capture;
pub mod encoder;
pub mod resample;

pub use buffer::{RingBuffer, SharedRingBuffer};
pub use capture::{AudioCapture, AudioChunk, AudioPlayback, CaptureError, StreamHandle, StreamInfo};
pub use encoder::{TakeEncoder, WavStreamEncoder};
pub use resample::{downmix, resample_linear};
