//! Capture session state machine.
//!
//! ```text
//! Idle ──arm──▶ Armed ──start──▶ Recording ──stop──▶ Stopped
//!                                    ▲                  │
//!                                    └──────start───────┘
//! any state ──disarm──▶ Idle
//! ```
//!
//! Fragments produced while recording are appended in arrival order and
//! concatenated into one blob on `stop`.  `start` always begins from an
//! empty fragment list, so consecutive takes never share bytes.

use std::fmt;

use thiserror::Error;

use crate::audio::{StreamInfo, TakeEncoder, WavStreamEncoder};

use super::take::Take;

// ---------------------------------------------------------------------------
// CaptureState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    /// No live input bound.
    #[default]
    Idle,
    /// Input bound; ready to record.
    Armed,
    /// Fragments are being collected.
    Recording,
    /// A take was finalised; ready to record again.
    Stopped,
}

impl CaptureState {
    /// Short label for status output.
    pub fn label(&self) -> &'static str {
        match self {
            CaptureState::Idle => "Idle",
            CaptureState::Armed => "Armed",
            CaptureState::Recording => "Recording",
            CaptureState::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A capture operation requested in the wrong state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} while {state}")]
pub struct TransitionError {
    pub action: &'static str,
    pub state: CaptureState,
}

// ---------------------------------------------------------------------------
// CaptureSession
// ---------------------------------------------------------------------------

pub struct CaptureSession {
    state: CaptureState,
    stream: Option<StreamInfo>,
    encoder: Box<dyn TakeEncoder>,
    fragments: Vec<Vec<u8>>,
    last_take: Option<Take>,
}

impl CaptureSession {
    pub fn new(encoder: Box<dyn TakeEncoder>) -> Self {
        Self {
            state: CaptureState::Idle,
            stream: None,
            encoder,
            fragments: Vec::new(),
            last_take: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Format of the bound input, while armed.
    pub fn stream(&self) -> Option<StreamInfo> {
        self.stream
    }

    /// Bind a live input.  Only from `Idle`.
    pub fn arm(&mut self, stream: StreamInfo) -> Result<(), TransitionError> {
        if self.state != CaptureState::Idle {
            return Err(self.invalid("arm"));
        }
        self.stream = Some(stream);
        self.state = CaptureState::Armed;
        Ok(())
    }

    /// Release the input.  A take in progress is discarded.
    pub fn disarm(&mut self) {
        if self.state == CaptureState::Recording {
            log::warn!(
                "disarmed while recording; discarding {} fragments",
                self.fragments.len()
            );
        }
        self.fragments.clear();
        self.stream = None;
        self.state = CaptureState::Idle;
    }

    /// Begin a new take.  Only from `Armed` or `Stopped`.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        let stream = match (self.state, self.stream) {
            (CaptureState::Armed | CaptureState::Stopped, Some(stream)) => stream,
            _ => return Err(self.invalid("start recording")),
        };
        self.fragments.clear();
        if let Some(header) = self.encoder.begin(&stream) {
            self.fragments.push(header);
        }
        self.state = CaptureState::Recording;
        log::debug!("recording started ({} Hz)", stream.sample_rate);
        Ok(())
    }

    /// Append an already-encoded fragment.  Ignored unless recording.
    pub fn on_chunk(&mut self, fragment: impl Into<Vec<u8>>) {
        if self.state != CaptureState::Recording {
            log::trace!("fragment dropped while {}", self.state);
            return;
        }
        let fragment = fragment.into();
        if !fragment.is_empty() {
            self.fragments.push(fragment);
        }
    }

    /// Encode mono samples and append the result.  Ignored unless recording.
    pub fn record(&mut self, samples: &[f32]) {
        if self.state != CaptureState::Recording {
            return;
        }
        let fragment = self.encoder.encode(samples);
        self.on_chunk(fragment);
    }

    /// Finish the take.  Only from `Recording`.
    pub fn stop(&mut self) -> Result<Take, TransitionError> {
        if self.state != CaptureState::Recording {
            return Err(self.invalid("stop"));
        }
        if let Some(tail) = self.encoder.finish() {
            self.fragments.push(tail);
        }

        let mut blob = std::mem::take(&mut self.fragments).concat();
        self.encoder.finalize(&mut blob);
        let take = Take::recorded(blob, self.encoder.mime_type());
        self.state = CaptureState::Stopped;
        log::info!(
            "take finalised: {} bytes ({})",
            take.blob().map_or(0, <[u8]>::len),
            take.mime_type()
        );

        self.last_take = Some(take.clone());
        Ok(take)
    }

    /// Most recent finished take.
    pub fn last_take(&self) -> Option<&Take> {
        self.last_take.as_ref()
    }

    /// Fragments collected so far in the current take.
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    fn invalid(&self, action: &'static str) -> TransitionError {
        TransitionError {
            action,
            state: self.state,
        }
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new(Box::new(WavStreamEncoder::new()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
