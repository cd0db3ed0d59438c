//! Studio-level error type.
//!
//! Subsystems keep their own error enums; [`StudioError`] folds them into
//! the categories a user sees.  None of them end a session: the controller
//! reports the error and keeps going.

use std::path::PathBuf;

use thiserror::Error;

use crate::audio::CaptureError;
use crate::backend::BackendError;
use crate::graph::{ImpulseError, ParamError};
use crate::postprocess::PostProcessError;
use crate::take::{StaleResult, TransitionError};

#[derive(Debug, Error)]
pub enum StudioError {
    /// The microphone could not be opened.  The session stays idle.
    #[error("microphone unavailable: {0}")]
    PermissionDenied(#[from] CaptureError),

    /// The reverb impulse could not be loaded.  Reverb stays silent.
    #[error("impulse response unavailable: {0}")]
    ResourceLoad(#[from] ImpulseError),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("no active take; record and save a take first")]
    NoActiveTake,

    /// The server answered but refused or garbled the request.
    #[error("{operation} failed: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: BackendError,
    },

    /// The server could not be reached.
    #[error("{operation} failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: BackendError,
    },

    /// A result arrived after a newer operation superseded it.
    #[error("{operation} result discarded: {source}")]
    Stale {
        operation: &'static str,
        #[source]
        source: StaleResult,
    },

    #[error(transparent)]
    Parameter(#[from] ParamError),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StudioError {
    /// Classify a backend failure for `operation`.
    pub fn backend(operation: &'static str, source: BackendError) -> Self {
        if source.is_transport() {
            StudioError::Transport { operation, source }
        } else {
            StudioError::Backend { operation, source }
        }
    }

    /// Category name for status output and events.
    pub fn kind(&self) -> &'static str {
        match self {
            StudioError::PermissionDenied(_) => "PermissionDenied",
            StudioError::ResourceLoad(_) => "ResourceLoadFailure",
            StudioError::InvalidTransition(_) => "InvalidTransition",
            StudioError::NoActiveTake => "NoActiveTake",
            StudioError::Backend { .. } => "BackendError",
            StudioError::Transport { .. } => "TransportFailure",
            StudioError::Stale { .. } => "StaleResult",
            StudioError::Parameter(_) => "InvalidParameter",
            StudioError::Io { .. } => "IoError",
        }
    }
}

impl From<PostProcessError> for StudioError {
    fn from(e: PostProcessError) -> Self {
        match e {
            PostProcessError::NoActiveTake => StudioError::NoActiveTake,
            PostProcessError::Backend { operation, source } => Self::backend(operation, source),
            PostProcessError::Stale { operation, source } => StudioError::Stale { operation, source },
            PostProcessError::Write { path, source } => StudioError::Io { path, source },
        }
    }
}
