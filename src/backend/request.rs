//! Request and response shapes for the processing endpoints.
//!
//! All three post-processing operations share one round trip: POST a JSON
//! body naming the server file, get back `{status, file, filename, error}`.
//! They differ only in endpoint and payload, which [`Operation`] encodes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::take::{ServerFile, Take};

use super::client::BackendError;

// ---------------------------------------------------------------------------
// ExportFormat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Wav,
    Mp3,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Wav => "wav",
            ExportFormat::Mp3 => "mp3",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported export format `{0}` (expected wav or mp3)")]
pub struct UnknownFormat(pub String);

impl FromStr for ExportFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wav" => Ok(ExportFormat::Wav),
            "mp3" => Ok(ExportFormat::Mp3),
            other => Err(UnknownFormat(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Operation / ProcessingRequest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operation {
    /// Convert to a download format.  Produces a side artifact.
    Export { format: ExportFormat },
    /// Shift by a number of semitones.
    PitchShift { semitones: f32 },
    /// Pitch correction; strength `0..=10`.
    Autotune { strength: f32 },
}

impl Operation {
    pub fn endpoint(&self) -> &'static str {
        match self {
            Operation::Export { .. } => "/convert-audio",
            Operation::PitchShift { .. } | Operation::Autotune { .. } => "/process-pitch",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Operation::Export { .. } => "export",
            Operation::PitchShift { .. } => "pitch shift",
            Operation::Autotune { .. } => "autotune",
        }
    }
}

/// One backend round trip against a persisted take.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingRequest {
    /// Server-side reference of the take.
    pub file: String,
    pub operation: Operation,
}

impl ProcessingRequest {
    /// `None` if `take` has not been persisted yet.
    pub fn for_take(take: &Take, operation: Operation) -> Option<Self> {
        take.server_path().map(|file| Self {
            file: file.to_string(),
            operation,
        })
    }

    pub fn endpoint(&self) -> &'static str {
        self.operation.endpoint()
    }

    /// JSON body for the endpoint.
    pub fn payload(&self) -> serde_json::Value {
        match self.operation {
            Operation::Export { format } => json!({
                "file": self.file,
                "format": format,
            }),
            Operation::PitchShift { semitones } => json!({
                "file": self.file,
                "amount": semitones,
                "correction": false,
            }),
            Operation::Autotune { strength } => json!({
                "file": self.file,
                "amount": strength,
                "correction": true,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

const SUCCESS: &str = "success";

/// Body of `POST /save`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaveResponse {
    pub status: Option<String>,
    pub filename: Option<String>,
    pub filepath: Option<String>,
    pub error: Option<String>,
}

impl SaveResponse {
    pub fn into_server_file(self) -> Result<ServerFile, BackendError> {
        if let Some(status) = self.status.as_deref() {
            if status != SUCCESS {
                return Err(rejected(self.error, status));
            }
        }
        let path = self
            .filepath
            .filter(|p| !p.is_empty())
            .ok_or_else(|| BackendError::Malformed("save response has no filepath".into()))?;
        let filename = self.filename.unwrap_or_else(|| basename(&path));
        Ok(ServerFile { filename, path })
    }
}

/// Body of `POST /convert-audio` and `POST /process-pitch`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessResponse {
    #[serde(default)]
    pub status: String,
    pub filename: Option<String>,
    pub file: Option<String>,
    pub error: Option<String>,
}

impl ProcessResponse {
    pub fn into_server_file(self) -> Result<ServerFile, BackendError> {
        if self.status != SUCCESS {
            return Err(rejected(self.error, &self.status));
        }
        let path = self
            .file
            .filter(|p| !p.is_empty())
            .ok_or_else(|| BackendError::Malformed("processing response has no file".into()))?;
        let filename = self.filename.unwrap_or_else(|| basename(&path));
        Ok(ServerFile { filename, path })
    }
}

fn rejected(error: Option<String>, status: &str) -> BackendError {
    BackendError::Rejected(error.unwrap_or_else(|| format!("status `{status}`")))
}

fn basename(path: &str) -> String {
    path.rsplit(['/', '\\']).next().unwrap_or(path).to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
