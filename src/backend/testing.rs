//! In-memory [`StudioBackend`] double shared by the crate's tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::take::ServerFile;

use super::{BackendError, Operation, ProcessingRequest, StudioBackend};

/// Answers like the recording server would, counting every call.
///
/// * `save` stores under `/data/t{n}.{ext}`.
/// * processing appends `_pitch` / `_autotune` to the stem, or swaps the
///   extension for exports.
/// * `download` returns the requested reference as bytes.
#[derive(Default)]
pub struct MockBackend {
    pub saves: AtomicUsize,
    pub processes: AtomicUsize,
    pub downloads: AtomicUsize,
    pub requests: Mutex<Vec<ProcessingRequest>>,
    /// Reject every call with this message.
    pub reject: Option<String>,
    /// Fail every call at the transport level.
    pub unreachable: bool,
    /// Delay processing requests whose amount equals this value.
    pub slow_amount: Option<f32>,
    /// Delay the first `save` so it resolves after later ones.
    pub slow_first_save: bool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(message: &str) -> Self {
        Self {
            reject: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    /// Total calls of any kind.
    pub fn calls(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
            + self.processes.load(Ordering::SeqCst)
            + self.downloads.load(Ordering::SeqCst)
    }

    /// File reference of every processing request, in order.
    pub fn requested_files(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.file.clone())
            .collect()
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.unreachable {
            return Err(BackendError::Transport("connection refused".into()));
        }
        if let Some(msg) = &self.reject {
            return Err(BackendError::Rejected(msg.clone()));
        }
        Ok(())
    }
}

fn server_file(path: String) -> ServerFile {
    let filename = Path::new(&path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    ServerFile { filename, path }
}

fn with_suffix(file: &str, suffix: &str, ext: Option<&str>) -> String {
    let (stem, original_ext) = file.rsplit_once('.').unwrap_or((file, "bin"));
    format!("{stem}{suffix}.{}", ext.unwrap_or(original_ext))
}

#[async_trait]
impl StudioBackend for MockBackend {
    async fn save(&self, _blob: &[u8], mime_type: &str) -> Result<ServerFile, BackendError> {
        let n = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
        if n == 1 && self.slow_first_save {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.check()?;
        let ext = crate::take::extension_for_mime(mime_type);
        Ok(server_file(format!("/data/t{n}.{ext}")))
    }

    async fn process(&self, request: &ProcessingRequest) -> Result<ServerFile, BackendError> {
        self.processes.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let amount = match request.operation {
            Operation::PitchShift { semitones } => Some(semitones),
            Operation::Autotune { strength } => Some(strength),
            Operation::Export { .. } => None,
        };
        if amount.is_some() && amount == self.slow_amount {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.check()?;

        let path = match request.operation {
            Operation::Export { format } => with_suffix(&request.file, "", Some(format.as_str())),
            Operation::PitchShift { .. } => with_suffix(&request.file, "_pitch", None),
            Operation::Autotune { .. } => with_suffix(&request.file, "_autotune", None),
        };
        Ok(server_file(path))
    }

    async fn download(&self, file: &str) -> Result<Vec<u8>, BackendError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(file.as_bytes().to_vec())
    }
}
