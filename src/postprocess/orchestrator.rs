//! Post-processing orchestrator: export, pitch shift and autotune.
//!
//! ```text
//! export(take, fmt)      ─▶ /convert-audio ─▶ /download ─▶ exports dir
//!                           (registry untouched)
//!
//! pitch_shift / autotune ─▶ issue token ─▶ /process-pitch
//!                           └─▶ replace_current(derived, token)
//! ```
//!
//! Requests are not serialised against each other.  Operations that replace
//! the current take draw an [`OpToken`](crate::take::OpToken) before going
//! out, and a result that comes back after a newer operation was issued is
//! reported as stale instead of overwriting the newer take.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::backend::{BackendError, ExportFormat, Operation, ProcessingRequest, StudioBackend};
use crate::take::registry::{self, SharedRegistry};
use crate::take::{ServerFile, StaleResult, Take};

// ---------------------------------------------------------------------------
// PostProcessError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PostProcessError {
    /// Nothing persisted to operate on.  No request was sent.
    #[error("no active take; record and save a take first")]
    NoActiveTake,

    #[error("{operation} failed: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("{operation} result discarded: {source}")]
    Stale {
        operation: &'static str,
        #[source]
        source: StaleResult,
    },

    #[error("failed to write export to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A downloaded export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    /// The converted file on the server.
    pub server: ServerFile,
    /// Where the bytes were written locally.
    pub path: PathBuf,
    pub size: usize,
}

// ---------------------------------------------------------------------------
// PostProcessOrchestrator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PostProcessOrchestrator {
    backend: Arc<dyn StudioBackend>,
    registry: SharedRegistry,
    exports_dir: PathBuf,
}

impl PostProcessOrchestrator {
    pub fn new(
        backend: Arc<dyn StudioBackend>,
        registry: SharedRegistry,
        exports_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            backend,
            registry,
            exports_dir: exports_dir.into(),
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn exports_dir(&self) -> &Path {
        &self.exports_dir
    }

    /// Snapshot of the current take.
    pub fn current_take(&self) -> Option<Take> {
        registry::lock(&self.registry).current().cloned()
    }

    // -- export -------------------------------------------------------------

    /// Convert `take` on the server, download the result and write it to the
    /// exports directory.  The current take is left as it is.
    pub async fn export(
        &self,
        take: &Take,
        format: ExportFormat,
    ) -> Result<ExportArtifact, PostProcessError> {
        let operation = Operation::Export { format };
        let request =
            ProcessingRequest::for_take(take, operation).ok_or(PostProcessError::NoActiveTake)?;

        let server = self
            .backend
            .process(&request)
            .await
            .map_err(|source| backend_error(operation, source))?;
        let bytes = self
            .backend
            .download(&server.path)
            .await
            .map_err(|source| backend_error(operation, source))?;

        let path = self.exports_dir.join(local_name(&server));
        write_export(&path, &bytes).await?;

        log::info!("exported {} ({} bytes) to {}", server.filename, bytes.len(), path.display());
        Ok(ExportArtifact {
            server,
            path,
            size: bytes.len(),
        })
    }

    pub async fn export_current(
        &self,
        format: ExportFormat,
    ) -> Result<ExportArtifact, PostProcessError> {
        let take = self.current_take().ok_or(PostProcessError::NoActiveTake)?;
        self.export(&take, format).await
    }

    // -- pitch processing ---------------------------------------------------

    /// Shift `take` by `amount` semitones, or with `correct` run pitch
    /// correction at strength `amount`.  The result becomes the current take.
    pub async fn pitch_shift(
        &self,
        take: &Take,
        amount: f32,
        correct: bool,
    ) -> Result<Take, PostProcessError> {
        let operation = if correct {
            Operation::Autotune { strength: amount }
        } else {
            Operation::PitchShift { semitones: amount }
        };
        self.replace_with(take, operation).await
    }

    pub async fn autotune(&self, take: &Take, strength: f32) -> Result<Take, PostProcessError> {
        self.pitch_shift(take, strength, true).await
    }

    pub async fn pitch_shift_current(
        &self,
        amount: f32,
        correct: bool,
    ) -> Result<Take, PostProcessError> {
        let take = self.current_take().ok_or(PostProcessError::NoActiveTake)?;
        self.pitch_shift(&take, amount, correct).await
    }

    pub async fn autotune_current(&self, strength: f32) -> Result<Take, PostProcessError> {
        self.pitch_shift_current(strength, true).await
    }

    async fn replace_with(&self, take: &Take, operation: Operation) -> Result<Take, PostProcessError> {
        let request =
            ProcessingRequest::for_take(take, operation).ok_or(PostProcessError::NoActiveTake)?;
        let token = registry::lock(&self.registry).issue_token();

        let server = self
            .backend
            .process(&request)
            .await
            .map_err(|source| backend_error(operation, source))?;
        let derived = Take::derived(server);

        registry::lock(&self.registry)
            .replace_current(derived.clone(), token)
            .map_err(|source| {
                log::warn!("{} result for {} arrived late: {source}", operation.label(), request.file);
                PostProcessError::Stale {
                    operation: operation.label(),
                    source,
                }
            })?;

        log::info!(
            "{} done: current take is now {}",
            operation.label(),
            derived.server_path().unwrap_or_default()
        );
        Ok(derived)
    }
}

fn backend_error(operation: Operation, source: BackendError) -> PostProcessError {
    log::error!("{} failed: {source}", operation.label());
    PostProcessError::Backend {
        operation: operation.label(),
        source,
    }
}

/// Local file name for a server file: its bare name, never a path.
fn local_name(server: &ServerFile) -> String {
    Path::new(&server.filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "export.bin".to_string())
}

async fn write_export(path: &Path, bytes: &[u8]) -> Result<(), PostProcessError> {
    let io_err = |source| PostProcessError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
    }
    tokio::fs::write(path, bytes).await.map_err(io_err)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::MockBackend;

    fn persisted(name: &str) -> Take {
        Take::recorded(b"abc".to_vec(), "audio/webm").with_server(ServerFile {
            filename: name.into(),
            path: format!("/data/{name}"),
        })
    }

    fn orchestrator(backend: Arc<MockBackend>, dir: &Path) -> PostProcessOrchestrator {
        PostProcessOrchestrator::new(backend, registry::shared(), dir)
    }

    #[tokio::test]
    async fn no_take_means_no_requests() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new());
        let orch = orchestrator(backend.clone(), dir.path());

        assert!(matches!(
            orch.export_current(ExportFormat::Wav).await,
            Err(PostProcessError::NoActiveTake)
        ));
        assert!(matches!(
            orch.pitch_shift_current(2.0, false).await,
            Err(PostProcessError::NoActiveTake)
        ));
        assert!(matches!(
            orch.autotune_current(5.0).await,
            Err(PostProcessError::NoActiveTake)
        ));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn unpersisted_take_means_no_requests() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new());
        let orch = orchestrator(backend.clone(), dir.path());
        let take = Take::recorded(b"abc".to_vec(), "audio/webm");

        assert!(matches!(
            orch.export(&take, ExportFormat::Mp3).await,
            Err(PostProcessError::NoActiveTake)
        ));
        assert!(matches!(
            orch.pitch_shift(&take, 1.0, false).await,
            Err(PostProcessError::NoActiveTake)
        ));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn pitch_shift_result_chains_into_export() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new());
        let orch = orchestrator(backend.clone(), dir.path());
        registry::lock(orch.registry()).set_current(persisted("t1.webm"));

        let derived = orch.pitch_shift_current(2.0, true).await.unwrap();
        assert_eq!(derived.server_path(), Some("/data/t1_autotune.webm"));
        assert_eq!(
            orch.current_take().unwrap().server_path(),
            Some("/data/t1_autotune.webm")
        );

        let artifact = orch.export_current(ExportFormat::Wav).await.unwrap();
        assert_eq!(
            backend.requested_files(),
            vec!["/data/t1.webm".to_string(), "/data/t1_autotune.webm".to_string()]
        );
        assert_eq!(artifact.server.path, "/data/t1_autotune.wav");
        assert_eq!(artifact.path, dir.path().join("t1_autotune.wav"));
        assert_eq!(
            std::fs::read(&artifact.path).unwrap(),
            b"/data/t1_autotune.wav".to_vec()
        );
    }

    #[tokio::test]
    async fn successive_shifts_each_consume_previous_result() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new());
        let orch = orchestrator(backend.clone(), dir.path());
        registry::lock(orch.registry()).set_current(persisted("t1.webm"));

        orch.pitch_shift_current(2.0, false).await.unwrap();
        orch.pitch_shift_current(-1.0, false).await.unwrap();

        assert_eq!(
            orch.current_take().unwrap().server_path(),
            Some("/data/t1_pitch_pitch.webm")
        );
    }

    #[tokio::test]
    async fn export_leaves_current_take_alone() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new());
        let orch = orchestrator(backend.clone(), dir.path());
        registry::lock(orch.registry()).set_current(persisted("t1.webm"));

        orch.export_current(ExportFormat::Mp3).await.unwrap();
        assert_eq!(orch.current_take().unwrap().server_path(), Some("/data/t1.webm"));
    }

    #[tokio::test]
    async fn rejected_request_leaves_registry_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::rejecting("File not found"));
        let orch = orchestrator(backend.clone(), dir.path());
        registry::lock(orch.registry()).set_current(persisted("t1.webm"));

        let err = orch.pitch_shift_current(3.0, false).await.unwrap_err();
        match err {
            PostProcessError::Backend { operation, source } => {
                assert_eq!(operation, "pitch shift");
                assert_eq!(source.to_string(), "File not found");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(orch.current_take().unwrap().server_path(), Some("/data/t1.webm"));
        // No retry.
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn transport_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::unreachable());
        let orch = orchestrator(backend, dir.path());
        let err = orch.export(&persisted("t1.webm"), ExportFormat::Wav).await.unwrap_err();
        assert!(matches!(
            err,
            PostProcessError::Backend { source, .. } if source.is_transport()
        ));
    }

    #[tokio::test]
    async fn late_result_does_not_overwrite_newer_one() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend {
            slow_amount: Some(1.0),
            ..MockBackend::default()
        });
        let orch = orchestrator(backend.clone(), dir.path());
        let take = persisted("t1.webm");
        registry::lock(orch.registry()).set_current(take.clone());

        // The first request is slow and resolves after the second.
        let (slow, fast) = tokio::join!(
            orch.pitch_shift(&take, 1.0, false),
            orch.autotune(&take, 5.0)
        );

        assert!(matches!(slow, Err(PostProcessError::Stale { .. })));
        assert_eq!(fast.unwrap().server_path(), Some("/data/t1_autotune.webm"));
        assert_eq!(
            orch.current_take().unwrap().server_path(),
            Some("/data/t1_autotune.webm")
        );
    }

    #[test]
    fn local_name_strips_directories() {
        let server = ServerFile {
            filename: "../../etc/passwd".into(),
            path: "/x".into(),
        };
        assert_eq!(local_name(&server), "passwd");
    }
}
