//! The studio session object.
//!
//! [`Studio`] owns everything one microphone session needs: the parameter
//! store, the effects graph (present only while armed), the capture session
//! and handles to the shared take registry and backend.  It replaces
//! ambient globals; the controller drives it from a single task.
//!
//! ```text
//! arm(stream)      Idle ─▶ Armed      graph built, impulse load started
//! start / stop     Armed ─▶ Recording ─▶ Stopped ─▶ Take
//! persist(take)    /save ─▶ take stamped ─▶ registry.set_current_if_newest
//! disarm           any ─▶ Idle        graph dropped
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::audio::{downmix, AudioChunk, SharedRingBuffer, StreamInfo, TakeEncoder};
use crate::backend::StudioBackend;
use crate::config::{AppConfig, RecordSource};
use crate::error::StudioError;
use crate::graph::{ImpulseSource, ParameterStore, ParameterValue, SignalGraph};
use crate::postprocess::PostProcessOrchestrator;
use crate::take::registry::{self, SharedRegistry};
use crate::take::{CaptureSession, CaptureState, OpToken, Take};

pub struct Studio {
    config: AppConfig,
    params: ParameterStore,
    graph: Option<SignalGraph>,
    capture: CaptureSession,
    registry: SharedRegistry,
    backend: Arc<dyn StudioBackend>,
    orchestrator: PostProcessOrchestrator,
    monitor: Option<SharedRingBuffer>,
}

impl Studio {
    pub fn new(config: AppConfig, backend: Arc<dyn StudioBackend>) -> Self {
        let registry = registry::shared();
        let orchestrator =
            PostProcessOrchestrator::new(Arc::clone(&backend), Arc::clone(&registry), config.exports_dir());
        Self {
            params: ParameterStore::from_config(&config.effects),
            graph: None,
            capture: CaptureSession::default(),
            registry,
            backend,
            orchestrator,
            monitor: None,
            config,
        }
    }

    /// Replace the take encoder.  Only before the first recording.
    pub fn with_encoder(mut self, encoder: Box<dyn TakeEncoder>) -> Self {
        self.capture = CaptureSession::new(encoder);
        self
    }

    /// Send processed audio to `buffer` for live monitoring.
    pub fn set_monitor(&mut self, buffer: SharedRingBuffer) {
        self.monitor = Some(buffer);
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn state(&self) -> CaptureState {
        self.capture.state()
    }

    pub fn params(&self) -> &ParameterStore {
        &self.params
    }

    pub fn graph(&self) -> Option<&SignalGraph> {
        self.graph.as_ref()
    }

    pub fn graph_mut(&mut self) -> Option<&mut SignalGraph> {
        self.graph.as_mut()
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn orchestrator(&self) -> &PostProcessOrchestrator {
        &self.orchestrator
    }

    /// Most recent finished take, persisted or not.
    pub fn last_take(&self) -> Option<&Take> {
        self.capture.last_take()
    }

    // -- session lifecycle --------------------------------------------------

    /// Bind a live input and build a fresh effects graph for it.
    pub fn arm(&mut self, stream: StreamInfo) -> Result<(), StudioError> {
        self.capture.arm(stream)?;

        // Drop any previous graph before the new one exists.
        self.graph = None;
        let impulse = ImpulseSource::resolve(
            &self.config.reverb.impulse_response,
            &self.config.backend.base_url,
        );
        self.graph = Some(SignalGraph::build(
            stream,
            &self.config.effects,
            &self.params,
            impulse,
            self.config.reverb.partition_size,
        ));

        log::info!(
            "armed: {} Hz, {} channel(s)",
            stream.sample_rate,
            stream.channels
        );
        Ok(())
    }

    /// Release the input and drop the graph.  A take in progress is lost.
    pub fn disarm(&mut self) {
        self.capture.disarm();
        self.graph = None;
        if let Some(monitor) = &self.monitor {
            if let Ok(mut buf) = monitor.lock() {
                buf.clear();
            }
        }
        log::info!("disarmed");
    }

    /// Disarm then arm again on `stream`.
    pub fn rearm(&mut self, stream: StreamInfo) -> Result<(), StudioError> {
        self.disarm();
        self.arm(stream)
    }

    pub fn start(&mut self) -> Result<(), StudioError> {
        self.capture.start()?;
        log::info!("recording");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<Take, StudioError> {
        Ok(self.capture.stop()?)
    }

    /// Remember a control change and apply it to the live graph, if any.
    pub fn set_parameter(&mut self, change: ParameterValue) {
        self.params.set(change);
        if let Some(graph) = self.graph.as_mut() {
            graph.set_parameter(change);
        }
        log::debug!("{} = {} {}", change.id, change.value, change.id.unit());
    }

    // -- audio path ---------------------------------------------------------

    /// Run one input chunk through the graph, feed the recorder and the
    /// monitor, and return the processed mono block.
    ///
    /// Ignored while disarmed.
    pub fn process_block(&mut self, chunk: &AudioChunk) -> Vec<f32> {
        let Some(graph) = self.graph.as_mut() else {
            return Vec::new();
        };

        let mono = downmix(&chunk.samples, chunk.channels);
        let processed = graph.process(&mono).to_vec();

        match self.config.audio.record_source {
            RecordSource::Raw => self.capture.record(&mono),
            RecordSource::Processed => self.capture.record(&processed),
        }

        if let Some(monitor) = &self.monitor {
            // Contention with the output callback only costs a block of monitor audio.
            if let Ok(mut buf) = monitor.try_lock() {
                buf.push_slice(&processed);
            }
        }

        processed
    }

    // -- persistence --------------------------------------------------------

    /// Persist `take` and make it current.
    pub async fn persist(&self, take: Take) -> Result<Take, StudioError> {
        let token = registry::lock(&self.registry).issue_take_token();
        persist_take(self.backend.as_ref(), &self.registry, take, token).await
    }

    /// Owned form of [`persist`](Self::persist) for spawning.  The take token
    /// is drawn now, so takes finished later win even if their save returns
    /// first.
    pub fn persist_task(
        &self,
        take: Take,
    ) -> impl Future<Output = Result<Take, StudioError>> + Send + 'static {
        let backend = Arc::clone(&self.backend);
        let registry = Arc::clone(&self.registry);
        let token = registry::lock(&registry).issue_take_token();
        async move { persist_take(backend.as_ref(), &registry, take, token).await }
    }

    /// Write the last recorded take to `path` (a file, or a directory to
    /// put `take.<ext>` in).
    pub async fn save_local_take(&self, path: &Path) -> Result<PathBuf, StudioError> {
        let take = self.last_take().cloned().ok_or(StudioError::NoActiveTake)?;
        save_take_file(take, path.to_path_buf()).await
    }
}

/// Store `take` on the backend, stamp it with its server identity and make
/// it the current take.  `token` comes from
/// [`TakeRegistry::issue_take_token`](crate::take::TakeRegistry::issue_take_token);
/// if a later take was finished meanwhile the result is stale.
pub async fn persist_take(
    backend: &dyn StudioBackend,
    registry: &SharedRegistry,
    take: Take,
    token: OpToken,
) -> Result<Take, StudioError> {
    let blob = take.blob().ok_or(StudioError::NoActiveTake)?;
    let server = backend
        .save(blob, take.mime_type())
        .await
        .map_err(|e| StudioError::backend("save", e))?;

    log::info!("take saved as {} ({})", server.filename, server.path);
    let stamped = take.with_server(server);
    registry::lock(registry)
        .set_current_if_newest(stamped.clone(), token)
        .map_err(|source| StudioError::Stale {
            operation: "save",
            source,
        })?;
    Ok(stamped)
}

/// Write a take's local bytes to disk.
pub async fn save_take_file(take: Take, path: PathBuf) -> Result<PathBuf, StudioError> {
    let blob = take.blob().ok_or(StudioError::NoActiveTake)?;
    let target = if tokio::fs::metadata(&path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        path.join(format!("take.{}", take.extension()))
    } else {
        path
    };

    let io_err = |source| StudioError::Io {
        path: target.clone(),
        source,
    };
    if let Some(dir) = target.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
    }
    tokio::fs::write(&target, blob).await.map_err(io_err)?;

    log::info!("take written to {}", target.display());
    Ok(target)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
