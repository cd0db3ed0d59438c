//! Studio controller: drives a [`Studio`] from command and audio channels.
//!
//! # Flow
//!
//! ```text
//! StudioCommand (mpsc) ──┐
//! AudioChunk    (mpsc) ──┼─▶ select! ─▶ Studio ─▶ StudioEvent (mpsc)
//! finished tasks (JoinSet)┘      │
//!                                └─▶ spawn: save / export / pitch / autotune
//! ```
//!
//! Audio is preferred over commands, so every chunk queued before a `Stop`
//! lands in the take.  Network work runs on spawned tasks; the loop keeps
//! accepting audio and commands while requests are in flight.  Errors are
//! reported as [`StudioEvent::Failed`] and never end the loop.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::audio::{AudioChunk, StreamInfo};
use crate::backend::ExportFormat;
use crate::error::StudioError;
use crate::graph::{ParameterValue, ReverbStatus};
use crate::postprocess::ExportArtifact;
use crate::take::Take;

use super::state::{save_take_file, Studio};

// ---------------------------------------------------------------------------
// Commands and events
// ---------------------------------------------------------------------------

/// User intents accepted by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum StudioCommand {
    /// Bind the input described by the stream and build the effects graph.
    Arm(StreamInfo),
    Disarm,
    Start,
    /// Finish the take and persist it to the backend.
    Stop,
    SetParameter(ParameterValue),
    /// Convert the current take and download it to the exports directory.
    Export(ExportFormat),
    PitchShift { amount: f32, correct: bool },
    Autotune(f32),
    /// Write the last recorded take to a local path.
    SaveLocal(PathBuf),
    /// Finish in-flight requests and return.
    Shutdown,
}

/// Everything the controller reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum StudioEvent {
    Armed(StreamInfo),
    Disarmed,
    RecordingStarted,
    /// A take was finalised locally; upload follows.
    TakeFinished { bytes: usize },
    /// The take is on the server and is now current.
    TakePersisted(Take),
    ParameterChanged(ParameterValue),
    ReverbLoaded,
    Exported(ExportArtifact),
    /// A pitch or autotune result replaced the current take.
    CurrentTakeChanged(Take),
    SavedLocally(PathBuf),
    Failed { kind: &'static str, message: String },
}

impl StudioEvent {
    fn failed(err: &StudioError) -> Self {
        StudioEvent::Failed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

type TaskResult = Result<StudioEvent, StudioError>;

// ---------------------------------------------------------------------------
// StudioController
// ---------------------------------------------------------------------------

pub struct StudioController {
    studio: Studio,
    events: mpsc::UnboundedSender<StudioEvent>,
    tasks: JoinSet<TaskResult>,
    /// Whether the reverb outcome for the current graph has been reported.
    reverb_reported: bool,
}

impl StudioController {
    pub fn new(studio: Studio, events: mpsc::UnboundedSender<StudioEvent>) -> Self {
        Self {
            studio,
            events,
            tasks: JoinSet::new(),
            reverb_reported: false,
        }
    }

    pub fn studio(&self) -> &Studio {
        &self.studio
    }

    /// Run until `Shutdown` or until the command channel closes, then wait
    /// for in-flight requests and hand the studio back.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<StudioCommand>,
        mut audio: mpsc::Receiver<AudioChunk>,
    ) -> Studio {
        loop {
            tokio::select! {
                biased;

                Some(chunk) = audio.recv() => {
                    self.studio.process_block(&chunk);
                    self.poll_reverb();
                }

                cmd = commands.recv() => match cmd {
                    Some(StudioCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle(cmd),
                },

                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    self.finish_task(joined);
                }
            }
        }

        log::info!(
            "controller: shutting down ({} request(s) in flight)",
            self.tasks.len()
        );
        while let Some(joined) = self.tasks.join_next().await {
            self.finish_task(joined);
        }
        self.studio
    }

    // -----------------------------------------------------------------------
    // Command handling
    // -----------------------------------------------------------------------

    fn handle(&mut self, cmd: StudioCommand) {
        log::debug!("controller: {cmd:?}");
        let outcome = match cmd {
            StudioCommand::Arm(stream) => self.studio.arm(stream).map(|()| {
                self.reverb_reported = false;
                Some(StudioEvent::Armed(stream))
            }),
            StudioCommand::Disarm => {
                self.studio.disarm();
                Ok(Some(StudioEvent::Disarmed))
            }
            StudioCommand::Start => self
                .studio
                .start()
                .map(|()| Some(StudioEvent::RecordingStarted)),
            StudioCommand::Stop => self.stop(),
            StudioCommand::SetParameter(change) => {
                self.studio.set_parameter(change);
                Ok(Some(StudioEvent::ParameterChanged(change)))
            }
            StudioCommand::Export(format) => {
                let orchestrator = self.studio.orchestrator().clone();
                self.tasks.spawn(async move {
                    let artifact = orchestrator.export_current(format).await?;
                    Ok(StudioEvent::Exported(artifact))
                });
                Ok(None)
            }
            StudioCommand::PitchShift { amount, correct } => {
                self.spawn_pitch(amount, correct);
                Ok(None)
            }
            StudioCommand::Autotune(strength) => {
                self.spawn_pitch(strength, true);
                Ok(None)
            }
            StudioCommand::SaveLocal(path) => match self.studio.last_take().cloned() {
                Some(take) => {
                    self.tasks.spawn(async move {
                        let written = save_take_file(take, path).await?;
                        Ok(StudioEvent::SavedLocally(written))
                    });
                    Ok(None)
                }
                None => Err(StudioError::NoActiveTake),
            },
            StudioCommand::Shutdown => Ok(None),
        };

        match outcome {
            Ok(Some(event)) => self.emit(event),
            Ok(None) => {}
            Err(e) => self.report(&e),
        }
    }

    fn stop(&mut self) -> Result<Option<StudioEvent>, StudioError> {
        let take = self.studio.stop()?;
        let bytes = take.blob().map_or(0, <[u8]>::len);
        self.emit(StudioEvent::TakeFinished { bytes });

        let persist = self.studio.persist_task(take);
        self.tasks.spawn(async move { Ok(StudioEvent::TakePersisted(persist.await?)) });
        Ok(None)
    }

    fn spawn_pitch(&mut self, amount: f32, correct: bool) {
        let orchestrator = self.studio.orchestrator().clone();
        self.tasks.spawn(async move {
            let take = orchestrator.pitch_shift_current(amount, correct).await?;
            Ok(StudioEvent::CurrentTakeChanged(take))
        });
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn poll_reverb(&mut self) {
        if self.reverb_reported {
            return;
        }
        let Some(graph) = self.studio.graph_mut() else {
            return;
        };
        match graph.reverb_status() {
            ReverbStatus::Pending => {}
            ReverbStatus::Loaded => {
                self.reverb_reported = true;
                self.emit(StudioEvent::ReverbLoaded);
            }
            ReverbStatus::Unavailable(reason) => {
                self.reverb_reported = true;
                log::warn!("controller: reverb unavailable ({reason}); continuing dry");
                self.emit(StudioEvent::Failed {
                    kind: "ResourceLoadFailure",
                    message: reason,
                });
            }
        }
    }

    fn finish_task(&mut self, joined: Result<TaskResult, tokio::task::JoinError>) {
        match joined {
            Ok(Ok(event)) => self.emit(event),
            Ok(Err(e)) => self.report(&e),
            Err(e) => log::error!("controller: request task failed: {e}"),
        }
    }

    fn report(&self, err: &StudioError) {
        log::warn!("controller: {err}");
        self.emit(StudioEvent::failed(err));
    }

    fn emit(&self, event: StudioEvent) {
        // A dropped receiver only means nobody is listening.
        let _ = self.events.send(event);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
