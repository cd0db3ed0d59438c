//! Backend round trips against the current take.

pub mod orchestrator;

pub use orchestrator::{ExportArtifact, PostProcessError, PostProcessOrchestrator};
