//! Take lifecycle: capture into a blob, then track the current take.
//!
//! ```text
//! CaptureSession::stop ─▶ Take ─▶ /save ─▶ Take + ServerFile ─▶ TakeRegistry
//!                                                                 │
//!                              PostProcessOrchestrator ◀──────────┘
//! ```

pub mod capture;
pub mod registry;
#[allow(clippy::module_inception)]
pub mod take;

pub use capture::{CaptureSession, CaptureState, TransitionError};
pub use registry::{OpToken, SharedRegistry, StaleResult, TakeRegistry};
pub use take::{extension_for_mime, mime_for_filename, ServerFile, Take};
