//! Voice take studio.
//!
//! Live microphone input runs through an effects chain while takes are
//! recorded, persisted to a recording server and post-processed there.
//!
//! ```text
//! mic ─▶ audio ─▶ graph (gain, EQ, compressor, delay, reverb) ─▶ monitor
//!          └────▶ take (capture session) ─▶ backend /save ─▶ registry
//!                                     postprocess ─▶ /convert-audio, /process-pitch
//! ```

pub mod audio;
pub mod backend;
pub mod config;
pub mod error;
pub mod graph;
pub mod postprocess;
pub mod studio;
pub mod take;

pub use error::StudioError;
