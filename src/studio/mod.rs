//! Studio session and its controller loop.
//!
//! [`Studio`] is the single owner of session state.  [`StudioController`]
//! runs it inside a tokio task, fed by [`StudioCommand`]s and audio chunks,
//! and reports [`StudioEvent`]s back.

pub mod prompt;
pub mod runner;
pub mod state;

pub use prompt::{parse_line, PromptError};
pub use runner::{StudioCommand, StudioController, StudioEvent};
pub use state::{persist_take, save_take_file, Studio};
