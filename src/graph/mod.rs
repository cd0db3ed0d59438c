//! Live effects graph: parameters, DSP stages and the fixed routing.
//!
//! # Flow
//!
//! ```text
//! ParameterValue ─▶ ParameterStore (remembered across re-arms)
//!                └▶ SignalGraph::set_parameter ─▶ one stage property
//!
//! mono block ─▶ SignalGraph::process ─▶ monitor / processed take
//! ```
//!
//! A graph is built per arm of the microphone and dropped on disarm.  The
//! reverb impulse loads in the background; see [`impulse`].

pub mod delay;
pub mod dynamics;
pub mod filter;
pub mod impulse;
pub mod params;
pub mod reverb;
pub mod signal_graph;
pub mod stage;

pub use impulse::{ImpulseError, ImpulseLoad, ImpulseSource};
pub use params::{ParamError, ParameterId, ParameterStore, ParameterValue};
pub use reverb::{ImpulseResponse, PreparedImpulse, ReverbStatus};
pub use signal_graph::{SignalGraph, TOPOLOGY};
pub use stage::{AudioStage, StageKind};
