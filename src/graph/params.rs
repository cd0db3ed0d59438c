//! User-facing effect parameters.
//!
//! [`ParameterId`] is the closed set of live controls.  Each id maps to
//! exactly one stage property of the [`SignalGraph`](super::SignalGraph),
//! so routing a value can never miss at runtime; only parsing an id from a
//! string can fail.
//!
//! [`ParameterStore`] keeps the current value of every control so a rebuilt
//! graph starts from what the user last dialled in.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EffectsConfig;

use super::stage::StageKind;

// ---------------------------------------------------------------------------
// ParamError
// ---------------------------------------------------------------------------

/// Reasons a parameter change is rejected before it reaches the graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    /// The id is not one of the known controls.
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),

    /// The value text is not a number.
    #[error("invalid value `{input}` for {id}")]
    InvalidNumber { id: ParameterId, input: String },

    /// NaN or infinite values never reach a stage.
    #[error("{id} must be a finite number, got {value}")]
    NotFinite { id: ParameterId, value: f32 },
}

// ---------------------------------------------------------------------------
// ParameterId
// ---------------------------------------------------------------------------

/// A live effect control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterId {
    /// Input gain (linear) → `gain.gain`.
    Gain,
    /// Low shelf boost/cut in dB → `lowShelfEQ.gainDb`.
    EqLow,
    /// High shelf boost/cut in dB → `highShelfEQ.gainDb`.
    EqHigh,
    /// Reverb return level (linear) → `reverbMix.gain`.
    ReverbMix,
    /// Delay time in milliseconds → `delay.delayTime` (seconds).
    DelayTime,
    /// Compressor threshold in dB → `dynamicsCompressor.threshold`.
    CompThresh,
    /// Delay return level (linear) → `delayMix.gain`.
    DelayMix,
}

impl ParameterId {
    /// Every control, in display order.
    pub const ALL: [ParameterId; 7] = [
        ParameterId::Gain,
        ParameterId::EqLow,
        ParameterId::EqHigh,
        ParameterId::ReverbMix,
        ParameterId::DelayTime,
        ParameterId::CompThresh,
        ParameterId::DelayMix,
    ];

    /// Wire/UI name of the control.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterId::Gain => "gain",
            ParameterId::EqLow => "eqLow",
            ParameterId::EqHigh => "eqHigh",
            ParameterId::ReverbMix => "reverbMix",
            ParameterId::DelayTime => "delayTime",
            ParameterId::CompThresh => "compThresh",
            ParameterId::DelayMix => "delayMix",
        }
    }

    /// Unit the caller expresses the value in.
    pub fn unit(&self) -> &'static str {
        match self {
            ParameterId::Gain | ParameterId::ReverbMix | ParameterId::DelayMix => "x",
            ParameterId::EqLow | ParameterId::EqHigh | ParameterId::CompThresh => "dB",
            ParameterId::DelayTime => "ms",
        }
    }

    /// The stage whose property this control drives.
    pub fn target(&self) -> StageKind {
        match self {
            ParameterId::Gain => StageKind::Gain,
            ParameterId::EqLow => StageKind::LowShelfEq,
            ParameterId::EqHigh => StageKind::HighShelfEq,
            ParameterId::ReverbMix => StageKind::ReverbMix,
            ParameterId::DelayTime => StageKind::Delay,
            ParameterId::CompThresh => StageKind::DynamicsCompressor,
            ParameterId::DelayMix => StageKind::DelayMix,
        }
    }

    fn index(&self) -> usize {
        match self {
            ParameterId::Gain => 0,
            ParameterId::EqLow => 1,
            ParameterId::EqHigh => 2,
            ParameterId::ReverbMix => 3,
            ParameterId::DelayTime => 4,
            ParameterId::CompThresh => 5,
            ParameterId::DelayMix => 6,
        }
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterId {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParameterId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParamError::UnknownParameter(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ParameterValue
// ---------------------------------------------------------------------------

/// A validated control change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterValue {
    pub id: ParameterId,
    pub value: f32,
}

impl ParameterValue {
    /// Validate `value` for `id`.  Range clamping is left to the stage.
    pub fn new(id: ParameterId, value: f32) -> Result<Self, ParamError> {
        if !value.is_finite() {
            return Err(ParamError::NotFinite { id, value });
        }
        Ok(Self { id, value })
    }

    /// Parse a control change from its textual id and value.
    ///
    /// ```rust
    /// use take_studio::graph::{ParameterId, ParameterValue};
    ///
    /// let v = ParameterValue::parse("delayTime", "250").unwrap();
    /// assert_eq!(v.id, ParameterId::DelayTime);
    /// assert_eq!(v.value, 250.0);
    /// assert!(ParameterValue::parse("wah", "1").is_err());
    /// ```
    pub fn parse(id: &str, value: &str) -> Result<Self, ParamError> {
        let id: ParameterId = id.parse()?;
        let parsed: f32 = value
            .trim()
            .parse()
            .map_err(|_| ParamError::InvalidNumber {
                id,
                input: value.to_string(),
            })?;
        Self::new(id, parsed)
    }
}

// ---------------------------------------------------------------------------
// ParameterStore
// ---------------------------------------------------------------------------

/// Current value of every control.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterStore {
    values: [f32; ParameterId::ALL.len()],
}

impl ParameterStore {
    /// Seed the store from the configured initial values.
    pub fn from_config(effects: &EffectsConfig) -> Self {
        let mut store = Self {
            values: [0.0; ParameterId::ALL.len()],
        };
        store.values[ParameterId::Gain.index()] = effects.gain;
        store.values[ParameterId::EqLow.index()] = effects.eq_low_db;
        store.values[ParameterId::EqHigh.index()] = effects.eq_high_db;
        store.values[ParameterId::ReverbMix.index()] = effects.reverb_mix;
        store.values[ParameterId::DelayTime.index()] = effects.delay_time_ms;
        store.values[ParameterId::CompThresh.index()] = effects.comp_threshold_db;
        store.values[ParameterId::DelayMix.index()] = effects.delay_mix;
        store
    }

    /// Current value of `id`, in the caller-facing unit.
    pub fn get(&self, id: ParameterId) -> f32 {
        self.values[id.index()]
    }

    /// Record a change and return the previous value.
    pub fn set(&mut self, change: ParameterValue) -> f32 {
        std::mem::replace(&mut self.values[change.id.index()], change.value)
    }

    /// Every control with its current value.
    pub fn iter(&self) -> impl Iterator<Item = ParameterValue> + '_ {
        ParameterId::ALL.iter().map(|&id| ParameterValue {
            id,
            value: self.get(id),
        })
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::from_config(&EffectsConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
