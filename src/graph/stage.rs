//! Graph nodes.
//!
//! Every node in the [`SignalGraph`](super::SignalGraph) is an
//! [`AudioStage`]: a tagged processor that transforms a mono block in
//! place.  Summing of multiple inputs happens in the graph before the stage
//! runs.

use std::fmt;

use super::delay::DelayLine;
use super::dynamics::Compressor;
use super::filter::ShelfFilter;
use super::reverb::{ReverbStage, ReverbStatus};

/// Linear gain range for gain and mix stages.
pub const GAIN_RANGE: (f32, f32) = (0.0, 10.0);

// ---------------------------------------------------------------------------
// StageKind
// ---------------------------------------------------------------------------

/// Identity of a node in the fixed topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Input,
    Gain,
    LowShelfEq,
    HighShelfEq,
    DynamicsCompressor,
    Dry,
    Delay,
    DelayMix,
    ConvolutionReverb,
    ReverbMix,
    Output,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Input => "input",
            StageKind::Gain => "gain",
            StageKind::LowShelfEq => "lowShelfEQ",
            StageKind::HighShelfEq => "highShelfEQ",
            StageKind::DynamicsCompressor => "dynamicsCompressor",
            StageKind::Dry => "dry",
            StageKind::Delay => "delay",
            StageKind::DelayMix => "delayMix",
            StageKind::ConvolutionReverb => "convolutionReverb",
            StageKind::ReverbMix => "reverbMix",
            StageKind::Output => "output",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// GainStage
// ---------------------------------------------------------------------------

/// Scalar gain, also used for the dry and wet mix levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainStage {
    gain: f32,
}

impl GainStage {
    pub fn new(gain: f32) -> Self {
        let mut stage = Self { gain: 1.0 };
        stage.set_gain(gain);
        stage
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Set the gain, clamped to [`GAIN_RANGE`].
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain.clamp(GAIN_RANGE.0, GAIN_RANGE.1);
    }

    pub fn process(&self, buf: &mut [f32]) {
        if self.gain == 1.0 {
            return;
        }
        for s in buf.iter_mut() {
            *s *= self.gain;
        }
    }
}

// ---------------------------------------------------------------------------
// AudioStage
// ---------------------------------------------------------------------------

/// A node's processor.
pub enum AudioStage {
    Input,
    Gain(GainStage),
    LowShelfEq(ShelfFilter),
    HighShelfEq(ShelfFilter),
    DynamicsCompressor(Compressor),
    Dry(GainStage),
    Delay(DelayLine),
    DelayMix(GainStage),
    ConvolutionReverb(ReverbStage),
    ReverbMix(GainStage),
    Output,
}

impl AudioStage {
    pub fn kind(&self) -> StageKind {
        match self {
            AudioStage::Input => StageKind::Input,
            AudioStage::Gain(_) => StageKind::Gain,
            AudioStage::LowShelfEq(_) => StageKind::LowShelfEq,
            AudioStage::HighShelfEq(_) => StageKind::HighShelfEq,
            AudioStage::DynamicsCompressor(_) => StageKind::DynamicsCompressor,
            AudioStage::Dry(_) => StageKind::Dry,
            AudioStage::Delay(_) => StageKind::Delay,
            AudioStage::DelayMix(_) => StageKind::DelayMix,
            AudioStage::ConvolutionReverb(_) => StageKind::ConvolutionReverb,
            AudioStage::ReverbMix(_) => StageKind::ReverbMix,
            AudioStage::Output => StageKind::Output,
        }
    }

    /// Transform `buf` in place.
    pub fn process(&mut self, buf: &mut [f32]) {
        match self {
            AudioStage::Input | AudioStage::Output => {}
            AudioStage::Gain(g)
            | AudioStage::Dry(g)
            | AudioStage::DelayMix(g)
            | AudioStage::ReverbMix(g) => g.process(buf),
            AudioStage::LowShelfEq(f) | AudioStage::HighShelfEq(f) => f.process(buf),
            AudioStage::DynamicsCompressor(c) => c.process(buf),
            AudioStage::Delay(d) => d.process(buf),
            AudioStage::ConvolutionReverb(r) => r.process(buf),
        }
    }

    /// Named automatable properties and their current values.
    pub fn properties(&self) -> Vec<(&'static str, f32)> {
        match self {
            AudioStage::Input | AudioStage::Output | AudioStage::ConvolutionReverb(_) => Vec::new(),
            AudioStage::Gain(g)
            | AudioStage::Dry(g)
            | AudioStage::DelayMix(g)
            | AudioStage::ReverbMix(g) => vec![("gain", g.gain())],
            AudioStage::LowShelfEq(f) | AudioStage::HighShelfEq(f) => {
                vec![("frequency", f.frequency()), ("gain", f.gain_db())]
            }
            AudioStage::DynamicsCompressor(c) => vec![
                ("threshold", c.threshold_db()),
                ("knee", c.knee_db()),
                ("ratio", c.ratio()),
                ("attack", c.attack_secs()),
                ("release", c.release_secs()),
            ],
            AudioStage::Delay(d) => vec![("delayTime", d.delay_secs())],
        }
    }

    /// Reverb load status, for the reverb node only.
    pub fn reverb_status(&mut self) -> Option<ReverbStatus> {
        match self {
            AudioStage::ConvolutionReverb(r) => Some(r.status().clone()),
            _ => None,
        }
    }
}

impl fmt::Debug for AudioStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioStage")
            .field("kind", &self.kind())
            .field("properties", &self.properties())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_scales_and_clamps() {
        let mut g = GainStage::new(0.5);
        let mut buf = vec![1.0, -0.4];
        g.process(&mut buf);
        assert_eq!(buf, vec![0.5, -0.2]);

        g.set_gain(50.0);
        assert_eq!(g.gain(), 10.0);
        g.set_gain(-1.0);
        assert_eq!(g.gain(), 0.0);
    }

    #[test]
    fn passthrough_stages_leave_audio_alone() {
        let mut buf = vec![0.3, 0.6];
        AudioStage::Input.process(&mut buf);
        AudioStage::Output.process(&mut buf);
        assert_eq!(buf, vec![0.3, 0.6]);
    }

    #[test]
    fn mix_stage_reports_gain_property() {
        let stage = AudioStage::DelayMix(GainStage::new(0.3));
        assert_eq!(stage.kind(), StageKind::DelayMix);
        assert_eq!(stage.properties(), vec![("gain", 0.3)]);
    }
}
