//! The effects graph.
//!
//! ```text
//!                                                            ┌─▶ dry ──────────────────────────┐
//! input ─▶ gain ─▶ lowShelfEQ ─▶ highShelfEQ ─▶ compressor ──┼─▶ delay ─▶ delayMix ─────────────┼─▶ output
//!                                                            └─▶ convolutionReverb ─▶ reverbMix ┘
//! ```
//!
//! The topology is fixed: twelve connections and three parallel paths from
//! the compressor to the output.  Stages are stored in topological order,
//! so one forward pass per block evaluates the whole graph; a node with
//! several inputs sees their sum.

use tokio::sync::oneshot;

use crate::audio::StreamInfo;
use crate::config::EffectsConfig;

use super::delay::DelayLine;
use super::dynamics::Compressor;
use super::filter::{ShelfFilter, ShelfKind};
use super::impulse::{self, ImpulseLoad, ImpulseSource};
use super::params::{ParameterId, ParameterStore, ParameterValue};
use super::reverb::{PreparedImpulse, ReverbStage, ReverbStatus};
use super::stage::{AudioStage, GainStage, StageKind};

/// Every connection in the graph, as (from, to).
pub const TOPOLOGY: [(StageKind, StageKind); 12] = [
    (StageKind::Input, StageKind::Gain),
    (StageKind::Gain, StageKind::LowShelfEq),
    (StageKind::LowShelfEq, StageKind::HighShelfEq),
    (StageKind::HighShelfEq, StageKind::DynamicsCompressor),
    (StageKind::DynamicsCompressor, StageKind::Dry),
    (StageKind::Dry, StageKind::Output),
    (StageKind::DynamicsCompressor, StageKind::Delay),
    (StageKind::Delay, StageKind::DelayMix),
    (StageKind::DelayMix, StageKind::Output),
    (StageKind::DynamicsCompressor, StageKind::ConvolutionReverb),
    (StageKind::ConvolutionReverb, StageKind::ReverbMix),
    (StageKind::ReverbMix, StageKind::Output),
];

/// Processing order; every connection points forward in this list.
const ORDER: [StageKind; 11] = [
    StageKind::Input,
    StageKind::Gain,
    StageKind::LowShelfEq,
    StageKind::HighShelfEq,
    StageKind::DynamicsCompressor,
    StageKind::Dry,
    StageKind::Delay,
    StageKind::DelayMix,
    StageKind::ConvolutionReverb,
    StageKind::ReverbMix,
    StageKind::Output,
];

const INPUT: usize = 0;
const OUTPUT: usize = ORDER.len() - 1;

fn position(kind: StageKind) -> usize {
    ORDER.iter().position(|&k| k == kind).unwrap_or(OUTPUT)
}

// ---------------------------------------------------------------------------
// SignalGraph
// ---------------------------------------------------------------------------

pub struct SignalGraph {
    stream: StreamInfo,
    stages: Vec<AudioStage>,
    /// Predecessor indices per stage.
    inputs: Vec<Vec<usize>>,
    buffers: Vec<Vec<f32>>,
}

impl SignalGraph {
    /// Build the graph for a live stream and start loading the impulse
    /// response in the background.
    ///
    /// Construction never fails.  Until the impulse arrives (or if it never
    /// does) the reverb path is silent.
    pub fn build(
        stream: StreamInfo,
        effects: &EffectsConfig,
        params: &ParameterStore,
        impulse: ImpulseSource,
        partition_size: usize,
    ) -> Self {
        let pending = impulse::spawn_load(impulse, stream.sample_rate, partition_size);
        Self::with_reverb(stream, effects, params, pending)
    }

    /// Build the graph with the reverb fed from an existing load channel.
    pub fn with_reverb(
        stream: StreamInfo,
        effects: &EffectsConfig,
        params: &ParameterStore,
        pending: oneshot::Receiver<ImpulseLoad>,
    ) -> Self {
        let sr = stream.sample_rate;

        let stages = vec![
            AudioStage::Input,
            AudioStage::Gain(GainStage::new(1.0)),
            AudioStage::LowShelfEq(ShelfFilter::new(ShelfKind::Low, sr, effects.low_shelf_hz)),
            AudioStage::HighShelfEq(ShelfFilter::new(ShelfKind::High, sr, effects.high_shelf_hz)),
            AudioStage::DynamicsCompressor(Compressor::new(sr, effects)),
            AudioStage::Dry(GainStage::new(1.0)),
            AudioStage::Delay(DelayLine::new(sr, effects.max_delay_secs)),
            AudioStage::DelayMix(GainStage::new(1.0)),
            AudioStage::ConvolutionReverb(ReverbStage::new(pending)),
            AudioStage::ReverbMix(GainStage::new(1.0)),
            AudioStage::Output,
        ];
        debug_assert!(stages.iter().map(AudioStage::kind).eq(ORDER));

        let mut inputs = vec![Vec::new(); ORDER.len()];
        for (from, to) in TOPOLOGY {
            inputs[position(to)].push(position(from));
        }

        let mut graph = Self {
            stream,
            stages,
            inputs,
            buffers: vec![Vec::new(); ORDER.len()],
        };
        for value in params.iter() {
            graph.set_parameter(value);
        }

        log::debug!(
            "signal graph built at {} Hz ({} stages, {} connections)",
            sr,
            graph.stages.len(),
            graph.connection_count()
        );
        graph
    }

    pub fn stream_info(&self) -> StreamInfo {
        self.stream
    }

    /// Apply one control change.  Touches exactly one stage property;
    /// out-of-range values are clamped by the stage.
    pub fn set_parameter(&mut self, change: ParameterValue) {
        let v = change.value;
        let stage = &mut self.stages[position(change.id.target())];
        match (change.id, stage) {
            (ParameterId::Gain, AudioStage::Gain(g)) => g.set_gain(v),
            (ParameterId::EqLow, AudioStage::LowShelfEq(f)) => f.set_gain_db(v),
            (ParameterId::EqHigh, AudioStage::HighShelfEq(f)) => f.set_gain_db(v),
            (ParameterId::ReverbMix, AudioStage::ReverbMix(g)) => g.set_gain(v),
            (ParameterId::DelayTime, AudioStage::Delay(d)) => d.set_delay_secs(v / 1000.0),
            (ParameterId::CompThresh, AudioStage::DynamicsCompressor(c)) => c.set_threshold_db(v),
            (ParameterId::DelayMix, AudioStage::DelayMix(g)) => g.set_gain(v),
            (id, stage) => {
                log::error!("parameter {id} has no property on stage {}", stage.kind());
            }
        }
    }

    /// Run one mono block through the graph and return the output block.
    pub fn process(&mut self, input: &[f32]) -> &[f32] {
        let n = input.len();
        for buf in &mut self.buffers {
            buf.resize(n, 0.0);
        }

        for i in 0..self.stages.len() {
            let (done, rest) = self.buffers.split_at_mut(i);
            let current = &mut rest[0];
            if i == INPUT {
                current.copy_from_slice(input);
            } else {
                current.fill(0.0);
                for &from in &self.inputs[i] {
                    for (acc, s) in current.iter_mut().zip(&done[from]) {
                        *acc += s;
                    }
                }
            }
            self.stages[i].process(current);
        }

        &self.buffers[OUTPUT]
    }

    /// Install an already prepared impulse, replacing any pending load.
    pub fn install_impulse(&mut self, ir: PreparedImpulse) {
        if let AudioStage::ConvolutionReverb(r) =
            &mut self.stages[position(StageKind::ConvolutionReverb)]
        {
            r.install(ir);
        }
    }

    /// Current reverb load status.
    pub fn reverb_status(&mut self) -> ReverbStatus {
        self.stages[position(StageKind::ConvolutionReverb)]
            .reverb_status()
            .unwrap_or(ReverbStatus::Unavailable("no reverb stage".into()))
    }

    // -- introspection ------------------------------------------------------

    pub fn stage(&self, kind: StageKind) -> &AudioStage {
        &self.stages[position(kind)]
    }

    /// Connections as (from, to) stage kinds.
    pub fn connections(&self) -> Vec<(StageKind, StageKind)> {
        self.inputs
            .iter()
            .enumerate()
            .flat_map(|(to, froms)| froms.iter().map(move |&from| (ORDER[from], ORDER[to])))
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.inputs.iter().map(Vec::len).sum()
    }

    /// Number of distinct input-to-output paths.
    pub fn output_path_count(&self) -> usize {
        // Paths into node i = sum of paths into its predecessors.
        let mut paths = vec![0usize; self.stages.len()];
        paths[INPUT] = 1;
        for i in 1..self.stages.len() {
            paths[i] = self.inputs[i].iter().map(|&p| paths[p]).sum();
        }
        paths[OUTPUT]
    }

    /// Every automatable property in the graph.
    pub fn properties(&self) -> Vec<(StageKind, &'static str, f32)> {
        self.stages
            .iter()
            .flat_map(|stage| {
                let kind = stage.kind();
                stage
                    .properties()
                    .into_iter()
                    .map(move |(name, value)| (kind, name, value))
            })
            .collect()
    }
}

impl std::fmt::Debug for SignalGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalGraph")
            .field("stream", &self.stream)
            .field("stages", &self.stages)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
