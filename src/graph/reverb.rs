//! Convolution reverb.
//!
//! # Algorithm
//!
//! Uniformly partitioned overlap-save convolution.  The impulse response is
//! split into `P` partitions of `B` samples; each is zero-padded to `2B` and
//! transformed once when the impulse is prepared.  At runtime every full
//! block of `B` input samples is transformed together with the previous
//! block, pushed onto a frequency-domain delay line, and multiplied against
//! the partition spectra:
//!
//! ```text
//! Y = Σ X[k - p] · H[p]      p = 0..P
//! y = last B samples of IFFT(Y) / 2B
//! ```
//!
//! Output is produced one block late, so the stage adds `B` samples of
//! latency.
//!
//! # Loading
//!
//! The impulse arrives asynchronously (see [`super::impulse`]).  Until it
//! does, or if it never does, the stage outputs silence and the dry and
//! delay paths carry on unaffected.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use tokio::sync::oneshot;

use super::impulse::{ImpulseError, ImpulseLoad};

/// Minimum RMS used when normalising an impulse response.
const MIN_POWER: f32 = 0.000125;
/// Calibration gain applied after normalisation (-58 dB).
const GAIN_CALIBRATION_DB: f32 = -58.0;
/// Reference rate the calibration gain was measured at.
const GAIN_CALIBRATION_RATE: f32 = 44_100.0;

// ---------------------------------------------------------------------------
// ImpulseResponse
// ---------------------------------------------------------------------------

/// Mono impulse response samples at a known rate.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseResponse {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl ImpulseResponse {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Equal-power normalisation: scale so that responses of different
    /// loudness and length produce a similar wet level.
    pub fn normalization_scale(samples: &[f32], sample_rate: u32) -> f32 {
        if samples.is_empty() {
            return 1.0;
        }
        let power = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
        let power = power.sqrt().max(MIN_POWER);
        let calibration = 10f32.powf(GAIN_CALIBRATION_DB * 0.05);
        let rate = GAIN_CALIBRATION_RATE / sample_rate.max(1) as f32;
        calibration * rate / power
    }

    /// Apply [`normalization_scale`](Self::normalization_scale) in place.
    pub fn normalized(mut self) -> Self {
        let scale = Self::normalization_scale(&self.samples, self.sample_rate);
        for s in &mut self.samples {
            *s *= scale;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// PreparedImpulse
// ---------------------------------------------------------------------------

/// Partition spectra plus FFT plans, ready for the audio path.
///
/// Building one is the expensive part of loading a reverb and happens off
/// the audio thread.
pub struct PreparedImpulse {
    block: usize,
    partitions: Vec<Vec<Complex<f32>>>,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
}

impl std::fmt::Debug for PreparedImpulse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedImpulse")
            .field("block", &self.block)
            .field("partitions", &self.partitions.len())
            .finish()
    }
}

impl PreparedImpulse {
    /// Split `ir` into partitions of `block` samples and transform each.
    ///
    /// An empty response still yields one (silent) partition.
    pub fn prepare(ir: &ImpulseResponse, block: usize) -> Self {
        let block = block.max(1);
        let n = block * 2;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);
        let ifft = planner.plan_fft_inverse(n);

        let mut partitions: Vec<Vec<Complex<f32>>> = ir
            .samples()
            .chunks(block)
            .map(|chunk| {
                let mut spectrum = vec![Complex::new(0.0, 0.0); n];
                for (c, &s) in spectrum.iter_mut().zip(chunk) {
                    c.re = s;
                }
                fft.process(&mut spectrum);
                spectrum
            })
            .collect();
        if partitions.is_empty() {
            partitions.push(vec![Complex::new(0.0, 0.0); n]);
        }

        Self {
            block,
            partitions,
            fft,
            ifft,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }
}

// ---------------------------------------------------------------------------
// Convolver
// ---------------------------------------------------------------------------

/// Streaming partitioned convolver.  Latency is one block.
pub struct Convolver {
    ir: PreparedImpulse,
    /// Previous block followed by the block being filled.
    input: Vec<f32>,
    /// Samples buffered in the current block.
    fill: usize,
    /// Frequency-domain delay line of input spectra.
    fdl: Vec<Vec<Complex<f32>>>,
    fdl_pos: usize,
    accum: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    output: Vec<f32>,
}

impl Convolver {
    pub fn new(ir: PreparedImpulse) -> Self {
        let b = ir.block;
        let n = 2 * b;
        let zero = Complex::new(0.0, 0.0);
        let scratch_len = ir
            .fft
            .get_inplace_scratch_len()
            .max(ir.ifft.get_inplace_scratch_len());
        let fdl = vec![vec![zero; n]; ir.partitions.len()];

        Self {
            ir,
            input: vec![0.0; n],
            fill: 0,
            fdl,
            fdl_pos: 0,
            accum: vec![zero; n],
            fft_scratch: vec![zero; scratch_len],
            output: vec![0.0; b],
        }
    }

    /// Samples of delay the convolver adds.
    pub fn latency(&self) -> usize {
        self.ir.block
    }

    /// Convolve `buf` in place.
    pub fn process(&mut self, buf: &mut [f32]) {
        let b = self.ir.block;
        for s in buf.iter_mut() {
            self.input[b + self.fill] = *s;
            *s = self.output[self.fill];
            self.fill += 1;
            if self.fill == b {
                self.process_block();
                self.fill = 0;
            }
        }
    }

    fn process_block(&mut self) {
        let b = self.ir.block;
        let n = 2 * b;
        let parts = self.ir.partitions.len();

        let spectrum = &mut self.fdl[self.fdl_pos];
        for (c, &s) in spectrum.iter_mut().zip(&self.input) {
            *c = Complex::new(s, 0.0);
        }
        self.ir
            .fft
            .process_with_scratch(spectrum, &mut self.fft_scratch);

        self.accum.fill(Complex::new(0.0, 0.0));
        for p in 0..parts {
            let x = &self.fdl[(self.fdl_pos + parts - p) % parts];
            let h = &self.ir.partitions[p];
            for ((acc, xk), hk) in self.accum.iter_mut().zip(x).zip(h) {
                *acc += xk * hk;
            }
        }
        self.ir
            .ifft
            .process_with_scratch(&mut self.accum, &mut self.fft_scratch);

        let scale = 1.0 / n as f32;
        for (out, y) in self.output.iter_mut().zip(&self.accum[b..]) {
            *out = y.re * scale;
        }

        self.input.copy_within(b.., 0);
        self.fdl_pos = (self.fdl_pos + 1) % parts;
    }
}

// ---------------------------------------------------------------------------
// ReverbStage
// ---------------------------------------------------------------------------

/// Whether the reverb has an impulse to convolve with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReverbStatus {
    /// Load still in flight.
    Pending,
    /// Impulse installed; the wet path is live.
    Loaded,
    /// Load failed or was disabled; the wet path stays silent.
    Unavailable(String),
}

impl ReverbStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ReverbStatus::Pending => "Pending",
            ReverbStatus::Loaded => "Loaded",
            ReverbStatus::Unavailable(_) => "Unavailable",
        }
    }
}

/// Graph stage wrapping a [`Convolver`] whose impulse may not have arrived yet.
pub struct ReverbStage {
    pending: Option<oneshot::Receiver<ImpulseLoad>>,
    convolver: Option<Convolver>,
    status: ReverbStatus,
}

impl ReverbStage {
    /// A stage waiting on `pending` for its impulse.
    pub fn new(pending: oneshot::Receiver<ImpulseLoad>) -> Self {
        Self {
            pending: Some(pending),
            convolver: None,
            status: ReverbStatus::Pending,
        }
    }

    /// Install a prepared impulse directly.
    pub fn install(&mut self, ir: PreparedImpulse) {
        log::info!(
            "reverb impulse installed ({} partitions of {})",
            ir.partition_count(),
            ir.block_size()
        );
        self.pending = None;
        self.convolver = Some(Convolver::new(ir));
        self.status = ReverbStatus::Loaded;
    }

    /// Current status, picking up a finished load if there is one.
    pub fn status(&mut self) -> &ReverbStatus {
        self.poll();
        &self.status
    }

    /// Convolve `buf` in place, or silence it while no impulse is loaded.
    pub fn process(&mut self, buf: &mut [f32]) {
        self.poll();
        match self.convolver.as_mut() {
            Some(conv) => conv.process(buf),
            None => buf.fill(0.0),
        }
    }

    fn poll(&mut self) {
        let Some(rx) = self.pending.as_mut() else {
            return;
        };
        match rx.try_recv() {
            Ok(Ok(ir)) => self.install(ir),
            Ok(Err(e)) => self.fail(e),
            Err(oneshot::error::TryRecvError::Empty) => {}
            Err(oneshot::error::TryRecvError::Closed) => {
                self.fail(ImpulseError::Abandoned);
            }
        }
    }

    fn fail(&mut self, err: ImpulseError) {
        log::warn!("reverb unavailable: {err}");
        self.pending = None;
        self.status = ReverbStatus::Unavailable(err.to_string());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn convolve_all(ir: Vec<f32>, block: usize, input: &[f32]) -> Vec<f32> {
        let prepared = PreparedImpulse::prepare(&ImpulseResponse::new(ir, 48_000), block);
        let mut conv = Convolver::new(prepared);
        let mut out = input.to_vec();
        // Odd-sized chunks exercise the block accumulator.
        for chunk in out.chunks_mut(7) {
            conv.process(chunk);
        }
        out
    }

    fn direct(ir: &[f32], input: &[f32]) -> Vec<f32> {
        (0..input.len())
            .map(|i| {
                ir.iter()
                    .enumerate()
                    .filter(|(k, _)| *k <= i)
                    .map(|(k, h)| h * input[i - k])
                    .sum()
            })
            .collect()
    }

    #[test]
    fn unit_impulse_delays_by_one_block() {
        let block = 16;
        let input: Vec<f32> = (0..64).map(|i| (i as f32 * 0.37).sin()).collect();
        let out = convolve_all(vec![1.0], block, &input);

        for i in 0..block {
            assert!(out[i].abs() < 1e-6);
        }
        for i in block..input.len() {
            assert!((out[i] - input[i - block]).abs() < 1e-4, "sample {i}");
        }
    }

    #[test]
    fn matches_direct_convolution_across_partitions() {
        let block = 8;
        // Longer than three partitions.
        let ir: Vec<f32> = (0..29).map(|i| 1.0 / (i as f32 + 1.0)).collect();
        let input: Vec<f32> = (0..96).map(|i| ((i * 13) % 7) as f32 / 7.0 - 0.5).collect();

        let out = convolve_all(ir.clone(), block, &input);
        let expected = direct(&ir, &input);

        for i in block..input.len() {
            assert!(
                (out[i] - expected[i - block]).abs() < 1e-3,
                "sample {i}: {} vs {}",
                out[i],
                expected[i - block]
            );
        }
    }

    #[test]
    fn empty_impulse_is_silent() {
        let out = convolve_all(Vec::new(), 8, &[1.0; 40]);
        assert!(out.iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn normalization_uses_min_power_for_silence() {
        let scale = ImpulseResponse::normalization_scale(&[0.0; 100], 44_100);
        let expected = 10f32.powf(-58.0 * 0.05) / MIN_POWER;
        assert!((scale - expected).abs() / expected < 1e-4);
    }

    #[test]
    fn normalization_compensates_sample_rate() {
        let ir = vec![0.5; 64];
        let at_44 = ImpulseResponse::normalization_scale(&ir, 44_100);
        let at_88 = ImpulseResponse::normalization_scale(&ir, 88_200);
        assert!((at_44 / at_88 - 2.0).abs() < 1e-4);
    }

    #[test]
    fn stage_is_silent_until_loaded() {
        let (tx, rx) = oneshot::channel();
        let mut stage = ReverbStage::new(rx);
        let mut buf = vec![0.5; 32];
        stage.process(&mut buf);
        assert!(buf.iter().all(|&s| s == 0.0));
        assert_eq!(stage.status(), &ReverbStatus::Pending);

        let prepared = PreparedImpulse::prepare(&ImpulseResponse::new(vec![1.0], 48_000), 4);
        tx.send(Ok(prepared)).unwrap();
        assert_eq!(stage.status(), &ReverbStatus::Loaded);

        let mut buf = vec![0.5; 8];
        stage.process(&mut buf);
        assert!((buf[4] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn failed_load_marks_unavailable() {
        let (tx, rx) = oneshot::channel();
        let mut stage = ReverbStage::new(rx);
        tx.send(Err(ImpulseError::Disabled)).unwrap();
        assert_eq!(stage.status().label(), "Unavailable");

        let mut buf = vec![0.5; 8];
        stage.process(&mut buf);
        assert!(buf.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn dropped_loader_marks_unavailable() {
        let (tx, rx) = oneshot::channel::<ImpulseLoad>();
        let mut stage = ReverbStage::new(rx);
        drop(tx);
        assert!(matches!(stage.status(), ReverbStatus::Unavailable(_)));
    }
}
