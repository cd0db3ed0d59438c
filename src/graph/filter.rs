//! Shelving equaliser stages.
//!
//! Low/high shelf biquads from the RBJ audio-EQ cookbook via the `biquad`
//! crate, run in transposed direct form II.  `Q = 1/√2` gives the cookbook
//! shelf slope `S = 1`.

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Q_BUTTERWORTH_F32};

/// Shelf boost/cut range in dB.
pub const SHELF_GAIN_RANGE_DB: (f32, f32) = (-40.0, 40.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShelfKind {
    Low,
    High,
}

/// Unity pass-through, used if the cookbook rejects the parameters.
const FLAT: Coefficients<f32> = Coefficients {
    a1: 0.0,
    a2: 0.0,
    b0: 1.0,
    b1: 0.0,
    b2: 0.0,
};

/// A single shelving biquad.
#[derive(Debug, Clone)]
pub struct ShelfFilter {
    kind: ShelfKind,
    sample_rate: f32,
    frequency: f32,
    gain_db: f32,
    biquad: DirectForm2Transposed<f32>,
}

impl ShelfFilter {
    /// A flat (0 dB) shelf at `frequency` Hz.
    pub fn new(kind: ShelfKind, sample_rate: u32, frequency: f32) -> Self {
        let sample_rate = sample_rate.max(1) as f32;
        let coeffs = coefficients(kind, sample_rate, frequency, 0.0);
        Self {
            kind,
            sample_rate,
            frequency,
            gain_db: 0.0,
            biquad: DirectForm2Transposed::<f32>::new(coeffs),
        }
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    /// Set the shelf gain, clamped to [`SHELF_GAIN_RANGE_DB`].  Filter
    /// memory is kept so a change mid-stream does not click.
    pub fn set_gain_db(&mut self, gain_db: f32) {
        let (lo, hi) = SHELF_GAIN_RANGE_DB;
        self.gain_db = gain_db.clamp(lo, hi);
        let coeffs = coefficients(self.kind, self.sample_rate, self.frequency, self.gain_db);
        self.biquad.update_coefficients(coeffs);
    }

    /// Filter `buf` in place.
    pub fn process(&mut self, buf: &mut [f32]) {
        for s in buf.iter_mut() {
            *s = self.biquad.run(*s);
        }
    }
}

fn coefficients(kind: ShelfKind, sample_rate: f32, frequency: f32, gain_db: f32) -> Coefficients<f32> {
    // Keep the corner strictly inside (0, nyquist).
    let f0 = frequency.clamp(1.0, sample_rate / 2.0 * 0.999);
    let filter = match kind {
        ShelfKind::Low => biquad::Type::LowShelf(gain_db),
        ShelfKind::High => biquad::Type::HighShelf(gain_db),
    };
    Coefficients::<f32>::from_params(filter, sample_rate.hz(), f0.hz(), Q_BUTTERWORTH_F32)
        .unwrap_or_else(|e| {
            log::warn!("shelf at {f0} Hz / {sample_rate} Hz rejected ({e:?}); passing through");
            FLAT
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 48_000;

    /// Run a constant signal long enough for the filter to settle.
    fn settle(filter: &mut ShelfFilter, level: f32) -> f32 {
        let mut buf = vec![level; 8192];
        filter.process(&mut buf);
        *buf.last().unwrap()
    }

    /// Steady-state amplitude for an alternating (Nyquist) signal.
    fn settle_nyquist(filter: &mut ShelfFilter) -> f32 {
        let mut buf: Vec<f32> = (0..8192).map(|i| if i % 2 == 0 { 0.1 } else { -0.1 }).collect();
        filter.process(&mut buf);
        buf[buf.len() - 1].abs()
    }

    #[test]
    fn flat_shelf_is_transparent() {
        let mut f = ShelfFilter::new(ShelfKind::Low, SR, 250.0);
        let mut buf = vec![0.3_f32, -0.2, 0.7, 0.0, 0.1];
        let original = buf.clone();
        f.process(&mut buf);
        for (a, b) in buf.iter().zip(&original) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn low_shelf_boosts_dc() {
        let mut f = ShelfFilter::new(ShelfKind::Low, SR, 250.0);
        f.set_gain_db(6.0);
        let out = settle(&mut f, 0.1);
        let expected = 0.1 * 10f32.powf(6.0 / 20.0);
        assert!((out - expected).abs() < 1e-3, "got {out}, want {expected}");
    }

    #[test]
    fn high_shelf_leaves_dc_alone_and_cuts_top() {
        let mut f = ShelfFilter::new(ShelfKind::High, SR, 4_000.0);
        f.set_gain_db(-12.0);
        let dc = settle(&mut f, 0.1);
        assert!((dc - 0.1).abs() < 1e-3);

        let mut f = ShelfFilter::new(ShelfKind::High, SR, 4_000.0);
        f.set_gain_db(-12.0);
        let top = settle_nyquist(&mut f);
        let expected = 0.1 * 10f32.powf(-12.0 / 20.0);
        assert!((top - expected).abs() < 2e-3, "got {top}, want {expected}");
    }

    #[test]
    fn gain_is_clamped() {
        let mut f = ShelfFilter::new(ShelfKind::High, SR, 4_000.0);
        f.set_gain_db(120.0);
        assert_eq!(f.gain_db(), 40.0);
        f.set_gain_db(-500.0);
        assert_eq!(f.gain_db(), -40.0);
    }

    #[test]
    fn corner_above_nyquist_stays_stable() {
        let mut f = ShelfFilter::new(ShelfKind::High, 8_000, 10_000.0);
        f.set_gain_db(12.0);
        let out = settle(&mut f, 0.1);
        assert!(out.is_finite());
        assert_eq!(f.frequency(), 10_000.0);
    }
}
