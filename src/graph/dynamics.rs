//! Feed-forward compressor stage.
//!
//! Peak envelope follower with one-pole attack/release smoothing, a
//! quadratic soft-knee gain computer and no makeup gain.  Parameter ranges
//! follow the usual browser dynamics node: threshold `[-100, 0]` dB, knee
//! `[0, 40]` dB, ratio `[1, 20]`, attack and release `[0, 1]` s.

use crate::config::EffectsConfig;

pub const THRESHOLD_RANGE_DB: (f32, f32) = (-100.0, 0.0);
pub const KNEE_RANGE_DB: (f32, f32) = (0.0, 40.0);
pub const RATIO_RANGE: (f32, f32) = (1.0, 20.0);
pub const TIME_RANGE_SECS: (f32, f32) = (0.0, 1.0);

/// Level floor used when converting to dB.
const FLOOR_DB: f32 = -120.0;

#[derive(Debug, Clone)]
pub struct Compressor {
    sample_rate: f32,
    threshold_db: f32,
    knee_db: f32,
    ratio: f32,
    attack_secs: f32,
    release_secs: f32,
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
    reduction_db: f32,
}

impl Compressor {
    pub fn new(sample_rate: u32, effects: &EffectsConfig) -> Self {
        let mut comp = Self {
            sample_rate: sample_rate.max(1) as f32,
            threshold_db: 0.0,
            knee_db: 0.0,
            ratio: 1.0,
            attack_secs: 0.0,
            release_secs: 0.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope: 0.0,
            reduction_db: 0.0,
        };
        comp.set_threshold_db(effects.comp_threshold_db);
        comp.set_knee_db(effects.comp_knee_db);
        comp.set_ratio(effects.comp_ratio);
        comp.set_attack_secs(effects.comp_attack_ms / 1000.0);
        comp.set_release_secs(effects.comp_release_ms / 1000.0);
        comp
    }

    pub fn threshold_db(&self) -> f32 {
        self.threshold_db
    }

    pub fn knee_db(&self) -> f32 {
        self.knee_db
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    pub fn attack_secs(&self) -> f32 {
        self.attack_secs
    }

    pub fn release_secs(&self) -> f32 {
        self.release_secs
    }

    /// Gain reduction applied to the most recent sample, in dB (≤ 0).
    pub fn reduction_db(&self) -> f32 {
        self.reduction_db
    }

    pub fn set_threshold_db(&mut self, db: f32) {
        self.threshold_db = db.clamp(THRESHOLD_RANGE_DB.0, THRESHOLD_RANGE_DB.1);
    }

    pub fn set_knee_db(&mut self, db: f32) {
        self.knee_db = db.clamp(KNEE_RANGE_DB.0, KNEE_RANGE_DB.1);
    }

    pub fn set_ratio(&mut self, ratio: f32) {
        self.ratio = ratio.clamp(RATIO_RANGE.0, RATIO_RANGE.1);
    }

    pub fn set_attack_secs(&mut self, secs: f32) {
        self.attack_secs = secs.clamp(TIME_RANGE_SECS.0, TIME_RANGE_SECS.1);
        self.attack_coeff = Self::coefficient(self.attack_secs, self.sample_rate);
    }

    pub fn set_release_secs(&mut self, secs: f32) {
        self.release_secs = secs.clamp(TIME_RANGE_SECS.0, TIME_RANGE_SECS.1);
        self.release_coeff = Self::coefficient(self.release_secs, self.sample_rate);
    }

    /// Compress `buf` in place.
    pub fn process(&mut self, buf: &mut [f32]) {
        for s in buf.iter_mut() {
            let level = s.abs();
            let coeff = if level > self.envelope {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope = coeff * self.envelope + (1.0 - coeff) * level;

            self.reduction_db = self.gain_reduction_db(to_db(self.envelope));
            *s *= from_db(self.reduction_db);
        }
    }

    /// Static curve: dB of gain change for an input level in dB.
    pub fn gain_reduction_db(&self, input_db: f32) -> f32 {
        let over = input_db - self.threshold_db;
        let slope = 1.0 / self.ratio - 1.0;

        if self.knee_db > 0.0 && 2.0 * over.abs() <= self.knee_db {
            let x = over + self.knee_db / 2.0;
            slope * x * x / (2.0 * self.knee_db)
        } else if over > 0.0 {
            slope * over
        } else {
            0.0
        }
    }

    // One-pole smoothing: reach ~63% of the target after `secs`.
    fn coefficient(secs: f32, sample_rate: f32) -> f32 {
        let samples = secs * sample_rate;
        if samples > 0.0 {
            (-1.0 / samples).exp()
        } else {
            0.0
        }
    }
}

fn to_db(linear: f32) -> f32 {
    if linear > 0.0 {
        (20.0 * linear.log10()).max(FLOOR_DB)
    } else {
        FLOOR_DB
    }
}

fn from_db(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
