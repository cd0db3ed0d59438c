//! Fractional delay line.
//!
//! A circular buffer sized for the maximum delay time plus interpolation
//! headroom.  The read position trails the write position by the delay time
//! in samples; fractional positions are linearly interpolated.  No feedback:
//! the single echo is mixed back in by the `delayMix` stage.

#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
    sample_rate: f64,
    max_delay_secs: f32,
    delay_secs: f32,
}

impl DelayLine {
    /// A delay line holding up to `max_delay_secs` of audio, starting at zero delay.
    pub fn new(sample_rate: u32, max_delay_secs: f32) -> Self {
        let max_delay_secs = max_delay_secs.max(0.0);
        let sample_rate = sample_rate.max(1) as f64;
        let size = (max_delay_secs as f64 * sample_rate).ceil() as usize + 2;
        Self {
            buffer: vec![0.0; size],
            write_pos: 0,
            sample_rate,
            max_delay_secs,
            delay_secs: 0.0,
        }
    }

    pub fn delay_secs(&self) -> f32 {
        self.delay_secs
    }

    pub fn max_delay_secs(&self) -> f32 {
        self.max_delay_secs
    }

    /// Set the delay time, clamped to `[0, max_delay_secs]`.
    pub fn set_delay_secs(&mut self, secs: f32) {
        self.delay_secs = secs.clamp(0.0, self.max_delay_secs);
    }

    /// Delay `buf` in place.
    pub fn process(&mut self, buf: &mut [f32]) {
        let size = self.buffer.len();
        let delay = self.delay_secs as f64 * self.sample_rate;

        for s in buf.iter_mut() {
            self.buffer[self.write_pos] = *s;

            let mut read = self.write_pos as f64 - delay;
            if read < 0.0 {
                read += size as f64;
            }
            let idx = read.floor() as usize % size;
            let frac = (read - read.floor()) as f32;
            let a = self.buffer[idx];
            let b = self.buffer[(idx + 1) % size];
            *s = a + (b - a) * frac;

            self.write_pos = (self.write_pos + 1) % size;
        }
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
