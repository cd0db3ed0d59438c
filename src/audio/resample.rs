//! Channel mixing and sample-rate conversion.
//!
//! The effects graph runs mono at the input device's native rate.  Two
//! conversions feed it:
//!
//! 1. [`downmix`]: interleaved multi-channel input to mono.
//! 2. [`resample_linear`]: impulse responses recorded at a different rate
//!    than the live stream.
//!
//! The resampler uses linear interpolation and only runs once per impulse
//! load, off the audio path.

// ---------------------------------------------------------------------------
// downmix
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`; a trailing partial frame
/// is dropped.
///
/// # Example
///
/// ```rust
/// use take_studio::audio::downmix;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = downmix(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample_linear
// ---------------------------------------------------------------------------

/// Resample mono `samples` from `source_rate` to `target_rate` Hz using
/// linear interpolation.
///
/// * Equal rates return a copy unchanged.
/// * Empty input or a zero rate returns an empty vector.
///
/// The output length is `ceil(samples.len() * target_rate / source_rate)`.
///
/// # Example
///
/// ```rust
/// use take_studio::audio::resample_linear;
///
/// let ir_44k = vec![0.5_f32; 441];
/// let ir_48k = resample_linear(&ir_44k, 44_100, 48_000);
/// assert_eq!(ir_48k.len(), 480);
/// ```
pub fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate {
        return samples.to_vec();
    }

    if samples.is_empty() || source_rate == 0 || target_rate == 0 {
        return Vec::new();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len =
        (samples.len() as u64 * target_rate as u64).div_ceil(source_rate as u64) as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_already_mono() {
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(downmix(&input, 1), input);
    }

    #[test]
    fn downmix_two_channel() {
        let out = downmix(&[1.0_f32, -1.0, 0.5, 0.5], 2);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn downmix_drops_partial_frame() {
        let out = downmix(&[0.2_f32, 0.4, 0.9], 2);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn downmix_zero_channels() {
        assert!(downmix(&[1.0_f32, 2.0], 0).is_empty());
    }

    #[test]
    fn resample_same_rate_is_noop() {
        let input: Vec<f32> = (0..160).map(|i| i as f32 / 160.0).collect();
        assert_eq!(resample_linear(&input, 48_000, 48_000), input);
    }

    #[test]
    fn resample_empty_input() {
        assert!(resample_linear(&[], 44_100, 48_000).is_empty());
    }

    #[test]
    fn resample_zero_rate_is_empty() {
        assert!(resample_linear(&[0.1, 0.2], 0, 48_000).is_empty());
    }

    #[test]
    fn resample_downsample_length() {
        let input = vec![0.5_f32; 480];
        assert_eq!(resample_linear(&input, 48_000, 16_000).len(), 160);
    }

    #[test]
    fn resample_upsample_length() {
        let input = vec![0.0_f32; 80];
        assert_eq!(resample_linear(&input, 8_000, 16_000).len(), 160);
    }

    #[test]
    fn resample_constant_signal_preserves_amplitude() {
        let input = vec![0.5_f32; 441];
        for &s in &resample_linear(&input, 44_100, 48_000) {
            assert!((s - 0.5).abs() < 1e-5, "amplitude drift: {s}");
        }
    }
}
