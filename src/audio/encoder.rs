//! Take encoders: turn live `f32` blocks into encoded byte fragments.
//!
//! A [`TakeEncoder`] is driven by the capture session: `begin` when a
//! recording starts, `encode` for each block, `finish` when it stops.  Every
//! call may yield a fragment; the session concatenates them in arrival order
//! and the result must be a playable file.
//!
//! [`WavStreamEncoder`] writes 16-bit PCM WAV.  Because the length of a live
//! take is unknown when the header goes out, the RIFF and `data` sizes start
//! as the open-ended `0xFFFF_FFFF` marker understood by streaming decoders.
//! [`finalize`](TakeEncoder::finalize) writes the real sizes into the
//! assembled take so strict readers accept it too.

use crate::audio::StreamInfo;

/// Size marker for RIFF chunks whose length is not known up front.
const STREAMING_SIZE: u32 = u32::MAX;

// ---------------------------------------------------------------------------
// TakeEncoder
// ---------------------------------------------------------------------------

/// Incremental audio encoder used by [`crate::take::CaptureSession`].
pub trait TakeEncoder: Send {
    /// MIME type of the produced take.
    fn mime_type(&self) -> &str;

    /// Start a new take.  May return a header fragment.
    fn begin(&mut self, stream: &StreamInfo) -> Option<Vec<u8>>;

    /// Encode one block of mono samples in `[-1.0, 1.0]`.
    fn encode(&mut self, samples: &[f32]) -> Vec<u8>;

    /// Flush any pending state at the end of the take.
    fn finish(&mut self) -> Option<Vec<u8>>;

    /// Patch the assembled take once every fragment is concatenated.
    fn finalize(&self, _blob: &mut [u8]) {}
}

// ---------------------------------------------------------------------------
// WavStreamEncoder
// ---------------------------------------------------------------------------

const HEADER_LEN: usize = 44;

/// Streaming 16-bit PCM mono WAV encoder.
#[derive(Debug, Default, Clone)]
pub struct WavStreamEncoder;

impl WavStreamEncoder {
    pub fn new() -> Self {
        Self
    }

    fn header(sample_rate: u32) -> Vec<u8> {
        const CHANNELS: u16 = 1;
        const BITS: u16 = 16;
        let block_align = CHANNELS * BITS / 8;
        let byte_rate = sample_rate * block_align as u32;

        let mut h = Vec::with_capacity(HEADER_LEN);
        h.extend_from_slice(b"RIFF");
        h.extend_from_slice(&STREAMING_SIZE.to_le_bytes());
        h.extend_from_slice(b"WAVE");
        h.extend_from_slice(b"fmt ");
        h.extend_from_slice(&16u32.to_le_bytes());
        h.extend_from_slice(&1u16.to_le_bytes()); // PCM
        h.extend_from_slice(&CHANNELS.to_le_bytes());
        h.extend_from_slice(&sample_rate.to_le_bytes());
        h.extend_from_slice(&byte_rate.to_le_bytes());
        h.extend_from_slice(&block_align.to_le_bytes());
        h.extend_from_slice(&BITS.to_le_bytes());
        h.extend_from_slice(b"data");
        h.extend_from_slice(&STREAMING_SIZE.to_le_bytes());
        h
    }
}

impl TakeEncoder for WavStreamEncoder {
    fn mime_type(&self) -> &str {
        "audio/wav"
    }

    fn begin(&mut self, stream: &StreamInfo) -> Option<Vec<u8>> {
        Some(Self::header(stream.sample_rate))
    }

    fn encode(&mut self, samples: &[f32]) -> Vec<u8> {
        let mut out = Vec::with_capacity(samples.len() * 2);
        for &s in samples {
            let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    fn finish(&mut self) -> Option<Vec<u8>> {
        None
    }

    fn finalize(&self, blob: &mut [u8]) {
        if blob.len() < HEADER_LEN || &blob[0..4] != b"RIFF" || &blob[36..40] != b"data" {
            log::warn!("take is not a WAV stream; sizes left open-ended");
            return;
        }
        // Sizes past 4 GiB keep the streaming marker.
        let riff = u32::try_from(blob.len() - 8).unwrap_or(STREAMING_SIZE);
        let data = u32::try_from(blob.len() - HEADER_LEN).unwrap_or(STREAMING_SIZE);
        blob[4..8].copy_from_slice(&riff.to_le_bytes());
        blob[40..44].copy_from_slice(&data.to_le_bytes());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> StreamInfo {
        StreamInfo {
            sample_rate: 48_000,
            channels: 1,
        }
    }

    #[test]
    fn header_layout() {
        let mut enc = WavStreamEncoder::new();
        let header = enc.begin(&stream()).expect("header");

        assert_eq!(header.len(), 44);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..12], b"WAVE");
        assert_eq!(&header[12..16], b"fmt ");
        assert_eq!(&header[36..40], b"data");
        assert_eq!(u32::from_le_bytes([header[24], header[25], header[26], header[27]]), 48_000);
        assert_eq!(u32::from_le_bytes([header[40], header[41], header[42], header[43]]), u32::MAX);
    }

    #[test]
    fn encodes_pcm16_little_endian() {
        let mut enc = WavStreamEncoder::new();
        enc.begin(&stream());

        let bytes = enc.encode(&[0.0, 1.0, -1.0]);
        assert_eq!(bytes.len(), 6);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 0);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), -i16::MAX);
    }

    #[test]
    fn out_of_range_samples_are_clamped() {
        let mut enc = WavStreamEncoder::new();
        let bytes = enc.encode(&[4.0]);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MAX);
    }

    #[test]
    fn finalize_writes_real_sizes() {
        let mut enc = WavStreamEncoder::new();
        let mut blob = enc.begin(&stream()).unwrap();
        blob.extend(enc.encode(&[0.25; 10]));
        assert!(enc.finish().is_none());
        enc.finalize(&mut blob);

        assert_eq!(u32::from_le_bytes([blob[4], blob[5], blob[6], blob[7]]), 36 + 20);
        assert_eq!(u32::from_le_bytes([blob[40], blob[41], blob[42], blob[43]]), 20);

        let reader = hound::WavReader::new(std::io::Cursor::new(blob)).unwrap();
        assert_eq!(reader.spec().sample_rate, 48_000);
        assert_eq!(reader.len(), 10);
    }

    #[test]
    fn finalize_ignores_foreign_bytes() {
        let mut blob = b"not a wav".to_vec();
        WavStreamEncoder::new().finalize(&mut blob);
        assert_eq!(blob, b"not a wav");
        assert_eq!(WavStreamEncoder::new().mime_type(), "audio/wav");
    }
}
