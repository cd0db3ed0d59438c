//! Impulse response loading for the reverb stage.
//!
//! ```text
//! ImpulseSource ─▶ fetch (tokio::fs / reqwest) ─▶ spawn_blocking {
//!     hound decode → downmix → resample → normalise → partition FFT
//! } ─▶ oneshot ─▶ ReverbStage
//! ```
//!
//! Loading never blocks graph construction and never fails it: errors are
//! delivered down the same channel and leave the reverb silent.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::oneshot;

use crate::audio::{downmix, resample_linear};

use super::reverb::{ImpulseResponse, PreparedImpulse};

/// Outcome of an impulse load.
pub type ImpulseLoad = Result<PreparedImpulse, ImpulseError>;

// ---------------------------------------------------------------------------
// ImpulseError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ImpulseError {
    #[error("no impulse response configured")]
    Disabled,

    #[error("failed to read impulse response {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("impulse response request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("impulse response request returned HTTP {0}")]
    Status(u16),

    #[error("impulse response is not a readable WAV file: {0}")]
    Decode(#[from] hound::Error),

    #[error("impulse response contains no samples")]
    Empty,

    #[error("no async runtime available to load the impulse response")]
    NoRuntime,

    #[error("impulse loader stopped before finishing")]
    Abandoned,

    #[error("impulse preparation task failed: {0}")]
    Task(String),
}

// ---------------------------------------------------------------------------
// ImpulseSource
// ---------------------------------------------------------------------------

/// Where an impulse response comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImpulseSource {
    /// Reverb switched off.
    Disabled,
    /// A file on the local disk.
    File(PathBuf),
    /// Fetched over HTTP.
    Url(String),
}

impl ImpulseSource {
    /// Resolve a configured location.
    ///
    /// * empty → [`Disabled`](Self::Disabled)
    /// * `http://` / `https://` → fetched as-is
    /// * absolute or existing local path → read from disk
    /// * anything else → served by the backend under `base_url`
    ///
    /// ```rust
    /// use take_studio::graph::ImpulseSource;
    ///
    /// assert_eq!(
    ///     ImpulseSource::resolve("static/irs/hall.wav", "http://localhost:8080/"),
    ///     ImpulseSource::Url("http://localhost:8080/static/irs/hall.wav".into()),
    /// );
    /// assert_eq!(ImpulseSource::resolve("  ", "http://x"), ImpulseSource::Disabled);
    /// ```
    pub fn resolve(location: &str, base_url: &str) -> Self {
        let location = location.trim();
        if location.is_empty() {
            return ImpulseSource::Disabled;
        }
        if location.starts_with("http://") || location.starts_with("https://") {
            return ImpulseSource::Url(location.to_string());
        }
        let path = Path::new(location);
        if path.is_absolute() || path.exists() {
            return ImpulseSource::File(path.to_path_buf());
        }
        ImpulseSource::Url(format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            location.trim_start_matches('/')
        ))
    }
}

impl std::fmt::Display for ImpulseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImpulseSource::Disabled => f.write_str("(disabled)"),
            ImpulseSource::File(path) => write!(f, "{}", path.display()),
            ImpulseSource::Url(url) => f.write_str(url),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Read the raw bytes of `source`.
pub async fn fetch(source: &ImpulseSource) -> Result<Vec<u8>, ImpulseError> {
    match source {
        ImpulseSource::Disabled => Err(ImpulseError::Disabled),
        ImpulseSource::File(path) => {
            tokio::fs::read(path)
                .await
                .map_err(|source| ImpulseError::Io {
                    path: path.clone(),
                    source,
                })
        }
        ImpulseSource::Url(url) => {
            let response = reqwest::get(url.as_str()).await?;
            let status = response.status();
            if !status.is_success() {
                return Err(ImpulseError::Status(status.as_u16()));
            }
            Ok(response.bytes().await?.to_vec())
        }
    }
}

/// Decode a WAV file to a mono impulse response at its native rate.
pub fn decode_wav(bytes: &[u8]) -> Result<ImpulseResponse, ImpulseError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()?
        }
    };

    let mono = downmix(&interleaved, spec.channels);
    if mono.is_empty() {
        return Err(ImpulseError::Empty);
    }
    Ok(ImpulseResponse::new(mono, spec.sample_rate))
}

/// Decode, match the stream rate, normalise and partition.  CPU-bound.
pub fn prepare(bytes: &[u8], target_rate: u32, block: usize) -> ImpulseLoad {
    let decoded = decode_wav(bytes)?;
    let samples = resample_linear(decoded.samples(), decoded.sample_rate(), target_rate);
    let ir = ImpulseResponse::new(samples, target_rate).normalized();
    Ok(PreparedImpulse::prepare(&ir, block))
}

/// Fetch and prepare `source` for a stream at `target_rate`.
pub async fn load(source: ImpulseSource, target_rate: u32, block: usize) -> ImpulseLoad {
    let bytes = fetch(&source).await?;
    log::debug!("impulse response fetched from {source} ({} bytes)", bytes.len());
    tokio::task::spawn_blocking(move || prepare(&bytes, target_rate, block))
        .await
        .map_err(|e| ImpulseError::Task(e.to_string()))?
}

/// Start loading `source` in the background and return the channel the
/// result will arrive on.
///
/// Outside a tokio runtime the load fails immediately with
/// [`ImpulseError::NoRuntime`].
pub fn spawn_load(
    source: ImpulseSource,
    target_rate: u32,
    block: usize,
) -> oneshot::Receiver<ImpulseLoad> {
    let (tx, rx) = oneshot::channel();

    if source == ImpulseSource::Disabled {
        let _ = tx.send(Err(ImpulseError::Disabled));
        return rx;
    }

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            log::info!("loading impulse response from {source}");
            handle.spawn(async move {
                let result = load(source, target_rate, block).await;
                // The graph may have been rebuilt in the meantime.
                let _ = tx.send(result);
            });
        }
        Err(_) => {
            let _ = tx.send(Err(ImpulseError::NoRuntime));
        }
    }

    rx
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn resolve_absolute_url() {
        assert_eq!(
            ImpulseSource::resolve("https://cdn.example/ir.wav", "http://localhost:8080"),
            ImpulseSource::Url("https://cdn.example/ir.wav".into())
        );
    }

    #[test]
    fn resolve_existing_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();
        assert_eq!(
            ImpulseSource::resolve(&path, "http://localhost:8080"),
            ImpulseSource::File(file.path().to_path_buf())
        );
    }

    #[test]
    fn resolve_relative_against_backend() {
        assert_eq!(
            ImpulseSource::resolve("/static/irs/medium-studio.wav", "http://localhost:8080"),
            ImpulseSource::File("/static/irs/medium-studio.wav".into())
        );
        assert_eq!(
            ImpulseSource::resolve("static/irs/medium-studio.wav", "http://localhost:8080"),
            ImpulseSource::Url("http://localhost:8080/static/irs/medium-studio.wav".into())
        );
    }

    #[test]
    fn decode_stereo_int_wav() {
        let bytes = wav_bytes(&[16_384, 0, -16_384, -16_384], 2, 22_050);
        let ir = decode_wav(&bytes).unwrap();
        assert_eq!(ir.sample_rate(), 22_050);
        assert_eq!(ir.len(), 2);
        assert!((ir.samples()[0] - 0.25).abs() < 1e-4);
        assert!((ir.samples()[1] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode_wav(b"<html>not found</html>"), Err(ImpulseError::Decode(_))));
    }

    #[test]
    fn decode_rejects_empty_wav() {
        let bytes = wav_bytes(&[], 1, 44_100);
        assert!(matches!(decode_wav(&bytes), Err(ImpulseError::Empty)));
    }

    #[test]
    fn prepare_resamples_to_stream_rate() {
        let bytes = wav_bytes(&[i16::MAX; 441], 1, 44_100);
        let ir = prepare(&bytes, 48_000, 64).unwrap();
        // 480 samples at 48 kHz in 64-sample partitions.
        assert_eq!(ir.partition_count(), 8);
        assert_eq!(ir.block_size(), 64);
    }

    #[test]
    fn spawn_load_without_runtime_fails_fast() {
        let mut rx = spawn_load(ImpulseSource::File("ir.wav".into()), 48_000, 128);
        assert!(matches!(rx.try_recv(), Ok(Err(ImpulseError::NoRuntime))));
    }

    #[test]
    fn disabled_source_resolves_immediately() {
        let mut rx = spawn_load(ImpulseSource::Disabled, 48_000, 128);
        assert!(matches!(rx.try_recv(), Ok(Err(ImpulseError::Disabled))));
    }

    #[tokio::test]
    async fn spawn_load_reads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("room.wav");
        std::fs::write(&path, wav_bytes(&[8_000, 4_000, 2_000, 1_000], 1, 48_000)).unwrap();

        let rx = spawn_load(ImpulseSource::File(path), 48_000, 32);
        let ir = rx.await.unwrap().unwrap();
        assert_eq!(ir.partition_count(), 1);
    }

    #[tokio::test]
    async fn missing_file_reports_io_error() {
        let rx = spawn_load(ImpulseSource::File("/definitely/not/here.wav".into()), 48_000, 32);
        assert!(matches!(rx.await.unwrap(), Err(ImpulseError::Io { .. })));
    }
}
