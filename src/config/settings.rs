//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// BackendConfig
// ---------------------------------------------------------------------------

/// Connection settings for the persistence / processing backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL the `/save`, `/convert-audio`, `/process-pitch` and
    /// `/download` endpoints hang off.
    pub base_url: String,
    /// Per-request transport timeout in seconds.  `None` leaves timeouts to
    /// the OS; pitch processing on long takes can run for minutes.
    pub timeout_secs: Option<u64>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            timeout_secs: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Which signal the capture session records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    /// The microphone signal before the effects chain.
    Raw,
    /// The monitor mix at the end of the effects chain.
    Processed,
}

impl Default for RecordSource {
    fn default() -> Self {
        Self::Raw
    }
}

/// Settings for audio capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name. `None` means the system default.
    pub input_device: Option<String>,
    /// Signal tapped by the recorder.
    pub record_source: RecordSource,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            record_source: RecordSource::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// EffectsConfig
// ---------------------------------------------------------------------------

/// Fixed (non user-facing) stage settings plus the initial control values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsConfig {
    /// Initial input gain (linear).
    pub gain: f32,
    /// Initial low-shelf gain in dB.
    pub eq_low_db: f32,
    /// Initial high-shelf gain in dB.
    pub eq_high_db: f32,
    /// Initial reverb return level (linear).
    pub reverb_mix: f32,
    /// Initial delay time in milliseconds.
    pub delay_time_ms: f32,
    /// Initial delay return level (linear).
    pub delay_mix: f32,
    /// Initial compressor threshold in dB.
    pub comp_threshold_db: f32,
    /// Corner frequency of the low shelf in Hz.
    pub low_shelf_hz: f32,
    /// Corner frequency of the high shelf in Hz.
    pub high_shelf_hz: f32,
    /// Longest delay the delay line can hold, in seconds.
    pub max_delay_secs: f32,
    /// Compressor knee width in dB.
    pub comp_knee_db: f32,
    /// Compressor ratio (`n`:1).
    pub comp_ratio: f32,
    /// Compressor attack in milliseconds.
    pub comp_attack_ms: f32,
    /// Compressor release in milliseconds.
    pub comp_release_ms: f32,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            gain: 1.0,
            eq_low_db: 0.0,
            eq_high_db: 0.0,
            reverb_mix: 1.0,
            delay_time_ms: 0.0,
            delay_mix: 0.3,
            comp_threshold_db: -24.0,
            low_shelf_hz: 250.0,
            high_shelf_hz: 4_000.0,
            max_delay_secs: 1.0,
            comp_knee_db: 30.0,
            comp_ratio: 12.0,
            comp_attack_ms: 3.0,
            comp_release_ms: 250.0,
        }
    }
}

// ---------------------------------------------------------------------------
// ReverbConfig
// ---------------------------------------------------------------------------

/// Convolution reverb settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbConfig {
    /// Impulse response location: an absolute `http(s)://` URL, a local file
    /// path, or a path relative to [`BackendConfig::base_url`].
    pub impulse_response: String,
    /// FFT partition length in samples (also the reverb send latency).
    pub partition_size: usize,
}

impl Default for ReverbConfig {
    fn default() -> Self {
        Self {
            impulse_response: "static/irs/medium-studio.wav".into(),
            partition_size: 512,
        }
    }
}

// ---------------------------------------------------------------------------
// MonitorConfig
// ---------------------------------------------------------------------------

/// Live monitoring of the effects chain output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Play the graph output on the default output device.
    pub enabled: bool,
    /// Seconds of audio buffered between the graph and the output device.
    pub buffer_secs: f32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_secs: 0.25,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use take_studio::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Where exported artifacts are written.  `None` uses
    /// [`AppPaths::exports_dir`].
    pub exports_dir: Option<PathBuf>,
    /// Backend connection settings.
    pub backend: BackendConfig,
    /// Capture settings.
    pub audio: AudioConfig,
    /// Effects chain settings.
    pub effects: EffectsConfig,
    /// Convolution reverb settings.
    pub reverb: ReverbConfig,
    /// Monitoring settings.
    pub monitor: MonitorConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// so callers never need to special-case a missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Directory exported artifacts are downloaded into.
    pub fn exports_dir(&self) -> PathBuf {
        self.exports_dir
            .clone()
            .unwrap_or_else(|| AppPaths::new().exports_dir)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original.backend.base_url, loaded.backend.base_url);
        assert_eq!(original.backend.timeout_secs, loaded.backend.timeout_secs);
        assert_eq!(original.audio.record_source, loaded.audio.record_source);
        assert_eq!(original.effects.delay_mix, loaded.effects.delay_mix);
        assert_eq!(
            original.effects.comp_threshold_db,
            loaded.effects.comp_threshold_db
        );
        assert_eq!(
            original.reverb.impulse_response,
            loaded.reverb.impulse_response
        );
        assert_eq!(original.reverb.partition_size, loaded.reverb.partition_size);
        assert_eq!(original.monitor.enabled, loaded.monitor.enabled);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config.backend.base_url, "http://localhost:8080");
        assert!(config.exports_dir.is_none());
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.backend.timeout_secs, None);
        assert_eq!(cfg.audio.record_source, RecordSource::Raw);
        assert_eq!(cfg.effects.gain, 1.0);
        assert_eq!(cfg.effects.delay_mix, 0.3);
        assert_eq!(cfg.effects.comp_threshold_db, -24.0);
        assert_eq!(cfg.effects.max_delay_secs, 1.0);
        assert_eq!(cfg.reverb.impulse_response, "static/irs/medium-studio.wav");
        assert!(cfg.monitor.enabled);
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.backend.base_url = "http://studio.local:9000".into();
        cfg.backend.timeout_secs = Some(120);
        cfg.audio.record_source = RecordSource::Processed;
        cfg.effects.low_shelf_hz = 120.0;
        cfg.reverb.impulse_response = "/srv/irs/plate.wav".into();
        cfg.exports_dir = Some(PathBuf::from("/tmp/exports"));

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.backend.base_url, "http://studio.local:9000");
        assert_eq!(loaded.backend.timeout_secs, Some(120));
        assert_eq!(loaded.audio.record_source, RecordSource::Processed);
        assert_eq!(loaded.effects.low_shelf_hz, 120.0);
        assert_eq!(loaded.reverb.impulse_response, "/srv/irs/plate.wav");
        assert_eq!(loaded.exports_dir(), PathBuf::from("/tmp/exports"));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "[backend]\nbase_url = \"http://10.0.0.2:8080\"\n",
        )
        .expect("write");

        let loaded = AppConfig::load_from(&path).expect("load");
        assert_eq!(loaded.backend.base_url, "http://10.0.0.2:8080");
        assert_eq!(loaded.effects.delay_mix, 0.3);
        assert_eq!(loaded.reverb.partition_size, 512);
    }
}
