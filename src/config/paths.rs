//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\take-studio\
//!   macOS:   ~/Library/Application Support/take-studio/
//!   Linux:   ~/.config/take-studio/
//!
//! Exports dir (downloaded artifacts):
//!   `<audio dir>/take-studio/` where the platform has one (e.g. ~/Music),
//!   otherwise `<local data dir>/take-studio/exports/`.

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory exported takes are downloaded into.
    pub exports_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "take-studio";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let exports_dir = match dirs::audio_dir() {
            Some(audio) => audio.join(Self::APP_NAME),
            None => dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(Self::APP_NAME)
                .join("exports"),
        };

        let settings_file = config_dir.join("settings.toml");

        Self {
            config_dir,
            settings_file,
            exports_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
