//! The take value type.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Where the backend stored a take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerFile {
    /// Bare file name, e.g. `t1.webm`.
    pub filename: String,
    /// Server-side reference passed back to the processing endpoints.
    pub path: String,
}

/// One recorded performance.
///
/// A freshly recorded take holds its encoded bytes and gains a
/// [`ServerFile`] once persisted.  A derived take (the result of pitch
/// processing) exists only on the backend and has no local bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Take {
    blob: Option<Arc<[u8]>>,
    mime_type: String,
    server: Option<ServerFile>,
}

impl Take {
    /// A take straight out of the capture session.
    pub fn recorded(blob: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            blob: Some(blob.into()),
            mime_type: mime_type.into(),
            server: None,
        }
    }

    /// A take produced by the backend.
    pub fn derived(server: ServerFile) -> Self {
        Self {
            blob: None,
            mime_type: mime_for_filename(&server.filename).to_string(),
            server: Some(server),
        }
    }

    /// Stamp the take with its server identity.
    pub fn with_server(mut self, server: ServerFile) -> Self {
        self.server = Some(server);
        self
    }

    pub fn blob(&self) -> Option<&[u8]> {
        self.blob.as_deref()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn server(&self) -> Option<&ServerFile> {
        self.server.as_ref()
    }

    /// The reference the processing endpoints expect, once persisted.
    pub fn server_path(&self) -> Option<&str> {
        self.server.as_ref().map(|s| s.path.as_str())
    }

    pub fn is_persisted(&self) -> bool {
        self.server.is_some()
    }

    /// File extension matching the take's MIME type.
    pub fn extension(&self) -> &'static str {
        extension_for_mime(&self.mime_type)
    }
}

/// File extension for an audio MIME type (parameters such as `;codecs=` ignored).
pub fn extension_for_mime(mime: &str) -> &'static str {
    let base = mime.split(';').next().unwrap_or("").trim();
    match base {
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/webm" => "webm",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/ogg" => "ogg",
        _ => "bin",
    }
}

/// Best-effort MIME type from a file name's extension.
pub fn mime_for_filename(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "wav" => "audio/wav",
        "webm" => "audio/webm",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        _ => "application/octet-stream",
    }
}
