//! `StudioBackend` trait and the `HttpBackend` implementation.
//!
//! `HttpBackend` talks to the recording server: `/save` for persistence,
//! `/convert-audio` and `/process-pitch` for processing, `/download` to
//! fetch results.  The base URL and optional timeout come from
//! [`BackendConfig`].

use async_trait::async_trait;
use thiserror::Error;

use crate::config::BackendConfig;
use crate::take::ServerFile;

use super::request::{ProcessResponse, ProcessingRequest, SaveResponse};

// ---------------------------------------------------------------------------
// BackendError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum BackendError {
    /// Connection-level failure reaching the server.
    #[error("request failed: {0}")]
    Transport(String),

    /// The configured transport timeout elapsed.
    #[error("request timed out")]
    Timeout,

    /// The server answered with a non-success status.
    #[error("{0}")]
    Rejected(String),

    /// The server answered with something other than the expected body.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Non-2xx HTTP status without a readable error body.
    #[error("server returned HTTP {0}")]
    HttpStatus(u16),
}

impl BackendError {
    /// Whether the failure happened before the server could answer.
    pub fn is_transport(&self) -> bool {
        matches!(self, BackendError::Transport(_) | BackendError::Timeout)
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout
        } else if e.is_decode() {
            BackendError::Malformed(e.to_string())
        } else {
            BackendError::Transport(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// StudioBackend trait
// ---------------------------------------------------------------------------

/// Persistence and processing server.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn StudioBackend>` between the controller and spawned requests.
#[async_trait]
pub trait StudioBackend: Send + Sync {
    /// Store a take; returns where the server put it.
    async fn save(&self, blob: &[u8], mime_type: &str) -> Result<ServerFile, BackendError>;

    /// Run one processing operation; returns the produced file.
    async fn process(&self, request: &ProcessingRequest) -> Result<ServerFile, BackendError>;

    /// Fetch a server file's bytes.
    async fn download(&self, file: &str) -> Result<Vec<u8>, BackendError>;
}

// ---------------------------------------------------------------------------
// HttpBackend
// ---------------------------------------------------------------------------

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Build a backend client from application config.
    ///
    /// Without `timeout_secs` no transport timeout is set.  A default client
    /// is used if the builder fails.
    pub fn from_config(config: &BackendConfig) -> Self {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(std::time::Duration::from_secs(secs));
        }
        let client = builder.build().unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Read a JSON body, falling back to the HTTP status when the body is
    /// not JSON.
    async fn json_body<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BackendError> {
        let status = response.status();
        let text = response.text().await?;
        match serde_json::from_str::<T>(&text) {
            Ok(body) => Ok(body),
            Err(_) if !status.is_success() => Err(BackendError::HttpStatus(status.as_u16())),
            Err(e) => Err(BackendError::Malformed(e.to_string())),
        }
    }
}

#[async_trait]
impl StudioBackend for HttpBackend {
    async fn save(&self, blob: &[u8], mime_type: &str) -> Result<ServerFile, BackendError> {
        let ext = crate::take::extension_for_mime(mime_type);
        let part = reqwest::multipart::Part::bytes(blob.to_vec())
            .file_name(format!("take.{ext}"))
            .mime_str(mime_type)?;
        let form = reqwest::multipart::Form::new().part("audio", part);

        log::debug!("POST /save ({} bytes, {mime_type})", blob.len());
        let response = self.client.post(self.url("/save")).multipart(form).send().await?;
        let body: SaveResponse = Self::json_body(response).await?;
        body.into_server_file()
    }

    async fn process(&self, request: &ProcessingRequest) -> Result<ServerFile, BackendError> {
        log::debug!("POST {} for {}", request.endpoint(), request.file);
        let response = self
            .client
            .post(self.url(request.endpoint()))
            .json(&request.payload())
            .send()
            .await?;
        let body: ProcessResponse = Self::json_body(response).await?;
        body.into_server_file()
    }

    async fn download(&self, file: &str) -> Result<Vec<u8>, BackendError> {
        let response = self
            .client
            .get(self.url("/download"))
            .query(&[("file", file)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::HttpStatus(status.as_u16()));
        }

        // A missing file redirects to the index page.
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("text/html"))
            .unwrap_or(false);
        if is_html {
            return Err(BackendError::Rejected(format!("file not available: {file}")));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
