use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the installer backend.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(
        "Download failed for {url}: HTTP {status} ({}){}",
        .content_type.as_deref().unwrap_or("unknown content type"),
        .body.as_deref().map(|b| format!(": {b}")).unwrap_or_default()
    )]
    DownloadFailed {
        url: String,
        status: u16,
        content_type: Option<String>,
        body: Option<String>,
    },

    // ── Integrity ───────────────────────────────────────
    #[error(
        "Integrity check failed for {file} from {url}: expected hash {expected_hash:?}, got {actual_hash:?}; expected size {expected_size:?}, got {actual_size}"
    )]
    IntegrityMismatch {
        file: String,
        url: String,
        expected_hash: Option<String>,
        actual_hash: Option<String>,
        expected_size: Option<u64>,
        actual_size: u64,
    },

    // ── Maven ───────────────────────────────────────────
    #[error("Invalid Maven coordinate: {0}")]
    InvalidMavenCoordinate(String),

    // ── Documents ───────────────────────────────────────
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Resolution error: {0}")]
    Resolution(String),

    // ── Archive ─────────────────────────────────────────
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Loader ──────────────────────────────────────────
    #[error("Loader error: {0}")]
    Loader(String),

    #[error("Processor failed: {0}")]
    Processor(String),

    // ── Mods ────────────────────────────────────────────
    #[error("{name} must be downloaded manually from {url}")]
    ManualDownloadRequired { name: String, url: String },

    #[error("Known malicious content ({signature}) found in {path:?}")]
    MaliciousContent { path: PathBuf, signature: String },

    // ── Instance ────────────────────────────────────────
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Install cancelled")]
    Cancelled,

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl LauncherError {
    /// Wraps an IO error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LauncherError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, LauncherError::Cancelled)
    }
}

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl From<tokio::task::JoinError> for LauncherError {
    fn from(err: tokio::task::JoinError) -> Self {
        LauncherError::Other(format!("Background task failed: {}", err))
    }
}
