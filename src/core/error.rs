use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the installer engine.
/// Every module returns `Result<T, InstallerError>`.
#[derive(Debug, Error)]
pub enum InstallerError {
    // ── Resolution ──────────────────────────────────────
    #[error("Manifest unavailable from {url}: {reason}")]
    ManifestUnavailable { url: String, reason: String },

    #[error("Manifest malformed: {0}")]
    ManifestMalformed(String),

    #[error("No loader version compatible with runtime {runtime}{}", requested_suffix(.requested))]
    NoCompatibleVersion {
        runtime: String,
        requested: Option<String>,
    },

    // ── Download ────────────────────────────────────────
    #[error("Download failed for {artifact}: {reason}")]
    DownloadFailed { artifact: String, reason: String },

    #[error("Integrity violation for {artifact} from {url}: expected {expected}, got {actual}")]
    IntegrityViolation {
        artifact: String,
        url: String,
        expected: String,
        actual: String,
    },

    #[error("Install plan exceeded its time budget of {0}s")]
    PlanTimedOut(u64),

    // ── Commit ──────────────────────────────────────────
    #[error(
        "Installation incomplete ({reason}): {} committed, {} failed",
        .committed.len(),
        .failed.len()
    )]
    InstallationIncomplete {
        committed: Vec<PathBuf>,
        failed: Vec<PathBuf>,
        reason: String,
    },

    // ── Bootstrap ───────────────────────────────────────
    #[error("Launch descriptor at {path:?} is unusable: {reason}")]
    BootstrapInconsistent { path: PathBuf, reason: String },

    #[error("Failed to start loader: {0}")]
    Launch(String),

    // ── Control ─────────────────────────────────────────
    #[error("Installation cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Jar read error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

fn requested_suffix(requested: &Option<String>) -> String {
    match requested {
        Some(v) => format!(" (requested loader {v})"),
        None => String::new(),
    }
}

/// Convenience alias used throughout the crate.
pub type InstallerResult<T> = Result<T, InstallerError>;

impl InstallerError {
    /// Attach the failing path to an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        InstallerError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether re-running the same request may succeed without user action.
    ///
    /// Schema problems, missing versions and integrity violations are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InstallerError::ManifestUnavailable { .. }
                | InstallerError::DownloadFailed { .. }
                | InstallerError::PlanTimedOut(_)
                | InstallerError::InstallationIncomplete { .. }
                | InstallerError::BootstrapInconsistent { .. }
                | InstallerError::Http(_)
        )
    }
}

impl From<std::io::Error> for InstallerError {
    fn from(source: std::io::Error) -> Self {
        InstallerError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

// Front-ends receive errors as plain strings.
impl serde::Serialize for InstallerError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
