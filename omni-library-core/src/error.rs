//! Error types shared by the walkers, the sink and the orchestrator.
//!
//! Only configuration errors and an unavailable sink abort a run. Everything
//! that goes wrong with a single file or subtree is logged and counted in the
//! walk report instead of surfacing here.

use std::path::PathBuf;

/// Failure while appending a record to the output.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The output file cannot be opened or written at all (missing
    /// directory, permission denied, disk full). Fatal to the run.
    #[error("output sink {path:?} is unavailable: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single write failed; the record is lost but the run continues.
    #[error("failed to write record to {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl SinkError {
    /// Whether the error means no further record can be written.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SinkError::Unavailable { .. })
    }

    pub(crate) fn from_write(path: PathBuf, source: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match source.kind() {
            ErrorKind::PermissionDenied | ErrorKind::StorageFull | ErrorKind::NotFound => {
                SinkError::Unavailable { path, source }
            }
            _ => SinkError::Write { path, source },
        }
    }
}

/// Errors that abort an extraction run.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("extraction cancelled")]
    Cancelled,
}

impl ExtractError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExtractError::Io {
            path: path.into(),
            source,
        }
    }
}
