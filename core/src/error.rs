use std::path::PathBuf;
use thiserror::Error;

/// Failures raised while building or reading an index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A corpus or index path is missing or unreadable.
    #[error("cannot read {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted line could not be decoded.
    #[error("malformed {context} line: {reason}")]
    Format { context: &'static str, reason: String },

    /// The index directory exists but was never marked complete.
    #[error("index at {path} is incomplete (no manifest)")]
    Incomplete { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl IndexError {
    pub(crate) fn input(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexError::Input { path: path.into(), source }
    }

    pub(crate) fn format(context: &'static str, reason: impl Into<String>) -> Self {
        IndexError::Format { context, reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
