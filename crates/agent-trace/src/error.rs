use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TraceError>;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "watcher")]
    #[error("file watcher unavailable: {0}")]
    Watcher(#[from] notify::Error),

    #[error("watch root not found: {0}")]
    RootNotFound(PathBuf),
}

