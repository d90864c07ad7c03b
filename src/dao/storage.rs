use std::{io, path::PathBuf};

use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by the on-disk persistence layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed state file {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode state: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("persistence vetoed: plugins in error status ({})", .0.join(", "))]
    Vetoed(Vec<String>),
    #[error("invalid artifact key `{0}`")]
    InvalidKey(String),
}

impl StorageError {
    /// Wrap an I/O failure together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}
