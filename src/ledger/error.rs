//! Error types for the ledger.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading or writing durable migration state.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Filesystem access failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A ledger file exists but does not hold the expected JSON.
    #[error("Malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A file detail references an album that is not in the album index.
    /// Enumeration produced inconsistent output; this is not recoverable.
    #[error("File detail {file} references album {album_id}, which is not in the album index")]
    UnknownAlbum { album_id: String, file: PathBuf },

    /// Another process holds the ledger lock.
    #[error("Another youai-immich instance is using {0}")]
    Locked(PathBuf),
}

impl LedgerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}
