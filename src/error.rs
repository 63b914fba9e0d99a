use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure writing the document to its backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Why an import was rejected. The current document is left untouched.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to parse file: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("invalid data format: {0}")]
    InvalidShape(&'static str),
    #[error("error reading file: {0}")]
    Read(String),
}
