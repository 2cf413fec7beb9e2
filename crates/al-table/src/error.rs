//! Error types for table and manifest persistence.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while writing the table or its manifest.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize JSON at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("row has {actual} samples per channel, table expects {expected}")]
    QuotaMismatch { expected: usize, actual: usize },

    #[error("could not find a free table file name in {dir}")]
    NameExhausted { dir: PathBuf },
}
