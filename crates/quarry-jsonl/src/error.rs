//! Error types for quarry-jsonl operations.

use std::io;
use thiserror::Error;

/// The error type for quarry-jsonl operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error occurred while reading or writing.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A value could not be serialized to JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A line could not be parsed into the requested type.
    #[error("line {line_number}: {source}")]
    Parse {
        /// 1-based line number of the offending line.
        line_number: usize,
        /// The underlying parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// A line is not valid UTF-8.
    #[error("line {line_number}: {source}")]
    Encoding {
        /// 1-based line number of the offending line.
        line_number: usize,
        /// The underlying decode failure.
        #[source]
        source: std::str::Utf8Error,
    },
}

/// A specialized Result type for quarry-jsonl operations.
pub type Result<T> = std::result::Result<T, Error>;
