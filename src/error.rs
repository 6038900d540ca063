//! Error types for `$ref` dereferencing.

use std::path::PathBuf;
use thiserror::Error;

/// Errors during dereferencing.
#[derive(Debug, Error)]
pub enum DerefError {
    /// One or more reference cycles were found. The whole call fails even if
    /// unrelated refs elsewhere in the document resolved cleanly.
    #[error("circular references found: {}", refs.join(", "))]
    CircularReference { refs: Vec<String> },

    /// A ref could not be resolved by any loader and `fail_on_missing` is set.
    #[error("missing $ref: {reference}")]
    MissingReference { reference: String },

    // IO errors from the built-in file loader
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {origin}: {source}")]
    InvalidJson {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// An external loader claimed the ref but failed to produce a value.
    #[error("loader failed for {reference}: {message}")]
    LoaderFailed { reference: String, message: String },
}

impl DerefError {
    /// True for errors caused by I/O against a file or network target,
    /// as opposed to a structural problem with the document itself.
    pub fn is_io(&self) -> bool {
        match self {
            DerefError::FileNotFound { .. } | DerefError::ReadError { .. } => true,
            #[cfg(feature = "remote")]
            DerefError::NetworkError { .. } => true,
            _ => false,
        }
    }
}
