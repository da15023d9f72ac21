//! Error types for the offline cache.

use thiserror::Error;

/// Errors surfaced to the caller of an intercepted or install-time fetch.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The request could not be completed at all (DNS, connect, I/O, ...).
    #[error("network error for {url}: {reason}")]
    Network { url: String, reason: String },

    /// A manifest asset answered with something other than 200.
    #[error("{url} returned status {status}")]
    BadStatus { url: String, status: u16 },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported method {method} for {url}")]
    UnsupportedMethod { method: String, url: String },

    #[error("cache storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors from the bucket store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode bucket {bucket}: {reason}")]
    Encode { bucket: String, reason: String },

    #[error("failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },
}
