//! Error types for pagebeacon-core

use thiserror::Error;

/// Main error type for the pagebeacon-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Delivery to the collection endpoint failed
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Cookie or key/value storage failure
    #[error("storage error: {0}")]
    Storage(String),
}

/// Failure to deliver one report.
///
/// Reports are best-effort: the tracker logs these and drops them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request never reached the server
    #[error("request failed: {0}")]
    Request(String),

    /// The response body could not be read
    #[error("failed to read response body: {0}")]
    Body(String),

    /// The request body could not be serialized
    #[error("failed to encode request: {0}")]
    Encode(String),
}

/// Result type alias for pagebeacon-core
pub type Result<T> = std::result::Result<T, Error>;
