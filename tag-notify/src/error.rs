//! Crate error types.

use thiserror::Error;

/// Errors raised while loading settings or talking to the broker.
#[derive(Debug, Error)]
pub enum Error {
    /// A required environment variable is missing or empty.
    #[error("missing required environment variable: {0}")]
    MissingEnv(&'static str),

    /// A broker call failed.
    #[error("{0}")]
    Broker(String),

    /// JSON encode/decode error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
