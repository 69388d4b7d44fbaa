//! Error types shared across obswell crates

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised while loading shared configuration
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid credentials file {path}: {source}")]
    Credentials {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("invalid connection url: {0}")]
    Url(#[from] url::ParseError),
}
