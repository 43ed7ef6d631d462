//! Error types shared by the package and image engines.

use thiserror::Error;

/// Errors raised while acquiring packages or images.
#[derive(Error, Debug)]
pub enum PullError {
    /// Nothing satisfies the request: no matching version, unknown dist-tag,
    /// or a repository without tags.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported manifest media type: {0}")]
    UnsupportedMediaType(String),

    #[error("{url} returned HTTP {code}")]
    Status { url: String, code: u16 },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("invalid version range '{range}': {message}")]
    InvalidRange { range: String, message: String },

    #[error("invalid image reference '{0}'")]
    InvalidReference(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no platform selected for {0}")]
    NoPlatformSelected(String),

    #[error("malformed registry response from {url}: {message}")]
    Json { url: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PullError {
    /// True for the not-found class, which callers report as a warning.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PullError::NotFound(_))
    }
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, PullError>;
