//! Error types for the STAC archive.

use thiserror::Error;

/// Errors produced while searching the catalog or fetching assets.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status} fetching {url}")]
    Status { status: u16, url: String },

    #[error("asset signing failed: {0}")]
    Signing(String),

    #[error("invalid STAC response: {0}")]
    InvalidResponse(String),

    #[error("item {item} has no asset for band {band}")]
    MissingAsset { item: String, band: String },

    #[error("unknown archive id '{0}'")]
    UnknownArchive(String),

    #[error("core error: {0}")]
    Core(#[from] covermap_core::Error),
}

impl CloudError {
    /// Client errors (4xx) will not go away on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            CloudError::Status { status, .. } => !(400..500).contains(status),
            CloudError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            CloudError::Network(_) => true,
            _ => false,
        }
    }
}

impl From<CloudError> for covermap_core::Error {
    fn from(e: CloudError) -> Self {
        match e {
            CloudError::Core(inner) => inner,
            other => covermap_core::Error::ArchiveUnavailable(other.to_string()),
        }
    }
}

/// Result alias for cloud operations.
pub type Result<T> = std::result::Result<T, CloudError>;
