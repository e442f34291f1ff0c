//! Error types for the picsync system
//!
//! This module defines all error types used throughout the crate.
//!
//! Note that the engine and the picker never hand these errors to their
//! callers: a failed walk step or a failed pick is logged and degrades to
//! "nothing indexed" / "no image available". The types below are what the
//! catalog stores and the configuration layer return.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for picsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the picsync system
#[derive(Error, Debug)]
pub enum Error {
    /// Catalog store errors (lookup, insert, persistence)
    #[error("Catalog store error: {0}")]
    CatalogStore(String),

    /// The persisted catalog could not be parsed
    #[error("Corrupt catalog: {0}")]
    CorruptCatalog(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Image decoding/encoding errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// A caller-side wait gave up
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a catalog store error
    pub fn catalog_store(msg: impl Into<String>) -> Self {
        Self::CatalogStore(msg.into())
    }

    /// Create a corrupt catalog error
    pub fn corrupt_catalog(msg: impl Into<String>) -> Self {
        Self::CorruptCatalog(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether this error means the persisted catalog is unreadable
    /// and a backup should be tried
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::CorruptCatalog(_) | Self::Json(_))
    }
}

/// Helper for converting blocking-task join failures to our Error type
impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::other(format!("Background task failed: {}", err))
    }
}
