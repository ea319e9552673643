//! Error types for tunewatch-poller
//!
//! Module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for the poller service
#[derive(Error, Debug)]
pub enum Error {
    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Errors surfaced by the shared store layer
    #[error(transparent)]
    Store(#[from] tunewatch_common::Error),

    /// Platform fetch failure (typed; see FetchError for the taxonomy)
    #[error("Fetch error: {0}")]
    Fetch(#[from] crate::fetch::FetchError),

    /// Notification delivery failure
    #[error("Delivery error: {0}")]
    Delivery(#[from] crate::notify::DeliveryError),

    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using the poller Error
pub type Result<T> = std::result::Result<T, Error>;
