//! Error types for lumo-pt
//!
//! Defines service-specific error types using thiserror for clear error
//! propagation.

use thiserror::Error;

/// Main error type for the lumo-pt service
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Content identifier that cannot resolve to a playable video
    #[error("Invalid video identifier: {0}")]
    InvalidSourceRef(String),

    /// Tracking session errors (no session, bad transition)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Curriculum or content item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<lumo_common::Error> for Error {
    fn from(e: lumo_common::Error) -> Self {
        match e {
            lumo_common::Error::Database(e) => Error::Database(e),
            lumo_common::Error::Io(e) => Error::Io(e),
            lumo_common::Error::Config(msg) => Error::Config(msg),
            lumo_common::Error::NotFound(msg) => Error::NotFound(msg),
            lumo_common::Error::InvalidInput(msg) => Error::BadRequest(msg),
            lumo_common::Error::Internal(msg) => Error::Internal(msg),
        }
    }
}

/// Convenience Result type using lumo-pt Error
pub type Result<T> = std::result::Result<T, Error>;
