//! Error types for the circulation engine

use thiserror::Error;

/// Result type for circulation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Circulation errors
#[derive(Error, Debug)]
pub enum Error {
    /// Referenced book, member, record, or reservation is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate pending reservation or other unique-key violation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation is not legal for the entity's current status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// No copies available at approval time
    #[error("Out of stock: {0}")]
    OutOfStock(String),

    /// Actor is not the owner of the resource
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Reservation is past its expiration window
    #[error("Expired: {0}")]
    Expired(String),

    /// Per-book serialization could not complete in time
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Malformed capacity adjustment or other bad argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Storage collaborator failure (surfaced unmodified)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Storage(msg)
    }
}
