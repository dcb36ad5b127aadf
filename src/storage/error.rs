//! Storage error types
//!
//! Defines all errors that can occur in the storage layer.

use thiserror::Error;

/// Errors that can occur in the bookmark store
#[derive(Error, Debug)]
pub enum StorageError {
    /// SQLite returned an error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O operation failed (creating the data directory, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be decoded (bad UUID, bad timestamp)
    #[error("Corrupt row: {0}")]
    Corruption(String),

    /// Input rejected before touching the database
    #[error("Invalid bookmark: {0}")]
    Validation(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),

    /// The blocking task running the query was cancelled or panicked
    #[error("Task error: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::Task(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
