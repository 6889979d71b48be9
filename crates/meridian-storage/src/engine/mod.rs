//! Storage engine traits and error type.

mod traits;

pub use traits::{Cursor, CursorResult, KeyValue, StorageEngine, Transaction};

use thiserror::Error;

/// Errors surfaced by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Write attempted through a read-only transaction.
    #[error("write on read-only transaction")]
    ReadOnly,

    /// Transaction could not be started, committed, or rolled back.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Backend-specific failure.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A lock guarding shared state was poisoned by a panic elsewhere.
    #[error("storage lock poisoned")]
    Poisoned,
}

impl StorageError {
    /// Wrap any displayable backend error.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
