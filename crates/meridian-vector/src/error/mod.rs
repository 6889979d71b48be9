//! Error types for the vector engine.

use meridian_storage::StorageError;
use thiserror::Error;

/// Errors that can occur in vector engine operations.
///
/// `CorruptData`, `OutOfRange`, `Interrupted`, `Query`, and `Internal`
/// terminate the query that raised them. `Unsupported` is recoverable at
/// the dispatch layer, which falls back to an alternative entry point of
/// the index variant. Diagnostics name the index id and, where one is in
/// scope, the list id.
#[derive(Debug, Error)]
pub enum VectorError {
    /// Binary decode failure at any layer: row image, typed array,
    /// entry key, entry value, or centroid blob.
    #[error("corrupt data: {0}")]
    CorruptData(String),

    /// The index variant does not implement the requested entry point.
    #[error("unsupported by this index variant: {0}")]
    Unsupported(&'static str),

    /// Dimension mismatch or identifier outside its valid range.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// The query's cancellation flag was set.
    #[error("query interrupted")]
    Interrupted,

    /// A pushed-down predicate failed to evaluate.
    #[error("predicate evaluation failed: {0}")]
    Query(String),

    /// Invariant violation inside the engine.
    #[error("internal error: {0}")]
    Internal(String),

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result alias for vector engine operations.
pub type VectorResult<T> = Result<T, VectorError>;
