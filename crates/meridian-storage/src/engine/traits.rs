//! Core storage traits.
//!
//! A [`StorageEngine`] hands out transactions; a [`Transaction`] reads and
//! writes named column families and opens bounded forward scans; a
//! [`Cursor`] walks one scan. All keys and values are raw byte strings and
//! keys sort lexicographically.

use std::sync::Arc;

use super::StorageError;

/// A key-value pair yielded by a cursor.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// Result of advancing a cursor: the next pair, or `None` at the end.
pub type CursorResult = Result<Option<KeyValue>, StorageError>;

/// A storage engine providing transactional access to column families.
///
/// Implementations must be thread-safe; read transactions from different
/// threads may run concurrently. Write visibility across transactions is
/// whatever the backend's snapshot model provides.
pub trait StorageEngine: Send + Sync {
    /// The transaction type for this engine.
    type Transaction<'a>: Transaction
    where
        Self: 'a;

    /// Begin a read-only transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transaction`] if the transaction cannot be
    /// started.
    fn begin_read(&self) -> Result<Self::Transaction<'_>, StorageError>;

    /// Begin a read-write transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transaction`] if the transaction cannot be
    /// started.
    fn begin_write(&self) -> Result<Self::Transaction<'_>, StorageError>;

    /// Flush buffered data to durable storage.
    ///
    /// Most backends make data durable on commit; the default is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the flush fails.
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// A transaction over one or more column families.
///
/// Write transactions must be committed explicitly; dropping one discards
/// its changes.
pub trait Transaction {
    /// The cursor type produced by [`Transaction::range`].
    type Cursor<'a>: Cursor
    where
        Self: 'a;

    /// Look up a key in a column family.
    ///
    /// Returns `Ok(None)` when the key (or the whole column family) does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Insert or overwrite a key in a column family.
    ///
    /// Creates the column family on first write.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadOnly`] on a read-only transaction.
    fn put(&mut self, cf: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Delete a key from a column family.
    ///
    /// Returns `Ok(true)` if the key existed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadOnly`] on a read-only transaction.
    fn delete(&mut self, cf: &str, key: &[u8]) -> Result<bool, StorageError>;

    /// Open a forward cursor over the half-open interval `[lower, upper)`
    /// of a column family.
    ///
    /// The cursor starts positioned before the first matching pair; the
    /// first [`Cursor::next`] yields it. A missing column family scans as
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend scan cannot be opened.
    fn range(&self, cf: &str, lower: &[u8], upper: &[u8])
        -> Result<Self::Cursor<'_>, StorageError>;

    /// Commit the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transaction`] if the commit fails.
    fn commit(self) -> Result<(), StorageError>;

    /// Roll the transaction back, discarding staged changes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transaction`] if the rollback fails.
    fn rollback(self) -> Result<(), StorageError>;

    /// Whether this transaction rejects writes.
    fn is_read_only(&self) -> bool;
}

/// Forward-only iteration over a scanned key range.
pub trait Cursor {
    /// Advance to the next pair in key order.
    ///
    /// Returns `Ok(None)` once the range is exhausted; further calls keep
    /// returning `Ok(None)`.
    fn next(&mut self) -> CursorResult;

    /// The pair the cursor is positioned on, if any.
    ///
    /// `None` before the first [`Cursor::next`] and after exhaustion.
    fn current(&self) -> Option<(&[u8], &[u8])>;
}

/// Shared ownership of an engine is itself an engine.
impl<E: StorageEngine> StorageEngine for Arc<E> {
    type Transaction<'a>
        = E::Transaction<'a>
    where
        Self: 'a;

    fn begin_read(&self) -> Result<Self::Transaction<'_>, StorageError> {
        (**self).begin_read()
    }

    fn begin_write(&self) -> Result<Self::Transaction<'_>, StorageError> {
        (**self).begin_write()
    }

    fn flush(&self) -> Result<(), StorageError> {
        (**self).flush()
    }
}
