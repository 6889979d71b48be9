//! Redb storage backend.
//!
//! Persistent backend on `redb`, a pure-Rust embedded database with ACID
//! transactions. Each column family maps to one redb table keyed and
//! valued by raw byte strings.
//!
//! # Example
//!
//! ```ignore
//! use meridian_storage::backends::RedbEngine;
//! use meridian_storage::{StorageEngine, Transaction};
//!
//! let engine = RedbEngine::open("meridian.redb")?;
//!
//! let mut tx = engine.begin_write()?;
//! tx.put("vectors", b"key", b"value")?;
//! tx.commit()?;
//! ```
//!
//! For tests, [`RedbEngine::in_memory`] backs the database with volatile
//! memory instead of a file.

use std::ops::Bound;
use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition, TableError};

use crate::engine::{KeyValue, StorageEngine, StorageError, StorageResult, Transaction};

use super::BufferedCursor;

fn table_def(name: &str) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
    TableDefinition::new(name)
}

/// Storage engine backed by a redb database.
#[derive(Debug)]
pub struct RedbEngine {
    db: Database,
}

impl RedbEngine {
    /// Open (or create) a database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path).map_err(StorageError::backend)?;
        Ok(Self { db })
    }

    /// Create a volatile in-memory database, for tests.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if the database cannot be created.
    pub fn in_memory() -> StorageResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db =
            Database::builder().create_with_backend(backend).map_err(StorageError::backend)?;
        Ok(Self { db })
    }
}

impl StorageEngine for RedbEngine {
    type Transaction<'a>
        = RedbTransaction
    where
        Self: 'a;

    fn begin_read(&self) -> StorageResult<RedbTransaction> {
        let tx = self
            .db
            .begin_read()
            .map_err(|e| StorageError::Transaction(e.to_string()))?;
        Ok(RedbTransaction::Read(tx))
    }

    fn begin_write(&self) -> StorageResult<RedbTransaction> {
        let tx = self
            .db
            .begin_write()
            .map_err(|e| StorageError::Transaction(e.to_string()))?;
        Ok(RedbTransaction::Write(tx))
    }
}

/// A transaction over a [`RedbEngine`].
pub enum RedbTransaction {
    /// Read-only snapshot.
    Read(redb::ReadTransaction),
    /// Read-write transaction.
    Write(redb::WriteTransaction),
}

impl RedbTransaction {
    fn scan(
        &self,
        cf: &str,
        lower: &[u8],
        upper: &[u8],
    ) -> StorageResult<Vec<KeyValue>> {
        if lower >= upper {
            return Ok(Vec::new());
        }
        let bounds = (Bound::Included(lower), Bound::Excluded(upper));
        let mut entries = Vec::new();
        match self {
            Self::Read(tx) => match tx.open_table(table_def(cf)) {
                Ok(table) => {
                    for item in table.range::<&[u8]>(bounds).map_err(StorageError::backend)? {
                        let (key, value) = item.map_err(StorageError::backend)?;
                        entries.push((key.value().to_vec(), value.value().to_vec()));
                    }
                }
                Err(TableError::TableDoesNotExist(_)) => {}
                Err(e) => return Err(StorageError::backend(e)),
            },
            Self::Write(tx) => {
                let table = tx.open_table(table_def(cf)).map_err(StorageError::backend)?;
                for item in table.range::<&[u8]>(bounds).map_err(StorageError::backend)? {
                    let (key, value) = item.map_err(StorageError::backend)?;
                    entries.push((key.value().to_vec(), value.value().to_vec()));
                }
            }
        }
        Ok(entries)
    }
}

impl Transaction for RedbTransaction {
    type Cursor<'a>
        = BufferedCursor
    where
        Self: 'a;

    fn get(&self, cf: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        match self {
            Self::Read(tx) => match tx.open_table(table_def(cf)) {
                Ok(table) => Ok(table
                    .get(key)
                    .map_err(StorageError::backend)?
                    .map(|guard| guard.value().to_vec())),
                Err(TableError::TableDoesNotExist(_)) => Ok(None),
                Err(e) => Err(StorageError::backend(e)),
            },
            Self::Write(tx) => {
                let table = tx.open_table(table_def(cf)).map_err(StorageError::backend)?;
                let result = table.get(key).map_err(StorageError::backend)?.map(|guard| guard.value().to_vec());
                Ok(result)
            }
        }
    }

    fn put(&mut self, cf: &str, key: &[u8], value: &[u8]) -> StorageResult<()> {
        match self {
            Self::Read(_) => Err(StorageError::ReadOnly),
            Self::Write(tx) => {
                let mut table = tx.open_table(table_def(cf)).map_err(StorageError::backend)?;
                table.insert(key, value).map_err(StorageError::backend)?;
                Ok(())
            }
        }
    }

    fn delete(&mut self, cf: &str, key: &[u8]) -> StorageResult<bool> {
        match self {
            Self::Read(_) => Err(StorageError::ReadOnly),
            Self::Write(tx) => {
                let mut table = tx.open_table(table_def(cf)).map_err(StorageError::backend)?;
                let removed = table.remove(key).map_err(StorageError::backend)?;
                Ok(removed.is_some())
            }
        }
    }

    fn range(&self, cf: &str, lower: &[u8], upper: &[u8]) -> StorageResult<BufferedCursor> {
        Ok(BufferedCursor::new(self.scan(cf, lower, upper)?))
    }

    fn commit(self) -> StorageResult<()> {
        match self {
            Self::Read(_) => Ok(()),
            Self::Write(tx) => tx.commit().map_err(|e| StorageError::Transaction(e.to_string())),
        }
    }

    fn rollback(self) -> StorageResult<()> {
        match self {
            Self::Read(_) => Ok(()),
            Self::Write(tx) => tx.abort().map_err(|e| StorageError::Transaction(e.to_string())),
        }
    }

    fn is_read_only(&self) -> bool {
        matches!(self, Self::Read(_))
    }
}
