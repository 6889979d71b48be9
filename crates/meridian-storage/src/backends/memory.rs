//! In-memory storage backend.
//!
//! A `BTreeMap`-per-column-family engine for unit tests and ephemeral
//! indexes. Writes are staged inside the transaction and applied to the
//! shared tree on commit; readers see committed state only. There is no
//! cross-transaction snapshot isolation - a long-lived read transaction
//! observes commits that land while it is open - which matches the
//! read-committed visibility the vector engine is specified against.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use crate::engine::{StorageEngine, StorageError, StorageResult, Transaction};

use super::BufferedCursor;

type Tree = BTreeMap<Vec<u8>, Vec<u8>>;
type Tables = HashMap<String, Tree>;

/// In-memory storage engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryEngine {
    /// Create an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageEngine for MemoryEngine {
    type Transaction<'a>
        = MemoryTransaction
    where
        Self: 'a;

    fn begin_read(&self) -> StorageResult<MemoryTransaction> {
        Ok(MemoryTransaction { tables: Arc::clone(&self.tables), staged: None })
    }

    fn begin_write(&self) -> StorageResult<MemoryTransaction> {
        Ok(MemoryTransaction { tables: Arc::clone(&self.tables), staged: Some(HashMap::new()) })
    }
}

/// Staged mutations: `None` marks a delete.
type Staged = HashMap<String, BTreeMap<Vec<u8>, Option<Vec<u8>>>>;

/// A transaction over a [`MemoryEngine`].
#[derive(Debug)]
pub struct MemoryTransaction {
    tables: Arc<RwLock<Tables>>,
    staged: Option<Staged>,
}

impl Transaction for MemoryTransaction {
    type Cursor<'a>
        = BufferedCursor
    where
        Self: 'a;

    fn get(&self, cf: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        if let Some(staged) = &self.staged {
            if let Some(pending) = staged.get(cf).and_then(|tree| tree.get(key)) {
                return Ok(pending.clone());
            }
        }
        let tables = self.tables.read().map_err(|_| StorageError::Poisoned)?;
        Ok(tables.get(cf).and_then(|tree| tree.get(key)).cloned())
    }

    fn put(&mut self, cf: &str, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let staged = self.staged.as_mut().ok_or(StorageError::ReadOnly)?;
        staged.entry(cf.to_string()).or_default().insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, cf: &str, key: &[u8]) -> StorageResult<bool> {
        let existed = self.get(cf, key)?.is_some();
        let staged = self.staged.as_mut().ok_or(StorageError::ReadOnly)?;
        staged.entry(cf.to_string()).or_default().insert(key.to_vec(), None);
        Ok(existed)
    }

    fn range(&self, cf: &str, lower: &[u8], upper: &[u8]) -> StorageResult<BufferedCursor> {
        if lower >= upper {
            return Ok(BufferedCursor::empty());
        }
        let tables = self.tables.read().map_err(|_| StorageError::Poisoned)?;
        let mut window: BTreeMap<Vec<u8>, Option<Vec<u8>>> = tables
            .get(cf)
            .map(|tree| {
                tree.range::<[u8], _>((Bound::Included(lower), Bound::Excluded(upper)))
                    .map(|(k, v)| (k.clone(), Some(v.clone())))
                    .collect()
            })
            .unwrap_or_default();

        // overlay staged writes falling inside the window
        if let Some(staged) = self.staged.as_ref().and_then(|s| s.get(cf)) {
            for (key, pending) in
                staged.range::<[u8], _>((Bound::Included(lower), Bound::Excluded(upper)))
            {
                window.insert(key.clone(), pending.clone());
            }
        }

        let entries =
            window.into_iter().filter_map(|(k, v)| v.map(|value| (k, value))).collect::<Vec<_>>();
        Ok(BufferedCursor::new(entries))
    }

    fn commit(self) -> StorageResult<()> {
        let Some(staged) = self.staged else {
            return Ok(());
        };
        let mut tables = self.tables.write().map_err(|_| StorageError::Poisoned)?;
        for (cf, tree) in staged {
            let target = tables.entry(cf).or_default();
            for (key, pending) in tree {
                match pending {
                    Some(value) => {
                        target.insert(key, value);
                    }
                    None => {
                        target.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    fn rollback(self) -> StorageResult<()> {
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.staged.is_none()
    }
}
