//! Meridian storage
//!
//! Ordered key-value storage abstraction for the meridian vector engine.
//!
//! # Overview
//!
//! The engine above this crate only ever needs four things from its store:
//! point reads, point writes through a transaction, forward range scans
//! over a half-open key interval, and lexicographic key order. This crate
//! pins those down as a small trait family that backends implement:
//!
//! - [`StorageEngine`] - opens read and write transactions
//! - [`Transaction`] - get/put/delete plus bounded range scans
//! - [`Cursor`] - forward-only iteration over a scanned range
//!
//! Keys within a column family sort as raw bytes; scan order is the sort
//! order. There is deliberately no backward iteration - nothing in the
//! engine walks a region in reverse.
//!
//! # Backends
//!
//! - [`backends::RedbEngine`] - persistent storage on `redb`
//! - [`backends::MemoryEngine`] - `BTreeMap`-based store for tests and
//!   ephemeral use
//!
//! # Example
//!
//! ```ignore
//! use meridian_storage::{StorageEngine, Transaction};
//! use meridian_storage::backends::MemoryEngine;
//!
//! let engine = MemoryEngine::new();
//!
//! let mut tx = engine.begin_write()?;
//! tx.put("vectors", b"\x00\x00\x00\x01k1", b"v1")?;
//! tx.commit()?;
//!
//! let tx = engine.begin_read()?;
//! assert!(tx.get("vectors", b"\x00\x00\x00\x01k1")?.is_some());
//! ```

pub mod backends;
pub mod engine;

pub use engine::{
    Cursor, CursorResult, KeyValue, StorageEngine, StorageError, StorageResult, Transaction,
};
