//! Meridian vector engine
//!
//! On-disk vector and hybrid geospatial k-nearest-neighbor search layered
//! on an ordered key-value store.
//!
//! # Overview
//!
//! Rows are written into a sorted store; vector entries live in inverted
//! lists keyed `be32(index_id) + be64(list_id) + pk_suffix`, so every
//! list is one contiguous key range. A query picks `nprobe` lists through
//! a coarse quantizer, streams their entries, scores candidates (raw
//! floats or PQ asymmetric distance), and keeps the top `k` in a bounded
//! heap. The LSM variant skips the quantizer entirely and decodes vectors
//! out of the row values on the fly, optionally blending great-circle
//! distance to a query coordinate into the score.
//!
//! # Modules
//!
//! - [`encoding`] - row-value, typed-array, entry-key, and WKB codecs
//! - [`store`] - inverted-list cursors, pushdown seams, entry writes
//! - [`quantization`] - pre-trained product quantizer and ADC tables
//! - [`index`] - the index variants ([`VectorIndex`]) and lifecycle
//! - [`search`] - bounded top-k heap and the per-query [`SearchSession`]
//! - [`spatial`] - MBR range scans sharing the key layout
//! - [`distance`] - scalar distance kernels
//!
//! # Example
//!
//! ```ignore
//! use meridian_storage::backends::MemoryEngine;
//! use meridian_storage::StorageEngine;
//! use meridian_vector::index::create_index;
//! use meridian_vector::store::put_entry;
//! use meridian_vector::types::{IndexConfig, IndexId, IndexType};
//!
//! let engine = MemoryEngine::new();
//! let config = IndexConfig::new(IndexType::Flat, 128);
//! let index = create_index(config, "vectors", IndexId::new(1), None, None)?;
//!
//! let mut tx = engine.begin_write()?;
//! let assignment = index.assign(&embedding)?;
//! put_entry(&mut tx, "vectors", IndexId::new(1), &assignment, &pk, &[])?;
//! tx.commit()?;
//! ```

pub mod distance;
pub mod encoding;
pub mod error;
pub mod index;
pub mod quantization;
pub mod search;
pub mod spatial;
pub mod store;
pub mod types;

pub use distance::Metric;
pub use error::{VectorError, VectorResult};
pub use index::{create_index, IndexInfo, VectorIndex};
pub use search::{DistanceCall, SearchSession, SortExpr};
pub use types::{
    Assignment, CancelFlag, IndexConfig, IndexData, IndexId, IndexType, ResultRow, SearchMode,
    SearchParams,
};
