//! Core types shared across the engine.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::distance::Metric;
use crate::error::{VectorError, VectorResult};

/// Identifier of one index, the leading 4 bytes of every key it owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexId(u32);

impl IndexId {
    /// Encoded width of an index id in a key.
    pub const SIZE: usize = 4;

    /// Create an index id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw id.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index variant selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    /// Single inverted list holding raw vectors.
    Flat,
    /// Coarse-quantized inverted lists holding raw vectors.
    IvfFlat,
    /// Coarse-quantized inverted lists holding product-quantized codes.
    IvfPq,
    /// Raw sorted scan; vectors decoded from row values on the fly.
    Lsm,
}

/// Declarative index configuration, registered in the catalog.
///
/// `nlist`, `pq_m`, and `pq_nbits` are declared here for introspection;
/// the centroid blob is authoritative and the two are cross-checked at
/// setup when both carry a value (zero means "take it from the blob").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Which variant to build.
    pub index_type: IndexType,
    /// Vector dimension.
    pub dimension: u32,
    /// Declared number of inverted lists.
    #[serde(default)]
    pub nlist: u64,
    /// Declared number of PQ subquantizers.
    #[serde(default)]
    pub pq_m: u32,
    /// Declared bits per PQ code.
    #[serde(default)]
    pub pq_nbits: u32,
    /// Reference to the out-of-band trained blob, `db.table/id` style.
    #[serde(default)]
    pub trained_index_ref: Option<String>,
}

impl IndexConfig {
    /// Create a configuration for the given variant and dimension.
    #[must_use]
    pub fn new(index_type: IndexType, dimension: u32) -> Self {
        Self { index_type, dimension, nlist: 0, pq_m: 0, pq_nbits: 0, trained_index_ref: None }
    }

    /// Serialize to JSON bytes for the catalog.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if serialization fails.
    pub fn to_bytes(&self) -> VectorResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| VectorError::Internal(format!("failed to encode index config: {e}")))
    }

    /// Deserialize from catalog JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `CorruptData` if the bytes do not parse.
    pub fn from_bytes(bytes: &[u8]) -> VectorResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| VectorError::CorruptData(format!("failed to decode index config: {e}")))
    }
}

/// Pre-trained centroid and codebook data produced out of band.
///
/// Binary layout (little-endian, leading version byte):
///
/// `[version:1][dim:u32][nlist:u64][pq_m:u32][pq_nbits:u32]`
/// `[centroids: nlist*dim f32][pq codebook: dim * 2^pq_nbits f32, when pq_m > 0]`
///
/// The codebook length follows from `pq_m * 2^pq_nbits * (dim / pq_m)`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexData {
    /// Vector dimension the blob was trained for.
    pub dimension: u32,
    /// Number of coarse centroids.
    pub nlist: u64,
    /// Coarse centroid coordinates, `nlist * dimension` floats.
    pub centroids: Vec<f32>,
    /// Number of PQ subquantizers; zero when the blob carries no codebook.
    pub pq_m: u32,
    /// Bits per PQ code.
    pub pq_nbits: u32,
    /// PQ codebook, `pq_m * 2^pq_nbits * (dimension / pq_m)` floats.
    pub pq_centroids: Vec<f32>,
}

const INDEX_DATA_VERSION: u8 = 1;
const INDEX_DATA_HEADER: usize = 1 + 4 + 8 + 4 + 4;

impl IndexData {
    /// Build a blob with no PQ codebook.
    #[must_use]
    pub fn flat(dimension: u32, nlist: u64, centroids: Vec<f32>) -> Self {
        Self { dimension, nlist, centroids, pq_m: 0, pq_nbits: 0, pq_centroids: Vec::new() }
    }

    /// Serialize to the versioned binary container.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(
            INDEX_DATA_HEADER + (self.centroids.len() + self.pq_centroids.len()) * 4,
        );
        bytes.push(INDEX_DATA_VERSION);
        bytes.extend_from_slice(&self.dimension.to_le_bytes());
        bytes.extend_from_slice(&self.nlist.to_le_bytes());
        bytes.extend_from_slice(&self.pq_m.to_le_bytes());
        bytes.extend_from_slice(&self.pq_nbits.to_le_bytes());
        for value in self.centroids.iter().chain(self.pq_centroids.iter()) {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    /// Deserialize from the versioned binary container.
    ///
    /// # Errors
    ///
    /// Returns `CorruptData` on an unknown version or a length that does
    /// not match the declared shape.
    pub fn from_bytes(bytes: &[u8]) -> VectorResult<Self> {
        if bytes.len() < INDEX_DATA_HEADER {
            return Err(VectorError::CorruptData("index data blob too short".to_string()));
        }
        if bytes[0] != INDEX_DATA_VERSION {
            return Err(VectorError::CorruptData(format!(
                "unsupported index data version {}",
                bytes[0]
            )));
        }
        let dimension = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let nlist = u64::from_le_bytes([
            bytes[5], bytes[6], bytes[7], bytes[8], bytes[9], bytes[10], bytes[11], bytes[12],
        ]);
        let pq_m = u32::from_le_bytes([bytes[13], bytes[14], bytes[15], bytes[16]]);
        let pq_nbits = u32::from_le_bytes([bytes[17], bytes[18], bytes[19], bytes[20]]);

        let centroid_count = (nlist as usize).saturating_mul(dimension as usize);
        let codebook_count = if pq_m > 0 {
            (dimension as usize).saturating_mul(1usize << pq_nbits.min(16))
        } else {
            0
        };
        let expected = INDEX_DATA_HEADER + (centroid_count + codebook_count) * 4;
        if bytes.len() != expected {
            return Err(VectorError::CorruptData(format!(
                "index data blob length mismatch: expected {expected}, got {}",
                bytes.len()
            )));
        }

        let mut floats = bytes[INDEX_DATA_HEADER..]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]));
        let centroids: Vec<f32> = floats.by_ref().take(centroid_count).collect();
        let pq_centroids: Vec<f32> = floats.collect();

        Ok(Self { dimension, nlist, centroids, pq_m, pq_nbits, pq_centroids })
    }
}

/// Which scan protocol a query runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMode {
    /// Stream selected lists without scoring.
    IndexScan,
    /// Vector k-NN.
    KnnFirst,
    /// Vector k-NN blended with great-circle distance.
    KnnHybrid,
}

/// Per-query search parameters handed to an index entry point.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Distance metric.
    pub metric: Metric,
    /// Result budget.
    pub k: usize,
    /// Number of inverted lists to probe.
    pub nprobe: usize,
    /// Spatial blend weight (hybrid only).
    pub weight: f32,
    /// WKB point the hybrid blend measures distance to.
    pub query_coordinate: Vec<u8>,
}

impl SearchParams {
    /// Plain k-NN parameters.
    #[must_use]
    pub fn knn(metric: Metric, k: usize, nprobe: usize) -> Self {
        Self { metric, k, nprobe, weight: 0.0, query_coordinate: Vec::new() }
    }
}

/// Write-side assignment of one vector: which list it joins and the code
/// bytes stored for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Target inverted list.
    pub list_id: u64,
    /// Encoded vector, `code_size` bytes.
    pub codes: Vec<u8>,
}

/// One row of a query result, in ascending score order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    /// Full entry key (primary key bytes for k-NN results).
    pub key: Vec<u8>,
    /// Score under the query's metric (combined score in hybrid mode).
    pub score: f32,
    /// Row value bytes, when the entry point materializes them.
    pub value: Option<Vec<u8>>,
}

/// Cooperative cancellation flag, checked on every scan step.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
