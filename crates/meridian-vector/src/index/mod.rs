//! Index variants and lifecycle.
//!
//! [`VectorIndex`] is the tagged union of the four variants. The IVF
//! family (FLAT, IVF-FLAT, IVF-PQ) shares one engine parameterized by its
//! list codec; the LSM variant scans rows and decodes vectors on the fly.
//! Entry points a variant does not implement return `Unsupported`, which
//! the search session recovers from by dispatching to the alternative
//! entry.

mod ivf;
mod lsm;
mod quantizer;

pub use ivf::IvfIndex;
pub use lsm::LsmIndex;
pub use quantizer::CoarseQuantizer;

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use meridian_storage::Transaction;
use serde::Serialize;

use crate::encoding::row::RowLayout;
use crate::error::{VectorError, VectorResult};
use crate::quantization::PqCodebook;
use crate::store::{ListScan, PushdownFilter, ScanContext};
use crate::types::{
    Assignment, CancelFlag, IndexConfig, IndexData, IndexId, IndexType, ResultRow, SearchParams,
};

/// Introspection snapshot of one index.
///
/// Totals and list sizes come from the last `analyze` pass (and from
/// fully scanned lists of past queries), so they are approximations, not
/// guarantees.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexInfo {
    /// Approximate number of stored vectors.
    pub ntotal: i64,
    /// Number of times the index served a search.
    pub hit: u64,
    /// Stored bytes per vector.
    pub code_size: usize,
    /// Number of inverted lists.
    pub nlist: u64,
    /// PQ subquantizers (IVF-PQ only).
    pub pq_m: u32,
    /// Bits per PQ code (IVF-PQ only).
    pub pq_nbits: u32,
    /// Smallest observed list size.
    pub min_list_size: u64,
    /// Largest observed list size.
    pub max_list_size: u64,
    /// Mean observed list size.
    pub avg_list_size: u64,
    /// Median observed list size.
    pub median_list_size: u64,
}

/// Mutable counters of one index: the hit counter, the ntotal
/// approximation, and per-list observed sizes (-1 until observed).
#[derive(Debug)]
pub(crate) struct IndexStats {
    hit: AtomicU64,
    ntotal: AtomicI64,
    list_sizes: Vec<AtomicI64>,
}

impl IndexStats {
    pub(crate) fn new(nlist: usize) -> Self {
        let mut list_sizes = Vec::with_capacity(nlist);
        for _ in 0..nlist {
            list_sizes.push(AtomicI64::new(-1));
        }
        Self { hit: AtomicU64::new(0), ntotal: AtomicI64::new(0), list_sizes }
    }

    pub(crate) fn record_hit(&self) {
        self.hit.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn hit(&self) -> u64 {
        self.hit.load(Ordering::Relaxed)
    }

    pub(crate) fn set_ntotal(&self, ntotal: i64) {
        self.ntotal.store(ntotal, Ordering::Relaxed);
    }

    pub(crate) fn ntotal(&self) -> i64 {
        self.ntotal.load(Ordering::Relaxed)
    }

    pub(crate) fn set_list_size(&self, list_id: u64, size: u64) {
        if let Some(slot) = self.list_sizes.get(list_id as usize) {
            slot.store(size as i64, Ordering::Relaxed);
        }
    }

    pub(crate) fn update_list_sizes(&self, observed: &[(u64, u64)]) {
        for (list_id, size) in observed {
            self.set_list_size(*list_id, *size);
        }
    }

    /// Sizes of lists observed at least once.
    pub(crate) fn observed_list_sizes(&self) -> Vec<u64> {
        self.list_sizes
            .iter()
            .map(|slot| slot.load(Ordering::Relaxed))
            .filter(|&size| size >= 0)
            .map(|size| size as u64)
            .collect()
    }
}

/// Fill the list-size section of an [`IndexInfo`] from observed sizes.
pub(crate) fn summarize_list_sizes(info: &mut IndexInfo, mut sizes: Vec<u64>) {
    if sizes.is_empty() {
        return;
    }
    sizes.sort_unstable();
    let total: u64 = sizes.iter().sum();
    info.ntotal = total as i64;
    info.min_list_size = sizes[0];
    info.max_list_size = sizes[sizes.len() - 1];
    info.avg_list_size = total / sizes.len() as u64;
    info.median_list_size = sizes[sizes.len() / 2];
}

/// One vector index attached to a column family.
pub enum VectorIndex {
    /// Single-list flat index.
    Flat(IvfIndex),
    /// Coarse-quantized inverted lists with raw codes.
    IvfFlat(IvfIndex),
    /// Coarse-quantized inverted lists with PQ codes.
    IvfPq(IvfIndex),
    /// Raw sorted scan over row values.
    Lsm(LsmIndex),
}

impl VectorIndex {
    fn as_ivf(&self) -> Option<&IvfIndex> {
        match self {
            Self::Flat(ivf) | Self::IvfFlat(ivf) | Self::IvfPq(ivf) => Some(ivf),
            Self::Lsm(_) => None,
        }
    }

    /// Vector dimension of the index.
    #[must_use]
    pub fn dimension(&self) -> usize {
        match self {
            Self::Flat(ivf) | Self::IvfFlat(ivf) | Self::IvfPq(ivf) => ivf.dimension(),
            Self::Lsm(lsm) => lsm.dimension(),
        }
    }

    /// The registered configuration.
    #[must_use]
    pub fn config(&self) -> &IndexConfig {
        match self {
            Self::Flat(ivf) | Self::IvfFlat(ivf) | Self::IvfPq(ivf) => ivf.config(),
            Self::Lsm(lsm) => lsm.config(),
        }
    }

    /// The index id.
    #[must_use]
    pub fn index_id(&self) -> IndexId {
        match self {
            Self::Flat(ivf) | Self::IvfFlat(ivf) | Self::IvfPq(ivf) => ivf.index_id(),
            Self::Lsm(lsm) => lsm.index_id(),
        }
    }

    /// Assign a vector to its list and encode its stored codes.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` on a dimension mismatch.
    pub fn assign(&self, vector: &[f32]) -> VectorResult<Assignment> {
        match self {
            Self::Flat(ivf) | Self::IvfFlat(ivf) | Self::IvfPq(ivf) => ivf.assign(vector),
            Self::Lsm(lsm) => lsm.assign(vector),
        }
    }

    /// k-NN search returning keys and scores.
    ///
    /// # Errors
    ///
    /// `Unsupported` for the LSM variant; otherwise the IVF engine's
    /// failure modes.
    pub fn knn_search<T: Transaction>(
        &self,
        tx: &T,
        query: &[f32],
        params: &SearchParams,
        filter: Option<PushdownFilter<'_>>,
        cancel: &CancelFlag,
    ) -> VectorResult<Vec<ResultRow>> {
        match self.as_ivf() {
            Some(ivf) => ivf.knn_search(tx, query, params, filter, cancel),
            None => Err(VectorError::Unsupported("knn_search")),
        }
    }

    /// k-NN search materializing row values alongside scores.
    ///
    /// # Errors
    ///
    /// `Unsupported` for the IVF family; otherwise the LSM engine's
    /// failure modes.
    pub fn knn_search_with_value<T: Transaction>(
        &self,
        tx: &T,
        query: &[f32],
        params: &SearchParams,
        _filter: Option<PushdownFilter<'_>>,
        cancel: &CancelFlag,
    ) -> VectorResult<Vec<ResultRow>> {
        match self {
            Self::Lsm(lsm) => lsm.knn_search_with_value(tx, query, params, cancel),
            _ => Err(VectorError::Unsupported("knn_search_with_value")),
        }
    }

    /// Hybrid vector + great-circle search with row values.
    ///
    /// # Errors
    ///
    /// `Unsupported` for the IVF family; otherwise the LSM engine's
    /// failure modes.
    pub fn knn_search_hybrid_with_value<T: Transaction>(
        &self,
        tx: &T,
        query: &[f32],
        params: &SearchParams,
        _filter: Option<PushdownFilter<'_>>,
        cancel: &CancelFlag,
    ) -> VectorResult<Vec<ResultRow>> {
        match self {
            Self::Lsm(lsm) => lsm.knn_search_hybrid_with_value(tx, query, params, cancel),
            _ => Err(VectorError::Unsupported("knn_search_hybrid_with_value")),
        }
    }

    /// Streaming scan over the probed lists, no distance computation.
    ///
    /// # Errors
    ///
    /// `Unsupported` for the LSM variant.
    pub fn index_scan<'t, T: Transaction>(
        &self,
        tx: &'t T,
        query: &[f32],
        nprobe: usize,
        ctx: ScanContext<'t>,
    ) -> VectorResult<ListScan<'t, T>> {
        match self.as_ivf() {
            Some(ivf) => ivf.index_scan(tx, query, nprobe, ctx),
            None => Err(VectorError::Unsupported("index_scan")),
        }
    }

    /// Ranked scan with row values, the LSM fallback for index-scan mode.
    ///
    /// # Errors
    ///
    /// `Unsupported` for the IVF family.
    pub fn index_scan_with_value<T: Transaction>(
        &self,
        tx: &T,
        query: &[f32],
        nprobe: usize,
        cancel: &CancelFlag,
    ) -> VectorResult<Vec<ResultRow>> {
        match self {
            Self::Lsm(lsm) => lsm.index_scan_with_value(tx, query, nprobe, cancel),
            _ => Err(VectorError::Unsupported("index_scan_with_value")),
        }
    }

    /// Scan the index and refresh the per-list size counters.
    ///
    /// # Errors
    ///
    /// `Interrupted` when cancelled; decode errors from corrupt entries.
    pub fn analyze<T: Transaction>(
        &self,
        tx: &T,
        max_rows_scanned: u64,
        cancel: &CancelFlag,
    ) -> VectorResult<()> {
        match self.as_ivf() {
            Some(ivf) => ivf.analyze(tx, max_rows_scanned, cancel),
            None => Ok(()),
        }
    }

    /// Introspection snapshot.
    #[must_use]
    pub fn dump_info(&self) -> IndexInfo {
        match self {
            Self::Flat(ivf) | Self::IvfFlat(ivf) | Self::IvfPq(ivf) => ivf.dump_info(),
            Self::Lsm(lsm) => lsm.dump_info(),
        }
    }
}

fn validate_index_data(config: &IndexConfig, data: &IndexData) -> VectorResult<()> {
    if data.nlist == 0 {
        return Err(VectorError::CorruptData("invalid nlist 0".to_string()));
    }
    if data.dimension != config.dimension {
        return Err(VectorError::CorruptData(format!(
            "centroid data dimension {} does not match index dimension {}",
            data.dimension, config.dimension
        )));
    }
    if config.nlist != 0 && config.nlist != data.nlist {
        return Err(VectorError::CorruptData(format!(
            "declared nlist {} does not match trained nlist {}",
            config.nlist, data.nlist
        )));
    }
    let expected = (data.nlist as usize).saturating_mul(data.dimension as usize);
    if data.centroids.len() != expected {
        return Err(VectorError::CorruptData(format!(
            "invalid quantizer codes, total code size {}",
            data.centroids.len() * 4
        )));
    }
    Ok(())
}

/// Build an index from its configuration, centroid data, and (for the
/// LSM variant) the region's row layout.
///
/// FLAT synthesizes a single zero centroid and needs no data; the IVF
/// variants consume the trained blob; LSM skips loading entirely.
///
/// # Errors
///
/// `OutOfRange` for a zero dimension, `Internal` when a required input is
/// absent, `CorruptData` when the blob does not match the configuration.
pub fn create_index(
    config: IndexConfig,
    cf: impl Into<String>,
    index_id: IndexId,
    data: Option<&IndexData>,
    layout: Option<RowLayout>,
) -> VectorResult<VectorIndex> {
    let cf = cf.into();
    if config.dimension == 0 {
        return Err(VectorError::OutOfRange(format!(
            "index {index_id} configured with zero dimension"
        )));
    }

    let index = match config.index_type {
        IndexType::Flat => {
            // flat is ivf-flat with a single list around a zero centroid
            let data = IndexData::flat(config.dimension, 1, vec![0.0; config.dimension as usize]);
            VectorIndex::Flat(IvfIndex::raw(index_id, cf, config, &data)?)
        }
        IndexType::IvfFlat => {
            let data = data.ok_or_else(|| {
                VectorError::Internal(format!(
                    "trained centroid data required for ivf_flat index {index_id}"
                ))
            })?;
            validate_index_data(&config, data)?;
            VectorIndex::IvfFlat(IvfIndex::raw(index_id, cf, config, data)?)
        }
        IndexType::IvfPq => {
            let data = data.ok_or_else(|| {
                VectorError::Internal(format!(
                    "trained centroid data required for ivf_pq index {index_id}"
                ))
            })?;
            validate_index_data(&config, data)?;
            if data.pq_m == 0 || data.pq_nbits == 0 {
                return Err(VectorError::CorruptData(format!(
                    "invalid pq m {}, pq nbits {}",
                    data.pq_m, data.pq_nbits
                )));
            }
            if data.pq_centroids.is_empty() {
                return Err(VectorError::CorruptData(
                    "pq codebook is required for ivf_pq".to_string(),
                ));
            }
            let codebook = PqCodebook::from_index_data(data)?;
            VectorIndex::IvfPq(IvfIndex::pq(index_id, cf, config, data, codebook)?)
        }
        IndexType::Lsm => {
            let layout = layout.ok_or_else(|| {
                VectorError::Internal(format!("row layout required for lsm index {index_id}"))
            })?;
            VectorIndex::Lsm(LsmIndex::new(index_id, cf, config, layout))
        }
    };

    tracing::debug!(
        index_id = index.index_id().as_u32(),
        dimension = index.dimension(),
        "vector index created"
    );
    Ok(index)
}
