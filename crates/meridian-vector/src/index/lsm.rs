//! LSM scan engine.
//!
//! The LSM variant has no trained quantizer: vectors live inside the row
//! values and are decoded on the fly. Queries scan the index's key
//! region, project the vector column (and the spatial column in hybrid
//! mode), compute exact distances, and rank through the bounded heap.

use meridian_storage::{Cursor, Transaction};

use crate::distance::{haversine_meters, l2_squared};
use crate::encoding::keys::region_bounds;
use crate::encoding::row::RowLayout;
use crate::encoding::{decode_array, decode_point};
use crate::error::{VectorError, VectorResult};
use crate::search::{HeapEntry, TopK};
use crate::types::{Assignment, CancelFlag, IndexConfig, IndexId, ResultRow, SearchParams};

use super::{IndexInfo, IndexStats};

/// Result budget for index-scan mode, where no LIMIT reaches the engine.
const DEFAULT_SCAN_LIMIT: usize = 100;

/// Internal ids start in the same band the inverted-list scans use.
const FIRST_INTERNAL_ID: i64 = 1024;

/// LSM-native index: a raw sorted scan over the region's rows.
pub struct LsmIndex {
    index_id: IndexId,
    cf: String,
    config: IndexConfig,
    layout: RowLayout,
    stats: IndexStats,
}

impl LsmIndex {
    pub(crate) fn new(
        index_id: IndexId,
        cf: String,
        config: IndexConfig,
        layout: RowLayout,
    ) -> Self {
        Self { index_id, cf, config, layout, stats: IndexStats::new(0) }
    }

    /// Vector dimension.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.config.dimension as usize
    }

    /// Registered configuration.
    #[must_use]
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// The index id.
    #[must_use]
    pub fn index_id(&self) -> IndexId {
        self.index_id
    }

    fn check_dimension(&self, vector: &[f32]) -> VectorResult<()> {
        if vector.len() != self.dimension() {
            return Err(VectorError::OutOfRange(format!(
                "vector of dimension {} against index {} of dimension {}",
                vector.len(),
                self.index_id,
                self.dimension()
            )));
        }
        Ok(())
    }

    fn vector_field_index(&self) -> VectorResult<usize> {
        self.layout.vector_field_index().ok_or_else(|| {
            VectorError::Internal(format!(
                "index {} column family has no vector column",
                self.index_id
            ))
        })
    }

    fn spatial_field_index(&self) -> VectorResult<usize> {
        self.layout.spatial_field_index().ok_or_else(|| {
            VectorError::Internal(format!(
                "index {} column family has no spatial column",
                self.index_id
            ))
        })
    }

    /// Walk every non-empty row of the region, tracking scan volume into
    /// the ntotal approximation.
    fn scan_rows<T, F>(&self, tx: &T, cancel: &CancelFlag, mut on_row: F) -> VectorResult<()>
    where
        T: Transaction,
        F: FnMut(&[u8], &[u8]) -> VectorResult<()>,
    {
        let (lower, upper) = region_bounds(self.index_id);
        let mut cursor = tx.range(&self.cf, &lower, &upper)?;
        let mut keys_scanned = 0i64;
        while let Some((key, value)) = cursor.next()? {
            if cancel.is_cancelled() {
                return Err(VectorError::Interrupted);
            }
            keys_scanned += 1;
            if value.is_empty() {
                continue;
            }
            on_row(&key, &value)?;
        }
        self.stats.set_ntotal(keys_scanned);
        Ok(())
    }

    fn decode_row_vector(&self, raw: &[u8], dim: usize) -> VectorResult<Vec<f32>> {
        let vector: Vec<f32> = decode_array(raw)?;
        if vector.len() != dim {
            tracing::warn!(
                index_id = self.index_id.as_u32(),
                expected = dim,
                actual = vector.len(),
                "stored vector has wrong dimension"
            );
            return Err(VectorError::CorruptData(format!(
                "stored vector of dimension {} in index {} of dimension {dim}",
                vector.len(),
                self.index_id
            )));
        }
        Ok(vector)
    }

    /// Assignment for the write path: a single list, raw float codes.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` on a dimension mismatch.
    pub fn assign(&self, vector: &[f32]) -> VectorResult<Assignment> {
        self.check_dimension(vector)?;
        let mut codes = Vec::with_capacity(vector.len() * 4);
        for value in vector {
            codes.extend_from_slice(&value.to_le_bytes());
        }
        Ok(Assignment { list_id: 0, codes })
    }

    /// Exact k-NN over the whole region, materializing row values.
    ///
    /// # Errors
    ///
    /// `OutOfRange` on a dimension mismatch, `Interrupted` on
    /// cancellation, `CorruptData` when a row's vector column does not
    /// decode.
    pub fn knn_search_with_value<T: Transaction>(
        &self,
        tx: &T,
        query: &[f32],
        params: &SearchParams,
        cancel: &CancelFlag,
    ) -> VectorResult<Vec<ResultRow>> {
        self.stats.record_hit();
        self.check_dimension(query)?;
        let vector_field = self.vector_field_index()?;

        let mut heap = TopK::new(params.k);
        let mut next_id = FIRST_INTERNAL_ID;

        self.scan_rows(tx, cancel, |key, value| {
            let fields = crate::encoding::decode_fields(value, &self.layout, &[vector_field])?;
            let vector = self.decode_row_vector(fields[0], query.len())?;
            let score = l2_squared(query, &vector);
            if heap.would_accept(score) {
                let internal_id = next_id;
                next_id += 1;
                heap.push(HeapEntry {
                    score,
                    internal_id,
                    key: key.to_vec(),
                    value: Some(value.to_vec()),
                });
            }
            Ok(())
        })?;

        Ok(collect(heap))
    }

    /// Hybrid search: vector distance blended with great-circle distance
    /// to the query coordinate.
    ///
    /// The heap keys entries by the combined score while a full heap is
    /// evicted by comparing the bare vector distance against the resident
    /// worst; callers rely on that exact rule.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`LsmIndex::knn_search_with_value`], plus
    /// `CorruptData` for an undecodable query coordinate or spatial
    /// column.
    pub fn knn_search_hybrid_with_value<T: Transaction>(
        &self,
        tx: &T,
        query: &[f32],
        params: &SearchParams,
        cancel: &CancelFlag,
    ) -> VectorResult<Vec<ResultRow>> {
        self.stats.record_hit();
        self.check_dimension(query)?;
        let spatial_field = self.spatial_field_index()?;
        let vector_field = self.vector_field_index()?;
        let (query_lon, query_lat) = decode_point(&params.query_coordinate)?;

        let mut heap = TopK::new(params.k);
        let mut next_id = FIRST_INTERNAL_ID;

        self.scan_rows(tx, cancel, |key, value| {
            let fields = crate::encoding::decode_fields(
                value,
                &self.layout,
                &[spatial_field, vector_field],
            )?;
            let (lon, lat) = decode_point(fields[0])?;
            let vector = self.decode_row_vector(fields[1], query.len())?;

            let vector_distance = l2_squared(query, &vector);
            let spatial_distance = haversine_meters(query_lon, query_lat, lon, lat) as f32;
            let combined = vector_distance + params.weight * spatial_distance;

            let internal_id = next_id;
            next_id += 1;
            heap.push_ranked(
                vector_distance,
                HeapEntry {
                    score: combined,
                    internal_id,
                    key: key.to_vec(),
                    value: Some(value.to_vec()),
                },
            );
            Ok(())
        })?;

        Ok(collect(heap))
    }

    /// Index-scan fallback: the same ranked scan with a default budget.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`LsmIndex::knn_search_with_value`].
    pub fn index_scan_with_value<T: Transaction>(
        &self,
        tx: &T,
        query: &[f32],
        nprobe: usize,
        cancel: &CancelFlag,
    ) -> VectorResult<Vec<ResultRow>> {
        let params = SearchParams {
            metric: crate::distance::Metric::L2,
            k: DEFAULT_SCAN_LIMIT,
            nprobe,
            weight: 0.0,
            query_coordinate: Vec::new(),
        };
        self.knn_search_with_value(tx, query, &params, cancel)
    }

    /// Introspection snapshot: totals and hit count only.
    #[must_use]
    pub fn dump_info(&self) -> IndexInfo {
        IndexInfo {
            ntotal: self.stats.ntotal(),
            hit: self.stats.hit(),
            ..IndexInfo::default()
        }
    }
}

fn collect(heap: TopK) -> Vec<ResultRow> {
    heap.into_sorted()
        .into_iter()
        .map(|entry| ResultRow { key: entry.key, score: entry.score, value: entry.value })
        .collect()
}
