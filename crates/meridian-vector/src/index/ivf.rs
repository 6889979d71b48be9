//! IVF engine shared by the FLAT, IVF-FLAT, and IVF-PQ variants.
//!
//! The coarse quantizer picks `nprobe` lists; each list streams through an
//! inverted-list cursor; candidates are scored raw (FLAT / IVF-FLAT) or by
//! asymmetric distance against a precomputed table (IVF-PQ) and ranked in
//! a bounded max-heap.

use meridian_storage::Transaction;

use crate::distance::Metric;
use crate::error::{VectorError, VectorResult};
use crate::quantization::{PqCodebook, PqDistanceTable};
use crate::search::{HeapEntry, TopK};
use crate::store::{open_list_cursor, ListScan, PushdownFilter, ScanContext};
use crate::types::{Assignment, CancelFlag, IndexConfig, IndexData, IndexId, ResultRow, SearchParams};

use super::{summarize_list_sizes, CoarseQuantizer, IndexInfo, IndexStats};

/// How vectors are encoded inside the inverted lists.
enum ListCodec {
    /// Raw little-endian f32 bytes, `dim * 4` per vector.
    Raw { dim: usize },
    /// One subquantizer index byte per subspace.
    Pq(PqCodebook),
}

impl ListCodec {
    fn code_size(&self) -> usize {
        match self {
            Self::Raw { dim } => dim * 4,
            Self::Pq(pq) => pq.code_size(),
        }
    }
}

/// Score raw f32 codes against the query without materializing a vector.
fn score_raw_codes(
    metric: Metric,
    query: &[f32],
    codes: &[u8],
    index_id: IndexId,
    list_id: u64,
) -> VectorResult<f32> {
    if codes.len() != query.len() * 4 {
        return Err(VectorError::CorruptData(format!(
            "raw codes of {} bytes do not hold {} floats in index {index_id}, list {list_id}",
            codes.len(),
            query.len()
        )));
    }
    let values = codes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]));
    let score = match metric {
        Metric::L2 => query
            .iter()
            .zip(values)
            .map(|(q, v)| (q - v) * (q - v))
            .sum(),
        Metric::Ip => -query.iter().zip(values).map(|(q, v)| q * v).sum::<f32>(),
    };
    Ok(score)
}

/// Inverted-file index over coarse-quantized lists.
pub struct IvfIndex {
    index_id: IndexId,
    cf: String,
    config: IndexConfig,
    quantizer: CoarseQuantizer,
    codec: ListCodec,
    stats: IndexStats,
}

impl IvfIndex {
    /// Build a raw-codes index (FLAT / IVF-FLAT) from centroid data.
    pub(crate) fn raw(
        index_id: IndexId,
        cf: String,
        config: IndexConfig,
        data: &IndexData,
    ) -> VectorResult<Self> {
        let dim = config.dimension as usize;
        let quantizer = CoarseQuantizer::new(dim, data.centroids.clone())?;
        let stats = IndexStats::new(quantizer.nlist());
        Ok(Self { index_id, cf, config, quantizer, codec: ListCodec::Raw { dim }, stats })
    }

    /// Build a PQ-codes index (IVF-PQ) from centroid data and an
    /// installed codebook.
    pub(crate) fn pq(
        index_id: IndexId,
        cf: String,
        config: IndexConfig,
        data: &IndexData,
        codebook: PqCodebook,
    ) -> VectorResult<Self> {
        let dim = config.dimension as usize;
        let quantizer = CoarseQuantizer::new(dim, data.centroids.clone())?;
        let stats = IndexStats::new(quantizer.nlist());
        Ok(Self { index_id, cf, config, quantizer, codec: ListCodec::Pq(codebook), stats })
    }

    /// Vector dimension.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.quantizer.dim()
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

    /// Stored bytes per vector.
    #[must_use]
    pub fn code_size(&self) -> usize {
        self.codec.code_size()
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

    /// Assign a vector to its nearest list and encode its codes.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` on a dimension mismatch.
    pub fn assign(&self, vector: &[f32]) -> VectorResult<Assignment> {
        self.check_dimension(vector)?;
        let list_id = self.quantizer.assign(vector);
        let codes = match &self.codec {
            ListCodec::Raw { .. } => {
                let mut codes = Vec::with_capacity(vector.len() * 4);
                for value in vector {
                    codes.extend_from_slice(&value.to_le_bytes());
                }
                codes
            }
            ListCodec::Pq(pq) => pq.encode(vector),
        };
        Ok(Assignment { list_id, codes })
    }

    /// k-NN over the `nprobe` nearest lists.
    ///
    /// # Errors
    ///
    /// `OutOfRange` on a dimension mismatch, `Interrupted` on
    /// cancellation, `CorruptData` from invalid entries, `Query` from a
    /// failing predicate.
    pub fn knn_search<T: Transaction>(
        &self,
        tx: &T,
        query: &[f32],
        params: &SearchParams,
        filter: Option<PushdownFilter<'_>>,
        cancel: &CancelFlag,
    ) -> VectorResult<Vec<ResultRow>> {
        self.stats.record_hit();
        self.check_dimension(query)?;

        let probes = self.quantizer.probe(query, params.nprobe.max(1));
        let table: Option<PqDistanceTable> = match &self.codec {
            ListCodec::Pq(pq) => Some(pq.distance_table(query, params.metric)),
            ListCodec::Raw { .. } => None,
        };

        let mut ctx = ScanContext::new(cancel.clone(), filter);
        let mut heap = TopK::new(params.k);

        for (list_id, _) in probes {
            let mut cursor = open_list_cursor(tx, &self.cf, self.index_id, list_id, self.code_size())?;
            while cursor.advance(&mut ctx)? {
                let codes = cursor.codes(&mut ctx)?;
                let score = match &table {
                    Some(table) => table.score(codes)?,
                    None => score_raw_codes(params.metric, query, codes, self.index_id, list_id)?,
                };
                if heap.would_accept(score) {
                    let (key, _) = cursor.key_and_value(false)?;
                    let internal_id = ctx.next_internal_id();
                    heap.push(HeapEntry { score, internal_id, key, value: None });
                }
            }
        }

        self.stats.update_list_sizes(ctx.list_size_stats());

        Ok(heap
            .into_sorted()
            .into_iter()
            .map(|entry| ResultRow { key: entry.key, score: entry.score, value: None })
            .collect())
    }

    /// Streaming iterator over the probed lists, no scoring.
    ///
    /// # Errors
    ///
    /// `OutOfRange` on a dimension mismatch.
    pub fn index_scan<'t, T: Transaction>(
        &self,
        tx: &'t T,
        query: &[f32],
        nprobe: usize,
        ctx: ScanContext<'t>,
    ) -> VectorResult<ListScan<'t, T>> {
        self.stats.record_hit();
        self.check_dimension(query)?;
        let list_ids: Vec<u64> =
            self.quantizer.probe(query, nprobe.max(1)).into_iter().map(|(id, _)| id).collect();
        Ok(ListScan::new(tx, self.cf.clone(), self.index_id, self.code_size(), list_ids, ctx))
    }

    /// Walk every list, validating entries and refreshing the size
    /// counters. Stops early once `max_rows_scanned` rows were seen
    /// (zero means unbounded).
    ///
    /// # Errors
    ///
    /// `Interrupted` on cancellation, `CorruptData` from invalid entries.
    pub fn analyze<T: Transaction>(
        &self,
        tx: &T,
        max_rows_scanned: u64,
        cancel: &CancelFlag,
    ) -> VectorResult<()> {
        let mut ntotal = 0u64;
        for list_id in 0..self.quantizer.nlist() as u64 {
            let mut ctx = ScanContext::new(cancel.clone(), None);
            let mut cursor = open_list_cursor(tx, &self.cf, self.index_id, list_id, self.code_size())?;
            let mut list_size = 0u64;
            while cursor.advance(&mut ctx)? {
                cursor.codes(&mut ctx)?;
                list_size += 1;
                ntotal += 1;
                if max_rows_scanned > 0 && ntotal > max_rows_scanned {
                    return Ok(());
                }
            }
            self.stats.set_list_size(list_id, list_size);
        }
        Ok(())
    }

    /// Introspection snapshot from the last observed list sizes.
    #[must_use]
    pub fn dump_info(&self) -> IndexInfo {
        let mut info = IndexInfo {
            hit: self.stats.hit(),
            code_size: self.code_size(),
            nlist: self.quantizer.nlist() as u64,
            ..IndexInfo::default()
        };
        if let ListCodec::Pq(pq) = &self.codec {
            info.pq_m = pq.num_segments() as u32;
            info.pq_nbits = pq.nbits();
        }
        summarize_list_sizes(&mut info, self.stats.observed_list_sizes());
        info
    }
}
