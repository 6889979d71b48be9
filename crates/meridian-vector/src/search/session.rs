//! Per-query search session.
//!
//! One session per handler instance: it owns the input vector buffer,
//! the resolved search parameters, the result rows, and the forward-only
//! cursor over them. Construction unwraps the ORDER-BY expression; `end`
//! clears everything for handler reuse.

use meridian_storage::Transaction;

use crate::distance::Metric;
use crate::error::{VectorError, VectorResult};
use crate::index::VectorIndex;
use crate::store::{ListScan, PushdownFilter, ScanContext};
use crate::types::{CancelFlag, ResultRow, SearchMode, SearchParams};

/// Hybrid queries scan a widened candidate set because the combined score
/// reorders rows relative to the underlying scan; the final result is
/// trimmed back to the limit.
const HYBRID_K_FACTOR: usize = 5;

/// The distance call at the heart of an ORDER-BY expression.
#[derive(Debug, Clone)]
pub struct DistanceCall {
    /// Metric from the distance function's tag.
    pub metric: Metric,
    /// The query vector argument.
    pub query_vector: Vec<f32>,
    /// LIMIT associated with the ORDER BY clause.
    pub limit: usize,
    /// Lists to probe.
    pub nprobe: usize,
    /// Requested scan protocol.
    pub search_mode: SearchMode,
    /// Spatial blend weight (hybrid only).
    pub weight: f32,
    /// WKB query coordinate (hybrid only).
    pub query_coordinate: Vec<u8>,
}

/// An ORDER-BY sort expression as handed down by the query layer: either
/// the distance call itself, or a weighted addition wrapping one.
#[derive(Debug, Clone)]
pub enum SortExpr {
    /// `distance(col, q)`
    Distance(DistanceCall),
    /// `distance(col, q) + weight * st_distance(coord, q_coord)`
    WeightedAdd(DistanceCall),
}

/// Per-query state and result cursor.
pub struct SearchSession<'q, T: Transaction> {
    buffer: Vec<f32>,
    search_mode: SearchMode,
    metric: Metric,
    limit: usize,
    nprobe: usize,
    weight: f32,
    query_coordinate: Vec<u8>,
    cancel: CancelFlag,
    results: Vec<ResultRow>,
    pos: usize,
    scan: Option<ListScan<'q, T>>,
}

impl<'q, T: Transaction> SearchSession<'q, T> {
    /// Initialize a session from the ORDER-BY expression, unwrapping the
    /// distance call out of a weighted addition. The weight and query
    /// coordinate are only taken up for hybrid queries.
    #[must_use]
    pub fn from_order_by(expr: &SortExpr) -> Self {
        let (SortExpr::Distance(call) | SortExpr::WeightedAdd(call)) = expr;
        let (weight, query_coordinate) = if call.search_mode == SearchMode::KnnHybrid {
            (call.weight, call.query_coordinate.clone())
        } else {
            (0.0, Vec::new())
        };
        Self {
            buffer: call.query_vector.clone(),
            search_mode: call.search_mode,
            metric: call.metric,
            limit: call.limit,
            nprobe: call.nprobe,
            weight,
            query_coordinate,
            cancel: CancelFlag::new(),
            results: Vec::new(),
            pos: 0,
            scan: None,
        }
    }

    /// Attach a cancellation flag shared with the caller.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// The session's cancellation flag.
    #[must_use]
    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Zero-pad a short query vector to the index dimension; reject a
    /// longer one.
    fn normalize_query(&mut self, dimension: usize) -> VectorResult<()> {
        if self.buffer.len() < dimension {
            self.buffer.resize(dimension, 0.0);
        } else if self.buffer.len() > dimension {
            tracing::warn!(
                query_dimension = self.buffer.len(),
                index_dimension = dimension,
                "query vector dimension is too big for vector index"
            );
            return Err(VectorError::OutOfRange(format!(
                "query vector of dimension {} against index dimension {dimension}",
                self.buffer.len()
            )));
        }
        Ok(())
    }

    fn reset_results(&mut self) {
        self.results.clear();
        self.pos = 0;
        self.scan = None;
    }

    /// Run the query against an index, dispatching on the search mode.
    ///
    /// # Errors
    ///
    /// Engine failures pass through; `Unsupported` from a variant's
    /// preferred entry point triggers the documented fallback before
    /// surfacing.
    pub fn search(
        &mut self,
        tx: &'q T,
        index: &VectorIndex,
        filter: Option<PushdownFilter<'q>>,
    ) -> VectorResult<()> {
        match self.search_mode {
            SearchMode::KnnFirst => self.knn_search(tx, index, filter),
            SearchMode::KnnHybrid => self.knn_search_hybrid(tx, index, filter),
            SearchMode::IndexScan => self.index_scan(tx, index, filter),
        }
    }

    fn knn_search(
        &mut self,
        tx: &'q T,
        index: &VectorIndex,
        filter: Option<PushdownFilter<'q>>,
    ) -> VectorResult<()> {
        self.reset_results();
        if self.buffer.is_empty() || self.limit == 0 {
            return Ok(());
        }
        self.normalize_query(index.dimension())?;

        let params = SearchParams::knn(self.metric, self.limit, self.nprobe);
        let rows =
            match index.knn_search_with_value(tx, &self.buffer, &params, filter, &self.cancel) {
                Err(VectorError::Unsupported(_)) => {
                    index.knn_search(tx, &self.buffer, &params, filter, &self.cancel)?
                }
                other => other?,
            };
        self.results = rows;
        Ok(())
    }

    fn knn_search_hybrid(
        &mut self,
        tx: &'q T,
        index: &VectorIndex,
        filter: Option<PushdownFilter<'q>>,
    ) -> VectorResult<()> {
        self.reset_results();
        if self.buffer.is_empty() || self.limit == 0 {
            return Ok(());
        }
        self.normalize_query(index.dimension())?;

        let params = SearchParams {
            metric: self.metric,
            k: self.limit.saturating_mul(HYBRID_K_FACTOR),
            nprobe: self.nprobe,
            weight: self.weight,
            query_coordinate: self.query_coordinate.clone(),
        };
        let mut rows =
            index.knn_search_hybrid_with_value(tx, &self.buffer, &params, filter, &self.cancel)?;
        rows.truncate(self.limit);
        self.results = rows;
        Ok(())
    }

    fn index_scan(
        &mut self,
        tx: &'q T,
        index: &VectorIndex,
        filter: Option<PushdownFilter<'q>>,
    ) -> VectorResult<()> {
        self.reset_results();
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.normalize_query(index.dimension())?;

        let ctx = ScanContext::new(self.cancel.clone(), filter);
        match index.index_scan(tx, &self.buffer, self.nprobe, ctx) {
            Ok(scan) => {
                self.scan = Some(scan);
                Ok(())
            }
            Err(VectorError::Unsupported(_)) => {
                self.results =
                    index.index_scan_with_value(tx, &self.buffer, self.nprobe, &self.cancel)?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Whether the cursor has a row to read.
    ///
    /// # Errors
    ///
    /// Streaming scans surface their failures here.
    pub fn has_more_results(&mut self) -> VectorResult<bool> {
        match &mut self.scan {
            Some(scan) => scan.is_available(),
            None => Ok(self.pos < self.results.len()),
        }
    }

    /// Step the cursor forward.
    ///
    /// # Errors
    ///
    /// Streaming scans surface their failures here.
    pub fn next_result(&mut self) -> VectorResult<()> {
        if !self.has_more_results()? {
            return Ok(());
        }
        match &mut self.scan {
            Some(scan) => scan.next(),
            None => {
                self.pos += 1;
                Ok(())
            }
        }
    }

    /// Key bytes of the current row.
    ///
    /// # Errors
    ///
    /// `Internal` when the cursor is past the end.
    pub fn current_key(&self) -> VectorResult<Vec<u8>> {
        match &self.scan {
            Some(scan) => scan.key(),
            None => self
                .results
                .get(self.pos)
                .map(|row| row.key.clone())
                .ok_or_else(|| VectorError::Internal("result cursor past end".to_string())),
        }
    }

    /// Score of the current row; streaming scans carry none.
    #[must_use]
    pub fn current_score(&self) -> Option<f32> {
        if self.scan.is_some() {
            return None;
        }
        self.results.get(self.pos).map(|row| row.score)
    }

    /// Row value bytes of the current row.
    ///
    /// # Errors
    ///
    /// `Unsupported` when the entry point did not materialize values.
    pub fn current_value(&self) -> VectorResult<Vec<u8>> {
        if self.scan.is_some() {
            return Err(VectorError::Unsupported("current_value"));
        }
        self.results
            .get(self.pos)
            .ok_or_else(|| VectorError::Internal("result cursor past end".to_string()))?
            .value
            .clone()
            .ok_or(VectorError::Unsupported("current_value"))
    }

    /// End the query: clear buffers, results, and the scan cursor.
    pub fn end(&mut self) {
        self.buffer.clear();
        self.query_coordinate.clear();
        self.limit = 0;
        self.nprobe = 0;
        self.weight = 0.0;
        self.reset_results();
    }
}
