//! Geospatial range scan.
//!
//! A parallel structure to the vector path for pure MBR queries: the
//! index region is range-scanned with the same key-layout conventions,
//! each row's stored point is decoded with the WKB offsets the hybrid
//! scorer uses, and matching `(key, value)` pairs are emitted unranked.

use meridian_storage::{Cursor, Transaction};

use crate::encoding::keys::region_bounds;
use crate::encoding::row::RowLayout;
use crate::encoding::{decode_fields, decode_point};
use crate::error::{VectorError, VectorResult};
use crate::index::IndexStats;
use crate::types::{CancelFlag, IndexId};

use serde::Serialize;

/// Minimum bounding rectangle over `(lon, lat)` coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mbr {
    /// West edge.
    pub x_min: f64,
    /// East edge.
    pub x_max: f64,
    /// South edge.
    pub y_min: f64,
    /// North edge.
    pub y_max: f64,
}

impl Mbr {
    /// Create a rectangle from its edges.
    #[must_use]
    pub const fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Self { x_min, x_max, y_min, y_max }
    }

    /// Whether a point lies inside the rectangle (edges inclusive).
    #[must_use]
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.x_min && lon <= self.x_max && lat >= self.y_min && lat <= self.y_max
    }
}

/// Parameters of one spatial range search.
#[derive(Debug, Clone, Copy)]
pub struct SpatialRangeParams {
    /// Distance bound the caller derived the MBR from; carried for
    /// diagnostics, the MBR does the filtering.
    pub distance: f64,
    /// Result cap; zero means unbounded.
    pub batch_size: usize,
}

/// Introspection counters of a spatial index.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SpatialIndexInfo {
    /// Approximate number of rows, from the last scan.
    pub ntotal: i64,
    /// Number of range searches served.
    pub hit: u64,
}

/// Spatial index over an index region whose rows carry a geometry
/// column.
pub struct SpatialIndex {
    index_id: IndexId,
    cf: String,
    layout: RowLayout,
    stats: IndexStats,
}

impl SpatialIndex {
    /// Attach a spatial index to a column family.
    #[must_use]
    pub fn new(index_id: IndexId, cf: impl Into<String>, layout: RowLayout) -> Self {
        Self { index_id, cf: cf.into(), layout, stats: IndexStats::new(0) }
    }

    /// The index id.
    #[must_use]
    pub fn index_id(&self) -> IndexId {
        self.index_id
    }

    /// Scan the region and collect `(key, value)` pairs whose stored
    /// point lies inside the MBR, up to `batch_size` when non-zero.
    /// No ranking.
    ///
    /// # Errors
    ///
    /// `Interrupted` on cancellation, `CorruptData` when a row's
    /// geometry column does not decode, `Internal` when the layout has
    /// no geometry column.
    pub fn range_search<T: Transaction>(
        &self,
        tx: &T,
        mbr: &Mbr,
        params: &SpatialRangeParams,
        cancel: &CancelFlag,
    ) -> VectorResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.stats.record_hit();
        let spatial_field = self.layout.spatial_field_index().ok_or_else(|| {
            VectorError::Internal(format!(
                "index {} column family has no spatial column",
                self.index_id
            ))
        })?;

        let (lower, upper) = region_bounds(self.index_id);
        let mut cursor = tx.range(&self.cf, &lower, &upper)?;

        let mut results = Vec::new();
        let mut keys_scanned = 0i64;
        while let Some((key, value)) = cursor.next()? {
            if cancel.is_cancelled() {
                return Err(VectorError::Interrupted);
            }
            keys_scanned += 1;
            if value.is_empty() {
                continue;
            }
            let fields = decode_fields(&value, &self.layout, &[spatial_field])?;
            let (lon, lat) = decode_point(fields[0])?;
            if mbr.contains(lon, lat) {
                results.push((key, value));
                if params.batch_size > 0 && results.len() >= params.batch_size {
                    break;
                }
            }
        }
        self.stats.set_ntotal(keys_scanned);
        Ok(results)
    }

    /// Introspection snapshot.
    #[must_use]
    pub fn dump_info(&self) -> SpatialIndexInfo {
        SpatialIndexInfo { ntotal: self.stats.ntotal(), hit: self.stats.hit() }
    }
}

/// Per-handler cursor over one spatial range search, mirroring the
/// vector session's protocol.
#[derive(Debug, Default)]
pub struct SpatialHandler {
    results: Vec<(Vec<u8>, Vec<u8>)>,
    pos: usize,
}

impl SpatialHandler {
    /// Create an empty handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a range search and load its results into the cursor.
    ///
    /// # Errors
    ///
    /// Propagates [`SpatialIndex::range_search`] failures.
    pub fn range_search<T: Transaction>(
        &mut self,
        tx: &T,
        index: &SpatialIndex,
        mbr: &Mbr,
        params: &SpatialRangeParams,
        cancel: &CancelFlag,
    ) -> VectorResult<()> {
        self.results = index.range_search(tx, mbr, params, cancel)?;
        self.pos = 0;
        Ok(())
    }

    /// Whether the cursor has a row to read.
    #[must_use]
    pub fn has_more_results(&self) -> bool {
        self.pos < self.results.len()
    }

    /// Step the cursor forward.
    pub fn next_result(&mut self) {
        if self.has_more_results() {
            self.pos += 1;
        }
    }

    /// Key bytes of the current row.
    ///
    /// # Errors
    ///
    /// `Internal` when the cursor is past the end.
    pub fn current_key(&self) -> VectorResult<Vec<u8>> {
        self.results
            .get(self.pos)
            .map(|(key, _)| key.clone())
            .ok_or_else(|| VectorError::Internal("spatial cursor past end".to_string()))
    }

    /// Value bytes of the current row.
    ///
    /// # Errors
    ///
    /// `Internal` when the cursor is past the end.
    pub fn current_value(&self) -> VectorResult<Vec<u8>> {
        self.results
            .get(self.pos)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| VectorError::Internal("spatial cursor past end".to_string()))
    }

    /// End the query and clear the cursor.
    pub fn end(&mut self) {
        self.results.clear();
        self.pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use meridian_storage::backends::MemoryEngine;
    use meridian_storage::StorageEngine;

    use super::*;
    use crate::encoding::row::{FieldDescriptor, FieldKind};
    use crate::encoding::{encode_point, encode_row};

    const CF: &str = "places";
    const INDEX: IndexId = IndexId::new(6);

    fn layout() -> RowLayout {
        RowLayout::new(vec![
            FieldDescriptor::fixed(2),
            FieldDescriptor::variable(FieldKind::Geometry, 4),
        ])
    }

    fn seed(engine: &MemoryEngine, rows: &[(&[u8], (f64, f64))]) {
        let layout = layout();
        let mut tx = engine.begin_write().unwrap();
        for (suffix, (lon, lat)) in rows {
            let point = encode_point(*lon, *lat);
            let value = encode_row(&layout, &[Some(&[7, 7]), Some(&point)]).unwrap();
            let key = [&INDEX.as_u32().to_be_bytes()[..], *suffix].concat();
            tx.put(CF, &key, &value).unwrap();
        }
        tx.commit().unwrap();
    }

    fn params() -> SpatialRangeParams {
        SpatialRangeParams { distance: 0.0, batch_size: 0 }
    }

    #[test]
    fn emits_only_points_inside_the_mbr() {
        let engine = MemoryEngine::new();
        let index = SpatialIndex::new(INDEX, CF, layout());
        seed(
            &engine,
            &[
                (b"in1", (1.0, 1.0)),
                (b"out", (10.0, 10.0)),
                (b"in2", (2.0, -1.0)),
            ],
        );

        let tx = engine.begin_read().unwrap();
        let mbr = Mbr::new(0.0, 5.0, -2.0, 2.0);
        let rows = index.range_search(&tx, &mbr, &params(), &CancelFlag::new()).unwrap();

        let mut suffixes: Vec<Vec<u8>> = rows.iter().map(|(k, _)| k[4..].to_vec()).collect();
        suffixes.sort();
        assert_eq!(suffixes, vec![b"in1".to_vec(), b"in2".to_vec()]);
        assert_eq!(index.dump_info().ntotal, 3);
    }

    #[test]
    fn batch_size_caps_results() {
        let engine = MemoryEngine::new();
        let index = SpatialIndex::new(INDEX, CF, layout());
        seed(&engine, &[(b"a", (0.0, 0.0)), (b"b", (0.1, 0.1)), (b"c", (0.2, 0.2))]);

        let tx = engine.begin_read().unwrap();
        let mbr = Mbr::new(-1.0, 1.0, -1.0, 1.0);
        let capped = SpatialRangeParams { distance: 0.0, batch_size: 2 };
        let rows = index.range_search(&tx, &mbr, &capped, &CancelFlag::new()).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn mbr_edges_are_inclusive() {
        let mbr = Mbr::new(0.0, 1.0, 0.0, 1.0);
        assert!(mbr.contains(0.0, 1.0));
        assert!(mbr.contains(1.0, 0.0));
        assert!(!mbr.contains(1.0001, 0.5));
    }

    #[test]
    fn handler_cursor_walks_results() {
        let engine = MemoryEngine::new();
        let index = SpatialIndex::new(INDEX, CF, layout());
        seed(&engine, &[(b"a", (0.0, 0.0)), (b"b", (0.5, 0.5))]);

        let tx = engine.begin_read().unwrap();
        let mbr = Mbr::new(-1.0, 1.0, -1.0, 1.0);
        let mut handler = SpatialHandler::new();
        handler.range_search(&tx, &index, &mbr, &params(), &CancelFlag::new()).unwrap();

        let mut count = 0;
        while handler.has_more_results() {
            assert!(handler.current_key().is_ok());
            assert!(handler.current_value().is_ok());
            handler.next_result();
            count += 1;
        }
        assert_eq!(count, 2);

        handler.end();
        assert!(!handler.has_more_results());
        assert!(handler.current_key().is_err());
    }

    #[test]
    fn cancellation_interrupts_the_scan() {
        let engine = MemoryEngine::new();
        let index = SpatialIndex::new(INDEX, CF, layout());
        seed(&engine, &[(b"a", (0.0, 0.0))]);

        let cancel = CancelFlag::new();
        cancel.cancel();
        let tx = engine.begin_read().unwrap();
        let mbr = Mbr::new(-1.0, 1.0, -1.0, 1.0);
        assert!(matches!(
            index.range_search(&tx, &mbr, &params(), &cancel),
            Err(VectorError::Interrupted)
        ));
    }

    #[test]
    fn corrupt_geometry_aborts() {
        let engine = MemoryEngine::new();
        let index = SpatialIndex::new(INDEX, CF, layout());
        let layout = layout();
        let value = encode_row(&layout, &[Some(&[7, 7]), Some(b"short")]).unwrap();
        let key = [&INDEX.as_u32().to_be_bytes()[..], b"bad"].concat();
        let mut tx = engine.begin_write().unwrap();
        tx.put(CF, &key, &value).unwrap();
        tx.commit().unwrap();

        let tx = engine.begin_read().unwrap();
        let mbr = Mbr::new(-1.0, 1.0, -1.0, 1.0);
        assert!(matches!(
            index.range_search(&tx, &mbr, &params(), &CancelFlag::new()),
            Err(VectorError::CorruptData(_))
        ));
    }
}
