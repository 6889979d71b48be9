//! End-to-end search scenarios over the in-memory engine: index build,
//! write path, and the session cursor together.

use meridian_storage::backends::MemoryEngine;
use meridian_storage::{StorageEngine, Transaction};

use meridian_vector::distance::Metric;
use meridian_vector::encoding::row::{FieldDescriptor, FieldKind, RowLayout};
use meridian_vector::encoding::{encode_entry_key, encode_f64_array, encode_point, encode_row};
use meridian_vector::index::create_index;
use meridian_vector::store::{
    put_entry, PushdownFilter, RowImage, RowPredicate, SecondaryKeyDescriptor,
};
use meridian_vector::{
    CancelFlag, DistanceCall, IndexConfig, IndexData, IndexId, IndexType, SearchMode,
    SearchSession, SortExpr, VectorError, VectorIndex,
};

const CF: &str = "vectors";
const INDEX: IndexId = IndexId::new(1);
const PK_INDEX: IndexId = IndexId::new(9);

fn pk(suffix: &[u8]) -> Vec<u8> {
    [&PK_INDEX.as_u32().to_be_bytes()[..], suffix].concat()
}

fn knn_expr(query: Vec<f32>, limit: usize, nprobe: usize) -> SortExpr {
    SortExpr::Distance(DistanceCall {
        metric: Metric::L2,
        query_vector: query,
        limit,
        nprobe,
        search_mode: SearchMode::KnnFirst,
        weight: 0.0,
        query_coordinate: Vec::new(),
    })
}

fn insert_vectors(engine: &MemoryEngine, index: &VectorIndex, rows: &[(&[u8], Vec<f32>)]) {
    let mut tx = engine.begin_write().unwrap();
    for (suffix, vector) in rows {
        let assignment = index.assign(vector).unwrap();
        put_entry(&mut tx, CF, INDEX, &assignment, &pk(suffix), &[]).unwrap();
    }
    tx.commit().unwrap();
}

struct PkIn(Vec<Vec<u8>>);

impl RowPredicate for PkIn {
    fn matches(&self, row: &RowImage) -> Result<bool, VectorError> {
        Ok(self.0.iter().any(|pk| pk == &row.pk))
    }
}

#[test]
fn flat_l2_top_two() {
    let engine = MemoryEngine::new();
    let index = create_index(IndexConfig::new(IndexType::Flat, 2), CF, INDEX, None, None).unwrap();
    insert_vectors(
        &engine,
        &index,
        &[(b"a", vec![0.0, 0.0]), (b"b", vec![1.0, 0.0]), (b"c", vec![0.0, 3.0])],
    );

    let tx = engine.begin_read().unwrap();
    let mut session = SearchSession::from_order_by(&knn_expr(vec![0.0, 0.0], 2, 1));
    session.search(&tx, &index, None).unwrap();

    let mut rows = Vec::new();
    while session.has_more_results().unwrap() {
        rows.push((session.current_key().unwrap(), session.current_score().unwrap()));
        session.next_result().unwrap();
    }
    assert_eq!(rows.len(), 2);
    assert_eq!(&rows[0].0[12..], b"a");
    assert_eq!(rows[0].1, 0.0);
    assert_eq!(&rows[1].0[12..], b"b");
    assert_eq!(rows[1].1, 1.0);
}

#[test]
fn ivf_flat_with_pushdown_predicate() {
    let engine = MemoryEngine::new();
    let data = IndexData::flat(2, 2, vec![0.0, 0.0, 10.0, 10.0]);
    let index =
        create_index(IndexConfig::new(IndexType::IvfFlat, 2), CF, INDEX, Some(&data), None)
            .unwrap();
    insert_vectors(
        &engine,
        &index,
        &[
            (b"a", vec![0.0, 0.0]),
            (b"b", vec![1.0, 1.0]),
            (b"c", vec![10.0, 10.0]),
            (b"d", vec![11.0, 11.0]),
        ],
    );

    let descriptor = SecondaryKeyDescriptor { pk_index_id: PK_INDEX };
    let keep = PkIn(vec![pk(b"a"), pk(b"c"), pk(b"d")]);
    let filter = PushdownFilter { unpacker: &descriptor, predicate: &keep };

    let tx = engine.begin_read().unwrap();
    let mut session = SearchSession::from_order_by(&knn_expr(vec![0.0, 0.0], 3, 2));
    session.search(&tx, &index, Some(filter)).unwrap();

    let mut rows = Vec::new();
    while session.has_more_results().unwrap() {
        rows.push((session.current_key().unwrap(), session.current_score().unwrap()));
        session.next_result().unwrap();
    }
    let suffixes: Vec<&[u8]> = rows.iter().map(|(key, _)| &key[12..]).collect();
    assert_eq!(suffixes, vec![&b"a"[..], &b"c"[..], &b"d"[..]]);
    assert_eq!(rows[0].1, 0.0);
    assert_eq!(rows[1].1, 200.0);
    assert_eq!(rows[2].1, 242.0);
}

#[test]
fn ivf_pq_corrupt_value_terminates_query() {
    let engine = MemoryEngine::new();
    // 4-dim vectors, 2 subquantizers of 4 centroids: code_size is 2
    let mut pq_centroids = Vec::new();
    for segment in 0..2 {
        for idx in 0..4 {
            let base = (segment * 4 + idx) as f32;
            pq_centroids.extend_from_slice(&[base, base]);
        }
    }
    let data = IndexData {
        dimension: 4,
        nlist: 1,
        centroids: vec![0.0; 4],
        pq_m: 2,
        pq_nbits: 2,
        pq_centroids,
    };
    let index =
        create_index(IndexConfig::new(IndexType::IvfPq, 4), CF, INDEX, Some(&data), None).unwrap();

    // a value one byte shorter than code_size
    let mut tx = engine.begin_write().unwrap();
    let key = encode_entry_key(INDEX, 0, b"bad");
    tx.put(CF, &key, &[0u8]).unwrap();
    tx.commit().unwrap();

    let tx = engine.begin_read().unwrap();
    let mut session = SearchSession::from_order_by(&knn_expr(vec![0.0; 4], 1, 1));
    assert!(matches!(
        session.search(&tx, &index, None),
        Err(VectorError::CorruptData(_))
    ));
    assert!(!session.has_more_results().unwrap());
}

#[test]
fn lsm_hybrid_blends_great_circle_distance() {
    let engine = MemoryEngine::new();
    let layout = RowLayout::new(vec![
        FieldDescriptor::variable(FieldKind::Geometry, 4),
        FieldDescriptor::variable(FieldKind::Json, 2),
    ]);
    let index = create_index(
        IndexConfig::new(IndexType::Lsm, 2),
        CF,
        INDEX,
        None,
        Some(layout.clone()),
    )
    .unwrap();

    let rows: [(&[u8], (f64, f64), Vec<f64>); 2] = [
        (b"r1", (0.0, 0.0), vec![1.0, 0.0]),
        (b"r2", (0.0, 1.0), vec![0.0, 0.0]),
    ];
    let mut tx = engine.begin_write().unwrap();
    for (suffix, (lon, lat), vector) in &rows {
        let point = encode_point(*lon, *lat);
        let array = encode_f64_array(vector);
        let value = encode_row(&layout, &[Some(&point), Some(&array)]).unwrap();
        let key = [&INDEX.as_u32().to_be_bytes()[..], *suffix].concat();
        tx.put(CF, &key, &value).unwrap();
    }
    tx.commit().unwrap();

    let expr = SortExpr::WeightedAdd(DistanceCall {
        metric: Metric::L2,
        query_vector: vec![0.0, 0.0],
        limit: 2,
        nprobe: 1,
        search_mode: SearchMode::KnnHybrid,
        weight: 1e-5,
        query_coordinate: encode_point(0.0, 0.0),
    });
    let tx = engine.begin_read().unwrap();
    let mut session = SearchSession::from_order_by(&expr);
    session.search(&tx, &index, None).unwrap();

    let mut rows = Vec::new();
    while session.has_more_results().unwrap() {
        rows.push((
            session.current_key().unwrap(),
            session.current_score().unwrap(),
            session.current_value().unwrap(),
        ));
        session.next_result().unwrap();
    }
    assert_eq!(rows.len(), 2);
    // r1: vector distance 1, no spatial penalty
    assert_eq!(&rows[0].0[4..], b"r1");
    assert!((rows[0].1 - 1.0).abs() < 1e-6);
    // r2: one degree of latitude at 1e-5 weight
    assert_eq!(&rows[1].0[4..], b"r2");
    assert!((rows[1].1 - 1.111_95).abs() < 1e-3, "got {}", rows[1].1);
    assert!(!rows[1].2.is_empty());
}

#[test]
fn cancellation_mid_scan_interrupts() {
    let engine = MemoryEngine::new();
    let index = create_index(IndexConfig::new(IndexType::Flat, 2), CF, INDEX, None, None).unwrap();
    insert_vectors(
        &engine,
        &index,
        &[(b"a", vec![0.0, 0.0]), (b"b", vec![1.0, 0.0]), (b"c", vec![2.0, 0.0])],
    );

    let expr = SortExpr::Distance(DistanceCall {
        metric: Metric::L2,
        query_vector: vec![0.0, 0.0],
        limit: 3,
        nprobe: 1,
        search_mode: SearchMode::IndexScan,
        weight: 0.0,
        query_coordinate: Vec::new(),
    });
    let cancel = CancelFlag::new();
    let tx = engine.begin_read().unwrap();
    let mut session = SearchSession::from_order_by(&expr).with_cancel(cancel.clone());
    session.search(&tx, &index, None).unwrap();

    // consume one row, then cancel
    assert!(session.has_more_results().unwrap());
    session.current_key().unwrap();
    cancel.cancel();
    assert!(matches!(session.next_result(), Err(VectorError::Interrupted)));
}

#[test]
fn cancellation_before_first_row_yields_no_partial_output() {
    let engine = MemoryEngine::new();
    let index = create_index(IndexConfig::new(IndexType::Flat, 2), CF, INDEX, None, None).unwrap();
    insert_vectors(&engine, &index, &[(b"a", vec![0.0, 0.0])]);

    let cancel = CancelFlag::new();
    cancel.cancel();
    let tx = engine.begin_read().unwrap();
    let mut session =
        SearchSession::from_order_by(&knn_expr(vec![0.0, 0.0], 1, 1)).with_cancel(cancel);
    assert!(matches!(session.search(&tx, &index, None), Err(VectorError::Interrupted)));
    assert!(!session.has_more_results().unwrap());
}

#[test]
fn short_query_matches_explicitly_padded_query() {
    let engine = MemoryEngine::new();
    let index = create_index(IndexConfig::new(IndexType::Flat, 4), CF, INDEX, None, None).unwrap();
    insert_vectors(
        &engine,
        &index,
        &[
            (b"a", vec![1.0, 2.0, 0.0, 0.0]),
            (b"b", vec![1.0, 2.0, 4.0, 4.0]),
            (b"c", vec![0.0, 0.0, 0.0, 1.0]),
        ],
    );

    let tx = engine.begin_read().unwrap();

    let mut short = SearchSession::from_order_by(&knn_expr(vec![1.0, 2.0], 3, 1));
    short.search(&tx, &index, None).unwrap();
    let mut short_rows = Vec::new();
    while short.has_more_results().unwrap() {
        short_rows.push((short.current_key().unwrap(), short.current_score().unwrap()));
        short.next_result().unwrap();
    }

    let mut padded = SearchSession::from_order_by(&knn_expr(vec![1.0, 2.0, 0.0, 0.0], 3, 1));
    padded.search(&tx, &index, None).unwrap();
    let mut padded_rows = Vec::new();
    while padded.has_more_results().unwrap() {
        padded_rows.push((padded.current_key().unwrap(), padded.current_score().unwrap()));
        padded.next_result().unwrap();
    }

    assert_eq!(short_rows, padded_rows);
    assert_eq!(&short_rows[0].0[12..], b"a");
}

#[test]
fn write_side_assignment_is_nearest_centroid() {
    let data = IndexData::flat(2, 3, vec![0.0, 0.0, 10.0, 10.0, 0.0, 20.0]);
    let index =
        create_index(IndexConfig::new(IndexType::IvfFlat, 2), CF, INDEX, Some(&data), None)
            .unwrap();

    for (vector, expected) in [
        (vec![1.0f32, 1.0], 0u64),
        (vec![9.0, 9.0], 1),
        (vec![-1.0, 19.0], 2),
    ] {
        assert_eq!(index.assign(&vector).unwrap().list_id, expected);
    }
}

#[test]
fn analyze_then_dump_info_reports_list_stats() {
    let engine = MemoryEngine::new();
    let data = IndexData::flat(2, 2, vec![0.0, 0.0, 10.0, 10.0]);
    let index =
        create_index(IndexConfig::new(IndexType::IvfFlat, 2), CF, INDEX, Some(&data), None)
            .unwrap();
    insert_vectors(
        &engine,
        &index,
        &[
            (b"a", vec![0.0, 0.0]),
            (b"b", vec![1.0, 1.0]),
            (b"c", vec![2.0, 2.0]),
            (b"d", vec![10.0, 10.0]),
        ],
    );

    let tx = engine.begin_read().unwrap();
    index.analyze(&tx, 0, &CancelFlag::new()).unwrap();
    let info = index.dump_info();
    assert_eq!(info.ntotal, 4);
    assert_eq!(info.nlist, 2);
    assert_eq!(info.min_list_size, 1);
    assert_eq!(info.max_list_size, 3);
    assert_eq!(info.code_size, 8);
}
