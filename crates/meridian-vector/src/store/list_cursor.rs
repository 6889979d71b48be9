//! Cursors over inverted lists.
//!
//! [`ListCursor`] walks one `(index_id, list_id)` key range, validating
//! every entry and applying the pushed-down predicate before a record
//! becomes visible. Availability is a pure check; advancing is explicit,
//! moving the cursor Start → Ready/Done and Ready → Ready/Done. Errors
//! park the cursor in Done and surface on the advancing call.
//!
//! [`ListScan`] chains the cursors of the probed lists for index-scan
//! mode, which streams keys without computing distances.

use meridian_storage::{Cursor, Transaction};

use crate::encoding::keys::{decode_entry_key, list_lower_bound, list_upper_bound};
use crate::error::{VectorError, VectorResult};
use crate::types::IndexId;

use super::{split_entry_value, ScanContext};

enum CursorState {
    /// Before the first advance.
    Start,
    /// Positioned on a validated, filter-passing record.
    Ready,
    /// Exhausted or failed.
    Done,
}

/// Forward cursor over one inverted list.
pub struct ListCursor<C: Cursor> {
    cursor: C,
    index_id: IndexId,
    list_id: u64,
    code_size: usize,
    state: CursorState,
}

impl<C: Cursor> ListCursor<C> {
    /// Wrap a storage cursor already bounded to the list's key range.
    #[must_use]
    pub fn new(cursor: C, index_id: IndexId, list_id: u64, code_size: usize) -> Self {
        Self { cursor, index_id, list_id, code_size, state: CursorState::Start }
    }

    /// The list this cursor iterates.
    #[must_use]
    pub fn list_id(&self) -> u64 {
        self.list_id
    }

    /// Whether the cursor is positioned on a visible record.
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self.state, CursorState::Ready)
    }

    /// Advance to the next record that passes validation and the pushed
    /// down predicate. Returns `false` at the clean end of the list, where
    /// the observed list size is recorded into the context.
    ///
    /// # Errors
    ///
    /// `Interrupted` when the query's cancellation flag is set,
    /// `CorruptData` for an entry that fails validation, `Query` when the
    /// predicate fails. Any error parks the cursor.
    pub fn advance(&mut self, ctx: &mut ScanContext<'_>) -> VectorResult<bool> {
        loop {
            if ctx.cancel.is_cancelled() {
                self.state = CursorState::Done;
                return Err(VectorError::Interrupted);
            }

            let Some((key, value)) = self.cursor.next()? else {
                self.state = CursorState::Done;
                ctx.on_list_end(self.list_id);
                return Ok(false);
            };

            if let Err(err) = decode_entry_key(&key, self.index_id, self.list_id) {
                self.state = CursorState::Done;
                tracing::warn!(
                    index_id = self.index_id.as_u32(),
                    list_id = self.list_id,
                    "invalid entry key in inverted list"
                );
                return Err(err);
            }

            if let Some(filter) = ctx.filter {
                let entry =
                    match split_entry_value(&value, self.code_size, self.index_id, self.list_id) {
                        Ok(entry) => entry,
                        Err(err) => {
                            self.state = CursorState::Done;
                            return Err(err);
                        }
                    };
                let row = match filter.unpacker.unpack(&key, &entry.without_codes()) {
                    Ok(row) => row,
                    Err(err) => {
                        self.state = CursorState::Done;
                        return Err(err);
                    }
                };
                match filter.predicate.matches(&row) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(err) => {
                        self.state = CursorState::Done;
                        return Err(err);
                    }
                }
            }

            self.state = CursorState::Ready;
            return Ok(true);
        }
    }

    fn current(&self) -> VectorResult<(&[u8], &[u8])> {
        if !self.is_available() {
            return Err(VectorError::Internal(format!(
                "list cursor read past end in index {}, list {}",
                self.index_id, self.list_id
            )));
        }
        self.cursor.current().ok_or_else(|| {
            VectorError::Internal(format!(
                "list cursor lost its position in index {}, list {}",
                self.index_id, self.list_id
            ))
        })
    }

    /// The current record's codes, tallying it into the observed list
    /// size.
    ///
    /// # Errors
    ///
    /// `CorruptData` when the value cannot hold `code_size` code bytes or
    /// carries an unknown tag; `Internal` when no record is available.
    pub fn codes(&self, ctx: &mut ScanContext<'_>) -> VectorResult<&[u8]> {
        let (_, value) = self.current()?;
        let entry = split_entry_value(value, self.code_size, self.index_id, self.list_id)?;
        ctx.on_record();
        Ok(entry.codes)
    }

    /// The current record's key and, when requested, its value with the
    /// codes spliced out.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`ListCursor::codes`].
    pub fn key_and_value(&self, need_value: bool) -> VectorResult<(Vec<u8>, Vec<u8>)> {
        let (key, value) = self.current()?;
        if !need_value {
            return Ok((key.to_vec(), Vec::new()));
        }
        let entry = split_entry_value(value, self.code_size, self.index_id, self.list_id)?;
        Ok((key.to_vec(), entry.without_codes()))
    }
}

/// Open one list's key range on a transaction and wrap it in a cursor.
///
/// # Errors
///
/// Returns `Storage` if the scan cannot be opened.
pub fn open_list_cursor<'t, T: Transaction>(
    tx: &'t T,
    cf: &str,
    index_id: IndexId,
    list_id: u64,
    code_size: usize,
) -> VectorResult<ListCursor<T::Cursor<'t>>> {
    let lower = list_lower_bound(index_id, list_id);
    let upper = list_upper_bound(index_id, list_id);
    let cursor = tx.range(cf, &lower, &upper)?;
    Ok(ListCursor::new(cursor, index_id, list_id, code_size))
}

/// Streaming iterator over the concatenation of the probed lists.
pub struct ListScan<'q, T: Transaction> {
    tx: &'q T,
    cf: String,
    index_id: IndexId,
    code_size: usize,
    list_ids: Vec<u64>,
    next_list: usize,
    current: Option<ListCursor<T::Cursor<'q>>>,
    ctx: ScanContext<'q>,
}

impl<'q, T: Transaction> ListScan<'q, T> {
    /// Create a scan over `list_ids` in probe order.
    #[must_use]
    pub fn new(
        tx: &'q T,
        cf: impl Into<String>,
        index_id: IndexId,
        code_size: usize,
        list_ids: Vec<u64>,
        ctx: ScanContext<'q>,
    ) -> Self {
        Self {
            tx,
            cf: cf.into(),
            index_id,
            code_size,
            list_ids,
            next_list: 0,
            current: None,
            ctx,
        }
    }

    /// Whether a record is available, opening the next list's cursor as
    /// needed.
    ///
    /// # Errors
    ///
    /// Propagates cursor errors; the scan is finished afterwards.
    pub fn is_available(&mut self) -> VectorResult<bool> {
        loop {
            if self.current.as_ref().is_some_and(ListCursor::is_available) {
                return Ok(true);
            }
            let Some(&list_id) = self.list_ids.get(self.next_list) else {
                return Ok(false);
            };
            self.next_list += 1;

            let lower = list_lower_bound(self.index_id, list_id);
            let upper = list_upper_bound(self.index_id, list_id);
            let cursor = self.tx.range(&self.cf, &lower, &upper)?;
            let mut list_cursor =
                ListCursor::new(cursor, self.index_id, list_id, self.code_size);
            list_cursor.advance(&mut self.ctx)?;
            self.current = Some(list_cursor);
        }
    }

    /// Step past the current record.
    ///
    /// # Errors
    ///
    /// Propagates cursor errors.
    pub fn next(&mut self) -> VectorResult<()> {
        if let Some(cursor) = &mut self.current {
            cursor.advance(&mut self.ctx)?;
        }
        Ok(())
    }

    /// The current record's key.
    ///
    /// # Errors
    ///
    /// `Internal` when no record is available.
    pub fn key(&self) -> VectorResult<Vec<u8>> {
        let cursor = self.current.as_ref().ok_or_else(|| {
            VectorError::Internal(format!(
                "index scan read before first record in index {}",
                self.index_id
            ))
        })?;
        Ok(cursor.key_and_value(false)?.0)
    }
}

#[cfg(test)]
mod tests {
    use meridian_storage::backends::MemoryEngine;
    use meridian_storage::StorageEngine;

    use super::*;
    use crate::encoding::encode_entry_key;
    use crate::store::{
        compose_entry_value, PushdownFilter, RowImage, RowPredicate, SecondaryKeyDescriptor,
    };
    use crate::types::CancelFlag;

    const CF: &str = "vectors";
    const INDEX: IndexId = IndexId::new(1);
    const CODE_SIZE: usize = 4;

    struct PkIn(Vec<Vec<u8>>);

    impl RowPredicate for PkIn {
        fn matches(&self, row: &RowImage) -> VectorResult<bool> {
            Ok(self.0.iter().any(|pk| pk == &row.pk))
        }
    }

    fn seed(engine: &MemoryEngine, entries: &[(u64, &[u8], Vec<u8>)]) {
        let mut tx = engine.begin_write().unwrap();
        for (list_id, pk_suffix, value) in entries {
            let key = encode_entry_key(INDEX, *list_id, pk_suffix);
            tx.put(CF, &key, value).unwrap();
        }
        tx.commit().unwrap();
    }

    fn collect_pks<T: Transaction>(
        tx: &T,
        list_id: u64,
        ctx: &mut ScanContext<'_>,
    ) -> VectorResult<Vec<Vec<u8>>> {
        let mut cursor = open_list_cursor(tx, CF, INDEX, list_id, CODE_SIZE)?;
        let mut pks = Vec::new();
        while cursor.advance(ctx)? {
            let (key, _) = cursor.key_and_value(false)?;
            pks.push(key[12..].to_vec());
        }
        Ok(pks)
    }

    #[test]
    fn walks_one_list_in_key_order() {
        let engine = MemoryEngine::new();
        seed(
            &engine,
            &[
                (0, b"b", vec![0; CODE_SIZE]),
                (0, b"a", vec![0; CODE_SIZE]),
                (1, b"c", vec![0; CODE_SIZE]),
            ],
        );

        let tx = engine.begin_read().unwrap();
        let mut ctx = ScanContext::new(CancelFlag::new(), None);
        let pks = collect_pks(&tx, 0, &mut ctx).unwrap();
        assert_eq!(pks, vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(ctx.list_size_stats(), &[(0, 0)]); // codes never read
    }

    #[test]
    fn codes_are_sliced_and_counted() {
        let engine = MemoryEngine::new();
        seed(
            &engine,
            &[
                (0, b"a", vec![1, 2, 3, 4]),
                (0, b"b", compose_entry_value(&[5, 6, 7, 8], b"tail")),
            ],
        );

        let tx = engine.begin_read().unwrap();
        let mut ctx = ScanContext::new(CancelFlag::new(), None);
        let mut cursor = open_list_cursor(&tx, CF, INDEX, 0, CODE_SIZE).unwrap();

        assert!(cursor.advance(&mut ctx).unwrap());
        assert_eq!(cursor.codes(&mut ctx).unwrap(), &[1, 2, 3, 4]);
        assert!(cursor.advance(&mut ctx).unwrap());
        assert_eq!(cursor.codes(&mut ctx).unwrap(), &[5, 6, 7, 8]);
        let (_, stripped) = cursor.key_and_value(true).unwrap();
        assert!(stripped.ends_with(b"tail"));
        assert!(!cursor.advance(&mut ctx).unwrap());
        assert_eq!(ctx.list_size_stats(), &[(0, 2)]);
    }

    #[test]
    fn predicate_skips_rows_before_they_surface() {
        let engine = MemoryEngine::new();
        seed(
            &engine,
            &[
                (0, b"a", vec![0; CODE_SIZE]),
                (0, b"b", vec![0; CODE_SIZE]),
                (0, b"c", vec![0; CODE_SIZE]),
            ],
        );

        let descriptor = SecondaryKeyDescriptor { pk_index_id: IndexId::new(9) };
        let keep = PkIn(vec![
            [&9u32.to_be_bytes()[..], b"a"].concat(),
            [&9u32.to_be_bytes()[..], b"c"].concat(),
        ]);
        let filter = PushdownFilter { unpacker: &descriptor, predicate: &keep };

        let tx = engine.begin_read().unwrap();
        let mut ctx = ScanContext::new(CancelFlag::new(), Some(filter));
        let pks = collect_pks(&tx, 0, &mut ctx).unwrap();
        assert_eq!(pks, vec![b"a".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn cancellation_interrupts_mid_list() {
        let engine = MemoryEngine::new();
        seed(
            &engine,
            &[
                (0, b"a", vec![0; CODE_SIZE]),
                (0, b"b", vec![0; CODE_SIZE]),
                (0, b"c", vec![0; CODE_SIZE]),
            ],
        );

        let cancel = CancelFlag::new();
        let tx = engine.begin_read().unwrap();
        let mut ctx = ScanContext::new(cancel.clone(), None);
        let lower = list_lower_bound(INDEX, 0);
        let upper = list_upper_bound(INDEX, 0);
        let mut cursor =
            ListCursor::new(tx.range(CF, &lower, &upper).unwrap(), INDEX, 0, CODE_SIZE);

        assert!(cursor.advance(&mut ctx).unwrap());
        cancel.cancel();
        assert!(matches!(cursor.advance(&mut ctx), Err(VectorError::Interrupted)));
        assert!(!cursor.is_available());
        // no partial stats for the interrupted list
        assert!(ctx.list_size_stats().is_empty());
    }

    #[test]
    fn short_value_surfaces_corrupt_data() {
        let engine = MemoryEngine::new();
        seed(&engine, &[(0, b"a", vec![0; CODE_SIZE - 1])]);

        let tx = engine.begin_read().unwrap();
        let mut ctx = ScanContext::new(CancelFlag::new(), None);
        let lower = list_lower_bound(INDEX, 0);
        let upper = list_upper_bound(INDEX, 0);
        let mut cursor =
            ListCursor::new(tx.range(CF, &lower, &upper).unwrap(), INDEX, 0, CODE_SIZE);

        assert!(cursor.advance(&mut ctx).unwrap());
        assert!(matches!(cursor.codes(&mut ctx), Err(VectorError::CorruptData(_))));
    }

    #[test]
    fn list_scan_chains_lists_in_probe_order() {
        let engine = MemoryEngine::new();
        seed(
            &engine,
            &[
                (0, b"a", vec![0; CODE_SIZE]),
                (1, b"b", vec![0; CODE_SIZE]),
                (2, b"c", vec![0; CODE_SIZE]),
            ],
        );

        let tx = engine.begin_read().unwrap();
        let ctx = ScanContext::new(CancelFlag::new(), None);
        // probe order 2, 0 - list 1 is never touched
        let mut scan = ListScan::new(&tx, CF, INDEX, CODE_SIZE, vec![2, 0], ctx);

        let mut pks = Vec::new();
        while scan.is_available().unwrap() {
            pks.push(scan.key().unwrap()[12..].to_vec());
            scan.next().unwrap();
        }
        assert_eq!(pks, vec![b"c".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn list_scan_over_empty_lists_is_empty() {
        let engine = MemoryEngine::new();
        let tx = engine.begin_read().unwrap();
        let ctx = ScanContext::new(CancelFlag::new(), None);
        let mut scan = ListScan::new(&tx, CF, INDEX, CODE_SIZE, vec![0, 1], ctx);
        assert!(!scan.is_available().unwrap());
    }
}
