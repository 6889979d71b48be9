//! Write-side composition of inverted-list entries.
//!
//! The per-row write path lives with the caller's batch; the engine only
//! owns how keys and values are put together.

use meridian_storage::Transaction;

use crate::encoding::keys::entry_key_from_pk;
use crate::error::VectorResult;
use crate::types::{Assignment, IndexId};

use super::UNPACK_DATA_TAG;

/// Compose an entry value from code bytes and trailing row columns.
///
/// A value with no trailing columns is stored as bare codes; otherwise the
/// value opens with a minimal unpack header so readers can locate the
/// codes by tag recognition.
#[must_use]
pub fn compose_entry_value(codes: &[u8], row_tail: &[u8]) -> Vec<u8> {
    if row_tail.is_empty() {
        return codes.to_vec();
    }
    let mut value = Vec::with_capacity(3 + codes.len() + row_tail.len());
    value.push(UNPACK_DATA_TAG);
    value.extend_from_slice(&3u16.to_le_bytes());
    value.extend_from_slice(codes);
    value.extend_from_slice(row_tail);
    value
}

/// Write one assigned vector into its inverted list.
///
/// `pk` is the row's full primary key; its index-id prefix is stripped
/// into the entry key's suffix. `row_tail` carries the row's non-vector
/// columns in catalog order.
///
/// # Errors
///
/// Returns `CorruptData` for a primary key shorter than its prefix and
/// `Storage` if the write fails.
pub fn put_entry<T: Transaction>(
    tx: &mut T,
    cf: &str,
    index_id: IndexId,
    assignment: &Assignment,
    pk: &[u8],
    row_tail: &[u8],
) -> VectorResult<()> {
    let key = entry_key_from_pk(index_id, assignment.list_id, pk)?;
    let value = compose_entry_value(&assignment.codes, row_tail);
    tx.put(cf, &key, &value)?;
    Ok(())
}

/// Delete one vector's entry from its inverted list.
///
/// Returns whether the entry existed.
///
/// # Errors
///
/// Returns `CorruptData` for a primary key shorter than its prefix and
/// `Storage` if the delete fails.
pub fn delete_entry<T: Transaction>(
    tx: &mut T,
    cf: &str,
    index_id: IndexId,
    list_id: u64,
    pk: &[u8],
) -> VectorResult<bool> {
    let key = entry_key_from_pk(index_id, list_id, pk)?;
    Ok(tx.delete(cf, &key)?)
}

#[cfg(test)]
mod tests {
    use meridian_storage::backends::MemoryEngine;
    use meridian_storage::StorageEngine;

    use super::*;
    use crate::encoding::encode_entry_key;
    use crate::store::split_entry_value;

    const CF: &str = "vectors";
    const INDEX: IndexId = IndexId::new(2);

    fn pk(suffix: &[u8]) -> Vec<u8> {
        [&8u32.to_be_bytes()[..], suffix].concat()
    }

    #[test]
    fn put_strips_pk_prefix_and_frames_value() {
        let engine = MemoryEngine::new();
        let mut tx = engine.begin_write().unwrap();
        let assignment = Assignment { list_id: 3, codes: vec![1, 2, 3, 4] };
        put_entry(&mut tx, CF, INDEX, &assignment, &pk(b"row1"), b"tail").unwrap();
        tx.commit().unwrap();

        let tx = engine.begin_read().unwrap();
        let key = encode_entry_key(INDEX, 3, b"row1");
        let value = tx.get(CF, &key).unwrap().expect("entry written");
        let entry = split_entry_value(&value, 4, INDEX, 3).unwrap();
        assert_eq!(entry.codes, &[1, 2, 3, 4]);
        assert_eq!(entry.tail, b"tail");
    }

    #[test]
    fn bare_codes_when_no_tail() {
        let value = compose_entry_value(&[9, 8], &[]);
        assert_eq!(value, vec![9, 8]);
    }

    #[test]
    fn delete_removes_the_entry() {
        let engine = MemoryEngine::new();
        let mut tx = engine.begin_write().unwrap();
        let assignment = Assignment { list_id: 0, codes: vec![0; 4] };
        put_entry(&mut tx, CF, INDEX, &assignment, &pk(b"row1"), &[]).unwrap();
        tx.commit().unwrap();

        let mut tx = engine.begin_write().unwrap();
        assert!(delete_entry(&mut tx, CF, INDEX, 0, &pk(b"row1")).unwrap());
        assert!(!delete_entry(&mut tx, CF, INDEX, 0, &pk(b"row2")).unwrap());
        tx.commit().unwrap();
    }

    #[test]
    fn short_pk_is_rejected() {
        let engine = MemoryEngine::new();
        let mut tx = engine.begin_write().unwrap();
        let assignment = Assignment { list_id: 0, codes: vec![0; 4] };
        assert!(put_entry(&mut tx, CF, INDEX, &assignment, &[1, 2, 3], &[]).is_err());
    }
}
