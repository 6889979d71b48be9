//! Inverted-list entry key codec.
//!
//! Entry keys are `be32(index_id) + be64(list_id) + pk_suffix`, where the
//! suffix is the row's primary key with its own 4-byte index-id prefix
//! stripped. Big-endian framing makes lexicographic key order equal
//! `(index_id, list_id, pk)` order, so one list is one contiguous range.

use crate::error::{VectorError, VectorResult};
use crate::types::IndexId;

/// Fixed prefix ahead of the pk suffix: index id + list id.
pub const ENTRY_KEY_PREFIX: usize = IndexId::SIZE + 8;

/// Lower bound of one list's key range (inclusive).
#[must_use]
pub fn list_lower_bound(index_id: IndexId, list_id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(ENTRY_KEY_PREFIX);
    key.extend_from_slice(&index_id.as_u32().to_be_bytes());
    key.extend_from_slice(&list_id.to_be_bytes());
    key
}

/// Upper bound of one list's key range (exclusive): the next list's
/// lower bound. List ids are bounded by `nlist`, far below `u64::MAX`.
#[must_use]
pub fn list_upper_bound(index_id: IndexId, list_id: u64) -> Vec<u8> {
    list_lower_bound(index_id, list_id.saturating_add(1))
}

/// Bounds of an index's whole key region, for LSM and spatial scans.
#[must_use]
pub fn region_bounds(index_id: IndexId) -> (Vec<u8>, Vec<u8>) {
    let lower = index_id.as_u32().to_be_bytes().to_vec();
    let upper = match index_id.as_u32().checked_add(1) {
        Some(next) => next.to_be_bytes().to_vec(),
        // index id u32::MAX: list ids never reach the all-0xFF prefix,
        // so this sentinel sorts above every real entry key
        None => vec![0xFF; ENTRY_KEY_PREFIX + 1],
    };
    (lower, upper)
}

/// Compose a full entry key from an already-stripped pk suffix.
#[must_use]
pub fn encode_entry_key(index_id: IndexId, list_id: u64, pk_suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(ENTRY_KEY_PREFIX + pk_suffix.len());
    key.extend_from_slice(&index_id.as_u32().to_be_bytes());
    key.extend_from_slice(&list_id.to_be_bytes());
    key.extend_from_slice(pk_suffix);
    key
}

/// Compose a full entry key from the row's primary key, stripping the
/// pk's own 4-byte index-id prefix.
///
/// # Errors
///
/// Returns `CorruptData` if the pk is no longer than its prefix.
pub fn entry_key_from_pk(index_id: IndexId, list_id: u64, pk: &[u8]) -> VectorResult<Vec<u8>> {
    if pk.len() <= IndexId::SIZE {
        return Err(VectorError::CorruptData(format!(
            "primary key too short for index {index_id}, list {list_id}: {} bytes",
            pk.len()
        )));
    }
    Ok(encode_entry_key(index_id, list_id, &pk[IndexId::SIZE..]))
}

/// Validate an entry key against the iteration bounds and return its pk
/// suffix.
///
/// # Errors
///
/// Returns `CorruptData` if the key is truncated, carries a different
/// index or list id, or has an empty pk suffix.
pub fn decode_entry_key<'a>(
    key: &'a [u8],
    index_id: IndexId,
    list_id: u64,
) -> VectorResult<&'a [u8]> {
    if key.len() <= ENTRY_KEY_PREFIX {
        return Err(VectorError::CorruptData(format!(
            "entry key too short in index {index_id}, list {list_id}: {} bytes",
            key.len()
        )));
    }
    let actual_index = u32::from_be_bytes([key[0], key[1], key[2], key[3]]);
    if actual_index != index_id.as_u32() {
        return Err(VectorError::CorruptData(format!(
            "invalid index id for key in index {index_id}: actual value {actual_index}"
        )));
    }
    let actual_list = u64::from_be_bytes([
        key[4], key[5], key[6], key[7], key[8], key[9], key[10], key[11],
    ]);
    if actual_list != list_id {
        return Err(VectorError::CorruptData(format!(
            "invalid list id for key in index {index_id}: expected {list_id}, actual value {actual_list}"
        )));
    }
    Ok(&key[ENTRY_KEY_PREFIX..])
}
