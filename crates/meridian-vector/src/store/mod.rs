//! Inverted-list storage access: entry-value framing, pushdown seams,
//! per-query scan context, list cursors, and the write-side composition.

mod list_cursor;
mod writer;

pub use list_cursor::{open_list_cursor, ListCursor, ListScan};
pub use writer::{compose_entry_value, delete_entry, put_entry};

use crate::encoding::keys::ENTRY_KEY_PREFIX;
use crate::error::{VectorError, VectorResult};
use crate::types::{CancelFlag, IndexId};

/// Unpack-header tag for plain unpack info.
pub(crate) const UNPACK_DATA_TAG: u8 = 0x00;
/// Unpack-header tag for unpack info with a covered-column bitmap.
pub(crate) const UNPACK_COVERED_DATA_TAG: u8 = 0x01;

/// Header width for a recognized unpack tag: tag + 2-byte length, plus a
/// 2-byte bitmap for the covered variant.
pub(crate) fn unpack_header_size(tag: u8) -> Option<usize> {
    match tag {
        UNPACK_DATA_TAG => Some(3),
        UNPACK_COVERED_DATA_TAG => Some(5),
        _ => None,
    }
}

/// Borrowed view of one entry value split into its three parts.
#[derive(Debug, Clone, Copy)]
pub struct EntryValue<'a> {
    /// Unpack header, empty for bare-codes values.
    pub header: &'a [u8],
    /// The `code_size` encoded vector bytes.
    pub codes: &'a [u8],
    /// Trailing row-column bytes.
    pub tail: &'a [u8],
}

impl EntryValue<'_> {
    /// The value with the codes spliced out: header followed by tail.
    /// This is the shape the secondary-key descriptor unpacks.
    #[must_use]
    pub fn without_codes(&self) -> Vec<u8> {
        let mut value = Vec::with_capacity(self.header.len() + self.tail.len());
        value.extend_from_slice(self.header);
        value.extend_from_slice(self.tail);
        value
    }
}

/// Split an entry value into `[header] codes [tail]`.
///
/// A value of exactly `code_size` bytes is bare codes. Anything longer
/// must open with a recognized unpack tag.
///
/// # Errors
///
/// Returns `CorruptData` when the value is shorter than `code_size`, the
/// leading tag is unknown, or the extra bytes cannot hold the header.
pub fn split_entry_value<'a>(
    value: &'a [u8],
    code_size: usize,
    index_id: IndexId,
    list_id: u64,
) -> VectorResult<EntryValue<'a>> {
    let Some(extra) = value.len().checked_sub(code_size) else {
        return Err(VectorError::CorruptData(format!(
            "invalid value size {} for key in index {index_id}, list {list_id}",
            value.len()
        )));
    };
    if extra == 0 {
        return Ok(EntryValue { header: &[], codes: value, tail: &[] });
    }
    let tag = value[0];
    let Some(header_size) = unpack_header_size(tag) else {
        return Err(VectorError::CorruptData(format!(
            "invalid data tag for key in index {index_id}, list {list_id}"
        )));
    };
    if extra < header_size {
        return Err(VectorError::CorruptData(format!(
            "invalid value size {} for key in index {index_id}, list {list_id}",
            value.len()
        )));
    }
    Ok(EntryValue {
        header: &value[..header_size],
        codes: &value[header_size..header_size + code_size],
        tail: &value[header_size + code_size..],
    })
}

/// A row recovered from an entry by the secondary-key descriptor, handed
/// to the pushed-down predicate.
#[derive(Debug, Clone)]
pub struct RowImage {
    /// Full primary-key bytes, index-id prefix restored.
    pub pk: Vec<u8>,
    /// Row column bytes (entry value minus codes).
    pub columns: Vec<u8>,
}

/// The secondary-key descriptor seam: unpacks one entry into a row image.
pub trait EntryUnpacker {
    /// Unpack an entry key and its codes-stripped value.
    ///
    /// # Errors
    ///
    /// Returns `CorruptData` if the entry cannot be unpacked.
    fn unpack(&self, key: &[u8], value_without_codes: &[u8]) -> VectorResult<RowImage>;
}

/// A predicate pushed down onto the companion primary-key index.
pub trait RowPredicate {
    /// Evaluate the predicate against an unpacked row.
    ///
    /// # Errors
    ///
    /// Returns `Query` if evaluation fails.
    fn matches(&self, row: &RowImage) -> VectorResult<bool>;
}

/// Unpacker plus predicate, attached to a scan as one unit.
#[derive(Clone, Copy)]
pub struct PushdownFilter<'a> {
    /// Recovers the row image from an entry.
    pub unpacker: &'a dyn EntryUnpacker,
    /// Decides whether the row survives.
    pub predicate: &'a dyn RowPredicate,
}

/// Default unpacker: restores the primary key by prepending the pk
/// region's index id to the entry key's pk suffix, and passes the
/// codes-stripped value through as the column image.
#[derive(Debug, Clone, Copy)]
pub struct SecondaryKeyDescriptor {
    /// Index id of the companion primary-key region.
    pub pk_index_id: IndexId,
}

impl EntryUnpacker for SecondaryKeyDescriptor {
    fn unpack(&self, key: &[u8], value_without_codes: &[u8]) -> VectorResult<RowImage> {
        if key.len() <= ENTRY_KEY_PREFIX {
            return Err(VectorError::CorruptData("entry key too short to unpack".to_string()));
        }
        let suffix = &key[ENTRY_KEY_PREFIX..];
        let mut pk = Vec::with_capacity(IndexId::SIZE + suffix.len());
        pk.extend_from_slice(&self.pk_index_id.as_u32().to_be_bytes());
        pk.extend_from_slice(suffix);
        Ok(RowImage { pk, columns: value_without_codes.to_vec() })
    }
}

/// Per-query scan state shared by every list cursor of one search:
/// cancellation, the optional pushdown filter, the internal id counter,
/// and observed list sizes.
pub struct ScanContext<'a> {
    /// Cooperative cancellation, checked on every step.
    pub cancel: CancelFlag,
    /// Optional pushed-down predicate.
    pub filter: Option<PushdownFilter<'a>>,
    next_internal_id: i64,
    current_list_size: u64,
    list_size_stats: Vec<(u64, u64)>,
}

/// Internal ids start above zero so they never collide with sentinel ids
/// of callers that reserve small values.
const FIRST_INTERNAL_ID: i64 = 1024;

impl<'a> ScanContext<'a> {
    /// Create a context for one query.
    #[must_use]
    pub fn new(cancel: CancelFlag, filter: Option<PushdownFilter<'a>>) -> Self {
        Self {
            cancel,
            filter,
            next_internal_id: FIRST_INTERNAL_ID,
            current_list_size: 0,
            list_size_stats: Vec::new(),
        }
    }

    /// Next monotonically assigned internal id.
    pub(crate) fn next_internal_id(&mut self) -> i64 {
        let id = self.next_internal_id;
        self.next_internal_id += 1;
        id
    }

    pub(crate) fn on_record(&mut self) {
        self.current_list_size += 1;
    }

    pub(crate) fn on_list_end(&mut self, list_id: u64) {
        self.list_size_stats.push((list_id, self.current_list_size));
        self.current_list_size = 0;
    }

    /// `(list_id, observed size)` pairs for lists scanned to completion.
    #[must_use]
    pub fn list_size_stats(&self) -> &[(u64, u64)] {
        &self.list_size_stats
    }
}
