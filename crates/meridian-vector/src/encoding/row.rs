//! Row-value decoder.
//!
//! Row values are laid out as `[ttl:8?] [null bitmap] [field 0] [field 1]
//! ...` with fields in catalog order. The decoder walks the layout far
//! enough to project the requested fields as borrowed slices; bytes past
//! the last requested field are never touched.

use crate::error::{VectorError, VectorResult};

/// Wire shape of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Variable-length string, 1 or 2 little-endian length bytes.
    VarString,
    /// Variable-length opaque blob, 1 to 4 little-endian length bytes.
    Blob,
    /// Variable-length binary JSON; the vector source column.
    Json,
    /// Variable-length WKB geometry; the spatial source column.
    Geometry,
    /// Fixed-width field of `pack_length` bytes.
    Fixed,
}

impl FieldKind {
    fn max_length_bytes(self) -> usize {
        match self {
            Self::VarString => 2,
            Self::Blob | Self::Json | Self::Geometry => 4,
            Self::Fixed => 0,
        }
    }
}

/// Catalog descriptor of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Wire shape.
    pub kind: FieldKind,
    /// Whether the field participates in the null bitmap.
    pub is_nullable: bool,
    /// Width of the length prefix for variable-length kinds.
    pub length_bytes: usize,
    /// Payload width for [`FieldKind::Fixed`].
    pub pack_length: usize,
}

impl FieldDescriptor {
    /// A fixed-width field.
    #[must_use]
    pub const fn fixed(pack_length: usize) -> Self {
        Self { kind: FieldKind::Fixed, is_nullable: false, length_bytes: 0, pack_length }
    }

    /// A variable-length field of the given kind and prefix width.
    #[must_use]
    pub const fn variable(kind: FieldKind, length_bytes: usize) -> Self {
        Self { kind, is_nullable: false, length_bytes, pack_length: 0 }
    }

    /// Mark the field nullable.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.is_nullable = true;
        self
    }
}

/// Catalog row layout: how one table's values are framed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLayout {
    /// Whether values begin with an 8-byte TTL.
    pub has_ttl: bool,
    /// Null bitmap width, `ceil(nullable_fields / 8)` as registered.
    pub null_bytes_length: usize,
    /// Whether values carry an unpack-info header between the bitmap and
    /// the fields. Registered by the catalog but not emitted by the
    /// current write path, so the decoder does not consume it.
    pub has_unpack_info: bool,
    /// Field descriptors in declared order.
    pub fields: Vec<FieldDescriptor>,
}

impl RowLayout {
    /// Create a layout with no TTL and no null bitmap.
    #[must_use]
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self { has_ttl: false, null_bytes_length: 0, has_unpack_info: false, fields }
    }

    /// Declared position of the vector source column (first JSON field).
    #[must_use]
    pub fn vector_field_index(&self) -> Option<usize> {
        self.fields.iter().position(|f| f.kind == FieldKind::Json)
    }

    /// Declared position of the spatial source column (first geometry
    /// field).
    #[must_use]
    pub fn spatial_field_index(&self) -> Option<usize> {
        self.fields.iter().position(|f| f.kind == FieldKind::Geometry)
    }
}

fn read_le_length(bytes: &[u8]) -> usize {
    let mut len = 0usize;
    for (i, b) in bytes.iter().enumerate() {
        len |= (*b as usize) << (8 * i);
    }
    len
}

/// Project the requested fields of a row value as borrowed slices, in the
/// order requested. Null fields project as empty slices. Fields past the
/// largest requested index are not parsed.
///
/// # Errors
///
/// Returns `CorruptData` on any length overrun, an out-of-range field
/// index, or an invalid length-prefix width.
pub fn decode_fields<'a>(
    row: &'a [u8],
    layout: &RowLayout,
    field_indices: &[usize],
) -> VectorResult<Vec<&'a [u8]>> {
    let mut pos = 0usize;

    if layout.has_ttl {
        if row.len() < 8 {
            return Err(VectorError::CorruptData("row value too short for ttl".to_string()));
        }
        pos += 8;
    }

    let null_bytes: Option<&[u8]> = if layout.null_bytes_length > 0 {
        if row.len() - pos < layout.null_bytes_length {
            return Err(VectorError::CorruptData(
                "row value too short for null bitmap".to_string(),
            ));
        }
        let bitmap = &row[pos..pos + layout.null_bytes_length];
        pos += layout.null_bytes_length;
        Some(bitmap)
    } else {
        None
    };

    if field_indices.is_empty() {
        return Ok(Vec::new());
    }

    let mut max_index = 0usize;
    for &idx in field_indices {
        if idx >= layout.fields.len() {
            return Err(VectorError::CorruptData(format!(
                "field index {idx} out of range, layout has {} fields",
                layout.fields.len()
            )));
        }
        max_index = max_index.max(idx);
    }

    let mut slices: Vec<&'a [u8]> = Vec::with_capacity(max_index + 1);

    for (i, field) in layout.fields.iter().enumerate().take(max_index + 1) {
        let is_null = field.is_nullable
            && null_bytes
                .and_then(|bitmap| bitmap.get(i / 8))
                .is_some_and(|byte| byte & (1u8 << (i % 8)) != 0);
        if is_null {
            slices.push(&[]);
            continue;
        }

        let payload_len = match field.kind {
            FieldKind::Fixed => field.pack_length,
            kind => {
                if field.length_bytes == 0 || field.length_bytes > kind.max_length_bytes() {
                    return Err(VectorError::CorruptData(format!(
                        "invalid length prefix width {} for field {i}",
                        field.length_bytes
                    )));
                }
                if row.len() - pos < field.length_bytes {
                    return Err(VectorError::CorruptData(format!(
                        "row value truncated at length prefix of field {i}"
                    )));
                }
                let len = read_le_length(&row[pos..pos + field.length_bytes]);
                pos += field.length_bytes;
                len
            }
        };

        if row.len() - pos < payload_len {
            return Err(VectorError::CorruptData(format!(
                "row value truncated at field {i}: need {payload_len} bytes"
            )));
        }
        slices.push(&row[pos..pos + payload_len]);
        pos += payload_len;
    }

    Ok(field_indices.iter().map(|&idx| slices[idx]).collect())
}

/// Encode a row value for the given layout. `values[i]` is the payload of
/// field `i`; `None` marks a null (the field must be nullable).
///
/// # Errors
///
/// Returns `Internal` when the values do not fit the layout: wrong value
/// count, null on a non-nullable field, a fixed field with the wrong
/// width, or a payload longer than its length prefix can express.
pub fn encode_row(layout: &RowLayout, values: &[Option<&[u8]>]) -> VectorResult<Vec<u8>> {
    if values.len() != layout.fields.len() {
        return Err(VectorError::Internal(format!(
            "expected {} field values, got {}",
            layout.fields.len(),
            values.len()
        )));
    }

    let mut row = Vec::new();
    if layout.has_ttl {
        row.extend_from_slice(&[0u8; 8]);
    }

    let bitmap_start = row.len();
    row.extend(std::iter::repeat(0u8).take(layout.null_bytes_length));

    for (i, (field, value)) in layout.fields.iter().zip(values.iter()).enumerate() {
        let Some(payload) = value else {
            if !field.is_nullable || i / 8 >= layout.null_bytes_length {
                return Err(VectorError::Internal(format!(
                    "null value for non-nullable field {i}"
                )));
            }
            row[bitmap_start + i / 8] |= 1u8 << (i % 8);
            continue;
        };

        match field.kind {
            FieldKind::Fixed => {
                if payload.len() != field.pack_length {
                    return Err(VectorError::Internal(format!(
                        "fixed field {i} expects {} bytes, got {}",
                        field.pack_length,
                        payload.len()
                    )));
                }
                row.extend_from_slice(payload);
            }
            kind => {
                if field.length_bytes == 0 || field.length_bytes > kind.max_length_bytes() {
                    return Err(VectorError::Internal(format!(
                        "invalid length prefix width {} for field {i}",
                        field.length_bytes
                    )));
                }
                if field.length_bytes < 8
                    && payload.len() >= 1usize << (8 * field.length_bytes)
                {
                    return Err(VectorError::Internal(format!(
                        "payload of field {i} too long for {}-byte length prefix",
                        field.length_bytes
                    )));
                }
                let len_le = (payload.len() as u64).to_le_bytes();
                row.extend_from_slice(&len_le[..field.length_bytes]);
                row.extend_from_slice(payload);
            }
        }
    }

    Ok(row)
}
