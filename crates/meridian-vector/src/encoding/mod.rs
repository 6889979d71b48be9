//! Binary codecs: entry keys, row values, typed JSON arrays, WKB points.
//!
//! Everything under this module parses untrusted on-disk bytes; every read
//! is bounds-checked and failures surface as
//! [`VectorError::CorruptData`](crate::error::VectorError::CorruptData).

pub mod array;
pub mod keys;
pub mod row;
pub mod wkb;

pub use array::{decode_array, encode_f64_array, ArrayElement};
pub use keys::{
    decode_entry_key, encode_entry_key, entry_key_from_pk, list_lower_bound, list_upper_bound,
    region_bounds,
};
pub use row::{decode_fields, encode_row, FieldDescriptor, FieldKind, RowLayout};
pub use wkb::{decode_point, encode_point};
