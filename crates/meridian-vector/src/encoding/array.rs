//! Typed decoder for the binary JSON array container.
//!
//! Containers open with a type byte: `0x02` small array (2-byte offsets)
//! or `0x03` large array (4-byte offsets), then an element count and a
//! total size in offset-width units, then one value entry per element.
//! Each entry is a value-type byte plus an offset-width word that either
//! inlines the value or points at it; non-inlined offsets are measured
//! from 1 byte before the container, so `absolute = offset + 1`.

use crate::error::{VectorError, VectorResult};

const TYPE_SMALL_ARRAY: u8 = 0x02;
const TYPE_LARGE_ARRAY: u8 = 0x03;

const VALUE_LITERAL: u8 = 0x04;
const VALUE_INT16: u8 = 0x05;
const VALUE_UINT16: u8 = 0x06;
const VALUE_INT32: u8 = 0x07;
const VALUE_UINT32: u8 = 0x08;
const VALUE_INT64: u8 = 0x09;
const VALUE_UINT64: u8 = 0x0A;
const VALUE_DOUBLE: u8 = 0x0B;
const VALUE_STRING: u8 = 0x0C;

const LITERAL_NULL: u8 = 0x00;
const LITERAL_TRUE: u8 = 0x01;
const LITERAL_FALSE: u8 = 0x02;

mod sealed {
    pub trait Sealed {}
    impl Sealed for bool {}
    impl Sealed for i32 {}
    impl Sealed for u32 {}
    impl Sealed for i64 {}
    impl Sealed for u64 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
    impl Sealed for String {}
}

/// Element types a binary JSON array can decode into.
///
/// Each conversion returns `None` when the stored value type is not
/// representable as `Self`, which the decoder reports as corruption.
pub trait ArrayElement: Sized + sealed::Sealed {
    /// Convert a literal (`null`/`true`/`false`).
    fn from_literal(lit: u8) -> Option<Self>;
    /// Convert a signed integer.
    fn from_int(v: i64) -> Option<Self>;
    /// Convert an unsigned integer.
    fn from_uint(v: u64) -> Option<Self>;
    /// Convert a double.
    fn from_double(v: f64) -> Option<Self>;
    /// Convert a string payload.
    fn from_string(bytes: &[u8]) -> Option<Self>;
}

macro_rules! numeric_array_element {
    ($($t:ty),*) => {$(
        impl ArrayElement for $t {
            fn from_literal(lit: u8) -> Option<Self> {
                // true maps to 1, false and null map to 0
                Some(if lit == LITERAL_TRUE { 1 as $t } else { 0 as $t })
            }
            fn from_int(v: i64) -> Option<Self> {
                Some(v as $t)
            }
            fn from_uint(v: u64) -> Option<Self> {
                Some(v as $t)
            }
            fn from_double(v: f64) -> Option<Self> {
                Some(v as $t)
            }
            fn from_string(_bytes: &[u8]) -> Option<Self> {
                None
            }
        }
    )*};
}

numeric_array_element!(i32, u32, i64, u64, f32, f64);

impl ArrayElement for bool {
    fn from_literal(lit: u8) -> Option<Self> {
        match lit {
            LITERAL_TRUE => Some(true),
            LITERAL_FALSE => Some(false),
            _ => None,
        }
    }
    fn from_int(v: i64) -> Option<Self> {
        Some(v != 0)
    }
    fn from_uint(v: u64) -> Option<Self> {
        Some(v != 0)
    }
    fn from_double(v: f64) -> Option<Self> {
        Some(v != 0.0)
    }
    fn from_string(_bytes: &[u8]) -> Option<Self> {
        None
    }
}

impl ArrayElement for String {
    fn from_literal(_lit: u8) -> Option<Self> {
        None
    }
    fn from_int(_v: i64) -> Option<Self> {
        None
    }
    fn from_uint(_v: u64) -> Option<Self> {
        None
    }
    fn from_double(_v: f64) -> Option<Self> {
        None
    }
    fn from_string(bytes: &[u8]) -> Option<Self> {
        String::from_utf8(bytes.to_vec()).ok()
    }
}

fn corrupt(detail: impl Into<String>) -> VectorError {
    VectorError::CorruptData(detail.into())
}

fn read_word(bytes: &[u8], pos: usize, width: usize) -> usize {
    let mut value = 0usize;
    for i in 0..width {
        value |= (bytes[pos + i] as usize) << (8 * i);
    }
    value
}

fn read_fixed8(bytes: &[u8], pos: usize) -> VectorResult<[u8; 8]> {
    bytes
        .get(pos..pos + 8)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| corrupt(format!("8-byte value at offset {pos} escapes container")))
}

fn element<T: ArrayElement>(value: Option<T>, value_type: u8, index: usize) -> VectorResult<T> {
    value.ok_or_else(|| {
        corrupt(format!("element {index} with value type {value_type:#04x} not supported"))
    })
}

/// Decode a binary JSON array into a dense vector of `T`.
///
/// # Errors
///
/// Returns `CorruptData` if the container is not a small or large array,
/// an element's value type is unknown or not representable as `T`, or any
/// offset escapes the container.
pub fn decode_array<T: ArrayElement>(bytes: &[u8]) -> VectorResult<Vec<T>> {
    if bytes.is_empty() {
        return Err(corrupt("empty json container"));
    }

    let offset_width = match bytes[0] {
        TYPE_SMALL_ARRAY => 2usize,
        TYPE_LARGE_ARRAY => 4usize,
        other => return Err(corrupt(format!("json type {other:#04x} is not an array"))),
    };
    let large = bytes[0] == TYPE_LARGE_ARRAY;

    let header = 1 + 2 * offset_width;
    if bytes.len() < header {
        return Err(corrupt("json array header truncated"));
    }
    let element_count = read_word(bytes, 1, offset_width);
    // total-size word at 1 + offset_width is not needed for decoding

    let entry_size = 1 + offset_width;
    let mut out = Vec::with_capacity(element_count.min(4096));

    for i in 0..element_count {
        let entry_pos = header + i * entry_size;
        if entry_pos + entry_size > bytes.len() {
            return Err(corrupt(format!("value entry {i} escapes container")));
        }

        let value_type = bytes[entry_pos];
        let word = read_word(bytes, entry_pos + 1, offset_width);

        let inlined = matches!(value_type, VALUE_LITERAL | VALUE_INT16 | VALUE_UINT16)
            || (large && matches!(value_type, VALUE_INT32 | VALUE_UINT32));

        // offsets are relative to 1 byte before the container
        let abs = word + 1;
        if !inlined && abs >= bytes.len() {
            return Err(corrupt(format!("element {i} offset {word} escapes container")));
        }

        let value = match value_type {
            VALUE_LITERAL => element(T::from_literal((word & 0xFF) as u8), value_type, i)?,
            VALUE_INT16 => element(T::from_int((word as u16 as i16).into()), value_type, i)?,
            VALUE_UINT16 => element(T::from_uint((word as u16).into()), value_type, i)?,
            VALUE_INT32 => {
                let v = if inlined {
                    word as u32 as i32
                } else {
                    let raw = bytes
                        .get(abs..abs + 4)
                        .ok_or_else(|| corrupt(format!("element {i} int32 escapes container")))?;
                    i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
                };
                element(T::from_int(v.into()), value_type, i)?
            }
            VALUE_UINT32 => {
                let v = if inlined {
                    word as u32
                } else {
                    let raw = bytes
                        .get(abs..abs + 4)
                        .ok_or_else(|| corrupt(format!("element {i} uint32 escapes container")))?;
                    u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
                };
                element(T::from_uint(v.into()), value_type, i)?
            }
            VALUE_INT64 => {
                let v = i64::from_le_bytes(read_fixed8(bytes, abs)?);
                element(T::from_int(v), value_type, i)?
            }
            VALUE_UINT64 => {
                let v = u64::from_le_bytes(read_fixed8(bytes, abs)?);
                element(T::from_uint(v), value_type, i)?
            }
            VALUE_DOUBLE => {
                // raw bit copy, native endianness
                let v = f64::from_ne_bytes(read_fixed8(bytes, abs)?);
                element(T::from_double(v), value_type, i)?
            }
            VALUE_STRING => {
                let (len, payload_start) = read_varint(bytes, abs)?;
                let payload = bytes
                    .get(payload_start..payload_start + len)
                    .ok_or_else(|| corrupt(format!("element {i} string escapes container")))?;
                element(T::from_string(payload), value_type, i)?
            }
            other => return Err(corrupt(format!("unknown json value type {other:#04x}"))),
        };
        out.push(value);
    }

    Ok(out)
}

/// Variable-length string length: up to 5 bytes of 7 value bits each,
/// high bit set on all but the last.
fn read_varint(bytes: &[u8], mut pos: usize) -> VectorResult<(usize, usize)> {
    let mut len = 0usize;
    for shift in 0..5u32 {
        let byte = *bytes
            .get(pos)
            .ok_or_else(|| corrupt("string length escapes container"))?;
        pos += 1;
        len |= ((byte & 0x7F) as usize) << (7 * shift);
        if byte & 0x80 == 0 {
            return Ok((len, pos));
        }
    }
    Err(corrupt("string length varint longer than 5 bytes"))
}

/// Encode `values` as a large-format array of doubles, the shape the
/// write path stores vector columns in.
#[must_use]
pub fn encode_f64_array(values: &[f64]) -> Vec<u8> {
    let header = 1 + 2 * 4;
    let entries = values.len() * 5;
    let data_start = header + entries;
    let total = data_start + values.len() * 8;

    let mut bytes = Vec::with_capacity(total);
    bytes.push(TYPE_LARGE_ARRAY);
    bytes.extend_from_slice(&(values.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&(total as u32).to_le_bytes());
    for i in 0..values.len() {
        bytes.push(VALUE_DOUBLE);
        // stored offset is absolute position minus 1
        let abs = data_start + i * 8;
        bytes.extend_from_slice(&((abs - 1) as u32).to_le_bytes());
    }
    for value in values {
        bytes.extend_from_slice(&value.to_ne_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Small-format container with inlined int16 entries.
    fn small_int16_array(values: &[i16]) -> Vec<u8> {
        let total = 1 + 4 + values.len() * 3;
        let mut bytes = vec![TYPE_SMALL_ARRAY];
        bytes.extend_from_slice(&(values.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&(total as u16).to_le_bytes());
        for v in values {
            bytes.push(VALUE_INT16);
            bytes.extend_from_slice(&(*v as u16).to_le_bytes());
        }
        bytes
    }

    #[test]
    fn decodes_doubles_bitwise() {
        let values = [0.25f64, -1.5, 3.141592653589793, 0.0, f64::MIN_POSITIVE];
        let bytes = encode_f64_array(&values);
        let decoded: Vec<f64> = decode_array(&bytes).unwrap();
        assert_eq!(decoded.len(), values.len());
        for (a, b) in values.iter().zip(decoded.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn decodes_doubles_as_f32() {
        let bytes = encode_f64_array(&[1.0, 2.0, 3.0]);
        let decoded: Vec<f32> = decode_array(&bytes).unwrap();
        assert_eq!(decoded, vec![1.0f32, 2.0, 3.0]);
    }

    #[test]
    fn decodes_small_format_int16() {
        let bytes = small_int16_array(&[-7, 0, 300]);
        let decoded: Vec<i64> = decode_array(&bytes).unwrap();
        assert_eq!(decoded, vec![-7, 0, 300]);
    }

    #[test]
    fn literal_mapping_for_numeric_and_bool() {
        // [true, false, null] as literals, small format
        let mut bytes = vec![TYPE_SMALL_ARRAY];
        bytes.extend_from_slice(&3u16.to_le_bytes());
        bytes.extend_from_slice(&14u16.to_le_bytes());
        for lit in [LITERAL_TRUE, LITERAL_FALSE, LITERAL_NULL] {
            bytes.push(VALUE_LITERAL);
            bytes.extend_from_slice(&(lit as u16).to_le_bytes());
        }

        let nums: Vec<i64> = decode_array(&bytes).unwrap();
        assert_eq!(nums, vec![1, 0, 0]);

        // null literal is not a bool
        assert!(decode_array::<bool>(&bytes).is_err());

        // drop the null entry: just [true, false]
        let mut two = bytes[..1 + 4 + 2 * 3].to_vec();
        two[1..3].copy_from_slice(&2u16.to_le_bytes());
        let bools: Vec<bool> = decode_array(&two).unwrap();
        assert_eq!(bools, vec![true, false]);
    }

    #[test]
    fn string_type_rejects_numeric_target() {
        let bytes = encode_f64_array(&[1.0]);
        assert!(matches!(decode_array::<String>(&bytes), Err(VectorError::CorruptData(_))));
    }

    #[test]
    fn decodes_varint_strings() {
        // ["ab", "c"] small format, strings stored after the entries
        let mut bytes = vec![TYPE_SMALL_ARRAY];
        bytes.extend_from_slice(&2u16.to_le_bytes());
        let data_start = 1 + 4 + 2 * 3;
        bytes.extend_from_slice(&((data_start + 6) as u16).to_le_bytes());
        bytes.push(VALUE_STRING);
        bytes.extend_from_slice(&((data_start - 1) as u16).to_le_bytes());
        bytes.push(VALUE_STRING);
        bytes.extend_from_slice(&((data_start + 3 - 1) as u16).to_le_bytes());
        bytes.push(2);
        bytes.extend_from_slice(b"ab");
        bytes.push(1);
        bytes.extend_from_slice(b"c");

        let decoded: Vec<String> = decode_array(&bytes).unwrap();
        assert_eq!(decoded, vec!["ab".to_string(), "c".to_string()]);
    }

    #[test]
    fn rejects_non_array_type() {
        assert!(decode_array::<f32>(&[0x01, 0x00]).is_err());
        assert!(decode_array::<f32>(&[]).is_err());
    }

    #[test]
    fn rejects_escaping_offsets() {
        let mut bytes = encode_f64_array(&[1.0]);
        let len = bytes.len();
        bytes.truncate(len - 4);
        assert!(matches!(decode_array::<f64>(&bytes), Err(VectorError::CorruptData(_))));

        // entry table truncated
        let bytes = encode_f64_array(&[1.0, 2.0]);
        assert!(decode_array::<f64>(&bytes[..8]).is_err());
    }

    #[test]
    fn rejects_unknown_value_type() {
        let mut bytes = vec![TYPE_SMALL_ARRAY];
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&8u16.to_le_bytes());
        bytes.push(0x0F);
        bytes.extend_from_slice(&0u16.to_le_bytes());
        assert!(decode_array::<f64>(&bytes).is_err());
    }

    #[test]
    fn empty_array_decodes_empty() {
        let bytes = encode_f64_array(&[]);
        let decoded: Vec<f64> = decode_array(&bytes).unwrap();
        assert!(decoded.is_empty());
    }
}
