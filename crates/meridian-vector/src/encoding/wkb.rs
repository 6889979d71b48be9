//! WKB point extraction.
//!
//! Geometry columns store an SRID-prefixed WKB value: 4 bytes SRID, 1 byte
//! byte order, 4 bytes geometry type, then the coordinates. For 2D points
//! that puts longitude at byte offset 9 and latitude at 17, both
//! little-endian doubles.

use crate::error::{VectorError, VectorResult};

/// SRID + byte order + geometry type envelope ahead of the coordinates.
pub const WKB_ENVELOPE: usize = 9;

/// Minimum length of an SRID-prefixed WKB point.
pub const WKB_POINT_LEN: usize = WKB_ENVELOPE + 16;

const WKB_TYPE_POINT: u32 = 1;
const SRID_WGS84: u32 = 4326;

/// Extract `(lon, lat)` from an SRID-prefixed WKB point.
///
/// # Errors
///
/// Returns `CorruptData` if the value is shorter than a point.
pub fn decode_point(bytes: &[u8]) -> VectorResult<(f64, f64)> {
    if bytes.len() < WKB_POINT_LEN {
        return Err(VectorError::CorruptData(format!(
            "wkb point too short: {} bytes",
            bytes.len()
        )));
    }
    let lon = f64::from_le_bytes([
        bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15], bytes[16],
    ]);
    let lat = f64::from_le_bytes([
        bytes[17], bytes[18], bytes[19], bytes[20], bytes[21], bytes[22], bytes[23], bytes[24],
    ]);
    Ok((lon, lat))
}

/// Encode `(lon, lat)` as an SRID-prefixed little-endian WKB point.
#[must_use]
pub fn encode_point(lon: f64, lat: f64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(WKB_POINT_LEN);
    bytes.extend_from_slice(&SRID_WGS84.to_le_bytes());
    bytes.push(1); // little-endian
    bytes.extend_from_slice(&WKB_TYPE_POINT.to_le_bytes());
    bytes.extend_from_slice(&lon.to_le_bytes());
    bytes.extend_from_slice(&lat.to_le_bytes());
    bytes
}
