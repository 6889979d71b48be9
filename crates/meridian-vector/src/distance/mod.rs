//! Distance kernels for vector and geospatial scoring.
//!
//! Scalar implementations only: queries are single-threaded and the hot
//! loops here vectorize well enough under `-C opt-level=3` for the list
//! sizes this engine scans.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters, shared with the out-of-band trainer.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Squared Euclidean (L2) distance between two vectors.
///
/// # Panics
///
/// Debug-panics if the vectors have different lengths.
#[inline]
#[must_use]
pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same dimension");
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Inner product of two vectors.
///
/// # Panics
///
/// Debug-panics if the vectors have different lengths.
#[inline]
#[must_use]
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same dimension");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Great-circle distance in meters between two `(lon, lat)` points given
/// in degrees, on a sphere of radius [`EARTH_RADIUS_M`] (haversine).
#[must_use]
pub fn haversine_meters(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();

    let a = sin_dlat * sin_dlat + lat1_rad.cos() * lat2_rad.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Vector distance metric.
///
/// Scores are ranked ascending regardless of metric: inner product is
/// negated so that a larger product yields a smaller score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    /// Squared Euclidean distance.
    L2,
    /// Inner product, negated for ascending rank order.
    Ip,
}

impl Metric {
    /// Score a database vector against a query vector under this metric.
    #[inline]
    #[must_use]
    pub fn score(self, query: &[f32], vector: &[f32]) -> f32 {
        match self {
            Self::L2 => l2_squared(query, vector),
            Self::Ip => -inner_product(query, vector),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_squared_basic() {
        assert_eq!(l2_squared(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(l2_squared(&[0.0, 0.0], &[0.0, 3.0]), 9.0);
        assert_eq!(l2_squared(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn inner_product_basic() {
        assert_eq!(inner_product(&[1.0, 2.0], &[3.0, 4.0]), 11.0);
        assert_eq!(inner_product(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn ip_scores_rank_ascending() {
        let q = [1.0, 0.0];
        // the more aligned vector must score lower (better)
        assert!(Metric::Ip.score(&q, &[2.0, 0.0]) < Metric::Ip.score(&q, &[1.0, 0.0]));
        assert!(Metric::L2.score(&q, &[1.0, 0.0]) < Metric::L2.score(&q, &[2.0, 0.0]));
    }

    #[test]
    fn haversine_one_degree_latitude() {
        // one degree of latitude along a meridian
        let d = haversine_meters(0.0, 0.0, 0.0, 1.0);
        assert!((d - 111_195.08).abs() < 1.0, "got {d}");
    }

    #[test]
    fn haversine_zero_distance() {
        assert!(haversine_meters(12.5, -3.25, 12.5, -3.25).abs() < 1e-9);
    }

    #[test]
    fn haversine_is_symmetric() {
        let a = haversine_meters(103.8, 1.35, -122.4, 37.77);
        let b = haversine_meters(-122.4, 37.77, 103.8, 1.35);
        assert!((a - b).abs() < 1e-6);
    }
}
