//! Coarse quantizer: a flat L2 table over the trained centroids.
//!
//! Both metrics probe through the same L2 quantizer; the metric only
//! changes how candidate vectors are scored inside the probed lists.

use crate::distance::l2_squared;
use crate::error::{VectorError, VectorResult};

/// Flat L2 quantizer over `nlist` centroids of one dimension.
#[derive(Debug, Clone)]
pub struct CoarseQuantizer {
    dim: usize,
    nlist: usize,
    centroids: Vec<f32>,
}

impl CoarseQuantizer {
    /// Build a quantizer from `nlist * dim` centroid coordinates.
    ///
    /// # Errors
    ///
    /// Returns `CorruptData` when the coordinate count is not a positive
    /// multiple of the dimension.
    pub fn new(dim: usize, centroids: Vec<f32>) -> VectorResult<Self> {
        if dim == 0 || centroids.is_empty() || centroids.len() % dim != 0 {
            return Err(VectorError::CorruptData(format!(
                "invalid quantizer codes, total code size {}",
                centroids.len() * 4
            )));
        }
        let nlist = centroids.len() / dim;
        Ok(Self { dim, nlist, centroids })
    }

    /// Number of centroids.
    #[must_use]
    pub fn nlist(&self) -> usize {
        self.nlist
    }

    /// Centroid dimension.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    fn centroid(&self, i: usize) -> &[f32] {
        &self.centroids[i * self.dim..(i + 1) * self.dim]
    }

    /// Assign a vector to its single nearest centroid.
    ///
    /// # Panics
    ///
    /// Debug-panics if the vector has the wrong dimension.
    #[must_use]
    pub fn assign(&self, vector: &[f32]) -> u64 {
        debug_assert_eq!(vector.len(), self.dim);
        if self.nlist == 1 {
            return 0;
        }
        let mut best = 0usize;
        let mut best_dist = f32::MAX;
        for i in 0..self.nlist {
            let dist = l2_squared(vector, self.centroid(i));
            if dist < best_dist {
                best_dist = dist;
                best = i;
            }
        }
        best as u64
    }

    /// Rank centroids against a query and return the `nprobe` nearest as
    /// `(list_id, squared distance)` pairs, ascending. `nprobe` above
    /// `nlist` is clamped.
    ///
    /// # Panics
    ///
    /// Debug-panics if the query has the wrong dimension.
    #[must_use]
    pub fn probe(&self, query: &[f32], nprobe: usize) -> Vec<(u64, f32)> {
        debug_assert_eq!(query.len(), self.dim);
        let mut ranked: Vec<(u64, f32)> = (0..self.nlist)
            .map(|i| (i as u64, l2_squared(query, self.centroid(i))))
            .collect();
        ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(nprobe.min(self.nlist));
        ranked
    }
}
