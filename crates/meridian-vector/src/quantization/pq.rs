//! Pre-trained product quantizer and asymmetric distance computation.

use crate::distance::{inner_product, l2_squared, Metric};
use crate::error::{VectorError, VectorResult};
use crate::types::IndexData;

/// A product-quantization codebook: `m` subquantizers of `2^nbits`
/// centroids over `dim / m`-wide subspaces.
///
/// Codes are one byte per subquantizer (`code_size == m`), so `nbits` is
/// capped at 8. Centroids are stored segment-major:
/// `centroids[(segment * ksub + centroid) * dsub ..][..dsub]`.
#[derive(Debug, Clone)]
pub struct PqCodebook {
    dim: usize,
    m: usize,
    nbits: u32,
    dsub: usize,
    ksub: usize,
    centroids: Vec<f32>,
}

impl PqCodebook {
    /// Install a codebook from the centroid data blob.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` for an invalid shape (`pq_m` not dividing the
    /// dimension, `pq_nbits` outside 1..=8) and `CorruptData` when the
    /// blob's codebook length does not match the declared shape.
    pub fn from_index_data(data: &IndexData) -> VectorResult<Self> {
        let dim = data.dimension as usize;
        let m = data.pq_m as usize;
        if m == 0 || dim == 0 || dim % m != 0 {
            return Err(VectorError::OutOfRange(format!(
                "pq_m {m} does not divide dimension {dim}"
            )));
        }
        if data.pq_nbits == 0 || data.pq_nbits > 8 {
            return Err(VectorError::OutOfRange(format!(
                "pq_nbits {} outside supported range 1..=8",
                data.pq_nbits
            )));
        }
        let ksub = 1usize << data.pq_nbits;
        let dsub = dim / m;
        let expected = m * ksub * dsub;
        if data.pq_centroids.len() != expected {
            return Err(VectorError::CorruptData(format!(
                "pq codebook length mismatch: expected {expected} floats, got {}",
                data.pq_centroids.len()
            )));
        }
        Ok(Self { dim, m, nbits: data.pq_nbits, dsub, ksub, centroids: data.pq_centroids.clone() })
    }

    /// Stored bytes per vector.
    #[must_use]
    pub fn code_size(&self) -> usize {
        self.m
    }

    /// Number of subquantizers.
    #[must_use]
    pub fn num_segments(&self) -> usize {
        self.m
    }

    /// Bits per code.
    #[must_use]
    pub fn nbits(&self) -> u32 {
        self.nbits
    }

    fn centroid(&self, segment: usize, idx: usize) -> &[f32] {
        let start = (segment * self.ksub + idx) * self.dsub;
        &self.centroids[start..start + self.dsub]
    }

    /// Encode a vector: nearest centroid per subspace, by squared L2.
    ///
    /// # Panics
    ///
    /// Debug-panics if the vector has the wrong dimension.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(&self, vector: &[f32]) -> Vec<u8> {
        debug_assert_eq!(vector.len(), self.dim);
        let mut codes = Vec::with_capacity(self.m);
        for segment in 0..self.m {
            let sub = &vector[segment * self.dsub..(segment + 1) * self.dsub];
            let mut best = 0usize;
            let mut best_dist = f32::MAX;
            for idx in 0..self.ksub {
                let dist = l2_squared(sub, self.centroid(segment, idx));
                if dist < best_dist {
                    best_dist = dist;
                    best = idx;
                }
            }
            codes.push(best as u8);
        }
        codes
    }

    /// Reconstruct the approximate vector a code stands for.
    ///
    /// # Errors
    ///
    /// Returns `CorruptData` for a wrong-length code or an out-of-range
    /// centroid index.
    pub fn decode(&self, codes: &[u8]) -> VectorResult<Vec<f32>> {
        if codes.len() != self.m {
            return Err(VectorError::CorruptData(format!(
                "pq code length {} does not match {} segments",
                codes.len(),
                self.m
            )));
        }
        let mut vector = Vec::with_capacity(self.dim);
        for (segment, &code) in codes.iter().enumerate() {
            if (code as usize) >= self.ksub {
                return Err(VectorError::CorruptData(format!(
                    "pq code {code} out of range for {} centroids",
                    self.ksub
                )));
            }
            vector.extend_from_slice(self.centroid(segment, code as usize));
        }
        Ok(vector)
    }

    /// Precompute the query-to-centroid score table for asymmetric
    /// distance computation under the given metric.
    ///
    /// # Panics
    ///
    /// Debug-panics if the query has the wrong dimension.
    #[must_use]
    pub fn distance_table(&self, query: &[f32], metric: Metric) -> PqDistanceTable {
        debug_assert_eq!(query.len(), self.dim);
        let mut table = Vec::with_capacity(self.m * self.ksub);
        for segment in 0..self.m {
            let sub = &query[segment * self.dsub..(segment + 1) * self.dsub];
            for idx in 0..self.ksub {
                let centroid = self.centroid(segment, idx);
                let score = match metric {
                    Metric::L2 => l2_squared(sub, centroid),
                    Metric::Ip => -inner_product(sub, centroid),
                };
                table.push(score);
            }
        }
        PqDistanceTable { m: self.m, ksub: self.ksub, table }
    }
}

/// Precomputed per-subspace scores for one query vector.
///
/// The score of a coded vector is the sum of one table entry per segment;
/// for L2 that is the squared distance to the reconstruction, for IP the
/// negated inner product.
#[derive(Debug, Clone)]
pub struct PqDistanceTable {
    m: usize,
    ksub: usize,
    table: Vec<f32>,
}

impl PqDistanceTable {
    /// Score a stored code against the table's query.
    ///
    /// # Errors
    ///
    /// Returns `CorruptData` for a wrong-length code or an out-of-range
    /// centroid index.
    #[inline]
    pub fn score(&self, codes: &[u8]) -> VectorResult<f32> {
        if codes.len() != self.m {
            return Err(VectorError::CorruptData(format!(
                "pq code length {} does not match {} segments",
                codes.len(),
                self.m
            )));
        }
        let mut total = 0.0f32;
        for (segment, &code) in codes.iter().enumerate() {
            if (code as usize) >= self.ksub {
                return Err(VectorError::CorruptData(format!(
                    "pq code {code} out of range for {} centroids",
                    self.ksub
                )));
            }
            total += self.table[segment * self.ksub + code as usize];
        }
        Ok(total)
    }
}
