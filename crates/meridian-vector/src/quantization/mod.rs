//! Product quantization.
//!
//! Codebooks are trained out of band and arrive through the centroid data
//! blob; this module only installs them, encodes vectors, and computes
//! asymmetric distances.

mod pq;

pub use pq::{PqCodebook, PqDistanceTable};
