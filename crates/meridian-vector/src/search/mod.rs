//! Query-side machinery: the bounded top-k heap and the per-query
//! search session.

mod heap;
pub mod session;

pub use heap::{HeapEntry, TopK};
pub use session::{DistanceCall, SearchSession, SortExpr};
