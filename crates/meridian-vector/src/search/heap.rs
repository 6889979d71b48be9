//! Bounded top-k accumulator.
//!
//! A max-heap of at most `k` entries ordered by score: push freely while
//! under budget, then strict pop-and-push when a candidate beats the
//! resident worst. Draining yields ascending score order. Equal scores
//! carry no secondary ordering.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// One candidate row held by the heap.
#[derive(Debug, Clone)]
pub struct HeapEntry {
    /// Ranking score; the stored key of the entry.
    pub score: f32,
    /// Monotonic internal id assigned at read time.
    pub internal_id: i64,
    /// Entry key bytes.
    pub key: Vec<u8>,
    /// Row value bytes, when the scan materializes them.
    pub value: Option<Vec<u8>>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score.partial_cmp(&other.score).unwrap_or(Ordering::Equal)
    }
}

/// Max-heap bounded to the k smallest scores seen.
#[derive(Debug)]
pub struct TopK {
    k: usize,
    heap: BinaryHeap<HeapEntry>,
}

impl TopK {
    /// Create a heap with budget `k`. A budget of zero accepts nothing.
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self { k, heap: BinaryHeap::with_capacity(k.saturating_add(1).min(4096)) }
    }

    /// Number of resident entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether the heap holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Score of the resident worst entry.
    #[must_use]
    pub fn top_score(&self) -> Option<f32> {
        self.heap.peek().map(|entry| entry.score)
    }

    /// Whether a candidate with `score` would enter the heap. Lets
    /// callers skip materializing keys for rows that cannot survive.
    #[must_use]
    pub fn would_accept(&self, score: f32) -> bool {
        if self.k == 0 {
            return false;
        }
        self.heap.len() < self.k || self.top_score().is_some_and(|top| score < top)
    }

    /// Offer a candidate ranked and evicted by its own score.
    pub fn push(&mut self, entry: HeapEntry) {
        let score = entry.score;
        self.push_ranked(score, entry);
    }

    /// Offer a candidate whose eviction comparison uses `eviction_score`
    /// while the stored key stays `entry.score`. The hybrid scorer evicts
    /// on the vector distance but inserts the combined score.
    pub fn push_ranked(&mut self, eviction_score: f32, entry: HeapEntry) {
        if self.k == 0 {
            return;
        }
        if self.heap.len() < self.k {
            self.heap.push(entry);
        } else if self.top_score().is_some_and(|top| eviction_score < top) {
            self.heap.pop();
            self.heap.push(entry);
        }
    }

    /// Drain into ascending score order.
    #[must_use]
    pub fn into_sorted(self) -> Vec<HeapEntry> {
        let mut entries = Vec::with_capacity(self.heap.len());
        let mut heap = self.heap;
        while let Some(entry) = heap.pop() {
            entries.push(entry);
        }
        entries.reverse();
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(score: f32, id: i64) -> HeapEntry {
        HeapEntry { score, internal_id: id, key: id.to_be_bytes().to_vec(), value: None }
    }

    #[test]
    fn keeps_k_smallest_in_ascending_order() {
        let mut heap = TopK::new(3);
        for (i, score) in [5.0, 1.0, 4.0, 2.0, 3.0].iter().enumerate() {
            heap.push(entry(*score, i as i64));
        }
        let scores: Vec<f32> = heap.into_sorted().iter().map(|e| e.score).collect();
        assert_eq!(scores, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn order_statistic_property() {
        // heap contents are exactly the k smallest of the scanned set
        let scanned: Vec<f32> = (0..50).map(|i| ((i * 37) % 50) as f32).collect();
        let mut heap = TopK::new(7);
        for (i, score) in scanned.iter().enumerate() {
            heap.push(entry(*score, i as i64));
        }
        let kept: Vec<f32> = heap.into_sorted().iter().map(|e| e.score).collect();
        let mut expected = scanned;
        expected.sort_by(|a, b| a.partial_cmp(b).unwrap());
        expected.truncate(7);
        assert_eq!(kept, expected);
    }

    #[test]
    fn result_never_exceeds_k() {
        let mut heap = TopK::new(2);
        for i in 0..10 {
            heap.push(entry(i as f32, i));
        }
        assert_eq!(heap.len(), 2);
    }

    #[test]
    fn k_zero_accepts_nothing() {
        let mut heap = TopK::new(0);
        assert!(!heap.would_accept(0.0));
        heap.push(entry(1.0, 1));
        assert!(heap.is_empty());
    }

    #[test]
    fn equal_score_does_not_evict() {
        let mut heap = TopK::new(1);
        heap.push(entry(2.0, 1));
        heap.push(entry(2.0, 2));
        let kept = heap.into_sorted();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].internal_id, 1);
    }

    #[test]
    fn ranked_push_evicts_on_the_given_score() {
        let mut heap = TopK::new(1);
        heap.push(entry(5.0, 1));
        // stored key 9.0 would lose, but the eviction score 1.0 wins
        heap.push_ranked(1.0, entry(9.0, 2));
        let kept = heap.into_sorted();
        assert_eq!(kept[0].internal_id, 2);
        assert_eq!(kept[0].score, 9.0);
    }

    #[test]
    fn would_accept_matches_push_behavior() {
        let mut heap = TopK::new(2);
        heap.push(entry(1.0, 1));
        assert!(heap.would_accept(10.0)); // still under budget
        heap.push(entry(2.0, 2));
        assert!(heap.would_accept(1.5));
        assert!(!heap.would_accept(2.0)); // strict comparison
        assert!(!heap.would_accept(3.0));
    }
}
