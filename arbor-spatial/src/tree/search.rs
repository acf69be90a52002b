//! Priority queue for best-first tree traversal.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use arbor::util::cmp_distance;

struct Candidate<T> {
    bound: f64,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Candidate<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Candidate<T> {}

impl<T> PartialOrd for Candidate<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Candidate<T> {
    // reversed: the max-heap pops the smallest bound, oldest first on ties
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_distance(other.bound, self.bound).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-queue of subtrees keyed by a lower distance bound.
///
/// Equal bounds are popped in insertion order, which keeps traversals
/// deterministic.
pub(crate) struct SearchQueue<T> {
    heap: BinaryHeap<Candidate<T>>,
    seq: u64,
}

impl<T> SearchQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    pub(crate) fn push(&mut self, bound: f64, item: T) {
        self.seq += 1;
        self.heap.push(Candidate {
            bound,
            seq: self.seq,
            item,
        });
    }

    /// Removes the candidate with the smallest bound.
    pub(crate) fn pop(&mut self) -> Option<(f64, T)> {
        self.heap.pop().map(|c| (c.bound, c.item))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pops_smallest_bound_first() {
        let mut queue = SearchQueue::new();
        queue.push(3.0, "c");
        queue.push(f64::NAN, "nan");
        queue.push(1.0, "a");
        queue.push(1.0, "a2");
        queue.push(2.0, "b");

        let order: Vec<&str> = std::iter::from_fn(|| queue.pop().map(|(_, item)| item)).collect();
        assert_eq!(order, vec!["a", "a2", "b", "c", "nan"]);
        assert!(queue.is_empty());
    }
}
