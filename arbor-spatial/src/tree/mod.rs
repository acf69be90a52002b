//! Pieces shared by the tree indexes.
//!
//! Node and entry capabilities are small traits instead of a class
//! hierarchy: [`SplittableNode`] for anything that overflows and splits,
//! [`DistanceBoundedEntry`] for metric-tree entries. [`DynamicIndex`] and
//! [`PartitionedIndex`] are what [`SharedIndex`] and the preprocessors need
//! from a tree.

use std::sync::atomic::{AtomicU64, Ordering};

use arbor::dbid::DBID;
use serde::{Deserialize, Serialize};

use crate::errors::SpatialResult;

mod integrity;
mod rknn;
mod search;
mod shared;

pub use integrity::IntegrityReport;
pub use rknn::KDistanceBounds;
pub(crate) use rknn::{fold_k_distance, may_contain};
pub(crate) use search::SearchQueue;
pub use shared::SharedIndex;

/// A node holding a bounded number of entries.
pub trait SplittableNode: Sized {
    fn is_leaf(&self) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the node holds more than `capacity` entries and must be
    /// split or otherwise relieved before it is written.
    fn is_overfull(&self, capacity: usize) -> bool {
        self.len() > capacity
    }

    /// Splits the node into the entries with `mask[i] == false` and those
    /// with `mask[i] == true`, keeping the relative order of entries.
    fn split_by(self, mask: &[bool]) -> (Self, Self);
}

/// An entry of a metric tree.
pub trait DistanceBoundedEntry {
    /// Distance to the routing object of the node holding this entry.
    fn parent_distance(&self) -> f64;

    /// Upper bound of the distance from this entry's object to every object
    /// below it; 0 for leaf entries.
    fn covering_radius(&self) -> f64;
}

/// An index that follows inserts and deletes of its relation.
pub trait DynamicIndex<O: ?Sized>: Send + Sync {
    fn insert(&mut self, id: DBID, object: &O) -> SpatialResult<()>;

    /// Removes the entry of `id`. Returns false if it was not indexed.
    fn delete(&mut self, id: DBID, object: &O) -> SpatialResult<bool>;

    /// Number of indexed objects.
    fn size(&self) -> usize;
}

/// How leaf partitions are grouped for approximate preprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ApproximationScope {
    /// Each leaf is one partition.
    #[default]
    Leaf,
    /// All leaves below the same parent form one partition.
    Siblings,
}

/// An index that can group its objects by tree leaves.
pub trait PartitionedIndex: Send + Sync {
    /// Object ids grouped by leaf (or by parent subtree of leaves).
    /// Every indexed id appears in exactly one partition.
    fn partitions(&self, scope: ApproximationScope) -> SpatialResult<Vec<Vec<DBID>>>;
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters of tree operations.
#[derive(Debug, Default)]
pub struct TreeStats {
    distance_computations: AtomicU64,
    node_reads: AtomicU64,
    node_writes: AtomicU64,
    splits: AtomicU64,
    reinsertions: AtomicU64,
}

/// Point-in-time copy of [`TreeStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStatsSnapshot {
    pub distance_computations: u64,
    pub node_reads: u64,
    pub node_writes: u64,
    pub splits: u64,
    pub reinsertions: u64,
}

impl TreeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn count_distances(&self, n: u64) {
        self.distance_computations.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn count_read(&self) {
        self.node_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_write(&self) {
        self.node_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_split(&self) {
        self.splits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_reinsertions(&self, n: u64) {
        self.reinsertions.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TreeStatsSnapshot {
        TreeStatsSnapshot {
            distance_computations: self.distance_computations.load(Ordering::Relaxed),
            node_reads: self.node_reads.load(Ordering::Relaxed),
            node_writes: self.node_writes.load(Ordering::Relaxed),
            splits: self.splits.load(Ordering::Relaxed),
            reinsertions: self.reinsertions.load(Ordering::Relaxed),
        }
    }
}

/// Minimum entry count of a node: `max(round(capacity * min_fill), 2)`,
/// never more than half the capacity rounded up.
pub fn minimum_entries(capacity: usize, min_fill: f64) -> usize {
    let minimum = ((capacity as f64) * min_fill).round() as usize;
    minimum.max(2).min(capacity.div_ceil(2))
}

/// Splits `n` items into the fewest chunks of at most `capacity` items,
/// with chunk sizes differing by at most one.
pub fn balanced_chunk_sizes(n: usize, capacity: usize) -> Vec<usize> {
    if n == 0 || capacity == 0 {
        return Vec::new();
    }
    let chunks = n.div_ceil(capacity);
    let base = n / chunks;
    let larger = n % chunks;
    (0..chunks).map(|i| if i < larger { base + 1 } else { base }).collect()
}

/// Splits `items` into consecutive groups of the given sizes.
pub(crate) fn split_into<T>(items: Vec<T>, sizes: &[usize]) -> Vec<Vec<T>> {
    let mut groups = Vec::with_capacity(sizes.len());
    let mut rest = items.into_iter();
    for &size in sizes {
        groups.push(rest.by_ref().take(size).collect());
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_entries() {
        assert_eq!(minimum_entries(10, 0.4), 4);
        assert_eq!(minimum_entries(3, 0.4), 2);
        assert_eq!(minimum_entries(32, 0.4), 13);
        // never above half the capacity
        assert_eq!(minimum_entries(4, 0.5), 2);
        assert_eq!(minimum_entries(5, 0.5), 3);
    }

    #[test]
    fn test_balanced_chunks() {
        assert_eq!(balanced_chunk_sizes(10, 4), vec![4, 3, 3]);
        assert_eq!(balanced_chunk_sizes(8, 4), vec![4, 4]);
        assert_eq!(balanced_chunk_sizes(3, 8), vec![3]);
        assert!(balanced_chunk_sizes(0, 8).is_empty());

        let groups = split_into((0..10).collect::<Vec<i32>>(), &[4, 3, 3]);
        assert_eq!(groups, vec![vec![0, 1, 2, 3], vec![4, 5, 6], vec![7, 8, 9]]);
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = TreeStats::new();
        stats.count_distances(5);
        stats.count_read();
        stats.count_split();
        let snap = stats.snapshot();
        assert_eq!(snap.distance_computations, 5);
        assert_eq!(snap.node_reads, 1);
        assert_eq!(snap.splits, 1);
        assert_eq!(snap.node_writes, 0);
    }
}
