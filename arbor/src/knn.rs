//! Result containers for nearest-neighbour and range queries.
//!
//! [`KnnHeap`] collects candidates during a search, [`KnnList`] is the
//! materialized, sorted result handed to callers. Equal distances keep the
//! order in which the candidates were first offered.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::dbid::{DoubleDBIDPair, DBID};
use crate::util::cmp_distance;

#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    distance: f64,
    seq: u64,
    id: DBID,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // max-heap: the farthest (and among equals, the latest) entry is on top
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_distance(self.distance, other.distance).then(self.seq.cmp(&other.seq))
    }
}

/// Bounded max-heap keeping the `k` best candidates seen so far.
#[derive(Debug, Clone)]
pub struct KnnHeap {
    k: usize,
    heap: BinaryHeap<HeapEntry>,
    seq: u64,
}

impl KnnHeap {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k + 1),
            seq: 0,
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Offers a candidate and returns the updated k-distance.
    ///
    /// A candidate at exactly the current k-distance does not displace an
    /// earlier one.
    pub fn insert(&mut self, distance: f64, id: DBID) -> f64 {
        if self.k == 0 {
            return self.k_distance();
        }
        let entry = HeapEntry {
            distance,
            seq: self.seq,
            id,
        };
        self.seq += 1;
        if self.heap.len() < self.k {
            self.heap.push(entry);
        } else if let Some(top) = self.heap.peek() {
            if cmp_distance(distance, top.distance) == Ordering::Less {
                self.heap.pop();
                self.heap.push(entry);
            }
        }
        self.k_distance()
    }

    /// Current pruning distance: infinite until `k` candidates were seen.
    pub fn k_distance(&self) -> f64 {
        if self.heap.len() < self.k {
            return f64::INFINITY;
        }
        self.heap.peek().map_or(f64::INFINITY, |top| top.distance)
    }

    /// Sorted result, nearest first.
    pub fn into_knn_list(self) -> KnnList {
        let mut entries = self.heap.into_vec();
        entries.sort();
        KnnList {
            k: self.k,
            entries: entries
                .into_iter()
                .map(|e| DoubleDBIDPair::new(e.distance, e.id))
                .collect(),
        }
    }
}

/// Sorted k-nearest-neighbour result.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KnnList {
    k: usize,
    entries: Vec<DoubleDBIDPair>,
}

impl KnnList {
    pub fn empty(k: usize) -> Self {
        Self {
            k,
            entries: Vec::new(),
        }
    }

    /// Builds a list from pairs that are already sorted by distance.
    pub fn from_sorted(k: usize, entries: Vec<DoubleDBIDPair>) -> Self {
        debug_assert!(entries.windows(2).all(|w| cmp_distance(w[0].distance, w[1].distance) != Ordering::Greater));
        Self { k, entries }
    }

    /// The requested k; the list may be shorter when fewer objects exist.
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&DoubleDBIDPair> {
        self.entries.get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DoubleDBIDPair> {
        self.entries.iter()
    }

    pub fn ids(&self) -> Vec<DBID> {
        self.entries.iter().map(|p| p.id).collect()
    }

    pub fn contains(&self, id: DBID) -> bool {
        self.entries.iter().any(|p| p.id == id)
    }

    pub fn distance_of(&self, id: DBID) -> Option<f64> {
        self.entries.iter().find(|p| p.id == id).map(|p| p.distance)
    }

    /// Distance of the farthest kept neighbour, infinite for an empty list.
    pub fn k_distance(&self) -> f64 {
        self.entries.last().map_or(f64::INFINITY, |p| p.distance)
    }

    /// The first `k` neighbours of a list computed for a larger k.
    pub fn prefix(&self, k: usize) -> KnnList {
        KnnList {
            k,
            entries: self.entries.iter().take(k).copied().collect(),
        }
    }

    pub fn as_slice(&self) -> &[DoubleDBIDPair] {
        &self.entries
    }
}

impl<'a> IntoIterator for &'a KnnList {
    type Item = &'a DoubleDBIDPair;
    type IntoIter = std::slice::Iter<'a, DoubleDBIDPair>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Unordered `(id, distance)` result of a range query.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DoubleDBIDList {
    entries: Vec<DoubleDBIDPair>,
}

impl DoubleDBIDList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, distance: f64, id: DBID) {
        self.entries.push(DoubleDBIDPair::new(distance, id));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DoubleDBIDPair> {
        self.entries.iter()
    }

    pub fn ids(&self) -> Vec<DBID> {
        self.entries.iter().map(|p| p.id).collect()
    }

    /// Sorts by distance, then id.
    pub fn sort(&mut self) {
        self.entries.sort_by(|a, b| a.compare(b));
    }

    pub fn into_vec(self) -> Vec<DoubleDBIDPair> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a DoubleDBIDList {
    type Item = &'a DoubleDBIDPair;
    type IntoIter = std::slice::Iter<'a, DoubleDBIDPair>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<DoubleDBIDPair> for DoubleDBIDList {
    fn from_iter<T: IntoIterator<Item = DoubleDBIDPair>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
