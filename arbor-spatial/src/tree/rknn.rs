//! Aggregated k-distances for reverse-kNN pruning.

use std::collections::HashMap;

use arbor::dbid::DBID;
use arbor::query::KnnProvider;

use crate::persistent::PageId;

/// Largest materialized k-distance of the objects below each page.
///
/// An object can only have the query among its k nearest neighbours if the
/// query lies within its k-distance, so a subtree whose lower distance
/// bound to the query exceeds the page bound holds no result. The bounds
/// are a snapshot of tree and provider; collect them again after either
/// changes.
#[derive(Debug, Clone)]
pub struct KDistanceBounds {
    k: usize,
    pages: HashMap<PageId, f64>,
}

impl KDistanceBounds {
    pub(crate) fn new(k: usize) -> Self {
        Self {
            k,
            pages: HashMap::new(),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Bound of `page`. `NEG_INFINITY` when no object below it has a
    /// stored list, `INFINITY` for pages collected after the snapshot.
    pub fn bound(&self, page: PageId) -> f64 {
        self.pages.get(&page).copied().unwrap_or(f64::INFINITY)
    }

    /// Number of pages with a bound.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub(crate) fn record(&mut self, page: PageId, bound: f64) {
        self.pages.insert(page, bound);
    }
}

/// Folds the k-distance of `id` into a running maximum. A NaN k-distance
/// makes the subtree unprunable.
pub(crate) fn fold_k_distance(max: f64, provider: &dyn KnnProvider, id: DBID, k: usize) -> f64 {
    match provider.k_distance(id, k) {
        Some(d) if d.is_nan() => f64::INFINITY,
        Some(d) => max.max(d),
        None => max,
    }
}

/// Whether a subtree with lower distance bound `lower` to the query can
/// hold an object whose k-distance is at most `bound`.
pub(crate) fn may_contain(lower: f64, bound: f64) -> bool {
    bound != f64::NEG_INFINITY && lower <= bound
}
