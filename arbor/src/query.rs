//! The query API exposed to algorithms.
//!
//! Indexes implement [`KnnIndex`]. A [`QueryBuilder`] picks the first
//! registered index that supports the requested distance and fails with a
//! configuration error when none does, unless a linear scan was explicitly
//! allowed. The resulting [`KnnQuery`] is cheap to share across threads.

use std::sync::Arc;

use rayon::prelude::*;

use crate::dbid::DBID;
use crate::distance::PrimitiveDistance;
use crate::errors::{ArborError, ArborResult, ErrorKind};
use crate::knn::{DoubleDBIDList, KnnHeap, KnnList};
use crate::relation::Relation;

/// An index answering kNN and range queries for some distances.
pub trait KnnIndex<O: ?Sized>: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this index can answer queries under `distance`.
    fn supports(&self, distance: &dyn PrimitiveDistance<O>) -> bool;

    /// The `k` nearest objects, nearest first. `k == 0` yields an empty list.
    fn knn(&self, distance: &dyn PrimitiveDistance<O>, query: &O, k: usize) -> ArborResult<KnnList>;

    /// All objects with `distance(query, obj) <= radius`, in no particular order.
    fn range(
        &self,
        distance: &dyn PrimitiveDistance<O>,
        query: &O,
        radius: f64,
    ) -> ArborResult<DoubleDBIDList>;

    /// Objects having `query` within their k-distance, as stored by
    /// `provider`. Indexes that cannot evaluate reverse queries refuse.
    fn reverse_knn(
        &self,
        distance: &dyn PrimitiveDistance<O>,
        query: &O,
        k: usize,
        provider: &dyn KnnProvider,
    ) -> ArborResult<DoubleDBIDList> {
        let _ = (distance, query, k, provider);
        Err(ArborError::new(
            &format!("{} does not answer reverse kNN queries", self.name()),
            ErrorKind::Unsupported,
        ))
    }
}

/// Materialized forward kNN lists, used to verify reverse-kNN candidates.
pub trait KnnProvider: Send + Sync {
    /// Largest k the lists were computed for.
    fn k_max(&self) -> usize;

    /// The stored neighbour list of `id`.
    fn knn_of(&self, id: DBID) -> Option<KnnList>;

    /// Distance to the k-th neighbour of `id`; the farthest stored neighbour
    /// when fewer than `k` exist.
    fn k_distance(&self, id: DBID, k: usize) -> Option<f64> {
        self.knn_of(id).map(|list| {
            let pos = k.min(list.len());
            if pos == 0 {
                f64::INFINITY
            } else {
                list.get(pos - 1).map_or(f64::INFINITY, |p| p.distance)
            }
        })
    }
}

/// Checks that a provider can answer reverse queries for `k`.
pub fn check_provider(provider: &dyn KnnProvider, k: usize) -> ArborResult<()> {
    if k > provider.k_max() {
        return Err(ArborError::new(
            &format!(
                "Reverse kNN for k={} requested, but neighbours were only materialized for k={}",
                k,
                provider.k_max()
            ),
            ErrorKind::Configuration,
        ));
    }
    Ok(())
}

// ============================================================================
// Linear scan
// ============================================================================

/// Brute force over the whole relation. Supports every distance.
pub struct LinearScan<O: ?Sized> {
    relation: Arc<dyn Relation<Object = O>>,
}

impl<O: ?Sized + 'static> LinearScan<O> {
    pub fn new(relation: Arc<dyn Relation<Object = O>>) -> Self {
        Self { relation }
    }
}

impl<O: ?Sized + 'static> KnnIndex<O> for LinearScan<O> {
    fn name(&self) -> &str {
        "LinearScan"
    }

    fn supports(&self, _distance: &dyn PrimitiveDistance<O>) -> bool {
        true
    }

    fn knn(&self, distance: &dyn PrimitiveDistance<O>, query: &O, k: usize) -> ArborResult<KnnList> {
        let mut heap = KnnHeap::new(k);
        if k == 0 {
            return Ok(heap.into_knn_list());
        }
        for id in self.relation.dbids() {
            if let Some(obj) = self.relation.get(id) {
                heap.insert(distance.distance(query, &obj), id);
            }
        }
        Ok(heap.into_knn_list())
    }

    fn range(
        &self,
        distance: &dyn PrimitiveDistance<O>,
        query: &O,
        radius: f64,
    ) -> ArborResult<DoubleDBIDList> {
        let mut result = DoubleDBIDList::new();
        for id in self.relation.dbids() {
            if let Some(obj) = self.relation.get(id) {
                let d = distance.distance(query, &obj);
                if d <= radius {
                    result.push(d, id);
                }
            }
        }
        Ok(result)
    }

    fn reverse_knn(
        &self,
        distance: &dyn PrimitiveDistance<O>,
        query: &O,
        k: usize,
        provider: &dyn KnnProvider,
    ) -> ArborResult<DoubleDBIDList> {
        let mut result = DoubleDBIDList::new();
        if k == 0 {
            return Ok(result);
        }
        check_provider(provider, k)?;
        for id in self.relation.dbids() {
            let Some(obj) = self.relation.get(id) else {
                continue;
            };
            let d = distance.distance(query, &obj);
            if let Some(kdist) = provider.k_distance(id, k) {
                if d <= kdist {
                    result.push(d, id);
                }
            }
        }
        Ok(result)
    }
}

// ============================================================================
// Query selection
// ============================================================================

/// Selects the index that will serve queries for one distance.
pub struct QueryBuilder<O: ?Sized> {
    relation: Arc<dyn Relation<Object = O>>,
    distance: Arc<dyn PrimitiveDistance<O>>,
    indexes: Vec<Arc<dyn KnnIndex<O>>>,
    linear_scan: bool,
}

impl<O: ?Sized + 'static> QueryBuilder<O> {
    pub fn new(
        relation: Arc<dyn Relation<Object = O>>,
        distance: Arc<dyn PrimitiveDistance<O>>,
    ) -> Self {
        Self {
            relation,
            distance,
            indexes: Vec::new(),
            linear_scan: false,
        }
    }

    /// Registers a candidate index; earlier registrations win.
    pub fn with_index(mut self, index: Arc<dyn KnnIndex<O>>) -> Self {
        self.indexes.push(index);
        self
    }

    /// Allows falling back to a linear scan when no index fits.
    pub fn linear_scan(mut self, allowed: bool) -> Self {
        self.linear_scan = allowed;
        self
    }

    pub fn knn_query(self) -> ArborResult<KnnQuery<O>> {
        let selected = self
            .indexes
            .iter()
            .find(|index| index.supports(self.distance.as_ref()))
            .cloned();

        let backend: Arc<dyn KnnIndex<O>> = match selected {
            Some(index) => index,
            None if self.linear_scan => Arc::new(LinearScan::new(self.relation.clone())),
            None => {
                let inspected = self
                    .indexes
                    .iter()
                    .map(|i| i.name().to_string())
                    .collect::<Vec<_>>();
                log::error!(
                    "no index for {} among {:?}",
                    self.distance.name(),
                    inspected
                );
                return Err(ArborError::new(
                    &format!(
                        "No index supports {} (inspected: {:?}); select a linear scan explicitly to allow the slow fallback",
                        self.distance.name(),
                        inspected
                    ),
                    ErrorKind::Configuration,
                ));
            }
        };

        log::debug!(
            "kNN queries for {} served by {}",
            self.distance.name(),
            backend.name()
        );
        Ok(KnnQuery {
            relation: self.relation,
            distance: self.distance,
            backend,
        })
    }
}

/// A resolved query: one distance, one backing index.
pub struct KnnQuery<O: ?Sized> {
    relation: Arc<dyn Relation<Object = O>>,
    distance: Arc<dyn PrimitiveDistance<O>>,
    backend: Arc<dyn KnnIndex<O>>,
}

impl<O: ?Sized> Clone for KnnQuery<O> {
    fn clone(&self) -> Self {
        Self {
            relation: self.relation.clone(),
            distance: self.distance.clone(),
            backend: self.backend.clone(),
        }
    }
}

impl<O: ?Sized + 'static> KnnQuery<O> {
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn distance(&self) -> &dyn PrimitiveDistance<O> {
        self.distance.as_ref()
    }

    pub fn relation(&self) -> &Arc<dyn Relation<Object = O>> {
        &self.relation
    }

    pub fn knn(&self, query: &O, k: usize) -> ArborResult<KnnList> {
        if k == 0 {
            return Ok(KnnList::empty(0));
        }
        self.backend.knn(self.distance.as_ref(), query, k)
    }

    pub fn knn_for_id(&self, id: DBID, k: usize) -> ArborResult<KnnList> {
        let obj = self.relation.get(id).ok_or_else(|| {
            ArborError::new(&format!("Object {} not in relation", id), ErrorKind::NotFound)
        })?;
        self.knn(&obj, k)
    }

    /// Range query. A negative or NaN radius yields an empty result.
    pub fn range(&self, query: &O, radius: f64) -> ArborResult<DoubleDBIDList> {
        if !(radius >= 0.0) {
            return Ok(DoubleDBIDList::new());
        }
        self.backend.range(self.distance.as_ref(), query, radius)
    }

    /// Reverse kNN of `query`, verified against the k-distances stored by
    /// `provider`.
    pub fn reverse_knn(
        &self,
        query: &O,
        k: usize,
        provider: &dyn KnnProvider,
    ) -> ArborResult<DoubleDBIDList> {
        check_provider(provider, k)?;
        if k == 0 {
            return Ok(DoubleDBIDList::new());
        }
        self.backend.reverse_knn(self.distance.as_ref(), query, k, provider)
    }

    /// kNN lists for many objects, computed in parallel. Output order
    /// follows `ids`.
    pub fn bulk_knn(&self, ids: &[DBID], k: usize) -> ArborResult<Vec<(DBID, KnnList)>> {
        ids.par_iter()
            .map(|&id| self.knn_for_id(id, k).map(|list| (id, list)))
            .collect()
    }
}
