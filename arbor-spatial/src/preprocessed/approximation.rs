//! Approximate kNN lists restricted to tree partitions.

use std::collections::HashMap;
use std::sync::Arc;

use arbor::dbid::DBID;
use arbor::distance::PrimitiveDistance;
use arbor::errors::{ArborError, ArborResult, ErrorKind};
use arbor::events::{DataStoreEvent, DataStoreListener};
use arbor::knn::{KnnHeap, KnnList};
use arbor::query::KnnProvider;
use arbor::relation::Relation;
use parking_lot::RwLock;
use rayon::prelude::*;

use super::{check_k, collect_lists};
use crate::errors::{SpatialError, SpatialResult};
use crate::tree::{ApproximationScope, PartitionedIndex};

/// Pairwise distances within one partition, each computed once.
///
/// A distance is stored the first time a pair is looked up and taken out
/// the second time, so after a partition visited every pair from both
/// sides the cache is empty again.
struct PairCache {
    distances: HashMap<(DBID, DBID), f64>,
    computed: u64,
}

impl PairCache {
    fn new() -> Self {
        Self {
            distances: HashMap::new(),
            computed: 0,
        }
    }

    fn get_or_compute(&mut self, a: DBID, b: DBID, compute: impl FnOnce() -> f64) -> f64 {
        let key = if a <= b { (a, b) } else { (b, a) };
        if let Some(d) = self.distances.remove(&key) {
            return d;
        }
        let d = compute();
        self.computed += 1;
        self.distances.insert(key, d);
        d
    }

    fn len(&self) -> usize {
        self.distances.len()
    }
}

/// kNN lists where each object only sees the objects of its own leaf (or
/// sibling group of leaves) in a tree.
///
/// Partitions smaller than `k` give shorter lists. Register it as a
/// listener after the tree, since changes trigger a recomputation from the
/// tree's current partitions.
pub struct SpatialApproximationPreprocessor<O: ?Sized> {
    relation: Arc<dyn Relation<Object = O>>,
    distance: Arc<dyn PrimitiveDistance<O>>,
    source: Arc<dyn PartitionedIndex>,
    scope: ApproximationScope,
    k: usize,
    lists: RwLock<HashMap<DBID, KnnList>>,
}

impl<O: ?Sized + Send + Sync + 'static> SpatialApproximationPreprocessor<O> {
    pub fn build(
        relation: Arc<dyn Relation<Object = O>>,
        distance: Arc<dyn PrimitiveDistance<O>>,
        k: usize,
        source: Arc<dyn PartitionedIndex>,
        scope: ApproximationScope,
    ) -> SpatialResult<Self> {
        check_k(k)?;
        let preprocessor = Self {
            relation,
            distance,
            source,
            scope,
            k,
            lists: RwLock::new(HashMap::new()),
        };
        preprocessor.recompute(preprocessor.relation.as_ref())?;
        Ok(preprocessor)
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn scope(&self) -> ApproximationScope {
        self.scope
    }

    pub fn len(&self) -> usize {
        self.lists.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn knn(&self, id: DBID) -> Option<KnnList> {
        self.lists.read().get(&id).cloned()
    }

    fn recompute(&self, relation: &dyn Relation<Object = O>) -> SpatialResult<()> {
        let partitions = self.source.partitions(self.scope)?;
        let computed = partitions
            .par_iter()
            .map(|partition| self.process_partition(relation, partition))
            .collect::<SpatialResult<Vec<_>>>()?;

        let mut distances = 0;
        let mut all = Vec::new();
        for (lists, computed) in computed {
            distances += computed;
            all.extend(lists);
        }
        let lists = collect_lists(all)?;
        log::debug!(
            "approximated {}-NN lists of {} objects over {} partitions ({} distances)",
            self.k,
            lists.len(),
            partitions.len(),
            distances
        );
        *self.lists.write() = lists;
        Ok(())
    }

    fn process_partition(
        &self,
        relation: &dyn Relation<Object = O>,
        ids: &[DBID],
    ) -> SpatialResult<(Vec<(DBID, KnnList)>, u64)> {
        let objects = ids
            .iter()
            .map(|&id| {
                relation.get(id).ok_or_else(|| {
                    SpatialError::Core(ArborError::new(
                        &format!("Partition object {} is not in the relation", id),
                        ErrorKind::NotFound,
                    ))
                })
            })
            .collect::<SpatialResult<Vec<_>>>()?;

        let mut cache = PairCache::new();
        let mut lists = Vec::with_capacity(ids.len());
        for (i, &id) in ids.iter().enumerate() {
            let mut heap = KnnHeap::new(self.k);
            heap.insert(0.0, id);
            for (j, &other) in ids.iter().enumerate() {
                if i == j {
                    continue;
                }
                let d = cache.get_or_compute(id, other, || {
                    self.distance.distance(&objects[i], &objects[j])
                });
                heap.insert(d, other);
            }
            lists.push((id, heap.into_knn_list()));
        }

        if cache.len() != 0 {
            log::error!(
                "pair cache holds {} distances after a partition of {} objects",
                cache.len(),
                ids.len()
            );
            return Err(SpatialError::InvariantViolation(format!(
                "pair cache not exhausted: {} distances left after partition",
                cache.len()
            )));
        }
        Ok((lists, cache.computed))
    }
}

impl<O: ?Sized + Send + Sync + 'static> KnnProvider for SpatialApproximationPreprocessor<O> {
    fn k_max(&self) -> usize {
        self.k
    }

    fn knn_of(&self, id: DBID) -> Option<KnnList> {
        self.knn(id)
    }
}

impl<O: ?Sized + Send + Sync + 'static> DataStoreListener<O>
    for SpatialApproximationPreprocessor<O>
{
    fn content_changed(
        &self,
        relation: &dyn Relation<Object = O>,
        event: &DataStoreEvent<O>,
    ) -> ArborResult<()> {
        log::trace!("recomputing approximate kNN lists after {:?}", event);
        Ok(self.recompute(relation)?)
    }
}
