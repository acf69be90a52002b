//! Exact kNN and reverse-kNN lists for every object of a relation.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use arbor::dbid::DBID;
use arbor::errors::{ArborError, ArborResult, ErrorKind};
use arbor::events::{DataStoreEvent, DataStoreListener};
use arbor::knn::{DoubleDBIDList, KnnList};
use arbor::query::{KnnProvider, KnnQuery};
use arbor::relation::Relation;
use parking_lot::RwLock;

use super::check_k;
use crate::errors::SpatialResult;

#[derive(Default)]
struct Lists {
    knn: HashMap<DBID, KnnList>,
    /// For each object, the objects listing it as a neighbour.
    reverse: HashMap<DBID, BTreeSet<DBID>>,
}

impl Lists {
    fn set(&mut self, id: DBID, list: KnnList) {
        if let Some(old) = self.knn.remove(&id) {
            for neighbour in old.ids() {
                if let Some(set) = self.reverse.get_mut(&neighbour) {
                    set.remove(&id);
                }
            }
        }
        for neighbour in list.ids() {
            self.reverse.entry(neighbour).or_default().insert(id);
        }
        self.knn.insert(id, list);
    }

    /// Drops the list of `id` and returns the objects that listed it.
    fn remove(&mut self, id: DBID) -> BTreeSet<DBID> {
        if let Some(old) = self.knn.remove(&id) {
            for neighbour in old.ids() {
                if let Some(set) = self.reverse.get_mut(&neighbour) {
                    set.remove(&id);
                }
            }
        }
        self.reverse.remove(&id).unwrap_or_default()
    }
}

/// Materialized kNN lists, computed in parallel through a [`KnnQuery`].
///
/// Register it as a listener of the relation *after* the index serving the
/// query, so recomputed lists see the updated index.
pub struct MaterializeKnnPreprocessor<O: ?Sized> {
    query: KnnQuery<O>,
    k: usize,
    lists: RwLock<Lists>,
}

impl<O: ?Sized + Send + Sync + 'static> MaterializeKnnPreprocessor<O> {
    /// Computes the `k` nearest neighbours of every object in `relation`.
    /// Each object is its own nearest neighbour.
    pub fn build(
        relation: &Arc<dyn Relation<Object = O>>,
        query: KnnQuery<O>,
        k: usize,
    ) -> SpatialResult<Self> {
        check_k(k)?;
        let ids = relation.dbids();
        let computed = query.bulk_knn(&ids, k)?;
        let mut lists = Lists::default();
        for (id, list) in computed {
            lists.set(id, list);
        }
        log::debug!(
            "materialized {}-NN lists of {} objects using {}",
            k,
            ids.len(),
            query.backend_name()
        );
        Ok(Self {
            query,
            k,
            lists: RwLock::new(lists),
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of materialized lists.
    pub fn len(&self) -> usize {
        self.lists.read().knn.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn knn(&self, id: DBID) -> Option<KnnList> {
        self.lists.read().knn.get(&id).cloned()
    }

    /// Objects listing `id` among their `k` nearest neighbours, nearest
    /// first.
    pub fn rknn(&self, id: DBID) -> Option<DoubleDBIDList> {
        let lists = self.lists.read();
        if !lists.knn.contains_key(&id) {
            return None;
        }
        let mut result = DoubleDBIDList::new();
        if let Some(set) = lists.reverse.get(&id) {
            for &other in set {
                if let Some(d) = lists.knn.get(&other).and_then(|l| l.distance_of(id)) {
                    result.push(d, other);
                }
            }
        }
        result.sort();
        Some(result)
    }

    fn inserted(&self, relation: &dyn Relation<Object = O>, ids: &[DBID]) -> ArborResult<()> {
        let fresh = self.query.bulk_knn(ids, self.k)?;
        let objects = ids
            .iter()
            .map(|&id| {
                relation.get(id).ok_or_else(|| {
                    ArborError::new(&format!("Inserted object {} is missing", id), ErrorKind::NotFound)
                })
            })
            .collect::<ArborResult<Vec<_>>>()?;

        let affected: Vec<DBID> = {
            let lists = self.lists.read();
            let distance = self.query.distance();
            lists
                .knn
                .iter()
                .filter(|(id, list)| {
                    let Some(object) = relation.get(**id) else {
                        return false;
                    };
                    let k_distance = if list.len() < self.k {
                        f64::INFINITY
                    } else {
                        list.k_distance()
                    };
                    objects
                        .iter()
                        .any(|new| distance.distance(&object, new) <= k_distance)
                })
                .map(|(id, _)| *id)
                .collect()
        };
        let updated = self.query.bulk_knn(&affected, self.k)?;

        let mut lists = self.lists.write();
        for (id, list) in fresh.into_iter().chain(updated) {
            lists.set(id, list);
        }
        log::debug!(
            "{} objects inserted, {} kNN lists recomputed",
            ids.len(),
            affected.len()
        );
        Ok(())
    }

    fn removed(&self, ids: &[DBID]) -> ArborResult<()> {
        let mut affected = BTreeSet::new();
        {
            let mut lists = self.lists.write();
            for &id in ids {
                affected.extend(lists.remove(id));
            }
            for id in ids {
                affected.remove(id);
            }
        }
        let affected: Vec<DBID> = affected.into_iter().collect();
        let updated = self.query.bulk_knn(&affected, self.k)?;

        let mut lists = self.lists.write();
        for (id, list) in updated {
            lists.set(id, list);
        }
        log::debug!(
            "{} objects removed, {} kNN lists recomputed",
            ids.len(),
            affected.len()
        );
        Ok(())
    }
}

impl<O: ?Sized + Send + Sync + 'static> KnnProvider for MaterializeKnnPreprocessor<O> {
    fn k_max(&self) -> usize {
        self.k
    }

    fn knn_of(&self, id: DBID) -> Option<KnnList> {
        self.knn(id)
    }
}

impl<O: ?Sized + Send + Sync + 'static> DataStoreListener<O> for MaterializeKnnPreprocessor<O> {
    fn content_changed(
        &self,
        relation: &dyn Relation<Object = O>,
        event: &DataStoreEvent<O>,
    ) -> ArborResult<()> {
        match event {
            DataStoreEvent::Inserted(ids) => self.inserted(relation, ids),
            DataStoreEvent::Removed(items) => {
                let ids: Vec<DBID> = items.iter().map(|(id, _)| *id).collect();
                self.removed(&ids)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor::distance::{ArcCosineDistance, EuclideanDistance, PrimitiveDistance};
    use arbor::query::QueryBuilder;
    use arbor::relation::VectorRelation;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::persistent::MemoryPageFile;
    use crate::rstar::{RStarNode, RStarTree, RStarTreeConfig};
    use crate::tree::SharedIndex;

    type SharedTree = SharedIndex<RStarTree<MemoryPageFile<RStarNode>>>;

    fn vectors(n: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| vec![rng.gen_range(0.0..50.0), rng.gen_range(0.0..50.0)])
            .collect()
    }

    fn scan(relation: &dyn Relation<Object = [f64]>, id: DBID, k: usize) -> Vec<f64> {
        let object = relation.get(id).unwrap();
        let mut all: Vec<f64> = relation
            .dbids()
            .into_iter()
            .map(|other| EuclideanDistance.distance(&object, &relation.get(other).unwrap()))
            .collect();
        all.sort_by(f64::total_cmp);
        all.truncate(k);
        all
    }

    fn assert_exact(pre: &MaterializeKnnPreprocessor<[f64]>, relation: &dyn Relation<Object = [f64]>) {
        assert_eq!(pre.len(), relation.size());
        for id in relation.dbids() {
            let list = pre.knn(id).unwrap();
            let got: Vec<f64> = list.iter().map(|p| p.distance).collect();
            assert_eq!(got, scan(relation, id, pre.k()), "list of {}", id);
            for neighbour in list.ids() {
                let rknn = pre.rknn(neighbour).unwrap();
                assert!(rknn.ids().contains(&id));
            }
        }
    }

    /// Relation, R*-tree listener and preprocessor listener, in that order.
    fn setup(n: usize, k: usize) -> (Arc<VectorRelation>, Arc<MaterializeKnnPreprocessor<[f64]>>) {
        let relation = Arc::new(VectorRelation::for_vectors());
        let tree = RStarTree::new(MemoryPageFile::new(), RStarTreeConfig::new().with_capacity(6)).unwrap();
        let shared: Arc<SharedTree> = Arc::new(SharedIndex::new(tree));
        relation.add_listener(shared.clone());
        relation.insert_all(vectors(n, 1).into_iter().map(Arc::from).collect()).unwrap();

        let dynamic: Arc<dyn Relation<Object = [f64]>> = relation.clone();
        let query = QueryBuilder::new(dynamic.clone(), Arc::new(EuclideanDistance))
            .with_index(shared)
            .knn_query()
            .unwrap();
        assert_eq!(query.backend_name(), "Shared(RStarTree)");
        let pre = Arc::new(MaterializeKnnPreprocessor::build(&dynamic, query, k).unwrap());
        relation.add_listener(pre.clone());
        (relation, pre)
    }

    #[test]
    fn test_build_matches_scan() {
        let (relation, pre) = setup(120, 5);
        assert_exact(&pre, relation.as_ref());
        // every object is its own nearest neighbour
        let first = relation.dbids()[0];
        assert_eq!(pre.knn(first).unwrap().get(0).unwrap().distance, 0.0);
        assert!(pre.knn(DBID::new(9999)).is_none());
        assert!(pre.rknn(DBID::new(9999)).is_none());
    }

    #[test]
    fn test_follows_inserts() {
        let (relation, pre) = setup(80, 4);
        relation.insert_vector(vec![10.0, 10.0]).unwrap();
        relation
            .insert_all(vectors(15, 2).into_iter().map(Arc::from).collect())
            .unwrap();
        assert_exact(&pre, relation.as_ref());
    }

    #[test]
    fn test_follows_deletes() {
        let (relation, pre) = setup(80, 4);
        let ids = relation.dbids();
        relation.delete(&ids[10..25]).unwrap();
        assert_exact(&pre, relation.as_ref());
        for id in &ids[10..25] {
            assert!(pre.knn(*id).is_none());
        }
    }

    #[test]
    fn test_provider_k_distance() {
        let (relation, pre) = setup(50, 3);
        let id = relation.dbids()[7];
        let expected = scan(relation.as_ref(), id, 3);
        assert_eq!(pre.k_max(), 3);
        assert_eq!(pre.k_distance(id, 2), Some(expected[1]));
    }

    #[test]
    fn test_rejects_zero_k() {
        let relation: Arc<dyn Relation<Object = [f64]>> =
            Arc::new(VectorRelation::from_vectors(vectors(5, 3)).unwrap());
        let query = QueryBuilder::new(relation.clone(), Arc::new(EuclideanDistance))
            .linear_scan(true)
            .knn_query()
            .unwrap();
        assert!(MaterializeKnnPreprocessor::build(&relation, query, 0).is_err());
    }

    #[test]
    fn test_missing_index_fails_fast() {
        let relation: Arc<dyn Relation<Object = [f64]>> =
            Arc::new(VectorRelation::from_vectors(vectors(5, 4)).unwrap());
        let tree = RStarTree::new(MemoryPageFile::new(), RStarTreeConfig::new()).unwrap();
        let shared: Arc<SharedTree> = Arc::new(SharedIndex::new(tree));
        let err = QueryBuilder::new(relation, Arc::new(ArcCosineDistance))
            .with_index(shared)
            .knn_query()
            .err()
            .unwrap();
        assert_eq!(err.kind(), &ErrorKind::Configuration);
        assert!(err.message().contains("ArcCosineDistance"));
    }
}
