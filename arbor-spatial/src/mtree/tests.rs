use std::collections::HashMap;
use std::sync::Arc;

use arbor::dbid::DBID;
use arbor::distance::{
    ArcCosineDistance, EuclideanDistance, ManhattanDistance, PrimitiveDistance,
    SquaredEuclideanDistance,
};
use arbor::errors::ErrorKind;
use arbor::knn::KnnList;
use arbor::query::{KnnIndex, KnnProvider};
use arbor::relation::{Relation, VectorRelation};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

use super::*;
use crate::persistent::{MemoryPageFile, PersistentPageFile};

type MemMTree = MTree<[f64], MemoryPageFile<MTreeNode>>;

fn relation(n: usize, dim: usize, seed: u64) -> Arc<dyn Relation<Object = [f64]>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let vectors = (0..n)
        .map(|_| (0..dim).map(|_| rng.gen_range(0.0..100.0)).collect())
        .collect();
    Arc::new(VectorRelation::from_vectors(vectors).unwrap())
}

fn build(
    relation: &Arc<dyn Relation<Object = [f64]>>,
    distance: Arc<dyn PrimitiveDistance<[f64]>>,
    config: MTreeConfig,
) -> MemMTree {
    MTree::build(Arc::clone(relation), distance, MemoryPageFile::new(), config).unwrap()
}

fn scan_knn(
    relation: &Arc<dyn Relation<Object = [f64]>>,
    distance: &dyn PrimitiveDistance<[f64]>,
    query: &[f64],
    k: usize,
) -> Vec<(f64, DBID)> {
    let mut all: Vec<(f64, DBID)> = relation
        .dbids()
        .into_iter()
        .map(|id| (distance.distance(query, &relation.get(id).unwrap()), id))
        .collect();
    all.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    all.truncate(k);
    all
}

fn assert_matches_scan(tree: &MemMTree, relation: &Arc<dyn Relation<Object = [f64]>>, dim: usize) {
    let queries = relation_queries(dim);
    for query in &queries {
        let knn = tree.knn(query, 10).unwrap();
        let got: Vec<f64> = knn.iter().map(|p| p.distance).collect();
        let expected: Vec<f64> = scan_knn(relation, tree.distance(), query, 10)
            .into_iter()
            .map(|(d, _)| d)
            .collect();
        assert_eq!(got, expected);

        let radius = expected[4];
        let mut range = tree.range(query, radius).unwrap().ids();
        range.sort();
        let mut want: Vec<DBID> = relation
            .dbids()
            .into_iter()
            .filter(|id| tree.distance().distance(query, &relation.get(*id).unwrap()) <= radius)
            .collect();
        want.sort();
        assert_eq!(range, want);
    }
}

fn relation_queries(dim: usize) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(77);
    (0..12)
        .map(|_| (0..dim).map(|_| rng.gen_range(0.0..100.0)).collect())
        .collect()
}

fn assert_valid(tree: &MemMTree) {
    let report = tree.check_integrity().unwrap();
    assert!(report.is_valid(), "{}", report);
    assert_eq!(report.entries_found, tree.size() as u64);
}

#[test]
fn test_queries_match_linear_scan() {
    crate::init_test_logger();
    let rel = relation(400, 3, 1);
    for promotion in [
        PromotionStrategy::MMRad,
        PromotionStrategy::MLBDist,
        PromotionStrategy::FarthestPoints,
        PromotionStrategy::Random,
    ] {
        for distribution in [DistributionStrategy::GeneralizedHyperplane, DistributionStrategy::Balanced] {
            let config = MTreeConfig::new()
                .with_capacity(8)
                .with_promotion(promotion)
                .with_distribution(distribution)
                .with_seed(5);
            let tree = build(&rel, Arc::new(EuclideanDistance), config);
            assert_eq!(tree.size(), 400);
            assert!(tree.height() > 1);
            assert_valid(&tree);
            assert_matches_scan(&tree, &rel, 3);
        }
    }
}

#[test]
fn test_other_metrics() {
    let rel = relation(250, 4, 2);
    for distance in [
        Arc::new(ManhattanDistance) as Arc<dyn PrimitiveDistance<[f64]>>,
        Arc::new(ArcCosineDistance),
    ] {
        let tree = build(&rel, distance, MTreeConfig::new().with_capacity(6));
        assert_valid(&tree);
        assert_matches_scan(&tree, &rel, 4);
    }
}

#[test]
fn test_non_metric_distance_is_rejected() {
    let rel = relation(10, 2, 3);
    let err = MemMTree::new(
        rel,
        Arc::new(SquaredEuclideanDistance),
        MemoryPageFile::new(),
        MTreeConfig::new(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, SpatialError::Configuration(_)));
}

#[test]
fn test_missing_object_is_not_found() {
    let rel = relation(10, 2, 4);
    let mut tree = build(&rel, Arc::new(EuclideanDistance), MTreeConfig::new());
    let err = tree.insert(DBID::new(999)).unwrap_err();
    match err {
        SpatialError::Core(inner) => assert_eq!(inner.kind(), &ErrorKind::NotFound),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(tree.size(), 10);
}

#[test]
fn test_delete_is_unsupported() {
    let rel = relation(10, 2, 5);
    let mut tree = build(&rel, Arc::new(EuclideanDistance), MTreeConfig::new());
    let object = rel.get(DBID::new(3)).unwrap();
    let err = DynamicIndex::delete(&mut tree, DBID::new(3), &object).unwrap_err();
    assert!(matches!(err, SpatialError::Unsupported(_)));
    assert_eq!(tree.size(), 10);
}

#[test]
fn test_degenerate_queries() {
    let rel = relation(50, 2, 6);
    let empty = MemMTree::new(
        Arc::clone(&rel),
        Arc::new(EuclideanDistance),
        MemoryPageFile::new(),
        MTreeConfig::new(),
    )
    .unwrap();
    assert!(empty.knn(&[1.0, 1.0], 3).unwrap().is_empty());
    assert_eq!(empty.range(&[1.0, 1.0], 10.0).unwrap().len(), 0);
    assert!(empty.check_integrity().unwrap().is_valid());

    let tree = build(&rel, Arc::new(EuclideanDistance), MTreeConfig::new().with_capacity(4));
    assert!(tree.knn(&[1.0, 1.0], 0).unwrap().is_empty());
    assert_eq!(tree.knn(&[1.0, 1.0], 500).unwrap().len(), 50);
    assert_eq!(tree.range(&[1.0, 1.0], -1.0).unwrap().len(), 0);
    assert_eq!(tree.range(&[1.0, 1.0], f64::NAN).unwrap().len(), 0);
    assert_eq!(tree.range(&[50.0, 50.0], f64::INFINITY).unwrap().len(), 50);
}

#[test]
fn test_duplicate_objects() {
    let vectors = vec![vec![2.0, 2.0]; 40];
    let rel: Arc<dyn Relation<Object = [f64]>> = Arc::new(VectorRelation::from_vectors(vectors).unwrap());
    let tree = build(&rel, Arc::new(EuclideanDistance), MTreeConfig::new().with_capacity(4));
    assert_valid(&tree);
    let knn = tree.knn(&[2.0, 2.0], 7).unwrap();
    assert_eq!(knn.len(), 7);
    assert_eq!(knn.k_distance(), 0.0);
    assert_eq!(tree.range(&[2.0, 2.0], 0.0).unwrap().len(), 40);
}

#[test]
fn test_knn_index_matches_distance_by_name() {
    let rel = relation(60, 2, 7);
    let tree = build(&rel, Arc::new(EuclideanDistance), MTreeConfig::new());
    assert_eq!(KnnIndex::name(&tree), "MTree");
    assert!(tree.supports(&EuclideanDistance));
    assert!(!tree.supports(&ManhattanDistance));

    let via_trait = KnnIndex::knn(&tree, &EuclideanDistance, &[3.0, 3.0], 4).unwrap();
    assert_eq!(via_trait, tree.knn(&[3.0, 3.0], 4).unwrap());

    let err = KnnIndex::range(&tree, &ManhattanDistance, &[3.0, 3.0], 5.0).unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::Configuration);
}

struct ScanProvider {
    k_max: usize,
    lists: HashMap<DBID, KnnList>,
}

impl KnnProvider for ScanProvider {
    fn k_max(&self) -> usize {
        self.k_max
    }

    fn knn_of(&self, id: DBID) -> Option<KnnList> {
        self.lists.get(&id).cloned()
    }
}

#[test]
fn test_reverse_knn() {
    let rel = relation(150, 2, 8);
    let tree = build(&rel, Arc::new(EuclideanDistance), MTreeConfig::new().with_capacity(6));
    let lists = rel
        .dbids()
        .into_iter()
        .map(|id| {
            let object = rel.get(id).unwrap();
            let pairs = scan_knn(&rel, &EuclideanDistance, &object, 4)
                .into_iter()
                .map(|(d, n)| arbor::dbid::DoubleDBIDPair::new(d, n))
                .collect();
            (id, KnnList::from_sorted(4, pairs))
        })
        .collect();
    let provider = ScanProvider { k_max: 4, lists };

    let query = rel.get(DBID::new(20)).unwrap();
    let mut got = tree.reverse_knn(&query, 2, &provider).unwrap().ids();
    got.sort();
    let mut expected: Vec<DBID> = rel
        .dbids()
        .into_iter()
        .filter(|id| {
            let d = EuclideanDistance.distance(&query, &rel.get(*id).unwrap());
            d <= provider.k_distance(*id, 2).unwrap()
        })
        .collect();
    expected.sort();
    assert_eq!(got, expected);
    assert!(got.contains(&DBID::new(20)));

    assert!(tree.reverse_knn(&query, 5, &provider).is_err());
}

fn scan_provider(rel: &Arc<dyn Relation<Object = [f64]>>, k_max: usize) -> ScanProvider {
    let lists = rel
        .dbids()
        .into_iter()
        .map(|id| {
            let object = rel.get(id).unwrap();
            let pairs = scan_knn(rel, &EuclideanDistance, &object, k_max)
                .into_iter()
                .map(|(d, n)| arbor::dbid::DoubleDBIDPair::new(d, n))
                .collect();
            (id, KnnList::from_sorted(k_max, pairs))
        })
        .collect();
    ScanProvider { k_max, lists }
}

#[test]
fn test_reverse_knn_prunes_subtrees() {
    let rel = relation(1500, 2, 21);
    let tree = build(&rel, Arc::new(EuclideanDistance), MTreeConfig::new().with_capacity(8));
    let provider = scan_provider(&rel, 4);
    let bounds = tree.k_distance_bounds(4, &provider).unwrap();
    assert_eq!(bounds.k(), 4);

    for query in relation_queries(2) {
        let before = tree.stats().distance_computations;
        let mut got = tree.reverse_knn_bounded(&query, &bounds, &provider).unwrap().ids();
        let spent = tree.stats().distance_computations - before;
        assert!(spent < tree.size() as u64, "{} distances for {} objects", spent, tree.size());

        got.sort();
        let mut expected: Vec<DBID> = rel
            .dbids()
            .into_iter()
            .filter(|id| {
                let d = EuclideanDistance.distance(&query, &rel.get(*id).unwrap());
                d <= provider.k_distance(*id, 4).unwrap()
            })
            .collect();
        expected.sort();
        assert_eq!(got, expected);
        assert_eq!(tree.reverse_knn(&query, 4, &provider).unwrap().ids().len(), expected.len());
    }
}

#[test]
fn test_partitions_cover_all_objects() {
    let rel = relation(300, 2, 9);
    let tree = build(&rel, Arc::new(EuclideanDistance), MTreeConfig::new().with_capacity(5));
    assert!(tree.height() >= 3);
    for scope in [ApproximationScope::Leaf, ApproximationScope::Siblings] {
        let partitions = tree.partitions(scope).unwrap();
        let mut ids: Vec<DBID> = partitions.iter().flatten().copied().collect();
        ids.sort();
        assert_eq!(ids, rel.dbids());
        assert!(partitions.iter().all(|p| !p.is_empty()));
    }
    let leaves = tree.partitions(ApproximationScope::Leaf).unwrap().len();
    let siblings = tree.partitions(ApproximationScope::Siblings).unwrap().len();
    assert!(siblings < leaves);
}

#[test]
fn test_insert_follows_relation() {
    let vectors = VectorRelation::for_vectors();
    let rel = Arc::new(vectors);
    let dynamic: Arc<dyn Relation<Object = [f64]>> = rel.clone();
    let mut tree = MemMTree::new(
        dynamic,
        Arc::new(EuclideanDistance),
        MemoryPageFile::new(),
        MTreeConfig::new().with_capacity(4),
    )
    .unwrap();
    for i in 0..30 {
        let id = rel.insert_vector(vec![i as f64, (i % 7) as f64]).unwrap();
        tree.insert(id).unwrap();
    }
    assert_eq!(tree.size(), 30);
    assert_valid(&tree);
    let nearest = tree.knn(&[10.2, 3.0], 1).unwrap();
    assert_eq!(nearest.get(0).unwrap().id, DBID::new(10));
}

#[test]
fn test_persistent_tree_reopens() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mtree.pages");
    let rel = relation(200, 3, 10);
    let query = [40.0, 40.0, 40.0];

    let file = PersistentPageFile::<MTreeNode>::create(&path, 1024, 8).unwrap();
    let tree = MTree::build(
        Arc::clone(&rel),
        Arc::new(EuclideanDistance),
        file,
        MTreeConfig::new().with_capacity(10),
    )
    .unwrap();
    let before = tree.knn(&query, 6).unwrap();
    let height = tree.height();
    let mut file = tree.close().unwrap();
    file.close().unwrap();

    let file = PersistentPageFile::<MTreeNode>::open(&path, 8).unwrap();
    let reopened = MTree::open(Arc::clone(&rel), Arc::new(EuclideanDistance), file, MTreeConfig::new()).unwrap();
    assert_eq!(reopened.size(), 200);
    assert_eq!(reopened.height(), height);
    assert_eq!(reopened.config().leaf_capacity, 10);
    assert_eq!(reopened.knn(&query, 6).unwrap(), before);
    assert!(reopened.check_integrity().unwrap().is_valid());
}

#[test]
fn test_open_requires_header() {
    let rel = relation(5, 2, 11);
    let err = MemMTree::open(rel, Arc::new(EuclideanDistance), MemoryPageFile::new(), MTreeConfig::new())
        .err()
        .unwrap();
    assert!(matches!(err, SpatialError::InvalidFormat(_)));
}
