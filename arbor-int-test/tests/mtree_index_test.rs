//! Integration tests for the M-tree behind the query API.

use arbor::distance::{ArcCosineDistance, EuclideanDistance, PrimitiveDistance};
use arbor::errors::ErrorKind;
use arbor::query::QueryBuilder;
use arbor::relation::Relation;
use arbor_int_test::test_util::{
    cleanup, create_uniform_context, run_test, scan_knn_distances, scan_range, uniform_points,
};
use arbor_spatial::mtree::{DistributionStrategy, PromotionStrategy};
use arbor_spatial::{
    MTree, MTreeConfig, MTreeNode, MemoryPageFile, PersistentPageFile, RStarNode, RStarTree, RStarTreeConfig,
    SharedIndex,
};
use std::sync::Arc;

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
fn test_mtree_agrees_with_rstar_tree() {
    run_test(
        || create_uniform_context(1200, 4, 31),
        |ctx| {
            let relation = ctx.dyn_relation();
            let mtree = MTree::build(
                relation.clone(),
                Arc::new(EuclideanDistance),
                MemoryPageFile::<MTreeNode>::new(),
                MTreeConfig::new()
                    .with_capacity(12)
                    .with_promotion(PromotionStrategy::MMRad)
                    .with_distribution(DistributionStrategy::Balanced),
            )?;
            assert!(mtree.check_integrity()?.is_valid());

            let mut rtree = RStarTree::new(MemoryPageFile::<RStarNode>::new(), RStarTreeConfig::new())?;
            for id in relation.dbids() {
                if let Some(p) = relation.get(id) {
                    rtree.insert(id, &p)?;
                }
            }

            for q in uniform_points(10, 4, 77) {
                let from_mtree: Vec<f64> = mtree.knn(&q, 15)?.iter().map(|p| p.distance).collect();
                let from_rtree: Vec<f64> = rtree
                    .knn(&EuclideanDistance, &q, 15)?
                    .iter()
                    .map(|p| p.distance)
                    .collect();
                assert_eq!(from_mtree, from_rtree);

                let mut range = mtree.range(&q, 30.0)?.ids();
                range.sort();
                assert_eq!(range, scan_range(relation.as_ref(), &EuclideanDistance, &q, 30.0));
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_non_vector_space_distance_needs_mtree() {
    run_test(
        || create_uniform_context(400, 3, 12),
        |ctx| {
            let relation = ctx.dyn_relation();
            let rtree = RStarTree::new(MemoryPageFile::<RStarNode>::new(), RStarTreeConfig::new())?;
            let shared = Arc::new(SharedIndex::new(rtree));

            let err = QueryBuilder::new(relation.clone(), Arc::new(ArcCosineDistance))
                .with_index(shared)
                .knn_query()
                .err()
                .map(|e| e.kind().clone());
            assert_eq!(err, Some(ErrorKind::Configuration));

            let distance: Arc<dyn PrimitiveDistance<[f64]>> = Arc::new(ArcCosineDistance);
            let mtree = MTree::build(
                relation.clone(),
                distance.clone(),
                MemoryPageFile::<MTreeNode>::new(),
                MTreeConfig::new().with_capacity(10),
            )?;
            let query = QueryBuilder::new(relation.clone(), distance.clone())
                .with_index(Arc::new(mtree))
                .knn_query()?;
            assert_eq!(query.backend_name(), "MTree");

            let q = [1.0, 2.0, 3.0];
            let got: Vec<f64> = query.knn(&q, 8)?.iter().map(|p| p.distance).collect();
            let expected = scan_knn_distances(relation.as_ref(), distance.as_ref(), &q, 8);
            assert_eq!(got.len(), expected.len());
            for (a, b) in got.iter().zip(&expected) {
                assert!((a - b).abs() < 1e-12);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_persistent_mtree_survives_reopen() {
    run_test(
        || create_uniform_context(500, 2, 6),
        |ctx| {
            let relation = ctx.dyn_relation();
            let path = ctx.file("mtree.pages");
            let q = [25.0, 75.0];

            let before = {
                let file = PersistentPageFile::<MTreeNode>::create(&path, 1024, 16)?;
                let tree = MTree::build(
                    relation.clone(),
                    Arc::new(EuclideanDistance),
                    file,
                    MTreeConfig::new().with_capacity(16),
                )?;
                let knn = tree.knn(&q, 10)?;
                let mut file = tree.close()?;
                file.close()?;
                knn
            };

            let file = PersistentPageFile::<MTreeNode>::open(&path, 16)?;
            let tree = MTree::open(relation.clone(), Arc::new(EuclideanDistance), file, MTreeConfig::new())?;
            assert_eq!(tree.size(), 500);
            assert!(tree.check_integrity()?.is_valid());
            assert_eq!(tree.knn(&q, 10)?, before);
            Ok(())
        },
        cleanup,
    )
}
