//! Integration tests for the kNN preprocessors wired to a live relation.

use arbor::dbid::DBID;
use arbor::distance::EuclideanDistance;
use arbor::errors::ErrorKind;
use arbor::query::{KnnProvider, QueryBuilder};
use arbor::relation::{Relation, VectorRelation};
use arbor_int_test::test_util::{
    cleanup, create_golden_context, run_test, scan_knn_distances, uniform_points, TestContext, GOLDEN_BLOBS,
};
use arbor_spatial::tree::{ApproximationScope, PartitionedIndex};
use arbor_spatial::{
    MaterializeKnnPreprocessor, MemoryPageFile, RStarNode, RStarTree, RStarTreeConfig, SharedIndex,
    SpatialApproximationPreprocessor,
};
use std::sync::Arc;

type SharedTree = SharedIndex<RStarTree<MemoryPageFile<RStarNode>>>;

#[ctor::ctor]
fn init() {
    colog::init();
}

/// Registers an R*-tree on the relation of `ctx` and loads it.
fn indexed(ctx: &TestContext, n: usize, seed: u64) -> arbor::errors::ArborResult<Arc<SharedTree>> {
    let tree = RStarTree::new(MemoryPageFile::new(), RStarTreeConfig::new().with_capacity(10))?;
    let shared: Arc<SharedTree> = Arc::new(SharedIndex::new(tree));
    ctx.relation().add_listener(shared.clone());
    ctx.relation()
        .insert_all(uniform_points(n, 2, seed).into_iter().map(Arc::from).collect())?;
    Ok(shared)
}

fn assert_lists_exact(pre: &MaterializeKnnPreprocessor<[f64]>, relation: &dyn Relation<Object = [f64]>) {
    assert_eq!(pre.len(), relation.size());
    for id in relation.dbids() {
        let object = relation.get(id).unwrap();
        let got: Vec<f64> = pre.knn(id).unwrap().iter().map(|p| p.distance).collect();
        assert_eq!(got, scan_knn_distances(relation, &EuclideanDistance, &object, pre.k()));
    }
}

#[test]
fn test_materialized_lists_follow_relation() {
    run_test(
        || TestContext::new(VectorRelation::for_vectors()),
        |ctx| {
            let shared = indexed(&ctx, 300, 1)?;
            let relation = ctx.dyn_relation();
            let query = QueryBuilder::new(relation.clone(), Arc::new(EuclideanDistance))
                .with_index(shared)
                .knn_query()?;
            let pre = Arc::new(MaterializeKnnPreprocessor::build(&relation, query, 6)?);
            ctx.relation().add_listener(pre.clone());
            assert_lists_exact(&pre, relation.as_ref());

            let added = ctx
                .relation()
                .insert_all(uniform_points(40, 2, 2).into_iter().map(Arc::from).collect())?;
            assert_lists_exact(&pre, relation.as_ref());

            let mut removed = added[..10].to_vec();
            removed.extend(relation.dbids().into_iter().take(25));
            ctx.relation().delete(&removed)?;
            assert_lists_exact(&pre, relation.as_ref());
            for id in &removed {
                assert!(pre.knn(*id).is_none());
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_preprocessor_requires_index() {
    run_test(
        create_golden_context,
        |ctx| {
            let err = QueryBuilder::new(ctx.dyn_relation(), Arc::new(EuclideanDistance))
                .knn_query()
                .err()
                .map(|e| e.kind().clone());
            assert_eq!(err, Some(ErrorKind::Configuration));

            let query = QueryBuilder::new(ctx.dyn_relation(), Arc::new(EuclideanDistance))
                .linear_scan(true)
                .knn_query()?;
            let pre = MaterializeKnnPreprocessor::build(&ctx.dyn_relation(), query, 3)?;
            assert_eq!(pre.len(), ctx.relation().size());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_golden_neighbours_stay_in_blob() {
    run_test(
        create_golden_context,
        |ctx| {
            let relation = ctx.dyn_relation();
            let mut tree = RStarTree::new(MemoryPageFile::<RStarNode>::new(), RStarTreeConfig::new())?;
            for id in relation.dbids() {
                if let Some(p) = relation.get(id) {
                    tree.insert(id, &p)?;
                }
            }
            let shared: Arc<SharedTree> = Arc::new(SharedIndex::new(tree));
            let query = QueryBuilder::new(relation.clone(), Arc::new(EuclideanDistance))
                .with_index(shared)
                .knn_query()?;
            let pre = MaterializeKnnPreprocessor::build(&relation, query, 10)?;

            // ids are assigned blob by blob
            let blob_of = |id: DBID| {
                let mut end = 0;
                GOLDEN_BLOBS
                    .iter()
                    .position(|(_, n)| {
                        end += n;
                        id.index() < end
                    })
                    .unwrap()
            };
            for id in relation.dbids() {
                let list = pre.knn(id).unwrap();
                assert_eq!(list.len(), 10);
                assert!(list.ids().iter().all(|n| blob_of(*n) == blob_of(id)));
                assert!(pre.rknn(id).unwrap().ids().contains(&id));
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_approximation_over_live_tree() {
    run_test(
        || TestContext::new(VectorRelation::for_vectors()),
        |ctx| {
            let shared = indexed(&ctx, 400, 9)?;
            let relation = ctx.dyn_relation();
            let pre = Arc::new(SpatialApproximationPreprocessor::build(
                relation.clone(),
                Arc::new(EuclideanDistance),
                5,
                shared.clone(),
                ApproximationScope::Siblings,
            )?);
            ctx.relation().add_listener(pre.clone());
            assert_eq!(pre.len(), 400);

            let exact = QueryBuilder::new(relation.clone(), Arc::new(EuclideanDistance))
                .with_index(shared.clone())
                .knn_query()?;
            for id in relation.dbids() {
                let list = pre.knn(id).unwrap();
                assert_eq!(list.get(0).unwrap().id, id);
                // an approximation never beats the exact k-distance
                let exact_k = exact.knn_for_id(id, list.len())?.k_distance();
                assert!(list.k_distance() >= exact_k);
            }

            ctx.relation()
                .insert_all(uniform_points(50, 2, 10).into_iter().map(Arc::from).collect())?;
            assert_eq!(pre.len(), 450);
            let covered: usize = shared.partitions(ApproximationScope::Siblings)?.iter().map(Vec::len).sum();
            assert_eq!(covered, 450);
            assert!(pre.k_distance(relation.dbids()[0], 5).is_some());
            Ok(())
        },
        cleanup,
    )
}
