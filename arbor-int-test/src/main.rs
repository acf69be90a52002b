use arbor::distance::EuclideanDistance;
use arbor::errors::ArborResult;
use arbor::query::QueryBuilder;
use arbor::relation::{Relation, VectorRelation};
use arbor_int_test::test_util::uniform_points;
use arbor_spatial::{MaterializeKnnPreprocessor, MemoryPageFile, RStarNode, RStarTree, RStarTreeConfig, SharedIndex};
use std::sync::Arc;

type SharedTree = SharedIndex<RStarTree<MemoryPageFile<RStarNode>>>;

fn main() -> ArborResult<()> {
    colog::init();
    println!("Starting stress test...");

    let count = 200_000;
    let relation = Arc::new(VectorRelation::for_vectors());
    let tree = RStarTree::new(MemoryPageFile::new(), RStarTreeConfig::new())?;
    let shared: Arc<SharedTree> = Arc::new(SharedIndex::new(tree));
    relation.add_listener(shared.clone());

    let start = std::time::Instant::now();
    relation.insert_all(uniform_points(count, 2, 42).into_iter().map(Arc::from).collect())?;
    println!("Indexed {} points in {:?}", count, start.elapsed());
    println!("Tree height: {}, stats: {:?}", shared.read().height(), shared.read().stats());

    let dynamic: Arc<dyn Relation<Object = [f64]>> = relation.clone();
    let query = QueryBuilder::new(dynamic.clone(), Arc::new(EuclideanDistance))
        .with_index(shared.clone())
        .knn_query()?;

    let start = std::time::Instant::now();
    let preprocessor = MaterializeKnnPreprocessor::build(&dynamic, query, 10)?;
    println!(
        "Materialized {} kNN lists in {:?} on {} threads",
        preprocessor.len(),
        start.elapsed(),
        arbor::get_cpu_count()
    );
    Ok(())
}
