use arbor::dbid::DBID;
use arbor::distance::PrimitiveDistance;
use arbor::errors::{ArborError, ArborResult, ErrorKind};
use arbor::relation::{Relation, VectorRelation};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;

/// Centers and sizes of the three blobs of the golden data set.
pub const GOLDEN_BLOBS: [([f64; 2], usize); 3] = [([0.0, 0.0], 200), ([100.0, 0.0], 211), ([0.0, 100.0], 227)];

/// Number of objects in the golden data set.
pub const GOLDEN_SIZE: usize = 638;

/// Runs `before`, then `test`, then `after`. `after` also runs when the test
/// fails, and the first error or panic fails the test.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> ArborResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> ArborResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> ArborResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    let start_time = Instant::now();
    let ctx = match before() {
        Ok(ctx) => ctx,
        Err(e) => panic!("Before run failed: {:?}", e),
    };

    let test_ctx = ctx.clone();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| test(test_ctx)));
    let after_result = after(ctx);
    let elapsed = start_time.elapsed();

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => panic!("Test failed after {:?}: {:?}", elapsed, e),
        Err(panic_err) => {
            let err_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_err.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            panic!("Test panicked after {:?}: {}", elapsed, err_msg);
        }
    }
    if let Err(e) = after_result {
        panic!("After run failed: {:?}", e);
    }
}

/// A relation plus a scratch directory that lives as long as the context.
#[derive(Clone)]
pub struct TestContext {
    dir: Arc<TempDir>,
    relation: Arc<VectorRelation>,
}

impl TestContext {
    pub fn new(relation: VectorRelation) -> ArborResult<Self> {
        let dir = tempfile::tempdir().map_err(|e| {
            ArborError::new(&format!("Failed to create temp dir: {}", e), ErrorKind::IOError)
        })?;
        Ok(Self {
            dir: Arc::new(dir),
            relation: Arc::new(relation),
        })
    }

    pub fn relation(&self) -> Arc<VectorRelation> {
        self.relation.clone()
    }

    pub fn dyn_relation(&self) -> Arc<dyn Relation<Object = [f64]>> {
        self.relation.clone()
    }

    /// A file path inside the scratch directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// Context over the golden three-blob data set.
pub fn create_golden_context() -> ArborResult<TestContext> {
    TestContext::new(VectorRelation::from_vectors(golden_blobs())?)
}

/// Context over `n` uniform points in `[0, 100)^dim`.
pub fn create_uniform_context(n: usize, dim: usize, seed: u64) -> ArborResult<TestContext> {
    TestContext::new(VectorRelation::from_vectors(uniform_points(n, dim, seed))?)
}

pub fn cleanup(ctx: TestContext) -> ArborResult<()> {
    let path = ctx.dir.path().to_path_buf();
    drop(ctx);
    log::debug!("Released test directory {:?}", path);
    Ok(())
}

/// Three well separated square blobs of half-width 1, generated blob by
/// blob from a fixed seed.
pub fn golden_blobs() -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(638);
    let mut points = Vec::with_capacity(GOLDEN_SIZE);
    for (center, count) in GOLDEN_BLOBS {
        for _ in 0..count {
            points.push(vec![
                center[0] + rng.gen_range(-1.0..1.0),
                center[1] + rng.gen_range(-1.0..1.0),
            ]);
        }
    }
    points
}

pub fn uniform_points(n: usize, dim: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.gen_range(0.0..100.0)).collect())
        .collect()
}

/// Distances of the `k` nearest objects by exhaustive scan, nearest first.
pub fn scan_knn_distances(
    relation: &dyn Relation<Object = [f64]>,
    distance: &dyn PrimitiveDistance<[f64]>,
    query: &[f64],
    k: usize,
) -> Vec<f64> {
    let mut all: Vec<f64> = relation
        .dbids()
        .into_iter()
        .filter_map(|id| relation.get(id))
        .map(|object| distance.distance(query, &object))
        .collect();
    all.sort_by(|a, b| a.total_cmp(b));
    all.truncate(k);
    all
}

/// Ids within `radius` of `query` by exhaustive scan, sorted.
pub fn scan_range(
    relation: &dyn Relation<Object = [f64]>,
    distance: &dyn PrimitiveDistance<[f64]>,
    query: &[f64],
    radius: f64,
) -> Vec<DBID> {
    let mut ids: Vec<DBID> = relation
        .dbids()
        .into_iter()
        .filter(|&id| {
            relation
                .get(id)
                .is_some_and(|object| distance.distance(query, &object) <= radius)
        })
        .collect();
    ids.sort();
    ids
}

/// Component sizes of a neighbourhood graph, sorted ascending.
/// `neighbours` answers a range query for one object.
pub fn connected_component_sizes<N>(ids: &[DBID], mut neighbours: N) -> ArborResult<Vec<usize>>
where
    N: FnMut(DBID) -> ArborResult<Vec<DBID>>,
{
    let mut seen = std::collections::HashSet::new();
    let mut sizes = Vec::new();
    for &start in ids {
        if !seen.insert(start) {
            continue;
        }
        let mut size = 0;
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            size += 1;
            for next in neighbours(id)? {
                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        sizes.push(size);
    }
    sizes.sort();
    Ok(sizes)
}
