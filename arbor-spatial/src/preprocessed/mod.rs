//! Materialized kNN lists over a relation.
//!
//! [`MaterializeKnnPreprocessor`] answers every object's exact kNN query
//! through a [`KnnQuery`](arbor::query::KnnQuery) and keeps reverse sets;
//! [`SpatialApproximationPreprocessor`] restricts each object's
//! neighbourhood to its tree partition. Both register as relation listeners
//! and follow inserts and deletes.

use std::collections::HashMap;

use arbor::dbid::DBID;
use arbor::knn::KnnList;

use crate::errors::{SpatialError, SpatialResult};

mod approximation;
mod materialize;

pub use approximation::SpatialApproximationPreprocessor;
pub use materialize::MaterializeKnnPreprocessor;

fn check_k(k: usize) -> SpatialResult<()> {
    if k == 0 {
        return Err(SpatialError::Configuration(
            "kNN preprocessing needs k of at least 1".into(),
        ));
    }
    Ok(())
}

/// Lists by id, with an error for ids seen twice.
fn collect_lists(
    lists: impl IntoIterator<Item = (DBID, KnnList)>,
) -> SpatialResult<HashMap<DBID, KnnList>> {
    let mut map = HashMap::new();
    for (id, list) in lists {
        if map.insert(id, list).is_some() {
            return Err(SpatialError::InvariantViolation(format!(
                "object {} appears in more than one partition",
                id
            )));
        }
    }
    Ok(map)
}
