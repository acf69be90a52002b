//! # Arbor - identifiers, relations and the nearest-neighbour query API
//!
//! This crate holds everything the tree indexes share:
//!
//! - **Object identifiers** ([`dbid`]) and **relations** ([`relation`]) that
//!   map them to objects, with change notification ([`events`])
//! - **Distance functions** ([`distance`]), including rectangle lower bounds
//!   for spatial pruning
//! - **Bounding boxes** ([`bounding_box`]) in any dimensionality
//! - **Result containers** ([`knn`]) and the **query API** ([`query`])
//!
//! The index structures themselves live in `arbor-spatial` (R*-tree,
//! M-tree, preprocessors) and `arbor-betula` (CF-tree).
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use arbor::distance::EuclideanDistance;
//! use arbor::query::QueryBuilder;
//! use arbor::relation::{Relation, VectorRelation};
//!
//! # fn main() -> arbor::errors::ArborResult<()> {
//! let relation: Arc<dyn Relation<Object = [f64]>> = Arc::new(VectorRelation::from_vectors(vec![
//!     vec![0.0, 0.0],
//!     vec![1.0, 1.0],
//!     vec![5.0, 5.0],
//! ])?);
//!
//! // no index registered, so the scan must be requested explicitly
//! let query = QueryBuilder::new(relation, Arc::new(EuclideanDistance))
//!     .linear_scan(true)
//!     .knn_query()?;
//! let knn = query.knn(&[0.9, 0.9], 2)?;
//! assert_eq!(knn.len(), 2);
//! # Ok(())
//! # }
//! ```

use std::thread::available_parallelism;

pub mod bounding_box;
pub mod dbid;
pub mod distance;
pub mod errors;
pub mod events;
pub mod knn;
pub mod query;
pub mod relation;
pub mod util;

pub use bounding_box::{HyperBoundingBox, SpatialComparable};
pub use dbid::{DoubleDBIDPair, DBID};
pub use errors::{ArborError, ArborResult, ErrorKind};
pub use knn::{DoubleDBIDList, KnnHeap, KnnList};

/// Number of worker threads parallel preprocessing can expect.
///
/// Defaults to 1 when the platform cannot tell.
pub fn get_cpu_count() -> usize {
    available_parallelism()
        .map(|p| p.get())
        .unwrap_or_else(|err| {
            log::warn!("Failed to detect available parallelism: {}. Defaulting to single thread.", err);
            1
        })
}
