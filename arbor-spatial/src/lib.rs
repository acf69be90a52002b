//! # Arbor Spatial - tree indexes for nearest-neighbour search
//!
//! This crate provides the paged tree indexes behind the `arbor` query API
//! and the preprocessors that materialize kNN lists with them.
//!
//! ## Features
//!
//! - **R*-tree**: choose-subtree strategies, forced reinsertion, topological
//!   and quadratic splits, STR/Hilbert/sort bulk loading
//! - **M-tree**: any metric, pluggable promotion and distribution
//! - **Best-first queries**: kNN, range and reverse kNN
//! - **Page files**: in memory, or on disk with checksums, an LRU
//!   write-back cache and a free list
//! - **Preprocessors**: exact kNN/RkNN lists that follow relation changes,
//!   and leaf-local approximate kNN computed in parallel
//!
//! ## Quick Start
//!
//! ```rust
//! use arbor::dbid::DBID;
//! use arbor::distance::EuclideanDistance;
//! use arbor_spatial::{MemoryPageFile, RStarNode, RStarTree, RStarTreeConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let file = MemoryPageFile::<RStarNode>::new();
//! let mut tree = RStarTree::new(file, RStarTreeConfig::new())?;
//! tree.insert(DBID::new(0), &[0.0, 0.0])?;
//! tree.insert(DBID::new(1), &[3.0, 4.0])?;
//! tree.insert(DBID::new(2), &[10.0, 10.0])?;
//!
//! let knn = tree.knn(&EuclideanDistance, &[1.0, 1.0], 2)?;
//! assert_eq!(knn.ids(), vec![DBID::new(0), DBID::new(1)]);
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod errors;
pub mod hilbert;
pub mod mtree;
pub mod persistent;
pub mod preprocessed;
pub mod rstar;
pub mod tree;

pub use errors::{SpatialError, SpatialResult};
pub use mtree::{MTree, MTreeConfig, MTreeNode};
pub use persistent::{MemoryPageFile, OnDiskArray, OnDiskUpperTriangleMatrix, PageFile, PersistentPageFile};
pub use preprocessed::{MaterializeKnnPreprocessor, SpatialApproximationPreprocessor};
pub use rstar::{RStarNode, RStarTree, RStarTreeConfig};
pub use tree::{
    ApproximationScope, DynamicIndex, IntegrityReport, KDistanceBounds, PartitionedIndex, SharedIndex,
    TreeStatsSnapshot,
};

#[cfg(test)]
pub(crate) fn init_test_logger() {
    let _ = env_logger::Builder::from_default_env()
        .is_test(true)
        .try_init();
}
