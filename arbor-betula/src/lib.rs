//! # Arbor BETULA - cluster-feature trees
//!
//! A CF-tree summarizes a stream of vectors in a bounded number of leaf
//! cluster features. It is the data reduction step of BIRCH and its
//! numerically stable successor BETULA.
//!
//! - [`features`]: the classic [`BirchCF`] and the stable [`VIIFeature`]
//! - [`distance`]: routing distances and absorption criteria
//! - [`tree`]: the [`CFTree`] with automatic threshold increase
//! - [`clustering`]: one cluster per leaf
//!
//! ```rust
//! use arbor::relation::VectorRelation;
//! use arbor_betula::{leaf_clustering, CFTree, CFTreeConfig, MaxLeaves};
//!
//! # fn main() -> arbor::errors::ArborResult<()> {
//! let relation = VectorRelation::from_vectors(vec![
//!     vec![0.0, 0.0],
//!     vec![0.5, 0.0],
//!     vec![40.0, 40.0],
//! ])?;
//! let config = CFTreeConfig::new().with_threshold(2.0).with_max_leaves(MaxLeaves::Absolute(8));
//! let tree: CFTree = CFTree::build(&relation, config)?;
//! assert_eq!(tree.leaf_count(), 2);
//! assert_eq!(leaf_clustering(&tree, &relation)?.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod clustering;
pub mod config;
pub mod distance;
pub mod features;
pub mod tree;

pub use clustering::{leaf_clustering, LeafCluster};
pub use config::{CFTreeConfig, MaxLeaves, ThresholdHeuristic};
pub use distance::{CFDistance, CFDistanceKind};
pub use features::{BirchCF, ClusterFeature, VIIFeature};
pub use tree::{CFTree, CFTreeStats, LeafId};

#[cfg(test)]
mod tests {
    #[ctor::ctor]
    fn init() {
        colog::init();
    }
}
