//! M-tree configuration.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CAPACITY, MIN_CAPACITY, NODE_OVERHEAD, WARN_CAPACITY};
use crate::errors::{SpatialError, SpatialResult};

/// Which two entries of an overflowing node become the new routing objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PromotionStrategy {
    /// The pair minimizing the larger of the two resulting covering radii.
    #[default]
    MMRad,
    /// Keep the current routing object and promote the entry farthest from it.
    MLBDist,
    /// The two entries farthest apart.
    FarthestPoints,
    /// Two entries drawn from the tree's seeded generator.
    Random,
}

/// How entries are assigned to the two promoted routing objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistributionStrategy {
    /// Each entry goes to its nearer routing object.
    #[default]
    GeneralizedHyperplane,
    /// The routing objects alternately take their nearest unassigned entry.
    Balanced,
}

/// Configuration of an [`MTree`](super::MTree).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MTreeConfig {
    pub leaf_capacity: usize,
    pub dir_capacity: usize,
    pub promotion: PromotionStrategy,
    pub distribution: DistributionStrategy,
    /// Seed of the generator used by [`PromotionStrategy::Random`].
    pub seed: u64,
}

impl Default for MTreeConfig {
    fn default() -> Self {
        Self {
            leaf_capacity: DEFAULT_CAPACITY,
            dir_capacity: DEFAULT_CAPACITY,
            promotion: PromotionStrategy::default(),
            distribution: DistributionStrategy::default(),
            seed: 0,
        }
    }
}

/// Encoded size of an entry: id, two distances, optional child page.
pub(crate) const ENTRY_BYTES: usize = 4 + 8 + 8 + 1 + 4;

impl MTreeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets both node capacities.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.leaf_capacity = capacity;
        self.dir_capacity = capacity;
        self
    }

    pub fn with_leaf_capacity(mut self, capacity: usize) -> Self {
        self.leaf_capacity = capacity;
        self
    }

    pub fn with_dir_capacity(mut self, capacity: usize) -> Self {
        self.dir_capacity = capacity;
        self
    }

    pub fn with_promotion(mut self, promotion: PromotionStrategy) -> Self {
        self.promotion = promotion;
        self
    }

    pub fn with_distribution(mut self, distribution: DistributionStrategy) -> Self {
        self.distribution = distribution;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Checks capacities, and that full nodes fit pages of `page_size`
    /// bytes when the page file is bounded.
    pub fn validate(&self, page_size: Option<usize>) -> SpatialResult<()> {
        for (kind, capacity) in [("leaf", self.leaf_capacity), ("directory", self.dir_capacity)] {
            if capacity < MIN_CAPACITY {
                return Err(SpatialError::Configuration(format!(
                    "{} capacity must be at least {}, got {}",
                    kind, MIN_CAPACITY, capacity
                )));
            }
            if let Some(page_size) = page_size {
                let needed = NODE_OVERHEAD + capacity * ENTRY_BYTES;
                if needed > page_size {
                    return Err(SpatialError::Configuration(format!(
                        "{} capacity {} needs pages of {} bytes, page size is {}",
                        kind, capacity, needed, page_size
                    )));
                }
            }
            if capacity < WARN_CAPACITY {
                log::warn!("{} capacity of {} is very small", kind, capacity);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(MTreeConfig::default().validate(None).is_ok());
        assert!(MTreeConfig::default().validate(Some(4096)).is_ok());
    }

    #[test]
    fn test_capacity_limits() {
        assert!(MTreeConfig::new().with_capacity(2).validate(None).is_err());
        let err = MTreeConfig::new().with_capacity(100).validate(Some(512)).unwrap_err();
        assert!(matches!(err, SpatialError::Configuration(msg) if msg.contains("page size")));
    }
}
