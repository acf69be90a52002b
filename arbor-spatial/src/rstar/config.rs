//! R*-tree configuration.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CAPACITY, DEFAULT_MIN_FILL, DEFAULT_REINSERT_FRACTION, MIN_CAPACITY, NODE_OVERHEAD,
    WARN_CAPACITY,
};
use crate::errors::{SpatialError, SpatialResult};

/// How the subtree receiving a new entry is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InsertionStrategy {
    /// Least volume enlargement, then smallest resulting volume, then
    /// smallest existing volume.
    #[default]
    LeastEnlargement,
    /// Least increase of overlap with the sibling rectangles.
    LeastOverlap,
    /// Least overlap directly above the leaves, least enlargement higher up.
    Combined,
}

/// How an overfull node is divided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SplitStrategy {
    /// R*-tree split: axis by margin, distribution by overlap.
    #[default]
    Topological,
    /// Guttman's quadratic split.
    Quadratic,
}

/// What happens first when a node overflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverflowTreatment {
    /// Forced reinsertion of the entries farthest from the node centre, once
    /// per level and insertion; split afterwards.
    #[default]
    LimitedReinsert,
    /// Always split.
    SplitOnly,
}

/// How a bulk load groups entries into nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BulkSplit {
    /// Sort-Tile-Recursive.
    #[default]
    SortTileRecursive,
    /// Sort by the first coordinate.
    OneDimSort,
    /// Sort along a Hilbert curve.
    HilbertSort,
    /// Keep the input order.
    FileOrder,
}

/// Configuration of an [`RStarTree`](super::RStarTree).
///
/// Node capacities are taken from `leaf_capacity`/`dir_capacity` when set,
/// otherwise derived from the page size and the data dimensionality, and
/// otherwise default to 32.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RStarTreeConfig {
    pub page_size: Option<usize>,
    pub leaf_capacity: Option<usize>,
    pub dir_capacity: Option<usize>,
    pub min_fill: f64,
    pub reinsert_fraction: f64,
    pub insertion: InsertionStrategy,
    pub split: SplitStrategy,
    pub overflow: OverflowTreatment,
    pub bulk_split: BulkSplit,
}

impl Default for RStarTreeConfig {
    fn default() -> Self {
        Self {
            page_size: None,
            leaf_capacity: None,
            dir_capacity: None,
            min_fill: DEFAULT_MIN_FILL,
            reinsert_fraction: DEFAULT_REINSERT_FRACTION,
            insertion: InsertionStrategy::default(),
            split: SplitStrategy::default(),
            overflow: OverflowTreatment::default(),
            bulk_split: BulkSplit::default(),
        }
    }
}

/// Encoded size of a leaf entry: id, vector length, coordinates.
pub(crate) fn leaf_entry_bytes(dim: usize) -> usize {
    4 + 8 + 8 * dim
}

/// Encoded size of a directory entry: page id and two corner vectors.
pub(crate) fn dir_entry_bytes(dim: usize) -> usize {
    4 + 2 * (8 + 8 * dim)
}

impl RStarTreeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Sets both node capacities.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.leaf_capacity = Some(capacity);
        self.dir_capacity = Some(capacity);
        self
    }

    pub fn with_leaf_capacity(mut self, capacity: usize) -> Self {
        self.leaf_capacity = Some(capacity);
        self
    }

    pub fn with_dir_capacity(mut self, capacity: usize) -> Self {
        self.dir_capacity = Some(capacity);
        self
    }

    pub fn with_min_fill(mut self, min_fill: f64) -> Self {
        self.min_fill = min_fill;
        self
    }

    pub fn with_reinsert_fraction(mut self, fraction: f64) -> Self {
        self.reinsert_fraction = fraction;
        self
    }

    pub fn with_insertion(mut self, insertion: InsertionStrategy) -> Self {
        self.insertion = insertion;
        self
    }

    pub fn with_split(mut self, split: SplitStrategy) -> Self {
        self.split = split;
        self
    }

    pub fn with_overflow(mut self, overflow: OverflowTreatment) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn with_bulk_split(mut self, bulk_split: BulkSplit) -> Self {
        self.bulk_split = bulk_split;
        self
    }

    /// Checks the parameters that do not depend on the data.
    pub fn validate(&self) -> SpatialResult<()> {
        if !(self.min_fill > 0.0 && self.min_fill <= 0.5) {
            return Err(SpatialError::Configuration(format!(
                "min fill must be in (0, 0.5], got {}",
                self.min_fill
            )));
        }
        if !(self.reinsert_fraction > 0.0 && self.reinsert_fraction < 1.0) {
            return Err(SpatialError::Configuration(format!(
                "reinsert fraction must be in (0, 1), got {}",
                self.reinsert_fraction
            )));
        }
        for (kind, capacity) in [("leaf", self.leaf_capacity), ("directory", self.dir_capacity)] {
            if let Some(capacity) = capacity {
                if capacity < MIN_CAPACITY {
                    return Err(SpatialError::Configuration(format!(
                        "{} capacity must be at least {}, got {}",
                        kind, MIN_CAPACITY, capacity
                    )));
                }
            }
        }
        Ok(())
    }

    /// Resolves `(leaf_capacity, dir_capacity)` for data of dimensionality
    /// `dim` stored in pages of `file_page_size` bytes (if bounded).
    pub fn capacities(&self, dim: usize, file_page_size: Option<usize>) -> SpatialResult<(usize, usize)> {
        let page_size = self.page_size.or(file_page_size);
        let leaf = resolve_capacity("leaf", self.leaf_capacity, page_size, leaf_entry_bytes(dim))?;
        let dir = resolve_capacity("directory", self.dir_capacity, page_size, dir_entry_bytes(dim))?;
        Ok((leaf, dir))
    }
}

fn resolve_capacity(
    kind: &str,
    explicit: Option<usize>,
    page_size: Option<usize>,
    entry_bytes: usize,
) -> SpatialResult<usize> {
    let fitting = page_size.map(|size| size.saturating_sub(NODE_OVERHEAD) / entry_bytes);
    let capacity = match (explicit, fitting) {
        (Some(explicit), Some(fitting)) if explicit > fitting => {
            return Err(SpatialError::Configuration(format!(
                "{} capacity {} does not fit pages of {} bytes (at most {} entries)",
                kind,
                explicit,
                page_size.unwrap_or_default(),
                fitting
            )));
        }
        (Some(explicit), _) => explicit,
        (None, Some(fitting)) => fitting,
        (None, None) => DEFAULT_CAPACITY,
    };

    if capacity < MIN_CAPACITY {
        return Err(SpatialError::Configuration(format!(
            "Node size of {} bytes is chosen too small: {} capacity {} is below {}",
            page_size.unwrap_or_default(),
            kind,
            capacity,
            MIN_CAPACITY
        )));
    }
    if capacity < WARN_CAPACITY {
        log::warn!(
            "{} capacity of {} is very small; the tree will degenerate",
            kind,
            capacity
        );
    }
    Ok(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = RStarTreeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.capacities(2, None).unwrap(), (DEFAULT_CAPACITY, DEFAULT_CAPACITY));
    }

    #[test]
    fn test_capacity_from_page_size() {
        let config = RStarTreeConfig::new().with_page_size(4096);
        let (leaf, dir) = config.capacities(2, None).unwrap();
        assert_eq!(leaf, (4096 - NODE_OVERHEAD) / 28);
        assert_eq!(dir, (4096 - NODE_OVERHEAD) / 52);

        // the file's page size is used when the config has none
        let (leaf, _) = RStarTreeConfig::new().capacities(2, Some(4096)).unwrap();
        assert_eq!(leaf, (4096 - NODE_OVERHEAD) / 28);
    }

    #[test]
    fn test_tiny_page_is_rejected() {
        let err = RStarTreeConfig::new()
            .with_page_size(100)
            .capacities(4, None)
            .unwrap_err();
        assert!(matches!(err, SpatialError::Configuration(msg) if msg.contains("chosen too small")));
    }

    #[test]
    fn test_explicit_capacity_must_fit_page() {
        let config = RStarTreeConfig::new().with_capacity(1000);
        assert!(config.capacities(2, Some(512)).is_err());
        assert_eq!(config.capacities(2, None).unwrap(), (1000, 1000));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(RStarTreeConfig::new().with_capacity(2).validate().is_err());
        assert!(RStarTreeConfig::new().with_min_fill(0.6).validate().is_err());
        assert!(RStarTreeConfig::new().with_reinsert_fraction(1.0).validate().is_err());
        assert!(RStarTreeConfig::new().with_reinsert_fraction(f64::NAN).validate().is_err());
    }
}
