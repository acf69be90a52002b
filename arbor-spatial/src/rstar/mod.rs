//! R*-tree over real vectors.
//!
//! Nodes live in a [`PageFile`]; directory entries reference child pages by
//! id, so restructuring never aliases live nodes. The tree is changed
//! through `&mut self` and queried through `&self`: wrap it in a
//! [`SharedIndex`](crate::tree::SharedIndex) to follow relation changes
//! while serving concurrent readers.
//!
//! ## Levels
//!
//! Leaves are level 0, the root is level `height - 1`. A node at level `l`
//! holds entries of level `l`; during forced reinsertion and deletion,
//! entries are put back at the level they came from.

use std::sync::Arc;

use arbor::dbid::DBID;
use arbor::errors::{ArborError, ErrorKind};

use crate::errors::{SpatialError, SpatialResult};
use crate::persistent::{PageFile, PageFileStats, PageId, TreeHeader};
use crate::tree::{minimum_entries, TreeStats, TreeStatsSnapshot};

mod bulk;
mod config;
mod insert;
mod node;
mod query;
mod split;

pub use config::{BulkSplit, InsertionStrategy, OverflowTreatment, RStarTreeConfig, SplitStrategy};
pub use node::{DirectoryEntry, LeafEntry, RStarNode};

/// An R*-tree storing its nodes in a page file `F`.
pub struct RStarTree<F> {
    file: F,
    config: RStarTreeConfig,
    header: TreeHeader,
    stats: TreeStats,
}

impl<F: PageFile<RStarNode>> RStarTree<F> {
    /// Creates an empty tree in a fresh page file.
    ///
    /// Node capacities are fixed when the first point arrives, because
    /// page-derived capacities depend on the dimensionality.
    pub fn new(file: F, config: RStarTreeConfig) -> SpatialResult<Self> {
        config.validate()?;
        if file.read_header()?.is_some() {
            return Err(SpatialError::InvalidOperation(
                "Page file already holds a tree; open it instead".into(),
            ));
        }
        Ok(Self {
            file,
            config,
            header: TreeHeader::default(),
            stats: TreeStats::new(),
        })
    }

    /// Restores a tree from the header in page 0.
    ///
    /// Capacities stored in the file take precedence over `config`.
    pub fn open(file: F, config: RStarTreeConfig) -> SpatialResult<Self> {
        config.validate()?;
        let header = file
            .read_header()?
            .ok_or_else(|| SpatialError::InvalidFormat("Page file holds no tree".into()))?;
        log::debug!(
            "opened R*-tree: {} objects, height {}, capacities {}/{}",
            header.size,
            header.height,
            header.leaf_capacity,
            header.dir_capacity
        );
        Ok(Self {
            file,
            config,
            header,
            stats: TreeStats::new(),
        })
    }

    pub fn config(&self) -> &RStarTreeConfig {
        &self.config
    }

    /// Number of indexed points.
    pub fn size(&self) -> usize {
        self.header.size
    }

    pub fn is_empty(&self) -> bool {
        self.header.size == 0
    }

    /// Number of levels; 0 before the first insertion.
    pub fn height(&self) -> usize {
        self.header.height
    }

    pub fn dimensionality(&self) -> Option<usize> {
        self.is_initialized().then_some(self.header.dimensionality)
    }

    pub fn leaf_capacity(&self) -> usize {
        self.header.leaf_capacity
    }

    pub fn dir_capacity(&self) -> usize {
        self.header.dir_capacity
    }

    pub fn stats(&self) -> TreeStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn page_file_stats(&self) -> PageFileStats {
        self.file.stats()
    }

    /// Writes the header and all cached pages.
    pub fn flush(&mut self) -> SpatialResult<()> {
        self.store_header()?;
        self.file.flush()
    }

    /// Flushes and hands back the page file.
    pub fn close(mut self) -> SpatialResult<F> {
        self.flush()?;
        Ok(self.file)
    }

    // ------------------------------------------------------------------------
    // page and header plumbing
    // ------------------------------------------------------------------------

    pub(crate) fn is_initialized(&self) -> bool {
        self.header.root != 0
    }

    /// Fixes capacities and allocates an empty root leaf.
    pub(crate) fn ensure_initialized(&mut self, dim: usize) -> SpatialResult<()> {
        if self.is_initialized() {
            return self.check_dimensionality(dim);
        }
        if dim == 0 {
            return Err(invalid_argument("Cannot index zero-dimensional points"));
        }
        let (leaf_capacity, dir_capacity) = self.config.capacities(dim, self.file.page_size())?;
        let root = self.file.allocate_page()?;
        self.write_node(root, RStarNode::Leaf(Vec::new()))?;
        self.header = TreeHeader {
            root,
            height: 1,
            leaf_capacity,
            dir_capacity,
            leaf_minimum: minimum_entries(leaf_capacity, self.config.min_fill),
            dir_minimum: minimum_entries(dir_capacity, self.config.min_fill),
            dimensionality: dim,
            size: 0,
        };
        log::debug!(
            "R*-tree initialized for {} dimensions: leaf capacity {} (min {}), directory capacity {} (min {})",
            dim,
            leaf_capacity,
            self.header.leaf_minimum,
            dir_capacity,
            self.header.dir_minimum
        );
        self.store_header()
    }

    pub(crate) fn check_dimensionality(&self, dim: usize) -> SpatialResult<()> {
        if self.is_initialized() && dim != self.header.dimensionality {
            return Err(invalid_argument(&format!(
                "Point of dimensionality {} does not match tree dimensionality {}",
                dim, self.header.dimensionality
            )));
        }
        Ok(())
    }

    pub(crate) fn read_node(&self, page: PageId) -> SpatialResult<Arc<RStarNode>> {
        self.stats.count_read();
        self.file.read_page(page)
    }

    /// Reads a node for modification.
    pub(crate) fn load_node(&self, page: PageId) -> SpatialResult<RStarNode> {
        Ok(RStarNode::clone(&*self.read_node(page)?))
    }

    pub(crate) fn write_node(&mut self, page: PageId, node: RStarNode) -> SpatialResult<()> {
        self.stats.count_write();
        self.file.write_page(page, node)
    }

    pub(crate) fn store_header(&mut self) -> SpatialResult<()> {
        if self.is_initialized() {
            self.file.write_header(&self.header)?;
        }
        Ok(())
    }

    pub(crate) fn capacity_of(&self, node: &RStarNode) -> usize {
        if matches!(node, RStarNode::Leaf(_)) {
            self.header.leaf_capacity
        } else {
            self.header.dir_capacity
        }
    }

    pub(crate) fn minimum_of(&self, node: &RStarNode) -> usize {
        if matches!(node, RStarNode::Leaf(_)) {
            self.header.leaf_minimum
        } else {
            self.header.dir_minimum
        }
    }
}

pub(crate) fn invalid_argument(message: &str) -> SpatialError {
    SpatialError::Core(ArborError::new(message, ErrorKind::InvalidArgument))
}

pub(crate) fn invariant(message: impl Into<String>) -> SpatialError {
    SpatialError::InvariantViolation(message.into())
}

/// Ids of the indexed points, used by tests to compare with a scan.
#[cfg(test)]
pub(crate) fn all_ids<F: PageFile<RStarNode>>(tree: &RStarTree<F>) -> Vec<DBID> {
    let mut ids = Vec::new();
    tree.for_each_leaf(|_, entries| {
        ids.extend(entries.iter().map(|e| e.id));
        Ok(())
    })
    .unwrap_or_default();
    ids.sort();
    ids
}
