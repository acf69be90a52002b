//! Bulk loading.
//!
//! The tree is built bottom-up: entries are grouped into leaves, the leaf
//! rectangles into directory nodes, and so on until one node remains.
//! Group sizes never differ by more than one, so every non-root node is at
//! least half full.

use arbor::bounding_box::{HyperBoundingBox, SpatialComparable};
use arbor::dbid::DBID;

use super::config::BulkSplit;
use super::node::{DirectoryEntry, LeafEntry, RStarNode};
use super::{invalid_argument, invariant, RStarTree};
use crate::errors::{SpatialError, SpatialResult};
use crate::hilbert::{hilbert_key_bounded, order_for};
use crate::persistent::PageFile;
use crate::tree::{balanced_chunk_sizes, split_into};

impl<F: PageFile<RStarNode>> RStarTree<F> {
    /// Builds the tree from `points` in one pass.
    ///
    /// Only allowed on an empty tree.
    pub fn bulk_load(&mut self, points: Vec<(DBID, Vec<f64>)>) -> SpatialResult<()> {
        if self.header.size > 0 {
            return Err(SpatialError::InvalidOperation(
                "Bulk load requires an empty tree".into(),
            ));
        }
        let Some(dim) = points.first().map(|(_, p)| p.len()) else {
            return Ok(());
        };
        if let Some((id, p)) = points.iter().find(|(_, p)| p.len() != dim) {
            return Err(invalid_argument(&format!(
                "Point {} has dimensionality {}, expected {}",
                id,
                p.len(),
                dim
            )));
        }
        self.ensure_initialized(dim)?;

        let n = points.len();
        let strategy = self.config.bulk_split;
        let leaves: Vec<LeafEntry> = points
            .into_iter()
            .map(|(id, point)| LeafEntry { id, point })
            .collect();

        // the empty root from initialization is replaced
        self.file.free_page(self.header.root)?;

        let mut level_entries = Vec::new();
        for group in bulk_groups(leaves, self.header.leaf_capacity, strategy) {
            level_entries.push(self.store_group(RStarNode::Leaf(group))?);
        }
        let mut height = 1;
        while level_entries.len() > 1 {
            let groups = bulk_groups(level_entries, self.header.dir_capacity, strategy);
            level_entries = Vec::with_capacity(groups.len());
            for group in groups {
                level_entries.push(self.store_group(RStarNode::Directory(group))?);
            }
            height += 1;
        }
        let root = level_entries
            .pop()
            .ok_or_else(|| invariant("bulk load produced no root"))?;

        self.header.root = root.page;
        self.header.height = height;
        self.header.size = n;
        log::debug!(
            "bulk loaded {} points with {:?}: height {}",
            n,
            strategy,
            height
        );
        self.store_header()
    }

    fn store_group(&mut self, node: RStarNode) -> SpatialResult<DirectoryEntry> {
        let mbr = node.mbr().ok_or_else(|| invariant("bulk load produced an empty node"))?;
        let page = self.file.allocate_page()?;
        self.write_node(page, node)?;
        Ok(DirectoryEntry { page, mbr })
    }
}

/// Groups `entries` into nodes of at most `capacity` entries.
pub(crate) fn bulk_groups<E: SpatialComparable>(
    mut entries: Vec<E>,
    capacity: usize,
    strategy: BulkSplit,
) -> Vec<Vec<E>> {
    if entries.is_empty() {
        return Vec::new();
    }
    match strategy {
        BulkSplit::FileOrder => {}
        BulkSplit::OneDimSort => sort_by_center(&mut entries, 0),
        BulkSplit::HilbertSort => sort_by_hilbert(&mut entries),
        BulkSplit::SortTileRecursive => {
            let dims = entries[0].dim();
            return sort_tile_recursive(entries, capacity, 0, dims);
        }
    }
    let sizes = balanced_chunk_sizes(entries.len(), capacity);
    split_into(entries, &sizes)
}

fn center(entry: &impl SpatialComparable, d: usize) -> f64 {
    (entry.min(d) + entry.max(d)) * 0.5
}

fn sort_by_center<E: SpatialComparable>(entries: &mut [E], d: usize) {
    entries.sort_by(|a, b| center(a, d).total_cmp(&center(b, d)));
}

fn sort_by_hilbert<E: SpatialComparable>(entries: &mut Vec<E>) {
    let Some(bounds) = HyperBoundingBox::union_all(entries.iter()) else {
        return;
    };
    let dims = bounds.dim();
    let order = order_for(dims);
    let mut keyed: Vec<(u128, E)> = entries
        .drain(..)
        .map(|e| {
            let c: Vec<f64> = (0..dims).map(|d| center(&e, d)).collect();
            (hilbert_key_bounded(&c, &bounds, order), e)
        })
        .collect();
    keyed.sort_by_key(|(key, _)| *key);
    entries.extend(keyed.into_iter().map(|(_, e)| e));
}

/// Sort-Tile-Recursive: sort along `axis`, cut into slabs, and recurse into
/// each slab with the next axis.
fn sort_tile_recursive<E: SpatialComparable>(
    mut entries: Vec<E>,
    capacity: usize,
    axis: usize,
    dims: usize,
) -> Vec<Vec<E>> {
    let n = entries.len();
    if n <= capacity {
        return vec![entries];
    }
    sort_by_center(&mut entries, axis);
    if axis + 1 >= dims {
        let sizes = balanced_chunk_sizes(n, capacity);
        return split_into(entries, &sizes);
    }

    let pages = n.div_ceil(capacity);
    let remaining_dims = (dims - axis) as f64;
    // the epsilon keeps exact roots such as 27^(1/3) from rounding up
    let slabs = (((pages as f64).powf(1.0 / remaining_dims) - 1e-9).ceil() as usize).clamp(1, pages);
    let sizes = even_sizes(n, slabs);
    split_into(entries, &sizes)
        .into_iter()
        .flat_map(|slab| sort_tile_recursive(slab, capacity, axis + 1, dims))
        .collect()
}

/// `n` split into `parts` sizes differing by at most one.
fn even_sizes(n: usize, parts: usize) -> Vec<usize> {
    let base = n / parts;
    let larger = n % parts;
    (0..parts).map(|i| if i < larger { base + 1 } else { base }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(side: usize) -> Vec<Vec<f64>> {
        let mut points = Vec::new();
        for x in 0..side {
            for y in 0..side {
                points.push(vec![x as f64, y as f64]);
            }
        }
        points
    }

    #[test]
    fn test_groups_cover_everything_within_capacity() {
        for strategy in [
            BulkSplit::SortTileRecursive,
            BulkSplit::OneDimSort,
            BulkSplit::HilbertSort,
            BulkSplit::FileOrder,
        ] {
            let groups = bulk_groups(grid(10), 7, strategy);
            let total: usize = groups.iter().map(Vec::len).sum();
            assert_eq!(total, 100, "{:?}", strategy);
            assert!(groups.iter().all(|g| g.len() <= 7 && g.len() >= 3), "{:?}", strategy);
        }
    }

    #[test]
    fn test_str_tiles_are_compact() {
        // 64 grid points into 16 tiles of 4: STR yields 2x2 squares
        let groups = bulk_groups(grid(8), 4, BulkSplit::SortTileRecursive);
        assert_eq!(groups.len(), 16);
        for group in &groups {
            let mbr = HyperBoundingBox::union_all(group.iter()).unwrap();
            assert!(arbor::bounding_box::margin(&mbr) <= 2.0, "{}", mbr);
        }
    }

    #[test]
    fn test_hilbert_groups_are_local() {
        let groups = bulk_groups(grid(8), 4, BulkSplit::HilbertSort);
        for group in &groups {
            let mbr = HyperBoundingBox::union_all(group.iter()).unwrap();
            // four consecutive cells of a Hilbert curve fit in a 2x2 block
            assert!(arbor::bounding_box::margin(&mbr) <= 2.0, "{}", mbr);
        }
    }

    #[test]
    fn test_even_sizes() {
        assert_eq!(even_sizes(10, 3), vec![4, 3, 3]);
        assert_eq!(even_sizes(4, 4), vec![1, 1, 1, 1]);
    }
}
