//! Insertion, overflow treatment and deletion.

use std::cmp::Ordering;

use arbor::bounding_box::{self, HyperBoundingBox};
use arbor::dbid::DBID;

use super::config::{InsertionStrategy, OverflowTreatment};
use super::node::{DirectoryEntry, Entry, LeafEntry, RStarNode};
use super::split::split_mask;
use super::{invariant, RStarTree};
use crate::errors::SpatialResult;
use crate::persistent::{PageFile, PageId};
use crate::tree::SplittableNode;

/// Nodes from the root down to the node being modified, each paired with
/// its page. Nodes are private copies until written back.
type Path = Vec<(PageId, RStarNode)>;

/// Levels at which forced reinsertion already happened during one
/// top-level insertion.
#[derive(Debug, Default)]
pub(crate) struct ReinsertGuard {
    done: Vec<bool>,
}

impl ReinsertGuard {
    fn is_done(&self, level: usize) -> bool {
        self.done.get(level).copied().unwrap_or(false)
    }

    fn mark(&mut self, level: usize) {
        if self.done.len() <= level {
            self.done.resize(level + 1, false);
        }
        self.done[level] = true;
    }
}

impl<F: PageFile<RStarNode>> RStarTree<F> {
    /// Inserts a point. Fixes the tree's dimensionality on first use.
    pub fn insert(&mut self, id: DBID, point: &[f64]) -> SpatialResult<()> {
        self.ensure_initialized(point.len())?;
        let mut guard = ReinsertGuard::default();
        let entry = Entry::Leaf(LeafEntry {
            id,
            point: point.to_vec(),
        });
        self.insert_entry(entry, 0, &mut guard)?;
        self.header.size += 1;
        self.store_header()
    }

    /// Removes the point with `id` located at `point`.
    ///
    /// Returns false when no such entry exists. Underfull nodes on the way
    /// up are dissolved and their entries reinserted.
    pub fn delete(&mut self, id: DBID, point: &[f64]) -> SpatialResult<bool> {
        if !self.is_initialized() || self.header.size == 0 {
            return Ok(false);
        }
        self.check_dimensionality(point.len())?;

        let root_level = self.header.height - 1;
        let Some(mut path) = self.find_leaf(self.header.root, root_level, id, point)? else {
            return Ok(false);
        };
        let Some((leaf_page, mut leaf)) = path.pop() else {
            return Ok(false);
        };
        if let RStarNode::Leaf(entries) = &mut leaf {
            if let Some(pos) = entries.iter().position(|e| e.id == id) {
                entries.swap_remove(pos);
            }
        }

        self.condense(path, leaf_page, leaf)?;
        self.header.size -= 1;
        self.store_header()?;
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // insertion
    // ------------------------------------------------------------------------

    pub(crate) fn insert_entry(
        &mut self,
        entry: Entry,
        level: usize,
        guard: &mut ReinsertGuard,
    ) -> SpatialResult<()> {
        let mut path = self.choose_path(&entry, level)?;
        match path.last_mut() {
            Some((_, node)) => node.push(entry)?,
            None => return Err(invariant("empty insertion path")),
        }
        self.resolve_overflow(path, level, guard)
    }

    /// Descends from the root to the node at `level` best suited for
    /// `entry`.
    fn choose_path(&self, entry: &Entry, level: usize) -> SpatialResult<Path> {
        let root_level = self.header.height - 1;
        if level > root_level {
            return Err(invariant(format!(
                "cannot insert at level {} into a tree of height {}",
                level, self.header.height
            )));
        }

        let mut path = Vec::with_capacity(self.header.height);
        let mut page = self.header.root;
        let mut node_level = root_level;
        loop {
            let node = self.load_node(page)?;
            if node_level == level {
                path.push((page, node));
                return Ok(path);
            }
            let child = match &node {
                RStarNode::Directory(entries) if !entries.is_empty() => {
                    entries[self.choose_subtree(entries, entry, node_level)].page
                }
                _ => {
                    return Err(invariant(format!(
                        "page {} at level {} is not a usable directory",
                        page, node_level
                    )))
                }
            };
            path.push((page, node));
            page = child;
            node_level -= 1;
        }
    }

    /// Index of the child of a directory at `node_level` that receives
    /// `entry`.
    fn choose_subtree(&self, entries: &[DirectoryEntry], entry: &Entry, node_level: usize) -> usize {
        // a child already covering the entry needs no enlargement
        let covering = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| bounding_box::contains(&e.mbr, entry))
            .min_by(|(_, a), (_, b)| bounding_box::volume(&a.mbr).total_cmp(&bounding_box::volume(&b.mbr)));
        if let Some((i, _)) = covering {
            return i;
        }

        let least_overlap = match self.config.insertion {
            InsertionStrategy::LeastEnlargement => false,
            InsertionStrategy::LeastOverlap => true,
            InsertionStrategy::Combined => node_level == 1,
        };
        if least_overlap {
            least_overlap_child(entries, entry)
        } else {
            least_enlargement_child(entries, entry)
        }
    }

    /// Writes the modified end of `path` back, splitting or reinserting
    /// while nodes overflow, and fixes the ancestors' rectangles.
    fn resolve_overflow(
        &mut self,
        mut path: Path,
        mut level: usize,
        guard: &mut ReinsertGuard,
    ) -> SpatialResult<()> {
        while let Some((page, node)) = path.pop() {
            if !node.is_overfull(self.capacity_of(&node)) {
                let mbr = node.mbr();
                self.write_node(page, node)?;
                return self.adjust_ancestors(path, page, mbr);
            }

            let is_root = path.is_empty();
            if self.config.overflow == OverflowTreatment::LimitedReinsert
                && !is_root
                && !guard.is_done(level)
            {
                guard.mark(level);
                let (node, removed) = self.take_reinsert_entries(node)?;
                let mbr = node.mbr();
                self.write_node(page, node)?;
                self.adjust_ancestors(path, page, mbr)?;
                self.stats.count_reinsertions(removed.len() as u64);
                log::trace!("reinserting {} entries at level {}", removed.len(), level);
                for entry in removed {
                    self.insert_entry(entry, level, guard)?;
                }
                return Ok(());
            }

            let (kept, moved) = self.split_node(node);
            self.stats.count_split();
            let new_page = self.file.allocate_page()?;
            let kept_mbr = kept.mbr().ok_or_else(|| invariant("split left an empty node"))?;
            let moved_mbr = moved.mbr().ok_or_else(|| invariant("split produced an empty node"))?;
            log::trace!(
                "split page {} at level {} into {} + {} entries (new page {})",
                page,
                level,
                kept.len(),
                moved.len(),
                new_page
            );
            self.write_node(page, kept)?;
            self.write_node(new_page, moved)?;

            if is_root {
                let root = self.file.allocate_page()?;
                let node = RStarNode::Directory(vec![
                    DirectoryEntry { page, mbr: kept_mbr },
                    DirectoryEntry {
                        page: new_page,
                        mbr: moved_mbr,
                    },
                ]);
                self.write_node(root, node)?;
                self.header.root = root;
                self.header.height += 1;
                log::debug!("root split, tree height is now {}", self.header.height);
                return Ok(());
            }

            let Some((parent_page, mut parent)) = path.pop() else {
                return Err(invariant("split node has no parent"));
            };
            let entries = parent.directory_entries_mut()?;
            let idx = entries
                .iter()
                .position(|e| e.page == page)
                .ok_or_else(|| invariant(format!("page {} missing from its parent", page)))?;
            entries[idx].mbr = kept_mbr;
            entries.push(DirectoryEntry {
                page: new_page,
                mbr: moved_mbr,
            });
            path.push((parent_page, parent));
            level += 1;
        }
        Ok(())
    }

    /// Propagates the new rectangle of `child` up the remaining `path`,
    /// stopping as soon as a rectangle does not change.
    fn adjust_ancestors(
        &mut self,
        mut path: Path,
        mut child: PageId,
        mut child_mbr: Option<HyperBoundingBox>,
    ) -> SpatialResult<()> {
        while let Some((page, mut node)) = path.pop() {
            let mbr = child_mbr.ok_or_else(|| invariant(format!("page {} became empty", child)))?;
            let entries = node.directory_entries_mut()?;
            let idx = entries
                .iter()
                .position(|e| e.page == child)
                .ok_or_else(|| invariant(format!("page {} missing from its parent", child)))?;
            if entries[idx].mbr == mbr {
                return Ok(());
            }
            entries[idx].mbr = mbr;
            child_mbr = node.mbr();
            self.write_node(page, node)?;
            child = page;
        }
        Ok(())
    }

    /// Removes the entries farthest from the node centre, returning them
    /// closest first.
    fn take_reinsert_entries(&self, node: RStarNode) -> SpatialResult<(RStarNode, Vec<Entry>)> {
        let leaf = node.is_leaf();
        let minimum = self.minimum_of(&node);
        let mbr = node.mbr().ok_or_else(|| invariant("overflowing node is empty"))?;
        let mut entries = node.into_entries();

        let wanted = (self.config.reinsert_fraction * entries.len() as f64).ceil() as usize;
        let count = wanted.clamp(1, entries.len().saturating_sub(minimum).max(1));

        let mut keyed: Vec<(f64, Entry)> = entries
            .drain(..)
            .map(|e| (bounding_box::center_distance_sq(&e, &mbr), e))
            .collect();
        keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
        let mut removed: Vec<Entry> = keyed.drain(..count).map(|(_, e)| e).collect();
        removed.reverse();

        let kept = keyed.into_iter().map(|(_, e)| e).collect();
        Ok((RStarNode::from_entries(leaf, kept)?, removed))
    }

    fn split_node(&self, node: RStarNode) -> (RStarNode, RStarNode) {
        let minimum = self.minimum_of(&node);
        let mask = match &node {
            RStarNode::Leaf(entries) => split_mask(entries, minimum, self.config.split),
            RStarNode::Directory(entries) => split_mask(entries, minimum, self.config.split),
        };
        node.split_by(&mask)
    }

    // ------------------------------------------------------------------------
    // deletion
    // ------------------------------------------------------------------------

    /// Path to the leaf holding `id`, descending only into rectangles that
    /// contain `point`.
    fn find_leaf(
        &self,
        page: PageId,
        level: usize,
        id: DBID,
        point: &[f64],
    ) -> SpatialResult<Option<Path>> {
        let node = self.read_node(page)?;
        match node.as_ref() {
            RStarNode::Leaf(entries) => {
                if entries.iter().any(|e| e.id == id) {
                    return Ok(Some(vec![(page, RStarNode::clone(&node))]));
                }
            }
            RStarNode::Directory(entries) => {
                if level == 0 {
                    return Err(invariant(format!("directory page {} found at leaf level", page)));
                }
                for entry in entries {
                    if !bounding_box::contains(&entry.mbr, point) {
                        continue;
                    }
                    if let Some(mut path) = self.find_leaf(entry.page, level - 1, id, point)? {
                        path.insert(0, (page, RStarNode::clone(&node)));
                        return Ok(Some(path));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Writes back `node` and its ancestors after a removal, dissolving
    /// underfull nodes and reinserting their entries.
    fn condense(&mut self, mut path: Path, page: PageId, node: RStarNode) -> SpatialResult<()> {
        let mut orphans: Vec<(Entry, usize)> = Vec::new();
        let mut level = 0;
        let mut current = (page, node);

        while let Some((parent_page, mut parent)) = path.pop() {
            let (page, node) = current;
            let minimum = self.minimum_of(&node);
            let entries = parent.directory_entries_mut()?;
            let idx = entries
                .iter()
                .position(|e| e.page == page)
                .ok_or_else(|| invariant(format!("page {} missing from its parent", page)))?;
            if node.len() < minimum {
                entries.swap_remove(idx);
                orphans.extend(node.into_entries().into_iter().map(|e| (e, level)));
                self.file.free_page(page)?;
                log::trace!("dissolved underfull page {} at level {}", page, level);
            } else {
                entries[idx].mbr = node.mbr().ok_or_else(|| invariant("non-root node is empty"))?;
                self.write_node(page, node)?;
            }
            current = (parent_page, parent);
            level += 1;
        }
        let (root_page, root) = current;
        if !orphans.is_empty() && root.is_empty() && !root.is_leaf() {
            return Err(invariant("root lost all children during deletion"));
        }
        self.write_node(root_page, root)?;

        // higher levels first so every target level still exists
        orphans.sort_by(|a, b| b.1.cmp(&a.1));
        if !orphans.is_empty() {
            self.stats.count_reinsertions(orphans.len() as u64);
        }
        for (entry, level) in orphans {
            let mut guard = ReinsertGuard::default();
            self.insert_entry(entry, level, &mut guard)?;
        }

        self.shrink_root()
    }

    /// Replaces a directory root with a single child by that child.
    fn shrink_root(&mut self) -> SpatialResult<()> {
        loop {
            let root = self.read_node(self.header.root)?;
            let child = match root.as_ref() {
                RStarNode::Directory(entries) if entries.len() == 1 => entries[0].page,
                _ => return Ok(()),
            };
            self.file.free_page(self.header.root)?;
            self.header.root = child;
            self.header.height -= 1;
            log::debug!("root collapsed, tree height is now {}", self.header.height);
        }
    }
}

fn least_enlargement_child(entries: &[DirectoryEntry], entry: &Entry) -> usize {
    let key = |e: &DirectoryEntry| {
        (
            bounding_box::enlargement(&e.mbr, entry),
            bounding_box::volume_union(&e.mbr, entry),
            bounding_box::volume(&e.mbr),
        )
    };
    entries
        .iter()
        .enumerate()
        .map(|(i, e)| (i, key(e)))
        .min_by(|(_, a), (_, b)| compare_keys(a, b))
        .map_or(0, |(i, _)| i)
}

fn least_overlap_child(entries: &[DirectoryEntry], entry: &Entry) -> usize {
    let key = |i: usize| {
        let current = &entries[i].mbr;
        let grown = bounding_box::union(current, entry);
        let delta: f64 = entries
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, other)| {
                bounding_box::overlap(&grown, &other.mbr) - bounding_box::overlap(current, &other.mbr)
            })
            .sum();
        (
            delta,
            bounding_box::enlargement(current, entry),
            bounding_box::volume(current),
        )
    };
    (0..entries.len())
        .map(|i| (i, key(i)))
        .min_by(|(_, a), (_, b)| compare_keys(a, b))
        .map_or(0, |(i, _)| i)
}

fn compare_keys(a: &(f64, f64, f64), b: &(f64, f64, f64)) -> Ordering {
    a.0.total_cmp(&b.0)
        .then(a.1.total_cmp(&b.1))
        .then(a.2.total_cmp(&b.2))
}
