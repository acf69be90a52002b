//! R*-tree nodes and entries.

use arbor::bounding_box::{HyperBoundingBox, SpatialComparable};
use arbor::dbid::DBID;
use serde::{Deserialize, Serialize};

use crate::errors::{SpatialError, SpatialResult};
use crate::persistent::PageId;
use crate::tree::SplittableNode;

/// A data point stored in a leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafEntry {
    pub id: DBID,
    pub point: Vec<f64>,
}

/// A child reference stored in a directory node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub page: PageId,
    pub mbr: HyperBoundingBox,
}

impl SpatialComparable for LeafEntry {
    fn dim(&self) -> usize {
        self.point.len()
    }

    fn min(&self, d: usize) -> f64 {
        self.point[d]
    }

    fn max(&self, d: usize) -> f64 {
        self.point[d]
    }
}

impl SpatialComparable for DirectoryEntry {
    fn dim(&self) -> usize {
        self.mbr.dim()
    }

    fn min(&self, d: usize) -> f64 {
        self.mbr.min(d)
    }

    fn max(&self, d: usize) -> f64 {
        self.mbr.max(d)
    }
}

/// Either kind of entry, used when entries move between nodes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Entry {
    Leaf(LeafEntry),
    Directory(DirectoryEntry),
}

impl SpatialComparable for Entry {
    fn dim(&self) -> usize {
        match self {
            Entry::Leaf(e) => e.dim(),
            Entry::Directory(e) => e.dim(),
        }
    }

    fn min(&self, d: usize) -> f64 {
        match self {
            Entry::Leaf(e) => e.min(d),
            Entry::Directory(e) => e.min(d),
        }
    }

    fn max(&self, d: usize) -> f64 {
        match self {
            Entry::Leaf(e) => e.max(d),
            Entry::Directory(e) => e.max(d),
        }
    }
}

/// A page of the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RStarNode {
    Leaf(Vec<LeafEntry>),
    Directory(Vec<DirectoryEntry>),
}

impl RStarNode {
    /// Bounding rectangle of all entries, `None` for an empty node.
    pub fn mbr(&self) -> Option<HyperBoundingBox> {
        match self {
            RStarNode::Leaf(entries) => HyperBoundingBox::union_all(entries.iter()),
            RStarNode::Directory(entries) => HyperBoundingBox::union_all(entries.iter()),
        }
    }

    /// Bounding rectangle of entry `i`.
    pub fn entry_mbr(&self, i: usize) -> HyperBoundingBox {
        match self {
            RStarNode::Leaf(entries) => HyperBoundingBox::from_point(&entries[i].point),
            RStarNode::Directory(entries) => entries[i].mbr.clone(),
        }
    }

    pub(crate) fn push(&mut self, entry: Entry) -> SpatialResult<()> {
        match (self, entry) {
            (RStarNode::Leaf(entries), Entry::Leaf(e)) => entries.push(e),
            (RStarNode::Directory(entries), Entry::Directory(e)) => entries.push(e),
            (node, _) => {
                return Err(SpatialError::InvariantViolation(format!(
                    "entry kind does not match {} node",
                    if node.is_leaf() { "leaf" } else { "directory" }
                )))
            }
        }
        Ok(())
    }

    pub(crate) fn remove(&mut self, i: usize) -> Entry {
        match self {
            RStarNode::Leaf(entries) => Entry::Leaf(entries.swap_remove(i)),
            RStarNode::Directory(entries) => Entry::Directory(entries.swap_remove(i)),
        }
    }

    pub(crate) fn into_entries(self) -> Vec<Entry> {
        match self {
            RStarNode::Leaf(entries) => entries.into_iter().map(Entry::Leaf).collect(),
            RStarNode::Directory(entries) => entries.into_iter().map(Entry::Directory).collect(),
        }
    }

    /// Builds a node from entries of one kind.
    pub(crate) fn from_entries(leaf: bool, entries: Vec<Entry>) -> SpatialResult<Self> {
        let mut node = if leaf {
            RStarNode::Leaf(Vec::with_capacity(entries.len()))
        } else {
            RStarNode::Directory(Vec::with_capacity(entries.len()))
        };
        for entry in entries {
            node.push(entry)?;
        }
        Ok(node)
    }

    /// The entry referencing `page`, if this is a directory holding it.
    pub(crate) fn child_index(&self, page: PageId) -> Option<usize> {
        match self {
            RStarNode::Directory(entries) => entries.iter().position(|e| e.page == page),
            RStarNode::Leaf(_) => None,
        }
    }

    pub(crate) fn directory_entries_mut(&mut self) -> SpatialResult<&mut Vec<DirectoryEntry>> {
        match self {
            RStarNode::Directory(entries) => Ok(entries),
            RStarNode::Leaf(_) => Err(SpatialError::InvariantViolation(
                "expected a directory node".into(),
            )),
        }
    }
}

impl SplittableNode for RStarNode {
    fn is_leaf(&self) -> bool {
        matches!(self, RStarNode::Leaf(_))
    }

    fn len(&self) -> usize {
        match self {
            RStarNode::Leaf(entries) => entries.len(),
            RStarNode::Directory(entries) => entries.len(),
        }
    }

    fn split_by(self, mask: &[bool]) -> (Self, Self) {
        fn partition<E>(entries: Vec<E>, mask: &[bool]) -> (Vec<E>, Vec<E>) {
            let mut first = Vec::new();
            let mut second = Vec::new();
            for (i, entry) in entries.into_iter().enumerate() {
                if mask.get(i).copied().unwrap_or(false) {
                    second.push(entry);
                } else {
                    first.push(entry);
                }
            }
            (first, second)
        }

        match self {
            RStarNode::Leaf(entries) => {
                let (a, b) = partition(entries, mask);
                (RStarNode::Leaf(a), RStarNode::Leaf(b))
            }
            RStarNode::Directory(entries) => {
                let (a, b) = partition(entries, mask);
                (RStarNode::Directory(a), RStarNode::Directory(b))
            }
        }
    }
}
