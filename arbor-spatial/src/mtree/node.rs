//! M-tree nodes and entries.

use arbor::dbid::DBID;
use serde::{Deserialize, Serialize};

use crate::persistent::PageId;
use crate::tree::{DistanceBoundedEntry, SplittableNode};

/// An object reference (leaf) or a routing object with its subtree
/// (directory).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MTreeEntry {
    /// The object, or the routing object of the child.
    pub id: DBID,
    /// Distance to the routing object of the node holding this entry; 0 in
    /// the root.
    pub parent_distance: f64,
    pub covering_radius: f64,
    pub child: Option<PageId>,
}

impl MTreeEntry {
    pub fn leaf(id: DBID, parent_distance: f64) -> Self {
        Self {
            id,
            parent_distance,
            covering_radius: 0.0,
            child: None,
        }
    }

    pub fn routing(id: DBID, parent_distance: f64, covering_radius: f64, child: PageId) -> Self {
        Self {
            id,
            parent_distance,
            covering_radius,
            child: Some(child),
        }
    }
}

impl DistanceBoundedEntry for MTreeEntry {
    fn parent_distance(&self) -> f64 {
        self.parent_distance
    }

    fn covering_radius(&self) -> f64 {
        self.covering_radius
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MTreeNode {
    pub leaf: bool,
    pub entries: Vec<MTreeEntry>,
}

impl MTreeNode {
    pub fn new(leaf: bool) -> Self {
        Self {
            leaf,
            entries: Vec::new(),
        }
    }

    pub(crate) fn child_index(&self, page: PageId) -> Option<usize> {
        self.entries.iter().position(|e| e.child == Some(page))
    }
}

impl SplittableNode for MTreeNode {
    fn is_leaf(&self) -> bool {
        self.leaf
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn split_by(self, mask: &[bool]) -> (Self, Self) {
        let mut first = MTreeNode::new(self.leaf);
        let mut second = MTreeNode::new(self.leaf);
        for (i, entry) in self.entries.into_iter().enumerate() {
            if mask.get(i).copied().unwrap_or(false) {
                second.entries.push(entry);
            } else {
                first.entries.push(entry);
            }
        }
        (first, second)
    }
}
