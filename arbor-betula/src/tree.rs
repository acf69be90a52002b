//! The CF-tree.
//!
//! Directory nodes and leaf features live in two arenas and refer to each
//! other by index. Leaves are cluster features, not nodes: the lowest
//! directory level holds them directly.

use std::sync::atomic::{AtomicU64, Ordering};

use arbor::dbid::DBID;
use arbor::errors::{ArborError, ArborResult, ErrorKind};
use arbor::relation::Relation;

use crate::config::{CFTreeConfig, ThresholdHeuristic};
use crate::distance::CFDistance;
use crate::features::{ClusterFeature, VIIFeature};

/// Handle of a leaf feature.
///
/// Handles are invalidated by a rebuild, so they are only meaningful
/// between two insertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeafId(usize);

impl LeafId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Child {
    Node(usize),
    Leaf(usize),
}

#[derive(Debug, Clone)]
struct DirNode<F> {
    cf: F,
    children: Vec<Child>,
}

#[derive(Debug, Clone)]
struct LeafCF<F> {
    cf: F,
    ids: Vec<DBID>,
}

/// Point-in-time copy of the tree counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CFTreeStats {
    pub rebuilds: u64,
    pub distance_computations: u64,
    pub absorption_computations: u64,
}

#[derive(Debug, Default)]
struct Counters {
    rebuilds: AtomicU64,
    distances: AtomicU64,
    absorptions: AtomicU64,
}

/// A BIRCH/BETULA cluster-feature tree over real vectors.
///
/// Every point descends to the closest leaf feature and is absorbed by it
/// when the absorption criterion stays within the squared threshold;
/// otherwise it starts a new leaf. Once there are more leaves than
/// allowed, the threshold is raised and all leaves are reinserted.
#[derive(Debug)]
pub struct CFTree<F: ClusterFeature = VIIFeature> {
    config: CFTreeConfig,
    dim: Option<usize>,
    nodes: Vec<DirNode<F>>,
    leaves: Vec<LeafCF<F>>,
    root: Option<usize>,
    thresholdsq: f64,
    max_leaves: usize,
    counters: Counters,
}

impl<F: ClusterFeature> CFTree<F> {
    /// Creates an empty tree for roughly `expected_size` objects; the size
    /// only matters when the leaf bound is a fraction.
    pub fn new(config: CFTreeConfig, expected_size: usize) -> ArborResult<Self> {
        config.validate()?;
        let max_leaves = config.max_leaves.resolve(expected_size);
        let thresholdsq = config.threshold * config.threshold;
        Ok(Self {
            config,
            dim: None,
            nodes: Vec::new(),
            leaves: Vec::new(),
            root: None,
            thresholdsq,
            max_leaves,
            counters: Counters::default(),
        })
    }

    /// Builds a tree from all vectors of a relation, remembering their ids
    /// when the configuration asks for it.
    pub fn build(relation: &dyn Relation<Object = [f64]>, config: CFTreeConfig) -> ArborResult<Self> {
        let mut tree = Self::new(config, relation.size())?;
        for id in relation.dbids() {
            let point = relation.get(id).ok_or_else(|| {
                ArborError::new(&format!("object {} vanished from the relation", id), ErrorKind::NotFound)
            })?;
            tree.insert_with_id(&point, id)?;
        }
        let stats = tree.stats();
        log::info!(
            "Built CF-tree of {} objects: {} leaves, threshold {:.6}, {} rebuilds",
            relation.size(),
            tree.leaf_count(),
            tree.threshold(),
            stats.rebuilds
        );
        Ok(tree)
    }

    pub fn config(&self) -> &CFTreeConfig {
        &self.config
    }

    pub fn insert(&mut self, point: &[f64]) -> ArborResult<()> {
        self.insert_entry(point, Vec::new())
    }

    /// Inserts a point on behalf of object `id`. The id is only kept when
    /// `store_ids` is enabled.
    pub fn insert_with_id(&mut self, point: &[f64], id: DBID) -> ArborResult<()> {
        let ids = if self.config.store_ids { vec![id] } else { Vec::new() };
        self.insert_entry(point, ids)
    }

    fn insert_entry(&mut self, point: &[f64], ids: Vec<DBID>) -> ArborResult<()> {
        self.check_dim(point)?;
        let mut cf = F::new(point.len());
        cf.add_point(point);
        self.insert_leaf_cf(LeafCF { cf, ids });
        if self.leaves.len() > self.max_leaves {
            self.rebuild()?;
        }
        Ok(())
    }

    fn check_dim(&mut self, point: &[f64]) -> ArborResult<()> {
        match self.dim {
            None => {
                self.dim = Some(point.len());
                Ok(())
            }
            Some(dim) if dim == point.len() => Ok(()),
            Some(dim) => Err(ArborError::new(
                &format!("expected a vector of dimensionality {}, got {}", dim, point.len()),
                ErrorKind::InvalidArgument,
            )),
        }
    }

    /// The leaf a point would be routed to, without modifying the tree.
    pub fn find_leaf(&self, point: &[f64]) -> ArborResult<LeafId> {
        let Some(mut node) = self.root else {
            return Err(ArborError::new("the CF-tree is empty", ErrorKind::InvalidOperation));
        };
        if let Some(dim) = self.dim.filter(|&dim| dim != point.len()) {
            return Err(ArborError::new(
                &format!("expected a vector of dimensionality {}, got {}", dim, point.len()),
                ErrorKind::InvalidArgument,
            ));
        }
        loop {
            let children = &self.nodes[node].children;
            let mut best = children[0];
            let mut best_distance = self.point_distance(point, self.child_cf(best));
            for &child in &children[1..] {
                let d = self.point_distance(point, self.child_cf(child));
                if d < best_distance {
                    best = child;
                    best_distance = d;
                }
            }
            match best {
                Child::Node(next) => node = next,
                Child::Leaf(leaf) => return Ok(LeafId(leaf)),
            }
        }
    }

    /// All leaf features with their handles.
    pub fn leaves(&self) -> impl Iterator<Item = (LeafId, &F)> + '_ {
        self.leaves.iter().enumerate().map(|(i, leaf)| (LeafId(i), &leaf.cf))
    }

    pub fn leaf_cf(&self, leaf: LeafId) -> Option<&F> {
        self.leaves.get(leaf.0).map(|leaf| &leaf.cf)
    }

    /// Ids absorbed by a leaf; `None` unless ids are stored.
    pub fn leaf_ids(&self, leaf: LeafId) -> Option<&[DBID]> {
        if !self.config.store_ids {
            return None;
        }
        self.leaves.get(leaf.0).map(|leaf| leaf.ids.as_slice())
    }

    /// Summary of everything inserted so far.
    pub fn root_cf(&self) -> Option<&F> {
        self.root.map(|root| &self.nodes[root].cf)
    }

    /// Current absorption threshold (not squared).
    pub fn threshold(&self) -> f64 {
        self.thresholdsq.sqrt()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn max_leaves(&self) -> usize {
        self.max_leaves
    }

    /// Number of directory levels; 0 for an empty tree.
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut node = self.root;
        while let Some(current) = node {
            height += 1;
            node = match self.nodes[current].children.first() {
                Some(Child::Node(child)) => Some(*child),
                _ => None,
            };
        }
        height
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn stats(&self) -> CFTreeStats {
        CFTreeStats {
            rebuilds: self.counters.rebuilds.load(Ordering::Relaxed),
            distance_computations: self.counters.distances.load(Ordering::Relaxed),
            absorption_computations: self.counters.absorptions.load(Ordering::Relaxed),
        }
    }

    fn child_cf(&self, child: Child) -> &F {
        match child {
            Child::Node(node) => &self.nodes[node].cf,
            Child::Leaf(leaf) => &self.leaves[leaf].cf,
        }
    }

    fn distance(&self, a: &F, b: &F) -> f64 {
        self.counters.distances.fetch_add(1, Ordering::Relaxed);
        self.config.distance.squared_cf(a, b)
    }

    fn point_distance(&self, point: &[f64], cf: &F) -> f64 {
        self.counters.distances.fetch_add(1, Ordering::Relaxed);
        self.config.distance.squared_point(point, cf)
    }

    fn absorption(&self, a: &F, b: &F) -> f64 {
        self.counters.absorptions.fetch_add(1, Ordering::Relaxed);
        self.config.absorption.squared_cf(a, b)
    }

    fn insert_leaf_cf(&mut self, entry: LeafCF<F>) {
        let Some(root) = self.root else {
            let node = DirNode {
                cf: entry.cf.clone(),
                children: vec![Child::Leaf(self.leaves.len())],
            };
            self.leaves.push(entry);
            self.nodes.push(node);
            self.root = Some(self.nodes.len() - 1);
            return;
        };
        if let Some(sibling) = self.insert_into(root, entry) {
            let mut cf = self.nodes[root].cf.clone();
            cf.add_cf(&self.nodes[sibling].cf);
            self.nodes.push(DirNode {
                cf,
                children: vec![Child::Node(root), Child::Node(sibling)],
            });
            self.root = Some(self.nodes.len() - 1);
            log::debug!("CF-tree root split, height is now {}", self.height());
        }
    }

    /// Inserts below `node`, returning the new sibling of `node` if it had
    /// to be split.
    fn insert_into(&mut self, node: usize, entry: LeafCF<F>) -> Option<usize> {
        // the subtree gains the entry whatever happens below
        self.nodes[node].cf.add_cf(&entry.cf);

        let children = &self.nodes[node].children;
        let mut best = children[0];
        let mut best_distance = self.distance(self.child_cf(best), &entry.cf);
        for &child in &children[1..] {
            let d = self.distance(self.child_cf(child), &entry.cf);
            if d < best_distance {
                best = child;
                best_distance = d;
            }
        }

        match best {
            Child::Leaf(leaf) => {
                if self.absorption(&self.leaves[leaf].cf, &entry.cf) <= self.thresholdsq {
                    let target = &mut self.leaves[leaf];
                    target.cf.add_cf(&entry.cf);
                    target.ids.extend(entry.ids);
                    return None;
                }
                self.leaves.push(entry);
                self.add_child(node, Child::Leaf(self.leaves.len() - 1))
            }
            Child::Node(child) => {
                let sibling = self.insert_into(child, entry)?;
                self.add_child(node, Child::Node(sibling))
            }
        }
    }

    fn add_child(&mut self, node: usize, child: Child) -> Option<usize> {
        if self.nodes[node].children.len() < self.config.branching_factor {
            self.nodes[node].children.push(child);
            return None;
        }
        Some(self.split(node, child))
    }

    /// Splits a full node plus one extra child around the farthest pair of
    /// children. Returns the index of the new node.
    fn split(&mut self, node: usize, extra: Child) -> usize {
        let mut entries = std::mem::take(&mut self.nodes[node].children);
        entries.push(extra);
        let size = entries.len();

        let mut dists = vec![vec![0.0; size]; size];
        let (mut m1, mut m2) = (0, 1);
        let mut max_distance = f64::NEG_INFINITY;
        for i in 0..size {
            for j in i + 1..size {
                let d = self.distance(self.child_cf(entries[i]), self.child_cf(entries[j]));
                dists[i][j] = d;
                dists[j][i] = d;
                if d > max_distance {
                    max_distance = d;
                    m1 = i;
                    m2 = j;
                }
            }
        }

        let mut first = Vec::with_capacity(size);
        let mut second = Vec::with_capacity(size);
        for (i, &child) in entries.iter().enumerate() {
            let (d1, d2) = (dists[m1][i], dists[m2][i]);
            if i == m1 || (i != m2 && (d1 < d2 || (d1 == d2 && first.len() <= second.len()))) {
                first.push(child);
            } else {
                second.push(child);
            }
        }

        let first_cf = self.summarize(&first);
        let second_cf = self.summarize(&second);
        self.nodes[node] = DirNode {
            cf: first_cf,
            children: first,
        };
        self.nodes.push(DirNode {
            cf: second_cf,
            children: second,
        });
        self.nodes.len() - 1
    }

    fn summarize(&self, children: &[Child]) -> F {
        let mut cf = F::new(self.dim.unwrap_or(0));
        for &child in children {
            cf.add_cf(self.child_cf(child));
        }
        cf
    }

    /// Raises the threshold and reinserts every leaf feature.
    fn rebuild(&mut self) -> ArborResult<()> {
        let Some(root) = self.root else {
            return Ok(());
        };
        self.counters.rebuilds.fetch_add(1, Ordering::Relaxed);
        let old_leaves = self.leaves.len();

        let mut estimates = Vec::with_capacity(old_leaves);
        self.estimate_thresholds(root, &mut estimates);

        let estimate = match self.config.threshold_heuristic {
            ThresholdHeuristic::Mean => {
                let finite: Vec<f64> = estimates.iter().map(|&(_, t)| t).filter(|t| t.is_finite()).collect();
                if finite.is_empty() {
                    f64::NAN
                } else {
                    let mean = finite.iter().map(|t| t.sqrt()).sum::<f64>() / finite.len() as f64;
                    mean * mean
                }
            }
            ThresholdHeuristic::Median => {
                estimates.sort_by(|a, b| a.1.total_cmp(&b.1));
                let mut median = estimates.len() / 2;
                while estimates[median].1 == f64::INFINITY && median > 0 {
                    median -= 1;
                }
                estimates[median].1
            }
        };
        // never shrink, and always make progress
        self.thresholdsq = if estimate > self.thresholdsq {
            estimate
        } else {
            f64::from_bits(self.thresholdsq.to_bits() + 1)
        };

        let mut slots: Vec<Option<LeafCF<F>>> = std::mem::take(&mut self.leaves).into_iter().map(Some).collect();
        self.nodes.clear();
        self.root = None;
        for &(leaf, _) in estimates.iter().rev() {
            if let Some(entry) = slots[leaf].take() {
                self.insert_leaf_cf(entry);
            }
        }

        if self.leaves.len() > old_leaves {
            log::error!(
                "CF-tree rebuild grew the number of leaves from {} to {}",
                old_leaves,
                self.leaves.len()
            );
            return Err(ArborError::new(
                &format!(
                    "rebuilding did not reduce the number of leaves ({} > {})",
                    self.leaves.len(),
                    old_leaves
                ),
                ErrorKind::InvariantViolation,
            ));
        }
        log::info!(
            "Rebuilt CF-tree: {} -> {} leaves, squared threshold {:e}",
            old_leaves,
            self.leaves.len(),
            self.thresholdsq
        );
        Ok(())
    }

    /// Collects every leaf with the absorption criterion towards its
    /// nearest sibling, infinite for an only child.
    fn estimate_thresholds(&self, node: usize, out: &mut Vec<(usize, f64)>) {
        let children = &self.nodes[node].children;
        let leaves: Vec<usize> = children
            .iter()
            .filter_map(|child| match child {
                Child::Leaf(leaf) => Some(*leaf),
                Child::Node(_) => None,
            })
            .collect();
        if leaves.is_empty() {
            for &child in children {
                if let Child::Node(child) = child {
                    self.estimate_thresholds(child, out);
                }
            }
            return;
        }
        if leaves.len() == 1 {
            out.push((leaves[0], f64::INFINITY));
            return;
        }

        let mut best = vec![f64::INFINITY; leaves.len()];
        let mut best_index = vec![0; leaves.len()];
        for i in 0..leaves.len() {
            let ci = &self.leaves[leaves[i]].cf;
            let (mut bi, mut bii) = (best[i], best_index[i]);
            for j in i + 1..leaves.len() {
                // nearest by routing distance, threshold by absorption
                let d = self.distance(ci, &self.leaves[leaves[j]].cf);
                if d < bi {
                    bi = d;
                    bii = j;
                }
                if d < best[j] {
                    best[j] = d;
                    best_index[j] = i;
                }
            }
            out.push((leaves[i], self.absorption(ci, &self.leaves[leaves[bii]].cf)));
        }
    }

    /// Walks the whole tree and checks that every directory feature
    /// summarizes its children and that no node is overfull.
    pub fn check_consistency(&self) -> ArborResult<()> {
        let Some(root) = self.root else {
            return Ok(());
        };
        let mut seen_leaves = 0;
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            let children = &self.nodes[node].children;
            if children.is_empty() || children.len() > self.config.branching_factor {
                return Err(self.violation(format!("node {} has {} children", node, children.len())));
            }
            let weight: u64 = children.iter().map(|&c| self.child_cf(c).weight()).sum();
            if weight != self.nodes[node].cf.weight() {
                return Err(self.violation(format!(
                    "node {} has weight {} but its children sum to {}",
                    node,
                    self.nodes[node].cf.weight(),
                    weight
                )));
            }
            for &child in children {
                match child {
                    Child::Node(child) => stack.push(child),
                    Child::Leaf(_) => seen_leaves += 1,
                }
            }
        }
        if seen_leaves != self.leaves.len() {
            return Err(self.violation(format!(
                "{} leaves reachable, {} allocated",
                seen_leaves,
                self.leaves.len()
            )));
        }
        Ok(())
    }

    fn violation(&self, message: String) -> ArborError {
        log::error!("CF-tree consistency check failed: {}", message);
        ArborError::new(&message, ErrorKind::InvariantViolation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MaxLeaves;
    use crate::distance::CFDistanceKind;
    use crate::features::BirchCF;
    use arbor::relation::VectorRelation;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn blobs(seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut points = Vec::new();
        for (center, count) in [([0.0, 0.0], 200), ([100.0, 0.0], 211), ([0.0, 100.0], 227)] {
            for _ in 0..count {
                points.push(vec![
                    center[0] + rng.gen_range(-1.0..1.0),
                    center[1] + rng.gen_range(-1.0..1.0),
                ]);
            }
        }
        points
    }

    fn grid(n: usize) -> Vec<Vec<f64>> {
        (0..n).map(|i| vec![(i % 10) as f64 * 3.0, (i / 10) as f64 * 3.0]).collect()
    }

    #[test]
    fn test_blobs_become_one_leaf_each() {
        let relation = VectorRelation::from_vectors(blobs(7)).unwrap();
        let config = CFTreeConfig::new()
            .with_threshold(5.0)
            .with_max_leaves(MaxLeaves::Absolute(10))
            .with_store_ids(true);
        let tree: CFTree = CFTree::build(&relation, config).unwrap();

        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.stats().rebuilds, 0);
        let mut weights: Vec<u64> = tree.leaves().map(|(_, cf)| cf.weight()).collect();
        weights.sort();
        assert_eq!(weights, vec![200, 211, 227]);
        assert_eq!(tree.root_cf().unwrap().weight(), 638);
        tree.check_consistency().unwrap();

        for id in relation.dbids() {
            let point = relation.get(id).unwrap();
            let leaf = tree.find_leaf(&point).unwrap();
            assert!(tree.leaf_ids(leaf).unwrap().contains(&id));
        }
    }

    #[test]
    fn test_split_keeps_tree_consistent() {
        let config = CFTreeConfig::new()
            .with_branching_factor(4)
            .with_max_leaves(MaxLeaves::Absolute(1000));
        let mut tree: CFTree<BirchCF> = CFTree::new(config, 100).unwrap();
        for p in grid(100) {
            tree.insert(&p).unwrap();
        }
        assert_eq!(tree.leaf_count(), 100);
        assert!(tree.height() >= 3);
        assert_eq!(tree.root_cf().unwrap().weight(), 100);
        tree.check_consistency().unwrap();
        assert!(tree.stats().distance_computations > 0);
    }

    #[test]
    fn test_rebuild_raises_threshold() {
        let config = CFTreeConfig::new()
            .with_branching_factor(8)
            .with_max_leaves(MaxLeaves::Absolute(3))
            .with_store_ids(true);
        let mut tree: CFTree = CFTree::new(config, 638).unwrap();
        let mut last = tree.threshold();
        for (i, p) in blobs(11).iter().enumerate() {
            tree.insert_with_id(p, DBID::new(i as u32)).unwrap();
            assert!(tree.threshold() >= last);
            last = tree.threshold();
        }
        assert!(tree.stats().rebuilds > 0);
        assert!(tree.threshold() > 0.0);
        assert_eq!(tree.root_cf().unwrap().weight(), 638);
        let stored: usize = tree.leaves().map(|(leaf, _)| tree.leaf_ids(leaf).unwrap().len()).sum();
        assert_eq!(stored, 638);
        tree.check_consistency().unwrap();
    }

    #[test]
    fn test_median_heuristic() {
        let config = CFTreeConfig::new()
            .with_max_leaves(MaxLeaves::Absolute(5))
            .with_threshold_heuristic(ThresholdHeuristic::Median)
            .with_absorption(CFDistanceKind::Diameter);
        let mut tree: CFTree = CFTree::new(config, 100).unwrap();
        for p in grid(100) {
            tree.insert(&p).unwrap();
        }
        assert!(tree.stats().rebuilds > 0);
        assert!(tree.threshold() > 0.0);
        assert_eq!(tree.root_cf().unwrap().weight(), 100);
        tree.check_consistency().unwrap();
    }

    #[test]
    fn test_duplicates_are_absorbed_at_zero_threshold() {
        let mut tree: CFTree = CFTree::new(CFTreeConfig::new(), 10).unwrap();
        for _ in 0..10 {
            tree.insert(&[1.0, 2.0]).unwrap();
        }
        assert_eq!(tree.leaf_count(), 1);
        assert_eq!(tree.root_cf().unwrap().weight(), 10);
    }

    #[test]
    fn test_ids_not_stored_by_default() {
        let mut tree: CFTree = CFTree::new(CFTreeConfig::new(), 10).unwrap();
        tree.insert_with_id(&[0.0], DBID::new(3)).unwrap();
        let leaf = tree.find_leaf(&[0.0]).unwrap();
        assert!(tree.leaf_ids(leaf).is_none());
        assert!(tree.leaf_cf(leaf).is_some());
    }

    #[test]
    fn test_empty_and_mismatched_inputs() {
        let mut tree: CFTree = CFTree::new(CFTreeConfig::new(), 10).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.height(), 0);
        let err = tree.find_leaf(&[0.0, 0.0]).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);

        tree.insert(&[0.0, 0.0]).unwrap();
        let err = tree.insert(&[0.0]).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidArgument);
        let err = tree.find_leaf(&[0.0, 0.0, 0.0]).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = CFTree::<VIIFeature>::new(CFTreeConfig::new().with_branching_factor(1), 10);
        assert_eq!(result.unwrap_err().kind(), &ErrorKind::Configuration);
    }
}
