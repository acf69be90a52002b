//! Queries, traversal and structural checks.

use arbor::bounding_box::{self, HyperBoundingBox, SpatialComparable};
use arbor::dbid::DBID;
use arbor::distance::{PrimitiveDistance, SpatialPrimitiveDistance};
use arbor::errors::{ArborError, ArborResult, ErrorKind};
use arbor::knn::{DoubleDBIDList, KnnHeap, KnnList};
use arbor::query::{check_provider, KnnIndex, KnnProvider};
use arbor::util::admissible_bound;

use super::node::{LeafEntry, RStarNode};
use super::RStarTree;
use crate::errors::SpatialResult;
use crate::persistent::{PageFile, PageId};
use crate::tree::{
    fold_k_distance, may_contain, ApproximationScope, DynamicIndex, IntegrityReport,
    KDistanceBounds, PartitionedIndex, SearchQueue, SplittableNode,
};

impl<F: PageFile<RStarNode>> RStarTree<F> {
    /// The `k` nearest points to `query`, nearest first.
    ///
    /// Best-first search: subtrees are expanded in order of their minimum
    /// distance and the search stops once that bound exceeds the current
    /// k-th distance.
    pub fn knn(
        &self,
        distance: &dyn SpatialPrimitiveDistance,
        query: &[f64],
        k: usize,
    ) -> SpatialResult<KnnList> {
        if k == 0 || self.is_empty() {
            return Ok(KnnList::empty(k));
        }
        self.check_dimensionality(query.len())?;

        let query_box = HyperBoundingBox::from_point(query);
        let mut heap = KnnHeap::new(k);
        let mut queue = SearchQueue::new();
        queue.push(0.0, self.header.root);

        while let Some((bound, page)) = queue.pop() {
            if bound > heap.k_distance() {
                break;
            }
            match self.read_node(page)?.as_ref() {
                RStarNode::Leaf(entries) => {
                    self.stats.count_distances(entries.len() as u64);
                    for entry in entries {
                        heap.insert(distance.distance(query, &entry.point), entry.id);
                    }
                }
                RStarNode::Directory(entries) => {
                    self.stats.count_distances(entries.len() as u64);
                    for entry in entries {
                        let bound = admissible_bound(distance.min_dist(&query_box, &entry.mbr));
                        if bound <= heap.k_distance() {
                            queue.push(bound, entry.page);
                        }
                    }
                }
            }
        }
        Ok(heap.into_knn_list())
    }

    /// All points within `radius` of `query`, in no particular order.
    pub fn range(
        &self,
        distance: &dyn SpatialPrimitiveDistance,
        query: &[f64],
        radius: f64,
    ) -> SpatialResult<DoubleDBIDList> {
        let mut result = DoubleDBIDList::new();
        if self.is_empty() || radius.is_nan() || radius < 0.0 {
            return Ok(result);
        }
        self.check_dimensionality(query.len())?;

        let query_box = HyperBoundingBox::from_point(query);
        let mut stack = vec![self.header.root];
        while let Some(page) = stack.pop() {
            match self.read_node(page)?.as_ref() {
                RStarNode::Leaf(entries) => {
                    self.stats.count_distances(entries.len() as u64);
                    for entry in entries {
                        let d = distance.distance(query, &entry.point);
                        if d <= radius {
                            result.push(d, entry.id);
                        }
                    }
                }
                RStarNode::Directory(entries) => {
                    self.stats.count_distances(entries.len() as u64);
                    for entry in entries {
                        if admissible_bound(distance.min_dist(&query_box, &entry.mbr)) <= radius {
                            stack.push(entry.page);
                        }
                    }
                }
            }
        }
        Ok(result)
    }

    /// Points having `query` among their `k` nearest neighbours, sorted by
    /// distance.
    ///
    /// Collects [`KDistanceBounds`] first, then descends only into subtrees
    /// whose minimum distance to the query is within the largest k-distance
    /// stored below them. Points without a stored list are skipped.
    pub fn reverse_knn(
        &self,
        distance: &dyn PrimitiveDistance<[f64]>,
        query: &[f64],
        k: usize,
        provider: &dyn KnnProvider,
    ) -> SpatialResult<DoubleDBIDList> {
        check_provider(provider, k)?;
        if k == 0 || self.is_empty() {
            return Ok(DoubleDBIDList::new());
        }
        self.check_dimensionality(query.len())?;
        let bounds = self.k_distance_bounds(k, provider)?;
        self.reverse_knn_bounded(distance, query, &bounds, provider)
    }

    /// Reverse kNN against bounds collected earlier, so that many queries
    /// share one pass over the provider.
    pub fn reverse_knn_bounded(
        &self,
        distance: &dyn PrimitiveDistance<[f64]>,
        query: &[f64],
        bounds: &KDistanceBounds,
        provider: &dyn KnnProvider,
    ) -> SpatialResult<DoubleDBIDList> {
        let k = bounds.k();
        check_provider(provider, k)?;
        let mut result = DoubleDBIDList::new();
        if k == 0 || self.is_empty() {
            return Ok(result);
        }
        self.check_dimensionality(query.len())?;

        // without rectangle bounds only the k-distances prune
        let spatial = distance.as_spatial();
        let query_box = HyperBoundingBox::from_point(query);
        let mut stack = Vec::new();
        if may_contain(0.0, bounds.bound(self.header.root)) {
            stack.push(self.header.root);
        }
        while let Some(page) = stack.pop() {
            match self.read_node(page)?.as_ref() {
                RStarNode::Leaf(entries) => {
                    for entry in entries {
                        let Some(k_distance) = provider.k_distance(entry.id, k) else {
                            continue;
                        };
                        self.stats.count_distances(1);
                        let d = distance.distance(query, &entry.point);
                        if d <= k_distance {
                            result.push(d, entry.id);
                        }
                    }
                }
                RStarNode::Directory(entries) => {
                    for entry in entries {
                        let bound = bounds.bound(entry.page);
                        if bound == f64::NEG_INFINITY {
                            continue;
                        }
                        let lower = match spatial {
                            Some(spatial) => {
                                self.stats.count_distances(1);
                                admissible_bound(spatial.min_dist(&query_box, &entry.mbr))
                            }
                            None => 0.0,
                        };
                        if may_contain(lower, bound) {
                            stack.push(entry.page);
                        }
                    }
                }
            }
        }
        result.sort();
        Ok(result)
    }

    /// Largest k-distance stored by `provider` below every page, collected
    /// bottom-up in one pass without distance computations.
    pub fn k_distance_bounds(
        &self,
        k: usize,
        provider: &dyn KnnProvider,
    ) -> SpatialResult<KDistanceBounds> {
        check_provider(provider, k)?;
        let mut bounds = KDistanceBounds::new(k);
        if self.is_initialized() {
            self.collect_k_distances(self.header.root, k, provider, &mut bounds)?;
        }
        Ok(bounds)
    }

    fn collect_k_distances(
        &self,
        page: PageId,
        k: usize,
        provider: &dyn KnnProvider,
        bounds: &mut KDistanceBounds,
    ) -> SpatialResult<f64> {
        let bound = match self.read_node(page)?.as_ref() {
            RStarNode::Leaf(entries) => entries
                .iter()
                .fold(f64::NEG_INFINITY, |max, e| fold_k_distance(max, provider, e.id, k)),
            RStarNode::Directory(entries) => {
                let mut max = f64::NEG_INFINITY;
                for entry in entries {
                    max = max.max(self.collect_k_distances(entry.page, k, provider, bounds)?);
                }
                max
            }
        };
        bounds.record(page, bound);
        Ok(bound)
    }

    /// Calls `f` with every leaf page and its entries, depth first.
    pub(crate) fn for_each_leaf(
        &self,
        mut f: impl FnMut(PageId, &[LeafEntry]) -> SpatialResult<()>,
    ) -> SpatialResult<()> {
        if !self.is_initialized() {
            return Ok(());
        }
        let mut stack = vec![self.header.root];
        while let Some(page) = stack.pop() {
            match self.read_node(page)?.as_ref() {
                RStarNode::Leaf(entries) => f(page, entries)?,
                RStarNode::Directory(entries) => {
                    stack.extend(entries.iter().rev().map(|e| e.page));
                }
            }
        }
        Ok(())
    }

    /// Object ids grouped by leaf, or by the parent of the leaves.
    pub fn partitions(&self, scope: ApproximationScope) -> SpatialResult<Vec<Vec<DBID>>> {
        let mut partitions = Vec::new();
        if self.is_empty() {
            return Ok(partitions);
        }
        if scope == ApproximationScope::Leaf || self.header.height == 1 {
            self.for_each_leaf(|_, entries| {
                partitions.push(entries.iter().map(|e| e.id).collect());
                Ok(())
            })?;
            return Ok(partitions);
        }

        // directories directly above the leaves sit at level 1
        let mut stack = vec![(self.header.root, self.header.height - 1)];
        while let Some((page, level)) = stack.pop() {
            let node = self.read_node(page)?;
            let RStarNode::Directory(entries) = node.as_ref() else {
                continue;
            };
            if level > 1 {
                stack.extend(entries.iter().rev().map(|e| (e.page, level - 1)));
                continue;
            }
            let mut ids = Vec::new();
            for entry in entries {
                if let RStarNode::Leaf(leaf) = self.read_node(entry.page)?.as_ref() {
                    ids.extend(leaf.iter().map(|e| e.id));
                }
            }
            partitions.push(ids);
        }
        Ok(partitions)
    }

    /// Walks the whole tree and reports every structural violation:
    /// rectangles not covering their subtree, capacity and fill limits,
    /// leaves at different depths and a wrong object count.
    pub fn check_integrity(&self) -> SpatialResult<IntegrityReport> {
        let mut report = IntegrityReport::new();
        if !self.is_initialized() {
            return Ok(report);
        }
        self.check_subtree(self.header.root, self.header.height - 1, None, true, &mut report)?;
        if report.entries_found != self.header.size as u64 {
            report.violation(
                self.header.root,
                format!(
                    "header counts {} objects, leaves hold {}",
                    self.header.size, report.entries_found
                ),
            );
        }
        if !report.is_valid() {
            log::error!("R*-tree integrity check failed: {}", report);
        }
        Ok(report)
    }

    fn check_subtree(
        &self,
        page: PageId,
        level: usize,
        parent_mbr: Option<&HyperBoundingBox>,
        is_root: bool,
        report: &mut IntegrityReport,
    ) -> SpatialResult<()> {
        let node = self.read_node(page)?;
        report.nodes_checked += 1;

        if node.is_leaf() != (level == 0) {
            report.violation(page, format!("node kind does not match level {}", level));
        }
        let capacity = self.capacity_of(&node);
        if node.len() > capacity {
            report.violation(page, format!("{} entries exceed capacity {}", node.len(), capacity));
        }
        let minimum = self.minimum_of(&node);
        if !is_root && node.len() < minimum {
            report.violation(page, format!("{} entries below minimum {}", node.len(), minimum));
        }
        if is_root && !node.is_leaf() && node.len() < 2 {
            report.violation(page, "directory root with fewer than two children");
        }
        if let (Some(expected), Some(actual)) = (parent_mbr, node.mbr()) {
            if !bounding_box::contains(expected, &actual) {
                report.violation(page, format!("parent rectangle {} does not cover {}", expected, actual));
            }
        }

        match node.as_ref() {
            RStarNode::Leaf(entries) => {
                report.entries_found += entries.len() as u64;
                if let Some(e) = entries.iter().find(|e| e.dim() != self.header.dimensionality) {
                    report.violation(page, format!("object {} has wrong dimensionality", e.id));
                }
            }
            RStarNode::Directory(entries) => {
                if level == 0 {
                    return Ok(());
                }
                for entry in entries {
                    self.check_subtree(entry.page, level - 1, Some(&entry.mbr), false, report)?;
                }
            }
        }
        Ok(())
    }
}

fn spatial_distance(
    distance: &dyn PrimitiveDistance<[f64]>,
) -> ArborResult<&dyn SpatialPrimitiveDistance> {
    distance.as_spatial().ok_or_else(|| {
        ArborError::new(
            &format!(
                "Distance {} provides no rectangle bounds and cannot use an R*-tree",
                distance.name()
            ),
            ErrorKind::Configuration,
        )
    })
}

impl<F: PageFile<RStarNode>> KnnIndex<[f64]> for RStarTree<F> {
    fn name(&self) -> &str {
        "RStarTree"
    }

    fn supports(&self, distance: &dyn PrimitiveDistance<[f64]>) -> bool {
        distance.as_spatial().is_some()
    }

    fn knn(&self, distance: &dyn PrimitiveDistance<[f64]>, query: &[f64], k: usize) -> ArborResult<KnnList> {
        let spatial = spatial_distance(distance)?;
        Ok(RStarTree::knn(self, spatial, query, k)?)
    }

    fn range(
        &self,
        distance: &dyn PrimitiveDistance<[f64]>,
        query: &[f64],
        radius: f64,
    ) -> ArborResult<DoubleDBIDList> {
        let spatial = spatial_distance(distance)?;
        Ok(RStarTree::range(self, spatial, query, radius)?)
    }

    fn reverse_knn(
        &self,
        distance: &dyn PrimitiveDistance<[f64]>,
        query: &[f64],
        k: usize,
        provider: &dyn KnnProvider,
    ) -> ArborResult<DoubleDBIDList> {
        spatial_distance(distance)?;
        Ok(RStarTree::reverse_knn(self, distance, query, k, provider)?)
    }
}

impl<F: PageFile<RStarNode>> DynamicIndex<[f64]> for RStarTree<F> {
    fn insert(&mut self, id: DBID, object: &[f64]) -> SpatialResult<()> {
        RStarTree::insert(self, id, object)
    }

    fn delete(&mut self, id: DBID, object: &[f64]) -> SpatialResult<bool> {
        RStarTree::delete(self, id, object)
    }

    fn size(&self) -> usize {
        RStarTree::size(self)
    }
}

impl<F: PageFile<RStarNode>> PartitionedIndex for RStarTree<F> {
    fn partitions(&self, scope: ApproximationScope) -> SpatialResult<Vec<Vec<DBID>>> {
        RStarTree::partitions(self, scope)
    }
}
