//! M-tree over any metric space.
//!
//! Entries store object ids, their distance to the routing object of the
//! enclosing node and, for directory entries, the covering radius of the
//! child. Objects themselves are looked up in the relation, so a tree is
//! only meaningful together with the relation it was built from.
//!
//! Deletion is not supported: an M-tree has no cheap way to shrink
//! covering radii, and the preprocessors rebuild instead.

use std::sync::Arc;

use arbor::dbid::DBID;
use arbor::distance::PrimitiveDistance;
use arbor::errors::{ArborError, ArborResult, ErrorKind};
use arbor::knn::{DoubleDBIDList, KnnHeap, KnnList};
use arbor::query::{check_provider, KnnIndex, KnnProvider};
use arbor::relation::Relation;
use arbor::util::admissible_bound;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::errors::{SpatialError, SpatialResult};
use crate::persistent::{PageFile, PageFileStats, PageId, TreeHeader};
use crate::tree::{
    fold_k_distance, may_contain, ApproximationScope, DynamicIndex, IntegrityReport,
    KDistanceBounds, PartitionedIndex, SearchQueue, SplittableNode, TreeStats, TreeStatsSnapshot,
};

mod config;
mod node;
mod split;

pub use config::{DistributionStrategy, MTreeConfig, PromotionStrategy};
pub use node::{MTreeEntry, MTreeNode};

use split::{plan_split, SplitInput};

/// Tolerance for covering radius checks.
const RADIUS_EPSILON: f64 = 1e-9;

/// Nodes from the root down, each with the routing object it hangs under.
type Path = Vec<(PageId, MTreeNode, Option<DBID>)>;

/// An M-tree storing its nodes in a page file `F`.
pub struct MTree<O: ?Sized, F> {
    relation: Arc<dyn Relation<Object = O>>,
    distance: Arc<dyn PrimitiveDistance<O>>,
    file: F,
    config: MTreeConfig,
    header: TreeHeader,
    stats: TreeStats,
    rng: StdRng,
}

impl<O, F> MTree<O, F>
where
    O: ?Sized + Send + Sync + 'static,
    F: PageFile<MTreeNode>,
{
    /// Creates an empty tree. The distance must be a metric.
    pub fn new(
        relation: Arc<dyn Relation<Object = O>>,
        distance: Arc<dyn PrimitiveDistance<O>>,
        file: F,
        config: MTreeConfig,
    ) -> SpatialResult<Self> {
        config.validate(file.page_size())?;
        if !distance.is_metric() {
            return Err(SpatialError::Configuration(format!(
                "M-tree pruning needs a metric, {} is not one",
                distance.name()
            )));
        }
        if file.read_header()?.is_some() {
            return Err(SpatialError::InvalidOperation(
                "Page file already holds a tree; open it instead".into(),
            ));
        }
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            relation,
            distance,
            file,
            config,
            header: TreeHeader::default(),
            stats: TreeStats::new(),
            rng,
        })
    }

    /// Restores a tree over the same relation from the header in page 0.
    pub fn open(
        relation: Arc<dyn Relation<Object = O>>,
        distance: Arc<dyn PrimitiveDistance<O>>,
        file: F,
        config: MTreeConfig,
    ) -> SpatialResult<Self> {
        let header = file
            .read_header()?
            .ok_or_else(|| SpatialError::InvalidFormat("Page file holds no tree".into()))?;
        let config = MTreeConfig {
            leaf_capacity: header.leaf_capacity,
            dir_capacity: header.dir_capacity,
            ..config
        };
        let rng = StdRng::seed_from_u64(config.seed);
        log::debug!("opened M-tree: {} objects, height {}", header.size, header.height);
        Ok(Self {
            relation,
            distance,
            file,
            config,
            header,
            stats: TreeStats::new(),
            rng,
        })
    }

    /// Creates a tree and inserts every object of the relation.
    pub fn build(
        relation: Arc<dyn Relation<Object = O>>,
        distance: Arc<dyn PrimitiveDistance<O>>,
        file: F,
        config: MTreeConfig,
    ) -> SpatialResult<Self> {
        let mut tree = Self::new(Arc::clone(&relation), distance, file, config)?;
        for id in relation.dbids() {
            tree.insert(id)?;
        }
        log::debug!(
            "built M-tree over {} objects: height {}, {} splits",
            tree.size(),
            tree.height(),
            tree.stats().splits
        );
        Ok(tree)
    }

    pub fn config(&self) -> &MTreeConfig {
        &self.config
    }

    pub fn distance(&self) -> &dyn PrimitiveDistance<O> {
        self.distance.as_ref()
    }

    pub fn size(&self) -> usize {
        self.header.size
    }

    pub fn is_empty(&self) -> bool {
        self.header.size == 0
    }

    pub fn height(&self) -> usize {
        self.header.height
    }

    pub fn stats(&self) -> TreeStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn page_file_stats(&self) -> PageFileStats {
        self.file.stats()
    }

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
    // plumbing
    // ------------------------------------------------------------------------

    fn is_initialized(&self) -> bool {
        self.header.root != 0
    }

    fn ensure_initialized(&mut self) -> SpatialResult<()> {
        if self.is_initialized() {
            return Ok(());
        }
        let root = self.file.allocate_page()?;
        self.write_node(root, MTreeNode::new(true))?;
        self.header = TreeHeader {
            root,
            height: 1,
            leaf_capacity: self.config.leaf_capacity,
            dir_capacity: self.config.dir_capacity,
            leaf_minimum: 0,
            dir_minimum: 0,
            dimensionality: self.relation.dimensionality().unwrap_or(0),
            size: 0,
        };
        self.store_header()
    }

    fn store_header(&mut self) -> SpatialResult<()> {
        if self.is_initialized() {
            self.file.write_header(&self.header)?;
        }
        Ok(())
    }

    fn read_node(&self, page: PageId) -> SpatialResult<Arc<MTreeNode>> {
        self.stats.count_read();
        self.file.read_page(page)
    }

    fn write_node(&mut self, page: PageId, node: MTreeNode) -> SpatialResult<()> {
        self.stats.count_write();
        self.file.write_page(page, node)
    }

    fn capacity_of(&self, node: &MTreeNode) -> usize {
        if node.leaf {
            self.header.leaf_capacity
        } else {
            self.header.dir_capacity
        }
    }

    fn object(&self, id: DBID) -> SpatialResult<Arc<O>> {
        self.relation.get(id).ok_or_else(|| {
            SpatialError::Core(ArborError::new(
                &format!("Object {} is not in the relation", id),
                ErrorKind::NotFound,
            ))
        })
    }

    fn dist(&self, a: &O, b: &O) -> f64 {
        self.stats.count_distances(1);
        self.distance.distance(a, b)
    }

    fn dist_to(&self, id: DBID, object: &O) -> SpatialResult<f64> {
        let other = self.object(id)?;
        Ok(self.dist(other.as_ref(), object))
    }

    // ------------------------------------------------------------------------
    // insertion
    // ------------------------------------------------------------------------

    /// Inserts the relation's object `id`.
    pub fn insert(&mut self, id: DBID) -> SpatialResult<()> {
        let object = self.object(id)?;
        self.insert_object(id, object.as_ref())
    }

    /// Inserts `object` under `id`; routing objects are still looked up in
    /// the relation.
    pub fn insert_object(&mut self, id: DBID, object: &O) -> SpatialResult<()> {
        self.ensure_initialized()?;

        let mut path: Path = Vec::with_capacity(self.header.height);
        let mut page = self.header.root;
        let mut routing = None;
        let mut parent_distance = 0.0;
        loop {
            let mut node = MTreeNode::clone(&*self.read_node(page)?);
            if node.leaf {
                node.entries.push(MTreeEntry::leaf(id, parent_distance));
                path.push((page, node, routing));
                break;
            }
            let (index, d) = self.choose_subtree(&node, object)?;
            let entry = &mut node.entries[index];
            if d > entry.covering_radius {
                entry.covering_radius = d;
            }
            let (child, child_routing) = match entry.child {
                Some(child) => (child, entry.id),
                None => {
                    return Err(SpatialError::InvariantViolation(format!(
                        "directory page {} holds an entry without child",
                        page
                    )))
                }
            };
            path.push((page, node, routing));
            page = child;
            routing = Some(child_routing);
            parent_distance = d;
        }

        self.write_path(path)?;
        self.header.size += 1;
        self.store_header()
    }

    /// Child to descend into: the closest routing object whose ball already
    /// holds `object`, else the one needing the least radius increase.
    fn choose_subtree(&self, node: &MTreeNode, object: &O) -> SpatialResult<(usize, f64)> {
        let mut best: Option<(usize, f64, bool, f64)> = None;
        for (i, entry) in node.entries.iter().enumerate() {
            let d = self.dist_to(entry.id, object)?;
            let inside = d <= entry.covering_radius;
            let key = if inside { d } else { d - entry.covering_radius };
            let better = match best {
                None => true,
                Some((_, _, best_inside, best_key)) => {
                    (inside && !best_inside) || (inside == best_inside && key < best_key)
                }
            };
            if better {
                best = Some((i, d, inside, key));
            }
        }
        best.map(|(i, d, _, _)| (i, d))
            .ok_or_else(|| SpatialError::InvariantViolation("empty directory node".into()))
    }

    /// Writes the nodes of `path` bottom-up, splitting overfull ones.
    fn write_path(&mut self, mut path: Path) -> SpatialResult<()> {
        while let Some((page, node, _)) = path.pop() {
            if !node.is_overfull(self.capacity_of(&node)) {
                self.write_node(page, node)?;
                continue;
            }

            let split = self.split(node)?;
            self.stats.count_split();
            let new_page = self.file.allocate_page()?;
            log::trace!(
                "split M-tree page {} into {} + {} entries (new page {})",
                page,
                split.first.len(),
                split.second.len(),
                new_page
            );
            self.write_node(page, split.first)?;
            self.write_node(new_page, split.second)?;

            match path.last_mut() {
                None => {
                    let root = self.file.allocate_page()?;
                    let mut node = MTreeNode::new(false);
                    node.entries.push(MTreeEntry::routing(split.first_id, 0.0, split.first_radius, page));
                    node.entries.push(MTreeEntry::routing(split.second_id, 0.0, split.second_radius, new_page));
                    self.write_node(root, node)?;
                    self.header.root = root;
                    self.header.height += 1;
                    log::debug!("M-tree root split, height is now {}", self.header.height);
                }
                Some((_, parent, parent_routing)) => {
                    let index = parent.child_index(page).ok_or_else(|| {
                        SpatialError::InvariantViolation(format!("page {} missing from its parent", page))
                    })?;
                    let (first_pd, second_pd) = match *parent_routing {
                        Some(r) => {
                            let r = self.object(r)?;
                            (
                                self.dist_to(split.first_id, r.as_ref())?,
                                self.dist_to(split.second_id, r.as_ref())?,
                            )
                        }
                        None => (0.0, 0.0),
                    };
                    parent.entries[index] =
                        MTreeEntry::routing(split.first_id, first_pd, split.first_radius, page);
                    parent
                        .entries
                        .push(MTreeEntry::routing(split.second_id, second_pd, split.second_radius, new_page));
                }
            }
        }
        Ok(())
    }

    fn split(&mut self, node: MTreeNode) -> SpatialResult<NodeSplit> {
        let objects = node
            .entries
            .iter()
            .map(|e| self.object(e.id))
            .collect::<SpatialResult<Vec<_>>>()?;
        let n = objects.len();
        let mut matrix = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = self.dist(objects[i].as_ref(), objects[j].as_ref());
                matrix[i][j] = d;
                matrix[j][i] = d;
            }
        }
        let covering_radii: Vec<f64> = node.entries.iter().map(|e| e.covering_radius).collect();
        let parent_distances: Vec<f64> = node.entries.iter().map(|e| e.parent_distance).collect();
        let input = SplitInput {
            matrix: &matrix,
            covering_radii: &covering_radii,
            parent_distances: &parent_distances,
        };
        let plan = plan_split(&input, self.config.promotion, self.config.distribution, &mut self.rng);

        let first_id = node.entries[plan.first].id;
        let second_id = node.entries[plan.second].id;
        let mut node = node;
        for (i, entry) in node.entries.iter_mut().enumerate() {
            let routing = if plan.mask[i] { plan.second } else { plan.first };
            entry.parent_distance = matrix[i][routing];
        }
        let (first, second) = node.split_by(&plan.mask);
        Ok(NodeSplit {
            first,
            second,
            first_id,
            second_id,
            first_radius: plan.first_radius,
            second_radius: plan.second_radius,
        })
    }

    // ------------------------------------------------------------------------
    // queries
    // ------------------------------------------------------------------------

    /// The `k` nearest objects to `query`, nearest first.
    pub fn knn(&self, query: &O, k: usize) -> SpatialResult<KnnList> {
        if k == 0 || self.is_empty() {
            return Ok(KnnList::empty(k));
        }
        let mut heap = KnnHeap::new(k);
        let mut queue: SearchQueue<(PageId, Option<f64>)> = SearchQueue::new();
        queue.push(0.0, (self.header.root, None));

        while let Some((bound, (page, to_routing))) = queue.pop() {
            if bound > heap.k_distance() {
                break;
            }
            let node = self.read_node(page)?;
            for entry in &node.entries {
                if let Some(dqr) = to_routing {
                    let pre = admissible_bound((dqr - entry.parent_distance).abs() - entry.covering_radius);
                    if pre > heap.k_distance() {
                        continue;
                    }
                }
                let d = self.dist_to(entry.id, query)?;
                match entry.child {
                    None => {
                        heap.insert(d, entry.id);
                    }
                    Some(child) => {
                        let lower = admissible_bound(d - entry.covering_radius);
                        if lower <= heap.k_distance() {
                            queue.push(lower, (child, Some(d)));
                        }
                    }
                }
            }
        }
        Ok(heap.into_knn_list())
    }

    /// All objects within `radius` of `query`.
    pub fn range(&self, query: &O, radius: f64) -> SpatialResult<DoubleDBIDList> {
        let mut result = DoubleDBIDList::new();
        if self.is_empty() || radius.is_nan() || radius < 0.0 {
            return Ok(result);
        }
        let mut stack: Vec<(PageId, Option<f64>)> = vec![(self.header.root, None)];
        while let Some((page, to_routing)) = stack.pop() {
            let node = self.read_node(page)?;
            for entry in &node.entries {
                if let Some(dqr) = to_routing {
                    let pre = admissible_bound((dqr - entry.parent_distance).abs() - entry.covering_radius);
                    if pre > radius {
                        continue;
                    }
                }
                let d = self.dist_to(entry.id, query)?;
                match entry.child {
                    None => {
                        if d <= radius {
                            result.push(d, entry.id);
                        }
                    }
                    Some(child) => {
                        if admissible_bound(d - entry.covering_radius) <= radius {
                            stack.push((child, Some(d)));
                        }
                    }
                }
            }
        }
        Ok(result)
    }

    /// Objects having `query` among their `k` nearest neighbours, sorted by
    /// distance.
    ///
    /// A subtree is skipped when `d(q, r) - r_cov` exceeds the largest
    /// k-distance stored below it; objects without a stored list are
    /// skipped.
    pub fn reverse_knn(
        &self,
        query: &O,
        k: usize,
        provider: &dyn KnnProvider,
    ) -> SpatialResult<DoubleDBIDList> {
        check_provider(provider, k)?;
        if k == 0 || self.is_empty() {
            return Ok(DoubleDBIDList::new());
        }
        let bounds = self.k_distance_bounds(k, provider)?;
        self.reverse_knn_bounded(query, &bounds, provider)
    }

    /// Reverse kNN against bounds collected earlier with
    /// [`MTree::k_distance_bounds`].
    pub fn reverse_knn_bounded(
        &self,
        query: &O,
        bounds: &KDistanceBounds,
        provider: &dyn KnnProvider,
    ) -> SpatialResult<DoubleDBIDList> {
        let k = bounds.k();
        check_provider(provider, k)?;
        let mut result = DoubleDBIDList::new();
        if k == 0 || self.is_empty() {
            return Ok(result);
        }
        let mut stack: Vec<(PageId, Option<f64>)> = Vec::new();
        if may_contain(0.0, bounds.bound(self.header.root)) {
            stack.push((self.header.root, None));
        }
        while let Some((page, to_routing)) = stack.pop() {
            let node = self.read_node(page)?;
            for entry in &node.entries {
                match entry.child {
                    None => {
                        let Some(k_distance) = provider.k_distance(entry.id, k) else {
                            continue;
                        };
                        if let Some(dqr) = to_routing {
                            if admissible_bound((dqr - entry.parent_distance).abs()) > k_distance {
                                continue;
                            }
                        }
                        let d = self.dist_to(entry.id, query)?;
                        if d <= k_distance {
                            result.push(d, entry.id);
                        }
                    }
                    Some(child) => {
                        let bound = bounds.bound(child);
                        if bound == f64::NEG_INFINITY {
                            continue;
                        }
                        if let Some(dqr) = to_routing {
                            let pre = admissible_bound(
                                (dqr - entry.parent_distance).abs() - entry.covering_radius,
                            );
                            if !may_contain(pre, bound) {
                                continue;
                            }
                        }
                        let d = self.dist_to(entry.id, query)?;
                        if may_contain(admissible_bound(d - entry.covering_radius), bound) {
                            stack.push((child, Some(d)));
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
        let node = self.read_node(page)?;
        let mut max = f64::NEG_INFINITY;
        for entry in &node.entries {
            max = match entry.child {
                None => fold_k_distance(max, provider, entry.id, k),
                Some(child) => max.max(self.collect_k_distances(child, k, provider, bounds)?),
            };
        }
        bounds.record(page, max);
        Ok(max)
    }

    fn for_each_leaf(
        &self,
        mut f: impl FnMut(PageId, &[MTreeEntry]) -> SpatialResult<()>,
    ) -> SpatialResult<()> {
        if !self.is_initialized() {
            return Ok(());
        }
        let mut stack = vec![self.header.root];
        while let Some(page) = stack.pop() {
            let node = self.read_node(page)?;
            if node.leaf {
                f(page, &node.entries)?;
            } else {
                stack.extend(node.entries.iter().rev().filter_map(|e| e.child));
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
        let mut stack = vec![(self.header.root, self.header.height - 1)];
        while let Some((page, level)) = stack.pop() {
            let node = self.read_node(page)?;
            let children = node.entries.iter().rev().filter_map(|e| e.child);
            if level > 1 {
                stack.extend(children.map(|c| (c, level - 1)));
                continue;
            }
            let mut ids = Vec::new();
            for child in children {
                ids.extend(self.read_node(child)?.entries.iter().map(|e| e.id));
            }
            partitions.push(ids);
        }
        Ok(partitions)
    }

    // ------------------------------------------------------------------------
    // integrity
    // ------------------------------------------------------------------------

    /// Checks parent distances, covering radii (against every object below
    /// each routing object), capacities, leaf depth and the object count.
    pub fn check_integrity(&self) -> SpatialResult<IntegrityReport> {
        let mut report = IntegrityReport::new();
        if !self.is_initialized() {
            return Ok(report);
        }
        self.check_subtree(self.header.root, self.header.height - 1, None, &mut report)?;
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
            log::error!("M-tree integrity check failed: {}", report);
        }
        Ok(report)
    }

    /// Returns the ids of all objects below `page`.
    fn check_subtree(
        &self,
        page: PageId,
        level: usize,
        routing: Option<DBID>,
        report: &mut IntegrityReport,
    ) -> SpatialResult<Vec<DBID>> {
        let node = self.read_node(page)?;
        report.nodes_checked += 1;

        if node.leaf != (level == 0) {
            report.violation(page, format!("node kind does not match level {}", level));
        }
        let capacity = self.capacity_of(&node);
        if node.len() > capacity {
            report.violation(page, format!("{} entries exceed capacity {}", node.len(), capacity));
        }

        let routing_object = routing.map(|r| self.object(r)).transpose()?;
        let mut ids = Vec::new();
        for entry in &node.entries {
            if let Some(r) = &routing_object {
                let d = self.dist_to(entry.id, r.as_ref())?;
                if (d - entry.parent_distance).abs() > RADIUS_EPSILON * d.max(1.0) {
                    report.violation(
                        page,
                        format!(
                            "entry {} stores parent distance {}, actual {}",
                            entry.id, entry.parent_distance, d
                        ),
                    );
                }
            }
            match entry.child {
                None => {
                    report.entries_found += 1;
                    ids.push(entry.id);
                }
                Some(child) => {
                    if level == 0 {
                        report.violation(page, "leaf entry with a child page");
                        continue;
                    }
                    let below = self.check_subtree(child, level - 1, Some(entry.id), report)?;
                    let center = self.object(entry.id)?;
                    for id in &below {
                        let d = self.dist_to(*id, center.as_ref())?;
                        if d > entry.covering_radius + RADIUS_EPSILON * d.max(1.0) {
                            report.violation(
                                child,
                                format!(
                                    "object {} at distance {} outside covering radius {} of {}",
                                    id, d, entry.covering_radius, entry.id
                                ),
                            );
                        }
                    }
                    ids.extend(below);
                }
            }
        }
        Ok(ids)
    }
}

struct NodeSplit {
    first: MTreeNode,
    second: MTreeNode,
    first_id: DBID,
    second_id: DBID,
    first_radius: f64,
    second_radius: f64,
}

impl<O, F> KnnIndex<O> for MTree<O, F>
where
    O: ?Sized + Send + Sync + 'static,
    F: PageFile<MTreeNode>,
{
    fn name(&self) -> &str {
        "MTree"
    }

    fn supports(&self, distance: &dyn PrimitiveDistance<O>) -> bool {
        distance.name() == self.distance.name()
    }

    fn knn(&self, distance: &dyn PrimitiveDistance<O>, query: &O, k: usize) -> ArborResult<KnnList> {
        self.require(distance)?;
        Ok(MTree::knn(self, query, k)?)
    }

    fn range(&self, distance: &dyn PrimitiveDistance<O>, query: &O, radius: f64) -> ArborResult<DoubleDBIDList> {
        self.require(distance)?;
        Ok(MTree::range(self, query, radius)?)
    }

    fn reverse_knn(
        &self,
        distance: &dyn PrimitiveDistance<O>,
        query: &O,
        k: usize,
        provider: &dyn KnnProvider,
    ) -> ArborResult<DoubleDBIDList> {
        self.require(distance)?;
        Ok(MTree::reverse_knn(self, query, k, provider)?)
    }
}

impl<O, F> MTree<O, F>
where
    O: ?Sized + Send + Sync + 'static,
    F: PageFile<MTreeNode>,
{
    fn require(&self, distance: &dyn PrimitiveDistance<O>) -> ArborResult<()> {
        if KnnIndex::supports(self, distance) {
            return Ok(());
        }
        Err(ArborError::new(
            &format!(
                "M-tree was built for {}, cannot answer queries under {}",
                self.distance.name(),
                distance.name()
            ),
            ErrorKind::Configuration,
        ))
    }
}

impl<O, F> DynamicIndex<O> for MTree<O, F>
where
    O: ?Sized + Send + Sync + 'static,
    F: PageFile<MTreeNode>,
{
    fn insert(&mut self, id: DBID, object: &O) -> SpatialResult<()> {
        self.insert_object(id, object)
    }

    fn delete(&mut self, id: DBID, _object: &O) -> SpatialResult<bool> {
        Err(SpatialError::Unsupported(format!(
            "M-tree does not support deletion (object {})",
            id
        )))
    }

    fn size(&self) -> usize {
        MTree::size(self)
    }
}

impl<O, F> PartitionedIndex for MTree<O, F>
where
    O: ?Sized + Send + Sync + 'static,
    F: PageFile<MTreeNode>,
{
    fn partitions(&self, scope: ApproximationScope) -> SpatialResult<Vec<Vec<DBID>>> {
        MTree::partitions(self, scope)
    }
}

#[cfg(test)]
mod tests;
