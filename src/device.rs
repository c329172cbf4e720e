use std::cmp::Ordering;
use std::collections::BinaryHeap;

use log::{debug, trace};
use rayon::prelude::*;

use crate::distance::Distance;
use crate::error::ForestError;
use crate::forest::KdForest;
use crate::matrix::PointMatrix;
use crate::node::{KdNode, NO_CHILD};
use crate::params::SearchParams;

/// Index value reported for result slots that found no point.
pub const NO_NEIGHBOR: usize = usize::MAX;

/// A memory space that holds the packed forest and answers queries against it.
///
/// Uploads copy the given buffers verbatim. Node buffers are ordinal addressed,
/// so nothing is translated on the way: ordinal `i` on the host is ordinal `i`
/// on the device.
pub trait Device {
    /// Copies the row-major point set.
    fn upload_dataset(&mut self, data: &[f64], rows: usize, cols: usize) -> Result<(), ForestError>;

    /// Copies the packed node buffer; `stride` is the size of one record.
    fn upload_nodes(&mut self, bytes: &[u8], stride: usize) -> Result<(), ForestError>;

    /// Copies the root ordinals, one per tree.
    fn upload_roots(&mut self, roots: &[u32]) -> Result<(), ForestError>;

    /// Frees every device buffer. Must be safe to call on an empty device.
    fn release(&mut self);

    /// Whether dataset, nodes and roots are all resident.
    fn is_resident(&self) -> bool;

    /// Answers `knn` nearest-neighbor queries for a row-major query block.
    fn knn_search(
        &self,
        queries: &[f64],
        knn: usize,
        distance: Distance,
        params: &SearchParams,
    ) -> Result<KnnResult, ForestError>;
}

/// Row-major neighbor lists, `knn` entries per query, nearest first.
#[derive(Clone, Debug, PartialEq)]
pub struct KnnResult {
    pub knn: usize,
    pub indices: Vec<usize>,
    pub dists: Vec<f64>,
}

impl KnnResult {
    pub fn rows(&self) -> usize {
        if self.knn == 0 { 0 } else { self.indices.len() / self.knn }
    }

    pub fn row(&self, query: usize) -> (&[usize], &[f64]) {
        let range = query * self.knn..(query + 1) * self.knn;
        (&self.indices[range.clone()], &self.dists[range])
    }
}

/// A validated, read-only view of a built forest ready to be transferred.
///
/// Construction checks that every root and child ordinal addresses a node of
/// the same arena, that every split dimension is below `dim`, that every leaf
/// holds an existing point and that each tree is a proper tree: no node is
/// reachable twice, from the same root or from different ones. A device kernel
/// can then follow ordinals without bounds checks and always reaches a leaf.
#[derive(Clone, Copy, Debug)]
pub struct DeviceForest<'a> {
    nodes: &'a [KdNode],
    roots: &'a [u32],
    point_count: usize,
    dim: usize,
}

impl<'a> DeviceForest<'a> {
    pub fn from_forest(forest: &'a KdForest) -> Result<Self, ForestError> {
        Self::new(forest.nodes(), forest.roots(), forest.point_count(), forest.dim())
    }

    pub fn new(nodes: &'a [KdNode], roots: &'a [u32], point_count: usize, dim: usize) -> Result<Self, ForestError> {
        validate(nodes, roots, point_count, dim)?;
        Ok(DeviceForest { nodes, roots, point_count, dim })
    }

    pub fn nodes(&self) -> &'a [KdNode] {
        self.nodes
    }

    /// The node records as one contiguous byte buffer.
    pub fn node_bytes(&self) -> &'a [u8] {
        bytemuck::cast_slice(self.nodes)
    }

    pub fn stride(&self) -> usize {
        std::mem::size_of::<KdNode>()
    }

    pub fn roots(&self) -> &'a [u32] {
        self.roots
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Copies points, nodes and roots to `device`.
    ///
    /// Either everything becomes resident or the device is released again and
    /// the error is returned; a failed transfer is not retried.
    pub fn transfer<T, D>(&self, points: &PointMatrix<'_, T>, device: &mut D) -> Result<(), ForestError>
    where
        T: Copy + Into<f64>,
        D: Device + ?Sized,
    {
        if points.rows() != self.point_count {
            return Err(ForestError::DimensionMismatch {
                expected: self.point_count,
                actual: points.rows(),
            });
        }
        if points.cols() != self.dim {
            return Err(ForestError::DimensionMismatch {
                expected: self.dim,
                actual: points.cols(),
            });
        }

        let result = device
            .upload_dataset(&points.to_f64_vec(), points.rows(), points.cols())
            .and_then(|_| device.upload_nodes(self.node_bytes(), self.stride()))
            .and_then(|_| device.upload_roots(self.roots));

        if let Err(e) = result {
            device.release();
            return Err(e);
        }
        debug!(
            "transferred {} nodes ({} bytes) and {} roots",
            self.nodes.len(),
            self.node_bytes().len(),
            self.roots.len()
        );
        Ok(())
    }
}

fn validate(nodes: &[KdNode], roots: &[u32], point_count: usize, dim: usize) -> Result<(), ForestError> {
    if roots.is_empty() {
        return Err(ForestError::InvalidSnapshot("no trees".into()));
    }
    let len = nodes.len();
    if let Some(&root) = roots.iter().find(|&&r| r as usize >= len) {
        return Err(ForestError::InvalidSnapshot(format!("root {} out of {} nodes", root, len)));
    }
    for (ordinal, node) in nodes.iter().enumerate() {
        if node.is_leaf() {
            if node.divfeat as usize >= point_count {
                return Err(ForestError::InvalidSnapshot(format!(
                    "leaf {} holds point {} of {}",
                    ordinal, node.divfeat, point_count
                )));
            }
        } else if node.child1 == NO_CHILD
            || node.child2 == NO_CHILD
            || node.child1 as usize >= len
            || node.child2 as usize >= len
        {
            return Err(ForestError::InvalidSnapshot(format!(
                "node {} has children ({}, {}) out of {} nodes",
                ordinal, node.child1, node.child2, len
            )));
        } else if node.divfeat as usize >= dim {
            return Err(ForestError::InvalidSnapshot(format!(
                "node {} splits on dimension {} of {}",
                ordinal, node.divfeat, dim
            )));
        }
    }

    // Every ordinal is in range, so a walk that never revisits a node ends
    // at leaves on every path.
    let mut visited = vec![false; len];
    let mut stack = Vec::new();
    for (tree, &root) in roots.iter().enumerate() {
        stack.push(root);
        while let Some(ordinal) = stack.pop() {
            let seen = &mut visited[ordinal as usize];
            if *seen {
                return Err(ForestError::InvalidSnapshot(format!(
                    "node {} reached twice while walking tree {}",
                    ordinal, tree
                )));
            }
            *seen = true;
            if let Some((child1, child2)) = nodes[ordinal as usize].children() {
                stack.push(child2);
                stack.push(child1);
            }
        }
    }
    Ok(())
}

/// A device emulated in host memory.
///
/// Buffers are private byte-for-byte copies of what was uploaded. The search
/// kernel runs a best-bin-first descent over all trees, one query per rayon
/// task, mirroring how a massively parallel kernel assigns one query per
/// thread.
#[derive(Clone, Debug, Default)]
pub struct EmulatedDevice {
    dataset: Vec<f64>,
    rows: usize,
    cols: usize,
    nodes: Vec<KdNode>,
    roots: Vec<u32>,
    memory_limit: Option<usize>,
}

impl EmulatedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device that refuses uploads once `bytes` would be exceeded.
    pub fn with_memory_limit(bytes: usize) -> Self {
        EmulatedDevice {
            memory_limit: Some(bytes),
            ..Default::default()
        }
    }

    pub fn nodes(&self) -> &[KdNode] {
        &self.nodes
    }

    pub fn roots(&self) -> &[u32] {
        &self.roots
    }

    pub fn dataset(&self) -> &[f64] {
        &self.dataset
    }

    /// Bytes currently held in device buffers.
    pub fn used_memory(&self) -> usize {
        self.dataset.len() * std::mem::size_of::<f64>()
            + self.nodes.len() * std::mem::size_of::<KdNode>()
            + self.roots.len() * std::mem::size_of::<u32>()
    }

    fn reserve(&self, bytes: usize) -> Result<(), ForestError> {
        match self.memory_limit {
            Some(limit) if self.used_memory() + bytes > limit => Err(ForestError::Transfer(format!(
                "out of device memory: {} + {} bytes exceeds {}",
                self.used_memory(),
                bytes,
                limit
            ))),
            _ => Ok(()),
        }
    }

    fn search_one(&self, query: &[f64], knn: usize, distance: Distance, params: &SearchParams) -> Vec<(f64, usize)> {
        let mut search = Search {
            device: self,
            query,
            distance,
            eps_factor: 1.0 + params.eps,
            results: KnnHeap::new(knn, self.rows),
            branches: BinaryHeap::new(),
            checked: vec![false; self.rows],
            checks: 0,
            max_checks: params.checks,
        };

        for &root in &self.roots {
            search.descend(root, 0.0);
        }
        while let Some(branch) = search.branches.pop() {
            if search.checks >= search.max_checks && search.results.is_full() {
                break;
            }
            search.descend(branch.node, branch.mindist);
        }
        search.results.into_sorted()
    }
}

impl Device for EmulatedDevice {
    fn upload_dataset(&mut self, data: &[f64], rows: usize, cols: usize) -> Result<(), ForestError> {
        if data.len() != rows * cols {
            return Err(ForestError::DimensionMismatch { expected: rows * cols, actual: data.len() });
        }
        self.reserve(std::mem::size_of_val(data))?;
        self.dataset = data.to_vec();
        self.rows = rows;
        self.cols = cols;
        Ok(())
    }

    fn upload_nodes(&mut self, bytes: &[u8], stride: usize) -> Result<(), ForestError> {
        if stride != std::mem::size_of::<KdNode>() || bytes.len() % stride != 0 {
            return Err(ForestError::Transfer(format!(
                "node buffer of {} bytes does not match stride {}",
                bytes.len(),
                stride
            )));
        }
        self.reserve(bytes.len())?;
        let mut nodes = vec![KdNode::leaf(0); bytes.len() / stride];
        bytemuck::cast_slice_mut::<KdNode, u8>(&mut nodes).copy_from_slice(bytes);
        self.nodes = nodes;
        Ok(())
    }

    fn upload_roots(&mut self, roots: &[u32]) -> Result<(), ForestError> {
        self.reserve(std::mem::size_of_val(roots))?;
        self.roots = roots.to_vec();
        Ok(())
    }

    fn release(&mut self) {
        trace!("releasing {} device bytes", self.used_memory());
        self.dataset = Vec::new();
        self.nodes = Vec::new();
        self.roots = Vec::new();
        self.rows = 0;
        self.cols = 0;
    }

    fn is_resident(&self) -> bool {
        !self.dataset.is_empty() && !self.nodes.is_empty() && !self.roots.is_empty()
    }

    fn knn_search(
        &self,
        queries: &[f64],
        knn: usize,
        distance: Distance,
        params: &SearchParams,
    ) -> Result<KnnResult, ForestError> {
        if !self.is_resident() {
            return Err(ForestError::NotOnDevice);
        }
        if queries.len() % self.cols != 0 {
            return Err(ForestError::DimensionMismatch {
                expected: (queries.len() / self.cols + 1) * self.cols,
                actual: queries.len(),
            });
        }

        // Rows are padded to `knn`, so size the output before searching.
        let slots = (queries.len() / self.cols)
            .checked_mul(knn)
            .ok_or_else(|| ForestError::InvalidParams(format!("knn {} is too large for the result", knn)))?;
        let mut indices: Vec<usize> = Vec::new();
        let mut dists: Vec<f64> = Vec::new();
        indices
            .try_reserve_exact(slots)
            .and_then(|_| dists.try_reserve_exact(slots))
            .map_err(|e| ForestError::InvalidParams(format!("cannot hold {} result slots: {}", slots, e)))?;

        let rows: Vec<Vec<(f64, usize)>> = queries
            .par_chunks(self.cols)
            .map(|q| self.search_one(q, knn, distance, params))
            .collect();

        for row in rows {
            let found = row.len();
            for (d, i) in row {
                indices.push(i);
                dists.push(d);
            }
            for _ in found..knn {
                indices.push(NO_NEIGHBOR);
                dists.push(f64::INFINITY);
            }
        }
        Ok(KnnResult { knn, indices, dists })
    }
}

struct Search<'a> {
    device: &'a EmulatedDevice,
    query: &'a [f64],
    distance: Distance,
    eps_factor: f64,
    results: KnnHeap,
    branches: BinaryHeap<Branch>,
    checked: Vec<bool>,
    checks: usize,
    max_checks: usize,
}

impl Search<'_> {
    /// Follows the closer child down to a leaf, queueing the farther ones.
    fn descend(&mut self, mut ordinal: u32, mindist: f64) {
        if self.results.is_full() && mindist * self.eps_factor > self.results.worst() {
            return;
        }
        loop {
            let node = self.device.nodes[ordinal as usize];
            let Some((child1, child2)) = node.children() else {
                let point = node.divfeat as usize;
                if self.checked[point] {
                    return;
                }
                if self.checks >= self.max_checks && self.results.is_full() {
                    return;
                }
                self.checked[point] = true;
                self.checks += 1;
                let cols = self.device.cols;
                let row = &self.device.dataset[point * cols..(point + 1) * cols];
                self.results.add(self.distance.eval(self.query, row), point);
                return;
            };

            let diff = self.query[node.divfeat as usize] - node.divval;
            let (best, other) = if diff < 0.0 { (child1, child2) } else { (child2, child1) };

            // Each plane distance alone bounds the distance to the far side.
            let bound = mindist.max(self.distance.accum(diff));
            if !self.results.is_full() || bound * self.eps_factor < self.results.worst() {
                self.branches.push(Branch { mindist: bound, node: other });
            }
            ordinal = best;
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Branch {
    mindist: f64,
    node: u32,
}

impl PartialEq for Branch {
    fn eq(&self, other: &Self) -> bool {
        self.mindist == other.mindist
    }
}

impl Eq for Branch {}

impl PartialOrd for Branch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Branch {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for Min-Heap behavior
        other.mindist.partial_cmp(&self.mindist).unwrap_or(Ordering::Equal)
    }
}

/// The `k` closest candidates seen so far, sorted ascending by distance.
struct KnnHeap {
    k: usize,
    items: Vec<(f64, usize)>,
}

impl KnnHeap {
    /// A heap for `k` results over at most `points` distinct candidates.
    fn new(k: usize, points: usize) -> Self {
        KnnHeap { k, items: Vec::with_capacity(k.min(points) + 1) }
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.k
    }

    fn worst(&self) -> f64 {
        if self.is_full() {
            self.items.last().map_or(f64::INFINITY, |&(d, _)| d)
        } else {
            f64::INFINITY
        }
    }

    fn add(&mut self, dist: f64, index: usize) {
        if self.k == 0 || (self.is_full() && dist >= self.worst()) {
            return;
        }
        let pos = self.items.partition_point(|&(d, _)| d <= dist);
        self.items.insert(pos, (dist, index));
        self.items.truncate(self.k);
    }

    fn into_sorted(self) -> Vec<(f64, usize)> {
        self.items
    }
}
