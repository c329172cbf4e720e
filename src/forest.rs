use log::{debug, trace};
use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::arena::Arena;
use crate::error::ForestError;
use crate::matrix::PointMatrix;
use crate::node::{KdNode, NO_CHILD};
use crate::params::IndexParams;
use crate::split::SplitScratch;
use crate::tree::TreeBuilder;

/// Number of arena slots reserved for a forest: one over-provisioned complete
/// binary tree, `2^(ceil(log2(count)) + 1)` slots, per tree.
///
/// A tree over `count` points has exactly `2 * count - 1` nodes, which always
/// fits. Returns `None` when the slot count does not fit in a `usize`.
pub fn forest_capacity(count: usize, trees: usize) -> Option<usize> {
    count
        .max(1)
        .checked_next_power_of_two()?
        .checked_mul(2)?
        .checked_mul(trees)
}

/// Summary numbers of a built forest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForestStats {
    pub trees: usize,
    pub nodes: usize,
    pub capacity: usize,
    pub max_depth: usize,
    pub used_bytes: usize,
}

/// A forest of randomized k-d trees packed into one arena.
///
/// Every tree is identified by the ordinal of its root node. The arena and the
/// root list together are everything a search kernel needs besides the points.
#[derive(Clone, Debug)]
pub struct KdForest {
    arena: Arena<KdNode>,
    roots: Vec<u32>,
    point_count: usize,
    dim: usize,
}

impl KdForest {
    /// Builds `params.trees` trees sequentially, seeded from `params.seed`.
    pub fn build<T>(points: &PointMatrix<'_, T>, params: &IndexParams) -> Result<Self, ForestError>
    where
        T: Copy + Into<f64>,
    {
        params.validate()?;
        let mut rng = StdRng::seed_from_u64(params.seed.unwrap_or_else(get_seed));
        Self::build_with_rng(points, params.trees, &mut rng)
    }

    /// Builds `trees` trees sequentially, drawing all randomness from `rng`.
    pub fn build_with_rng<T, R>(points: &PointMatrix<'_, T>, trees: usize, rng: &mut R) -> Result<Self, ForestError>
    where
        T: Copy + Into<f64>,
        R: Rng + ?Sized,
    {
        let capacity = check_shape(points, trees)?;
        let count = points.rows();

        debug!(
            "building {} tree(s) over {} points of dim {}: {} slots",
            trees, count, points.cols(), capacity
        );

        let mut arena = Arena::with_capacity(capacity);
        let mut scratch = SplitScratch::new(points.cols());
        let mut ind: Vec<u32> = Vec::with_capacity(count);
        let mut roots = Vec::with_capacity(trees);

        for tree in 0..trees {
            // Fresh permutation per tree so the sampled means are unbiased.
            ind.clear();
            ind.extend(0..count as u32);
            ind.shuffle(&mut *rng);

            let before = arena.used();
            let root = TreeBuilder::new(points, &mut arena, &mut scratch, &mut *rng).divide_tree(&mut ind);
            trace!("tree {}: root {} with {} nodes", tree, root, arena.used() - before);
            roots.push(root);
        }

        debug!("forest built: {} of {} slots used", arena.used(), arena.capacity());

        Ok(KdForest {
            arena,
            roots,
            point_count: count,
            dim: points.cols(),
        })
    }

    /// Builds the trees in parallel, one private arena per tree, then merges
    /// them into a single arena with rebased child ordinals.
    ///
    /// The result satisfies the same layout contract as [`KdForest::build`]
    /// but draws a different random sequence for the same seed.
    pub fn build_parallel<T>(points: &PointMatrix<'_, T>, params: &IndexParams) -> Result<Self, ForestError>
    where
        T: Copy + Into<f64> + Sync,
    {
        params.validate()?;
        let trees = params.trees;
        let capacity = check_shape(points, trees)?;
        let count = points.rows();
        let tree_capacity = capacity / trees;

        let mut rng = StdRng::seed_from_u64(params.seed.unwrap_or_else(get_seed));
        let seeds: Vec<u64> = (0..trees).map(|_| rng.r#gen()).collect();

        debug!(
            "building {} tree(s) in parallel over {} points of dim {}: {} slots",
            trees, count, points.cols(), capacity
        );

        let built: Vec<(Arena<KdNode>, u32)> = seeds
            .par_iter()
            .map(|&seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut ind: Vec<u32> = (0..count as u32).collect();
                ind.shuffle(&mut rng);

                let mut arena = Arena::with_capacity(tree_capacity);
                let mut scratch = SplitScratch::new(points.cols());
                let root = TreeBuilder::new(points, &mut arena, &mut scratch, &mut rng).divide_tree(&mut ind);
                (arena, root)
            })
            .collect();

        let mut arena = Arena::with_capacity(capacity);
        let mut roots = Vec::with_capacity(trees);
        for (tree_arena, root) in built {
            let offset = arena.used() as u32;
            for node in tree_arena.as_slice() {
                let mut node = *node;
                if !node.is_leaf() {
                    node.child1 += offset;
                    node.child2 += offset;
                }
                arena.push(node);
            }
            roots.push(root + offset);
        }

        debug!("forest merged: {} of {} slots used", arena.used(), arena.capacity());

        Ok(KdForest {
            arena,
            roots,
            point_count: count,
            dim: points.cols(),
        })
    }

    pub fn tree_count(&self) -> usize {
        self.roots.len()
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn node_count(&self) -> usize {
        self.arena.used()
    }

    pub fn arena(&self) -> &Arena<KdNode> {
        &self.arena
    }

    /// All nodes of all trees, in ordinal order.
    pub fn nodes(&self) -> &[KdNode] {
        self.arena.as_slice()
    }

    /// Root ordinals in tree-construction order.
    pub fn roots(&self) -> &[u32] {
        &self.roots
    }

    pub fn root(&self, tree: usize) -> Option<u32> {
        self.roots.get(tree).copied()
    }

    pub fn node(&self, ordinal: u32) -> Option<&KdNode> {
        self.arena.get(ordinal)
    }

    /// Point indices of a tree's leaves, left to right.
    pub fn leaves(&self, tree: usize) -> Vec<u32> {
        let mut out = Vec::new();
        let Some(root) = self.root(tree) else {
            return out;
        };
        let mut stack = vec![root];
        while let Some(ordinal) = stack.pop() {
            let Some(node) = self.arena.get(ordinal) else { continue };
            match node.children() {
                Some((left, right)) => {
                    stack.push(right);
                    stack.push(left);
                }
                None => out.push(node.divfeat),
            }
        }
        out
    }

    /// Number of edges on the longest root-to-leaf path of a tree.
    pub fn depth(&self, tree: usize) -> usize {
        let Some(root) = self.root(tree) else {
            return 0;
        };
        let mut max_depth = 0;
        let mut stack = vec![(root, 0usize)];
        while let Some((ordinal, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let Some((left, right)) = self.arena.get(ordinal).and_then(|n| n.children()) {
                stack.push((left, depth + 1));
                stack.push((right, depth + 1));
            }
        }
        max_depth
    }

    pub fn stats(&self) -> ForestStats {
        ForestStats {
            trees: self.tree_count(),
            nodes: self.node_count(),
            capacity: self.arena.capacity(),
            max_depth: (0..self.tree_count()).map(|t| self.depth(t)).max().unwrap_or(0),
            used_bytes: self.arena.used_bytes(),
        }
    }

    /// Splits the forest into its arena and root list.
    pub fn into_parts(self) -> (Arena<KdNode>, Vec<u32>) {
        (self.arena, self.roots)
    }
}

fn check_shape<T: Copy + Into<f64>>(points: &PointMatrix<'_, T>, trees: usize) -> Result<usize, ForestError> {
    if points.is_empty() {
        return Err(ForestError::EmptyDataset { rows: points.rows(), cols: points.cols() });
    }
    if trees == 0 {
        return Err(ForestError::InvalidParams("trees must be at least 1".into()));
    }
    // Ordinals and point ids are u32 and NO_CHILD must stay out of range.
    match forest_capacity(points.rows(), trees) {
        Some(capacity) if capacity < NO_CHILD as usize => Ok(capacity),
        _ => Err(ForestError::InvalidParams(format!(
            "{} trees over {} points exceed the addressable arena",
            trees,
            points.rows()
        ))),
    }
}

pub(crate) fn get_seed() -> u64 {
    #[cfg(target_arch = "wasm32")]
    {
        (js_sys::Math::random() * 4294967296.0) as u64
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        rand::random()
    }
}
