use rand::Rng;

use crate::arena::Arena;
use crate::matrix::PointMatrix;
use crate::node::KdNode;
use crate::split::{SplitScratch, mean_split};

/// Recursively subdivides an index list into a randomized k-d tree whose
/// nodes live in a shared arena.
pub struct TreeBuilder<'a, 'p, T, R: ?Sized> {
    points: &'a PointMatrix<'p, T>,
    arena: &'a mut Arena<KdNode>,
    scratch: &'a mut SplitScratch,
    rng: &'a mut R,
}

impl<'a, 'p, T, R> TreeBuilder<'a, 'p, T, R>
where
    T: Copy + Into<f64>,
    R: Rng + ?Sized,
{
    pub fn new(
        points: &'a PointMatrix<'p, T>,
        arena: &'a mut Arena<KdNode>,
        scratch: &'a mut SplitScratch,
        rng: &'a mut R,
    ) -> Self {
        assert_eq!(
            scratch.dim(),
            points.cols(),
            "split scratch holds {} dimensions, points have {}",
            scratch.dim(),
            points.cols()
        );
        TreeBuilder { points, arena, scratch, rng }
    }

    /// Builds the subtree over `ind` and returns the ordinal of its root.
    ///
    /// Nodes are allocated in pre-order: a node always precedes its children,
    /// and the left subtree precedes the right one.
    ///
    /// # Panics
    ///
    /// Panics if `ind` is empty or the arena runs out of slots.
    pub fn divide_tree(&mut self, ind: &mut [u32]) -> u32 {
        assert!(!ind.is_empty(), "cannot build a tree over no points");

        if ind.len() == 1 {
            return self.arena.push(KdNode::leaf(ind[0]));
        }

        let split = mean_split(self.points, ind, &mut *self.scratch, &mut *self.rng);
        let ordinal = self.arena.push(KdNode::internal(split.dim as u32, split.value));

        let (left, right) = ind.split_at_mut(split.index);
        let child1 = self.divide_tree(left);
        let child2 = self.divide_tree(right);

        if let Some(node) = self.arena.get_mut(ordinal) {
            node.child1 = child1;
            node.child2 = child2;
        }
        ordinal
    }
}
