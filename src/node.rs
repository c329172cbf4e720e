use bytemuck::{Pod, Zeroable};

/// Child reference marking a leaf. Ordinal 0 is a real node, so the sentinel
/// lives at the other end of the range.
pub const NO_CHILD: u32 = u32::MAX;

/// One k-d tree node as it is laid out in the arena and on the device.
///
/// Internal nodes store the split dimension in `divfeat` and the threshold in
/// `divval`. Leaves store the point index in `divfeat` and have both children
/// set to [`NO_CHILD`]. Children are arena ordinals, never pointers, so the
/// packed block can be copied to another address space as is.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct KdNode {
    pub divval: f64,
    pub divfeat: u32,
    pub child1: u32,
    pub child2: u32,
    _pad: u32,
}

impl KdNode {
    pub fn leaf(point: u32) -> Self {
        KdNode {
            divval: 0.0,
            divfeat: point,
            child1: NO_CHILD,
            child2: NO_CHILD,
            _pad: 0,
        }
    }

    /// An internal node whose children are filled in once they are built.
    pub fn internal(dim: u32, value: f64) -> Self {
        KdNode {
            divval: value,
            divfeat: dim,
            child1: NO_CHILD,
            child2: NO_CHILD,
            _pad: 0,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.child1 == NO_CHILD && self.child2 == NO_CHILD
    }

    /// Point index of a leaf.
    #[inline]
    pub fn point(&self) -> Option<u32> {
        self.is_leaf().then_some(self.divfeat)
    }

    #[inline]
    pub fn split_dim(&self) -> Option<usize> {
        (!self.is_leaf()).then_some(self.divfeat as usize)
    }

    #[inline]
    pub fn split_value(&self) -> Option<f64> {
        (!self.is_leaf()).then_some(self.divval)
    }

    #[inline]
    pub fn children(&self) -> Option<(u32, u32)> {
        (!self.is_leaf()).then_some((self.child1, self.child2))
    }
}
