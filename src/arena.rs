use bytemuck::{Pod, Zeroable};

/// A bump allocator over one pre-sized contiguous block of fixed-size slots.
///
/// Slots are handed out in order and addressed by their ordinal, so the whole
/// block can be moved or copied without patching references. There is no
/// per-slot deallocation; [`Arena::clear`] releases everything at once.
///
/// The arena is not synchronized. Concurrent builders need one arena each.
#[derive(Clone, Debug)]
pub struct Arena<T> {
    slots: Vec<T>,
    capacity: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Arena { slots: Vec::new(), capacity: 0 }
    }
}

impl<T: Pod> Arena<T> {
    /// Reserves a block of exactly `capacity` slots.
    pub fn with_capacity(capacity: usize) -> Self {
        Arena {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Hands out the next zeroed slot together with its ordinal.
    ///
    /// # Panics
    ///
    /// Panics when the arena is full. The capacity is computed up front from
    /// the point count, so running out is a sizing bug and nothing built so
    /// far can be trusted.
    pub fn allocate(&mut self) -> (u32, &mut T) {
        let ordinal = self.slots.len();
        if ordinal >= self.capacity {
            panic!(
                "arena capacity exhausted: {} of {} slots in use",
                ordinal, self.capacity
            );
        }
        self.slots.push(T::zeroed());
        (ordinal as u32, &mut self.slots[ordinal])
    }

    /// Allocates a slot initialised to `value` and returns its ordinal.
    pub fn push(&mut self, value: T) -> u32 {
        let (ordinal, slot) = self.allocate();
        *slot = value;
        ordinal
    }

    #[inline]
    pub fn get(&self, ordinal: u32) -> Option<&T> {
        self.slots.get(ordinal as usize)
    }

    #[inline]
    pub fn get_mut(&mut self, ordinal: u32) -> Option<&mut T> {
        self.slots.get_mut(ordinal as usize)
    }

    /// Releases the block and resets the bookkeeping to an empty arena.
    pub fn clear(&mut self) {
        self.slots = Vec::new();
        self.capacity = 0;
    }

    /// Whether a block is currently held.
    pub fn is_allocated(&self) -> bool {
        self.capacity > 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used(&self) -> usize {
        self.slots.len()
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.slots.len()
    }

    pub fn slot_size(&self) -> usize {
        std::mem::size_of::<T>()
    }

    pub fn used_bytes(&self) -> usize {
        self.used() * self.slot_size()
    }

    pub fn remaining_bytes(&self) -> usize {
        self.remaining() * self.slot_size()
    }

    /// The allocated slots in ordinal order.
    pub fn as_slice(&self) -> &[T] {
        &self.slots
    }

    /// The allocated slots as one packed byte buffer.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_are_sequential() {
        let mut arena: Arena<u64> = Arena::with_capacity(4);
        let (a, slot) = arena.allocate();
        assert_eq!(*slot, 0);
        *slot = 11;
        let b = arena.push(22);
        assert_eq!((a, b), (0, 1));
        assert_eq!(arena.get(0), Some(&11));
        assert_eq!(arena.get(1), Some(&22));
        assert_eq!(arena.used(), 2);
        assert_eq!(arena.remaining(), 2);
        assert_eq!(arena.used_bytes(), 16);
        assert_eq!(arena.remaining_bytes(), 16);
        assert_eq!(arena.as_bytes().len(), 16);
    }

    #[test]
    fn test_block_never_reallocates() {
        let mut arena: Arena<u32> = Arena::with_capacity(64);
        arena.push(1);
        let base = arena.as_slice().as_ptr();
        for i in 0..63 {
            arena.push(i);
        }
        assert_eq!(arena.as_slice().as_ptr(), base);
        assert_eq!(arena.remaining(), 0);
    }

    #[test]
    #[should_panic(expected = "arena capacity exhausted")]
    fn test_exhaustion_panics() {
        let mut arena: Arena<u32> = Arena::with_capacity(2);
        arena.push(1);
        arena.push(2);
        arena.push(3);
    }

    #[test]
    fn test_clear_releases_block() {
        let mut arena: Arena<u32> = Arena::with_capacity(8);
        arena.push(5);
        assert!(arena.is_allocated());
        arena.clear();
        assert!(!arena.is_allocated());
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.capacity(), 0);
        assert!(arena.get(0).is_none());
    }
}
