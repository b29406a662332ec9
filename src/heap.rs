//! # Bounded Heap
//!
//! Fixed-capacity binary heap used as the scheduler's timer queue.
//!
//! Elements are small `Copy` records; ordering comes from a key-extraction
//! function and a [`HeapOrder`] chosen at construction. Storage is an
//! inline array of `N` slots: slots below `len()` are occupied, slots at or
//! beyond it are `None`. [`BoundedHeap::is_valid`] checks all of this plus
//! the heap property and is meant to be called from tests after every
//! mutation.
//!
//! | Operation      | Cost      |
//! |----------------|-----------|
//! | `insert`       | O(log n)  |
//! | `remove_head`  | O(log n)  |
//! | `head`         | O(1)      |
//! | `remove_where` | O(n)      |

/// Which end of the key range sits at the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapOrder {
    /// Smallest key first
    Min,
    /// Largest key first
    Max,
}

/// Fixed-capacity binary heap.
pub struct BoundedHeap<T: Copy, K: Ord, const N: usize> {
    slots: [Option<T>; N],
    size: usize,
    order: HeapOrder,
    key: fn(&T) -> K,
}

#[inline]
const fn parent(index: usize) -> usize {
    (index - 1) / 2
}

#[inline]
const fn left_child(index: usize) -> usize {
    index * 2 + 1
}

#[inline]
const fn right_child(index: usize) -> usize {
    index * 2 + 2
}

impl<T: Copy, K: Ord, const N: usize> BoundedHeap<T, K, N> {
    /// Create an empty heap ordered by `key` under `order`.
    pub const fn new(order: HeapOrder, key: fn(&T) -> K) -> Self {
        Self {
            slots: [None; N],
            size: 0,
            order,
            key,
        }
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Maximum number of elements.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.size == N
    }

    #[inline]
    pub fn order(&self) -> HeapOrder {
        self.order
    }

    /// Root element without removing it.
    #[inline]
    pub fn head(&self) -> Option<&T> {
        self.slots[0..self.size].first().and_then(Option::as_ref)
    }

    fn key_at(&self, index: usize) -> K {
        match &self.slots[index] {
            Some(item) => (self.key)(item),
            None => unreachable!("occupied heap slot {} is empty", index),
        }
    }

    /// True if the element at `a` strictly outranks the one at `b`.
    fn beats(&self, a: usize, b: usize) -> bool {
        let (ka, kb) = (self.key_at(a), self.key_at(b));
        match self.order {
            HeapOrder::Min => ka < kb,
            HeapOrder::Max => ka > kb,
        }
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let up = parent(index);
            if self.beats(up, index) {
                break;
            }
            self.slots.swap(up, index);
            index = up;
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        loop {
            let (left, right) = (left_child(index), right_child(index));
            let mut best = index;
            if left < self.size && self.beats(left, best) {
                best = left;
            }
            // ties stay with the left child
            if right < self.size && self.beats(right, best) {
                best = right;
            }
            if best == index {
                break;
            }
            self.slots.swap(index, best);
            index = best;
        }
    }

    /// Insert `item`. A full heap hands the item back unchanged.
    pub fn insert(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        let index = self.size;
        self.slots[index] = Some(item);
        self.size += 1;
        self.sift_up(index);
        debug_assert!(self.is_valid());
        Ok(())
    }

    /// Remove and return the root element.
    pub fn remove_head(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        Some(self.remove_at(0))
    }

    /// Remove and return the first element (in storage order) matching
    /// `pred`, restoring the heap property afterwards.
    pub fn remove_where<P>(&mut self, mut pred: P) -> Option<T>
    where
        P: FnMut(&T) -> bool,
    {
        let index = self.slots[..self.size]
            .iter()
            .position(|slot| slot.as_ref().is_some_and(&mut pred))?;
        Some(self.remove_at(index))
    }

    fn remove_at(&mut self, index: usize) -> T {
        let last = self.size - 1;
        self.slots.swap(index, last);
        let removed = match self.slots[last].take() {
            Some(item) => item,
            None => unreachable!("occupied heap slot {} is empty", last),
        };
        self.size = last;
        if index < self.size {
            // the moved element may belong above or below its new slot
            self.sift_up(index);
            self.sift_down(index);
        }
        debug_assert!(self.is_valid());
        removed
    }

    /// Occupied elements in storage order (not sorted).
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.slots[..self.size].iter().filter_map(Option::as_ref)
    }

    /// Check the structural invariants: size within bounds, slot occupancy
    /// matching size, and no child outranking its parent.
    pub fn is_valid(&self) -> bool {
        if self.size > N {
            return false;
        }
        let occupancy_ok = self
            .slots
            .iter()
            .enumerate()
            .all(|(i, slot)| slot.is_some() == (i < self.size));
        if !occupancy_ok {
            return false;
        }
        (1..self.size).all(|i| !self.beats(i, parent(i)))
    }
}
