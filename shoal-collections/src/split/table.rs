//! Bucket index tables
//!
//! The split-ordered table maps a bucket id to the dummy node anchoring that
//! bucket in the list. Slots hold weak references: the nodes belong to the
//! list and are never freed through the table. Two layouts are available:
//!
//! - a fixed flat array sized for the worst case up front
//! - an expandable two-level array whose segments are installed lazily by a
//!   double-checked CAS (the loser frees its freshly allocated segment)

use crossbeam::epoch::{self, Atomic, Guard, Owned, Shared};
use shoal_core::MemoryModel;
use std::sync::atomic::Ordering;

/// Slots per segment of the expandable table
const SEGMENT_SIZE: usize = 256;

pub(crate) struct Segment<N> {
    slots: Box<[Atomic<N>]>,
}

impl<N> Segment<N> {
    fn new(size: usize) -> Self {
        Self {
            slots: (0..size).map(|_| Atomic::null()).collect(),
        }
    }
}

pub(crate) struct FixedTable<N> {
    slots: Box<[Atomic<N>]>,
}

pub(crate) struct ExpandableTable<N> {
    segments: Box<[Atomic<Segment<N>>]>,
    segment_size: usize,
}

impl<N> ExpandableTable<N> {
    fn new(max_capacity: usize) -> Self {
        debug_assert!(max_capacity.is_power_of_two());
        let segment_size = SEGMENT_SIZE.min(max_capacity);
        let segment_count = (max_capacity / segment_size).max(1);
        Self {
            segments: (0..segment_count).map(|_| Atomic::null()).collect(),
            segment_size,
        }
    }

    fn slot<'g>(&'g self, index: usize, guard: &'g Guard, mm: MemoryModel) -> &'g Atomic<N> {
        let segment_index = index / self.segment_size;
        let segment_ref = &self.segments[segment_index];

        let mut segment = segment_ref.load(mm.load_order(), guard);
        if segment.is_null() {
            let fresh = Owned::new(Segment::new(self.segment_size));
            match segment_ref.compare_exchange(
                Shared::null(),
                fresh,
                mm.rmw_order(),
                mm.load_order(),
                guard,
            ) {
                Ok(installed) => segment = installed,
                Err(e) => {
                    // another thread installed first; discard ours
                    segment = e.current;
                    drop(e.new);
                }
            }
        }

        let segment = unsafe { segment.deref() };
        &segment.slots[index % self.segment_size]
    }
}

impl<N> Drop for ExpandableTable<N> {
    fn drop(&mut self) {
        unsafe {
            let guard = epoch::unprotected();
            for segment in self.segments.iter() {
                let s = segment.load(Ordering::Relaxed, guard);
                if !s.is_null() {
                    drop(s.into_owned());
                }
            }
        }
    }
}

/// A bucket id → dummy node index with a construction-time layout
pub(crate) enum BucketTable<N> {
    Fixed(FixedTable<N>),
    Expandable(ExpandableTable<N>),
}

impl<N> BucketTable<N> {
    pub(crate) fn fixed(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        BucketTable::Fixed(FixedTable {
            slots: (0..capacity).map(|_| Atomic::null()).collect(),
        })
    }

    pub(crate) fn expandable(max_capacity: usize) -> Self {
        BucketTable::Expandable(ExpandableTable::new(max_capacity))
    }

    /// Worst-case bucket count this table can index
    pub(crate) fn capacity(&self) -> usize {
        match self {
            BucketTable::Fixed(t) => t.slots.len(),
            BucketTable::Expandable(t) => t.segments.len() * t.segment_size,
        }
    }

    /// The atomic slot for `index`, installing its segment if needed
    pub(crate) fn slot<'g>(
        &'g self,
        index: usize,
        guard: &'g Guard,
        mm: MemoryModel,
    ) -> &'g Atomic<N> {
        match self {
            BucketTable::Fixed(t) => &t.slots[index],
            BucketTable::Expandable(t) => t.slot(index, guard, mm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smr;

    #[test]
    fn test_fixed_capacity_and_slots() {
        let table: BucketTable<u32> = BucketTable::fixed(8);
        assert_eq!(table.capacity(), 8);
        let guard = smr::pin();
        let slot = table.slot(5, &guard, MemoryModel::default());
        assert!(slot.load(Ordering::Acquire, &guard).is_null());
    }

    #[test]
    fn test_expandable_capacity_covers_max() {
        let table: BucketTable<u32> = BucketTable::expandable(1 << 12);
        assert_eq!(table.capacity(), 1 << 12);

        let small: BucketTable<u32> = BucketTable::expandable(16);
        assert_eq!(small.capacity(), 16);
    }

    #[test]
    fn test_expandable_installs_segments_lazily() {
        let table: BucketTable<u64> = BucketTable::expandable(1 << 10);
        let guard = smr::pin();
        let mm = MemoryModel::default();

        // Slots in different segments resolve independently.
        let a = table.slot(0, &guard, mm) as *const _;
        let b = table.slot(SEGMENT_SIZE, &guard, mm) as *const _;
        assert_ne!(a, b);

        // The same slot resolves to the same atomic.
        let again = table.slot(0, &guard, mm) as *const _;
        assert_eq!(a, again);
    }

    #[test]
    fn test_concurrent_segment_install_converges() {
        use std::sync::Arc;
        use std::thread;

        let table: Arc<BucketTable<u64>> = Arc::new(BucketTable::expandable(1 << 10));
        let mut handles = vec![];
        for _ in 0..8 {
            let table = Arc::clone(&table);
            handles.push(thread::spawn(move || {
                let guard = smr::pin();
                table.slot(300, &guard, MemoryModel::default()) as *const _ as usize
            }));
        }
        let addrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(addrs.windows(2).all(|w| w[0] == w[1]));
    }
}
