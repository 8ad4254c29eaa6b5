//! Internal event statistics
//!
//! Each collection can be constructed with statistics enabled, in which case
//! it owns one of the structs below and bumps its counters on the matching
//! events. Statistics are disabled by default and all counters are relaxed;
//! they are a debugging aid, not part of any correctness contract.

use std::sync::atomic::{AtomicU64, Ordering};

/// A relaxed event counter
#[derive(Debug, Default)]
pub struct EventCounter(AtomicU64);

impl EventCounter {
    #[inline]
    pub(crate) fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Current event count
    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Events of the ordered lists (Michael and Lazy)
#[derive(Debug, Default)]
pub struct ListStats {
    /// Successful insertions
    pub insert_success: EventCounter,
    /// Insertions that found the key present
    pub insert_failed: EventCounter,
    /// `update` calls that created a new item
    pub update_new: EventCounter,
    /// `update` calls that observed an existing item
    pub update_existing: EventCounter,
    /// Successful erasures
    pub erase_success: EventCounter,
    /// Erasures of absent keys
    pub erase_failed: EventCounter,
    /// Successful extractions
    pub extract_success: EventCounter,
    /// Extractions of absent keys
    pub extract_failed: EventCounter,
    /// Lookups that found the key
    pub find_success: EventCounter,
    /// Lookups that missed
    pub find_failed: EventCounter,
    /// Traversals restarted after a snapshot went stale
    pub search_retries: EventCounter,
    /// Marked nodes unlinked on behalf of other threads
    pub helped_unlinks: EventCounter,
    /// Writer validation failures (Lazy list only)
    pub validation_failed: EventCounter,
}

/// Events of the split-ordered hash table
#[derive(Debug, Default)]
pub struct SplitListStats {
    /// Successful insertions
    pub insert_success: EventCounter,
    /// Insertions that found the key present
    pub insert_failed: EventCounter,
    /// `update` calls that created a new item
    pub update_new: EventCounter,
    /// `update` calls that observed an existing item
    pub update_existing: EventCounter,
    /// Successful erasures
    pub erase_success: EventCounter,
    /// Erasures of absent keys
    pub erase_failed: EventCounter,
    /// Successful extractions
    pub extract_success: EventCounter,
    /// Extractions of absent keys
    pub extract_failed: EventCounter,
    /// Lookups that found the key
    pub find_success: EventCounter,
    /// Lookups that missed
    pub find_failed: EventCounter,
    /// Buckets spliced into the list
    pub bucket_count: EventCounter,
    /// Recursive parent-bucket initializations
    pub init_bucket_recursive: EventCounter,
    /// Bucket initializations that lost a race to a concurrent initializer
    pub init_bucket_contention: EventCounter,
    /// Spins waiting for a bucket another thread is initializing
    pub busy_wait_bucket_init: EventCounter,
    /// Dummy pool exhaustion events
    pub buckets_exhausted: EventCounter,
    /// Bucket index doublings
    pub table_grow: EventCounter,
}

/// Events of the skip-list
#[derive(Debug, Default)]
pub struct SkipListStats {
    /// Successful insertions
    pub insert_success: EventCounter,
    /// Insertions that found the key present
    pub insert_failed: EventCounter,
    /// Insertions restarted after a level-0 CAS failure
    pub insert_retries: EventCounter,
    /// `update` calls that created a new item
    pub update_new: EventCounter,
    /// `update` calls that observed an existing item
    pub update_existing: EventCounter,
    /// Successful erasures
    pub erase_success: EventCounter,
    /// Erasures of absent keys
    pub erase_failed: EventCounter,
    /// Erasures abandoned because another thread won the level-0 mark
    pub erase_contention: EventCounter,
    /// Erasures whose every level was unlinked by the fast path
    pub fast_erase: EventCounter,
    /// Erasures that fell back to a position search for unlinking
    pub slow_erase: EventCounter,
    /// Successful extract-min/extract-max calls
    pub extract_success: EventCounter,
    /// Extract calls on an empty list
    pub extract_failed: EventCounter,
    /// Lookups answered by the fast path
    pub find_fast: EventCounter,
    /// Lookups that fell back to the position search
    pub find_slow: EventCounter,
    /// Tower links abandoned because the node was marked mid-insert
    pub logical_delete_while_insert: EventCounter,
    /// Per-level link retries that recomputed the insert position
    pub renew_insert_position: EventCounter,
    /// Marked nodes unlinked on behalf of other threads
    pub helped_unlinks: EventCounter,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_counter_increments() {
        let c = EventCounter::default();
        assert_eq!(c.get(), 0);
        c.inc();
        c.inc();
        assert_eq!(c.get(), 2);
    }
}
