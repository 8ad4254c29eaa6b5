//! Item counters
//!
//! Each collection owns a counter of live items. The counter flavor is picked
//! at construction: a bare atomic, a cache-line padded atomic (default), or
//! no counting at all. Counter updates are always relaxed; the count is only
//! meaningful at quiescence.

use crossbeam::utils::CachePadded;
use shoal_core::CounterKind;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A live-item counter with a construction-time flavor
#[derive(Debug)]
pub(crate) enum ItemCounter {
    Strict(AtomicUsize),
    Padded(CachePadded<AtomicUsize>),
    Disabled,
}

impl ItemCounter {
    pub(crate) fn new(kind: CounterKind) -> Self {
        match kind {
            CounterKind::Strict => ItemCounter::Strict(AtomicUsize::new(0)),
            CounterKind::Padded => ItemCounter::Padded(CachePadded::new(AtomicUsize::new(0))),
            CounterKind::None => ItemCounter::Disabled,
        }
    }

    /// Increments and returns the new count (0 when disabled)
    #[inline]
    pub(crate) fn inc(&self) -> usize {
        match self {
            ItemCounter::Strict(c) => c.fetch_add(1, Ordering::Relaxed) + 1,
            ItemCounter::Padded(c) => c.fetch_add(1, Ordering::Relaxed) + 1,
            ItemCounter::Disabled => 0,
        }
    }

    /// Decrements and returns the new count (0 when disabled)
    #[inline]
    pub(crate) fn dec(&self) -> usize {
        match self {
            ItemCounter::Strict(c) => c.fetch_sub(1, Ordering::Relaxed) - 1,
            ItemCounter::Padded(c) => c.fetch_sub(1, Ordering::Relaxed) - 1,
            ItemCounter::Disabled => 0,
        }
    }

    #[inline]
    pub(crate) fn get(&self) -> usize {
        match self {
            ItemCounter::Strict(c) => c.load(Ordering::Relaxed),
            ItemCounter::Padded(c) => c.load(Ordering::Relaxed),
            ItemCounter::Disabled => 0,
        }
    }
}
