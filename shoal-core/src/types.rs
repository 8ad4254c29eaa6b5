//! Core types used throughout shoal
//!
//! This module contains the configuration primitives shared by every
//! collection in the project: the memory-ordering model, the item counter
//! flavor, the back-off strategy and the bit-reversal algorithm selection.

use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;

/// Memory-ordering model applied to the atomics inside a collection
///
/// The default model uses acquire loads when following a pointer, release
/// stores when publishing a node and acquire-release read-modify-write
/// operations. The sequentially consistent model upgrades all of these to
/// `SeqCst` and exists for testing and debugging. Internal counters stay
/// relaxed under both models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryModel {
    /// Acquire/release orderings (default)
    #[default]
    RelaxedOrdering,
    /// `SeqCst` on every load, store and read-modify-write
    SequentialConsistent,
}

impl MemoryModel {
    /// Ordering for loads that follow a pointer
    #[inline]
    pub fn load_order(self) -> Ordering {
        match self {
            MemoryModel::RelaxedOrdering => Ordering::Acquire,
            MemoryModel::SequentialConsistent => Ordering::SeqCst,
        }
    }

    /// Ordering for stores that publish a new node
    #[inline]
    pub fn store_order(self) -> Ordering {
        match self {
            MemoryModel::RelaxedOrdering => Ordering::Release,
            MemoryModel::SequentialConsistent => Ordering::SeqCst,
        }
    }

    /// Ordering for successful compare-exchanges that observe and publish
    #[inline]
    pub fn rmw_order(self) -> Ordering {
        match self {
            MemoryModel::RelaxedOrdering => Ordering::AcqRel,
            MemoryModel::SequentialConsistent => Ordering::SeqCst,
        }
    }

    /// Ordering for the failure path of a compare-exchange
    #[inline]
    pub fn failure_order(self) -> Ordering {
        match self {
            MemoryModel::RelaxedOrdering => Ordering::Relaxed,
            MemoryModel::SequentialConsistent => Ordering::SeqCst,
        }
    }
}

/// Flavor of the live-item counter owned by a collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterKind {
    /// A bare atomic counter
    Strict,
    /// An atomic counter padded to a cache line to defeat false sharing
    #[default]
    Padded,
    /// No counting; `len()` always reports zero
    ///
    /// Forbidden for the split-ordered set, whose `is_empty()` contract is
    /// defined in terms of the counter.
    None,
}

/// Back-off strategy invoked on CAS failure or validation failure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackOffKind {
    /// Busy spinning with the processor pause hint
    #[default]
    Spin,
    /// Spin briefly, then yield to the scheduler
    SpinThenYield,
    /// Retry immediately
    None,
}

/// Algorithm used to reverse the bits of a hash value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitReversal {
    /// Byte-wise lookup table (default)
    #[default]
    Lookup,
    /// Branch-free shift-and-mask reversal
    Swar,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_orderings() {
        let m = MemoryModel::RelaxedOrdering;
        assert_eq!(m.load_order(), Ordering::Acquire);
        assert_eq!(m.store_order(), Ordering::Release);
        assert_eq!(m.rmw_order(), Ordering::AcqRel);
        assert_eq!(m.failure_order(), Ordering::Relaxed);
    }

    #[test]
    fn test_seq_cst_model_orderings() {
        let m = MemoryModel::SequentialConsistent;
        assert_eq!(m.load_order(), Ordering::SeqCst);
        assert_eq!(m.store_order(), Ordering::SeqCst);
        assert_eq!(m.rmw_order(), Ordering::SeqCst);
        assert_eq!(m.failure_order(), Ordering::SeqCst);
    }
}
