//! Split-ordered hash tables
//!
//! A split-ordered table keeps every element in one shared ordered list,
//! sorted by the *bit-reversed* hash of the element. Each bucket is anchored
//! into the list by a *dummy node* whose rank is the bit-reversed bucket id
//! with the low bit clear; real elements carry the bit-reversed hash with
//! the low bit set, so they sort immediately after their bucket's dummy.
//! Doubling the bucket count therefore never moves an element; it only
//! splices new dummies between existing runs.
//!
//! The table comes in two flavors sharing the same index machinery:
//! [`SplitOrderedMap`] over the lock-free Michael list and
//! [`LazySplitOrderedMap`] over the lock-based Lazy list.

pub(crate) mod pool;
pub(crate) mod table;

mod lazy_map;
mod map;

pub use lazy_map::{
    Entry as LazyMapEntry, ExtractedEntry as LazyMapExtractedEntry, Iter as LazyMapIter,
    LazySplitOrderedMap,
};
pub use map::{Entry, ExtractedEntry, Iter, SetIter, SplitOrderedMap, SplitOrderedSet};

use std::cmp::Ordering;

/// A key in the shared list: the split-order rank plus, for real nodes, the
/// user key. Dummies carry no user key.
pub(crate) struct SplitKey<K> {
    pub(crate) rank: u64,
    pub(crate) key: Option<K>,
}

impl<K> SplitKey<K> {
    pub(crate) fn real(rank: u64, key: K) -> Self {
        Self {
            rank,
            key: Some(key),
        }
    }

    pub(crate) fn dummy(rank: u64) -> Self {
        Self { rank, key: None }
    }
}

/// Orders a node key against the dummy target of a bucket with rank `rank`
pub(crate) fn cmp_dummy_target<K>(node: &SplitKey<K>, rank: u64) -> Ordering {
    match node.rank.cmp(&rank) {
        Ordering::Equal => match &node.key {
            None => Ordering::Equal,
            Some(_) => Ordering::Greater,
        },
        other => other,
    }
}

/// Orders a node key against the real target `(rank, key)`
///
/// A dummy sharing the rank sorts before every real node with that rank;
/// real nodes with equal ranks (hash collisions) fall back to the user key.
pub(crate) fn cmp_real_target<K: Ord>(node: &SplitKey<K>, rank: u64, key: &K) -> Ordering {
    match node.rank.cmp(&rank) {
        Ordering::Equal => match &node.key {
            None => Ordering::Less,
            Some(k) => k.cmp(key),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dummy_sorts_before_real_of_same_bucket() {
        let dummy: SplitKey<u64> = SplitKey::dummy(8);
        assert_eq!(cmp_real_target(&dummy, 9, &1), Ordering::Less);
        assert_eq!(cmp_dummy_target(&dummy, 8), Ordering::Equal);
    }

    #[test]
    fn test_hash_collisions_fall_back_to_key() {
        let node = SplitKey::real(9, 5u64);
        assert_eq!(cmp_real_target(&node, 9, &7), Ordering::Less);
        assert_eq!(cmp_real_target(&node, 9, &5), Ordering::Equal);
        assert_eq!(cmp_real_target(&node, 9, &3), Ordering::Greater);
    }

    #[test]
    fn test_rank_dominates_key() {
        let node = SplitKey::real(16, 100u64);
        assert_eq!(cmp_real_target(&node, 32, &0), Ordering::Less);
        assert_eq!(cmp_real_target(&node, 8, &200), Ordering::Greater);
    }
}
