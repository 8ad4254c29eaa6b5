//! Split-ordered map over the lock-based Lazy list
//!
//! The same bucket index, dummy pool and split-order key layout as
//! [`SplitOrderedMap`](crate::SplitOrderedMap), layered over the optimistic
//! per-node-lock list instead of the lock-free one. Readers stay
//! unsynchronized; writers lock the two nodes around the modification point.

use crossbeam::epoch::{self, Guard, Owned, Shared};
use crossbeam::utils::Backoff;
use log::{debug, warn};
use shoal_core::{BackOffKind, BitReversal, Error, MemoryModel, Result};
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use crate::backoff;
use crate::bitrev;
use crate::config::SplitMapConfig;
use crate::counter::ItemCounter;
use crate::list::lazy::{search_from, try_delete, try_insert, LazyNode};
use crate::smr;
use crate::split::pool::DummyPool;
use crate::split::table::BucketTable;
use crate::split::{cmp_dummy_target, cmp_real_target, SplitKey};
use crate::stats::SplitListStats;
use std::cmp::Ordering;

type LNode<K, V> = LazyNode<SplitKey<K>, V>;

/// A protected reference to a live map entry
pub struct Entry<'g, K, V> {
    node: &'g LNode<K, V>,
}

impl<'g, K, V> Entry<'g, K, V> {
    pub fn key(&self) -> &'g K {
        self.node.key.as_ref().unwrap().key.as_ref().unwrap()
    }

    pub fn value(&self) -> &'g V {
        self.node.value.as_ref().unwrap()
    }

    fn as_ptr(&self) -> *const LNode<K, V> {
        self.node as *const _
    }
}

/// An entry removed from the map, owned by the caller until dropped
pub struct ExtractedEntry<K, V> {
    _guard: Guard,
    node: *const LNode<K, V>,
}

impl<K, V> ExtractedEntry<K, V> {
    pub fn key(&self) -> &K {
        unsafe { (*self.node).key.as_ref().unwrap().key.as_ref().unwrap() }
    }

    pub fn value(&self) -> &V {
        unsafe { (*self.node).value.as_ref().unwrap() }
    }
}

/// A concurrent hash map over the Lazy list
///
/// Behaviorally equivalent to [`SplitOrderedMap`](crate::SplitOrderedMap);
/// reads are obstruction-free, writes block on the per-node locks of the
/// affected pair.
///
/// # Example
///
/// ```
/// use shoal_collections::{LazySplitOrderedMap, SplitMapConfig};
///
/// let map: LazySplitOrderedMap<u64, &str> =
///     LazySplitOrderedMap::new(SplitMapConfig::default()).unwrap();
/// assert!(map.insert(1, "one").unwrap());
/// assert!(map.contains(&1).unwrap());
/// ```
pub struct LazySplitOrderedMap<K, V, S = RandomState> {
    head: Box<LNode<K, V>>,
    table: BucketTable<LNode<K, V>>,
    pool: DummyPool<Box<LNode<K, V>>>,
    bucket_count: AtomicUsize,
    load_factor: usize,
    dynamic: bool,
    counter: ItemCounter,
    stats: Option<Box<SplitListStats>>,
    memory_model: MemoryModel,
    back_off: BackOffKind,
    bit_reversal: BitReversal,
    hash_builder: S,
}

impl<K, V> LazySplitOrderedMap<K, V, RandomState>
where
    K: Ord + Hash,
{
    /// Creates an empty map with the default hasher
    pub fn new(config: SplitMapConfig) -> Result<Self> {
        Self::with_hasher(config, RandomState::new())
    }
}

impl<K, V, S> LazySplitOrderedMap<K, V, S>
where
    K: Ord + Hash,
    S: BuildHasher,
{
    /// Creates an empty map hashing through `hash_builder`
    pub fn with_hasher(config: SplitMapConfig, hash_builder: S) -> Result<Self> {
        config.validate()?;
        smr::check_available_guards(2)?;

        let max_buckets = config.max_bucket_count();
        let table = if config.dynamic_bucket_table {
            BucketTable::expandable(max_buckets)
        } else {
            BucketTable::fixed(max_buckets)
        };
        let initial_buckets = if config.dynamic_bucket_table {
            2.min(max_buckets)
        } else {
            max_buckets
        };

        let map = Self {
            head: Box::new(LazyNode::sentinel()),
            table,
            pool: DummyPool::new(max_buckets),
            bucket_count: AtomicUsize::new(initial_buckets),
            load_factor: config.load_factor,
            dynamic: config.dynamic_bucket_table,
            counter: ItemCounter::new(config.counter),
            stats: config.stat.then(|| Box::new(SplitListStats::default())),
            memory_model: config.memory_model,
            back_off: config.back_off,
            bit_reversal: config.bit_reversal,
            hash_builder,
        };

        // Bucket 0 heads the list right behind the sentinel.
        let guard = smr::pin();
        let rank = map.dummy_rank(0);
        let dummy = map
            .pool
            .alloc_with(|| Box::new(LazyNode::new(SplitKey::dummy(rank), None)))
            .ok_or(Error::BucketsExhausted(max_buckets))?;
        let shared = Owned::<LNode<K, V>>::from(dummy).into_shared(&guard);
        map.head.next.store(shared, AtomicOrdering::Relaxed);
        map.table
            .slot(0, &guard, map.memory_model)
            .store(shared, AtomicOrdering::Relaxed);
        map.stat(|s| s.bucket_count.inc());

        Ok(map)
    }

    #[inline]
    fn stat<F: FnOnce(&SplitListStats)>(&self, f: F) {
        if let Some(s) = &self.stats {
            f(s);
        }
    }

    #[inline]
    fn hash_of(&self, key: &K) -> u64 {
        self.hash_builder.hash_one(key)
    }

    #[inline]
    fn real_rank(&self, hash: u64) -> u64 {
        bitrev::reverse(self.bit_reversal, hash) | 1
    }

    #[inline]
    fn dummy_rank(&self, bucket: u64) -> u64 {
        bitrev::reverse(self.bit_reversal, bucket) & !1
    }

    #[inline]
    fn bucket_index(&self, hash: u64) -> usize {
        (hash as usize) & (self.bucket_count.load(AtomicOrdering::Relaxed) - 1)
    }

    fn is_real_match(node: &LNode<K, V>, rank: u64, key: &K) -> bool {
        let split = node.key.as_ref().unwrap();
        cmp_real_target(split, rank, key) == Ordering::Equal
            && !node.marked.load(AtomicOrdering::Acquire)
    }

    /// The dummy anchoring bucket `bucket`, initializing it if needed
    fn bucket_head<'g>(&'g self, bucket: usize, guard: &'g Guard) -> Result<&'g LNode<K, V>> {
        let slot = self.table.slot(bucket, guard, self.memory_model);
        let head = slot.load(self.memory_model.load_order(), guard);
        if let Some(node) = unsafe { head.as_ref() } {
            return Ok(node);
        }
        self.init_bucket(bucket, guard)
    }

    fn init_bucket<'g>(&'g self, bucket: usize, guard: &'g Guard) -> Result<&'g LNode<K, V>> {
        debug_assert!(bucket != 0);
        let mm = self.memory_model;

        let parent = bucket ^ (1 << bucket.ilog2());
        self.stat(|s| s.init_bucket_recursive.inc());
        let parent_node = self.bucket_head(parent, guard)?;

        let slot = self.table.slot(bucket, guard, mm);
        if let Some(node) = unsafe { slot.load(mm.load_order(), guard).as_ref() } {
            self.stat(|s| s.busy_wait_bucket_init.inc());
            return Ok(node);
        }

        let rank = self.dummy_rank(bucket as u64);
        let Some(mut dummy) = self
            .pool
            .alloc_with(|| Box::new(LazyNode::new(SplitKey::dummy(rank), None)))
        else {
            self.stat(|s| s.buckets_exhausted.inc());
            warn!("dummy pool exhausted while initializing bucket {bucket}");
            return Err(Error::BucketsExhausted(self.pool.capacity()));
        };
        dummy.key = Some(SplitKey::dummy(rank));

        let backoff = Backoff::new();
        loop {
            let (pred, curr) = search_from(parent_node, |k| cmp_dummy_target(k, rank), guard, mm);

            if let Some(c) = unsafe { curr.as_ref() } {
                if cmp_dummy_target(c.key.as_ref().unwrap(), rank) == Ordering::Equal {
                    // Another initializer spliced this bucket's dummy first.
                    self.pool.release(dummy);
                    self.stat(|s| s.init_bucket_contention.inc());
                    let _ = slot.compare_exchange(
                        Shared::null(),
                        curr,
                        mm.rmw_order(),
                        mm.failure_order(),
                        guard,
                    );
                    return Ok(c);
                }
            }

            match try_insert(pred, curr, Owned::from(dummy), guard, mm) {
                Ok(inserted) => {
                    let _ = slot.compare_exchange(
                        Shared::null(),
                        inserted,
                        mm.rmw_order(),
                        mm.failure_order(),
                        guard,
                    );
                    self.stat(|s| s.bucket_count.inc());
                    debug!("initialized bucket {bucket} (parent {parent})");
                    return Ok(unsafe { inserted.deref() });
                }
                Err(returned) => {
                    dummy = returned.into_box();
                    backoff::pause(self.back_off, &backoff);
                }
            }
        }
    }

    fn maybe_grow(&self, count: usize) {
        if !self.dynamic {
            return;
        }
        let buckets = self.bucket_count.load(AtomicOrdering::Relaxed);
        if count > self.load_factor * buckets && buckets < self.table.capacity() {
            if self
                .bucket_count
                .compare_exchange(
                    buckets,
                    buckets * 2,
                    AtomicOrdering::Relaxed,
                    AtomicOrdering::Relaxed,
                )
                .is_ok()
            {
                self.stat(|s| s.table_grow.inc());
                debug!("bucket table grown to {} buckets", buckets * 2);
            }
        }
    }

    /// Inserts `key → value` if the key is absent; returns `Ok(true)` on
    /// insertion
    pub fn insert(&self, key: K, value: V) -> Result<bool> {
        let guard = smr::pin();
        let backoff = Backoff::new();
        let hash = self.hash_of(&key);
        let rank = self.real_rank(hash);
        let mut node: Option<Owned<LNode<K, V>>> = Some(Owned::new(LazyNode::new(
            SplitKey::real(rank, key),
            Some(value),
        )));

        loop {
            let bucket_node = self.bucket_head(self.bucket_index(hash), &guard)?;
            let pending = node.take().unwrap();
            let key_ref = pending.key.as_ref().unwrap().key.as_ref().unwrap();
            let (pred, curr) = search_from(
                bucket_node,
                |k| cmp_real_target(k, rank, key_ref),
                &guard,
                self.memory_model,
            );

            if let Some(c) = unsafe { curr.as_ref() } {
                if Self::is_real_match(c, rank, key_ref) {
                    self.stat(|s| s.insert_failed.inc());
                    return Ok(false);
                }
            }

            match try_insert(pred, curr, pending, &guard, self.memory_model) {
                Ok(_) => {
                    let count = self.counter.inc();
                    self.maybe_grow(count);
                    self.stat(|s| s.insert_success.inc());
                    return Ok(true);
                }
                Err(returned) => {
                    node = Some(returned);
                    backoff::pause(self.back_off, &backoff);
                }
            }
        }
    }

    /// Inserts `key` with a value produced by `make`, if the key is absent
    pub fn insert_with<F>(&self, key: K, make: F) -> Result<bool>
    where
        F: FnOnce() -> V,
    {
        let guard = smr::pin();
        let backoff = Backoff::new();
        let hash = self.hash_of(&key);
        let rank = self.real_rank(hash);
        let mut make = Some(make);
        let mut key_holder = Some(key);
        let mut node: Option<Owned<LNode<K, V>>> = None;

        loop {
            let bucket_node = self.bucket_head(self.bucket_index(hash), &guard)?;
            let key_ref = node
                .as_ref()
                .map(|n| n.key.as_ref().unwrap().key.as_ref().unwrap())
                .or(key_holder.as_ref())
                .unwrap();
            let (pred, curr) = search_from(
                bucket_node,
                |k| cmp_real_target(k, rank, key_ref),
                &guard,
                self.memory_model,
            );

            if let Some(c) = unsafe { curr.as_ref() } {
                if Self::is_real_match(c, rank, key_ref) {
                    self.stat(|s| s.insert_failed.inc());
                    return Ok(false);
                }
            }

            let pending = match node.take() {
                Some(n) => n,
                None => Owned::new(LazyNode::new(
                    SplitKey::real(rank, key_holder.take().unwrap()),
                    Some(make.take().unwrap()()),
                )),
            };

            match try_insert(pred, curr, pending, &guard, self.memory_model) {
                Ok(_) => {
                    let count = self.counter.inc();
                    self.maybe_grow(count);
                    self.stat(|s| s.insert_success.inc());
                    return Ok(true);
                }
                Err(returned) => {
                    node = Some(returned);
                    backoff::pause(self.back_off, &backoff);
                }
            }
        }
    }

    /// Inserts `key → value` if absent, or reports the existing entry
    pub fn update<F>(
        &self,
        key: K,
        value: V,
        allow_insert: bool,
        on_existing: F,
    ) -> Result<(bool, bool)>
    where
        F: FnOnce(&V, &V),
    {
        let guard = smr::pin();
        let backoff = Backoff::new();
        let hash = self.hash_of(&key);
        let rank = self.real_rank(hash);
        let mut on_existing = Some(on_existing);
        let mut key_holder = Some(key);
        let mut value_holder = Some(value);
        let mut node: Option<Owned<LNode<K, V>>> = None;

        loop {
            let bucket_node = self.bucket_head(self.bucket_index(hash), &guard)?;
            let key_ref = node
                .as_ref()
                .map(|n| n.key.as_ref().unwrap().key.as_ref().unwrap())
                .or(key_holder.as_ref())
                .unwrap();
            let (pred, curr) = search_from(
                bucket_node,
                |k| cmp_real_target(k, rank, key_ref),
                &guard,
                self.memory_model,
            );

            if let Some(c) = unsafe { curr.as_ref() } {
                if Self::is_real_match(c, rank, key_ref) {
                    let new_value = node
                        .as_ref()
                        .map(|n| n.value.as_ref().unwrap())
                        .or(value_holder.as_ref())
                        .unwrap();
                    on_existing.take().unwrap()(c.value.as_ref().unwrap(), new_value);
                    self.stat(|s| s.update_existing.inc());
                    return Ok((true, false));
                }
            }

            if !allow_insert {
                return Ok((false, false));
            }

            let pending = match node.take() {
                Some(n) => n,
                None => Owned::new(LazyNode::new(
                    SplitKey::real(rank, key_holder.take().unwrap()),
                    Some(value_holder.take().unwrap()),
                )),
            };

            match try_insert(pred, curr, pending, &guard, self.memory_model) {
                Ok(_) => {
                    let count = self.counter.inc();
                    self.maybe_grow(count);
                    self.stat(|s| s.update_new.inc());
                    return Ok((true, true));
                }
                Err(returned) => {
                    node = Some(returned);
                    backoff::pause(self.back_off, &backoff);
                }
            }
        }
    }

    /// Erases the entry for `key`; returns `Ok(true)` if this call removed
    /// it
    pub fn erase(&self, key: &K) -> Result<bool> {
        self.erase_with(key, |_, _| {})
    }

    /// Erases the entry for `key`, running `f` between logical and physical
    /// deletion
    pub fn erase_with<F>(&self, key: &K, f: F) -> Result<bool>
    where
        F: FnOnce(&K, &V),
    {
        let guard = smr::pin();
        let backoff = Backoff::new();
        let hash = self.hash_of(key);
        let rank = self.real_rank(hash);
        let mut f = Some(f);

        loop {
            let bucket_node = self.bucket_head(self.bucket_index(hash), &guard)?;
            let (pred, curr) = search_from(
                bucket_node,
                |k| cmp_real_target(k, rank, key),
                &guard,
                self.memory_model,
            );

            let found = matches!(
                unsafe { curr.as_ref() },
                Some(c) if Self::is_real_match(c, rank, key)
            );
            if !found {
                self.stat(|s| s.erase_failed.inc());
                return Ok(false);
            }

            let result = try_delete(
                pred,
                curr,
                |split: &SplitKey<K>, v: &V| {
                    if let Some(callback) = f.take() {
                        callback(split.key.as_ref().unwrap(), v);
                    }
                },
                &guard,
                self.memory_model,
            );
            match result {
                Ok(_) => {
                    self.counter.dec();
                    self.stat(|s| s.erase_success.inc());
                    return Ok(true);
                }
                Err(_) => backoff::pause(self.back_off, &backoff),
            }
        }
    }

    /// Erases the entry only if it is the exact node behind `entry`
    pub fn unlink(&self, entry: &Entry<'_, K, V>) -> Result<bool> {
        let guard = smr::pin();
        let backoff = Backoff::new();
        let key = entry.key();
        let hash = self.hash_of(key);
        let rank = self.real_rank(hash);
        let target = entry.as_ptr();

        loop {
            let bucket_node = self.bucket_head(self.bucket_index(hash), &guard)?;
            let (pred, curr) = search_from(
                bucket_node,
                |k| cmp_real_target(k, rank, key),
                &guard,
                self.memory_model,
            );

            if curr.as_raw() != target {
                self.stat(|s| s.erase_failed.inc());
                return Ok(false);
            }

            match try_delete(pred, curr, |_, _| {}, &guard, self.memory_model) {
                Ok(_) => {
                    self.counter.dec();
                    self.stat(|s| s.erase_success.inc());
                    return Ok(true);
                }
                Err(_) => backoff::pause(self.back_off, &backoff),
            }
        }
    }

    /// Erases the entry for `key` and hands it to the caller
    pub fn extract(&self, key: &K) -> Result<Option<ExtractedEntry<K, V>>> {
        let guard = smr::pin();
        let backoff = Backoff::new();
        let hash = self.hash_of(key);
        let rank = self.real_rank(hash);
        let node_ptr;

        loop {
            let bucket_node = self.bucket_head(self.bucket_index(hash), &guard)?;
            let (pred, curr) = search_from(
                bucket_node,
                |k| cmp_real_target(k, rank, key),
                &guard,
                self.memory_model,
            );

            let found = matches!(
                unsafe { curr.as_ref() },
                Some(c) if Self::is_real_match(c, rank, key)
            );
            if !found {
                self.stat(|s| s.extract_failed.inc());
                return Ok(None);
            }

            match try_delete(pred, curr, |_, _| {}, &guard, self.memory_model) {
                Ok(node) => {
                    node_ptr = node as *const LNode<K, V>;
                    break;
                }
                Err(_) => backoff::pause(self.back_off, &backoff),
            }
        }

        self.counter.dec();
        self.stat(|s| s.extract_success.inc());
        Ok(Some(ExtractedEntry {
            _guard: guard,
            node: node_ptr,
        }))
    }

    /// Returns `true` if `key` is present
    pub fn contains(&self, key: &K) -> Result<bool> {
        let guard = smr::pin();
        self.get(key, &guard).map(|entry| entry.is_some())
    }

    /// Runs `f` on the entry for `key` under guard protection
    pub fn find<F>(&self, key: &K, f: F) -> Result<bool>
    where
        F: FnOnce(&K, &V),
    {
        let guard = smr::pin();
        match self.get(key, &guard)? {
            Some(entry) => {
                f(entry.key(), entry.value());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Returns a protected reference to the entry for `key`
    pub fn get<'g>(&'g self, key: &K, guard: &'g Guard) -> Result<Option<Entry<'g, K, V>>> {
        let hash = self.hash_of(key);
        let rank = self.real_rank(hash);
        let bucket_node = self.bucket_head(self.bucket_index(hash), guard)?;
        let (_, curr) = search_from(
            bucket_node,
            |k| cmp_real_target(k, rank, key),
            guard,
            self.memory_model,
        );

        match unsafe { curr.as_ref() } {
            Some(c) if Self::is_real_match(c, rank, key) => {
                self.stat(|s| s.find_success.inc());
                Ok(Some(Entry { node: c }))
            }
            _ => {
                self.stat(|s| s.find_failed.inc());
                Ok(None)
            }
        }
    }

    /// Returns a best-effort iterator over the live entries in split-order
    pub fn iter<'g>(&'g self, guard: &'g Guard) -> Iter<'g, K, V> {
        Iter {
            curr: self.head.next.load(self.memory_model.load_order(), guard),
            guard,
            memory_model: self.memory_model,
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.counter.get()
    }

    /// Returns `true` if the map holds no entries (`len() == 0`)
    pub fn is_empty(&self) -> bool {
        self.counter.get() == 0
    }

    /// Current bucket count (a power of two, monotone under growth)
    pub fn bucket_count(&self) -> usize {
        self.bucket_count.load(AtomicOrdering::Relaxed)
    }

    /// Worst-case bucket count fixed at construction
    pub fn max_bucket_count(&self) -> usize {
        self.table.capacity()
    }

    /// Internal statistics, when enabled at construction
    pub fn stats(&self) -> Option<&SplitListStats> {
        self.stats.as_deref()
    }
}

/// Best-effort iterator over the live entries of a [`LazySplitOrderedMap`]
pub struct Iter<'g, K, V> {
    curr: Shared<'g, LNode<K, V>>,
    guard: &'g Guard,
    memory_model: MemoryModel,
}

impl<'g, K, V> Iterator for Iter<'g, K, V> {
    type Item = Entry<'g, K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = unsafe { self.curr.as_ref() } {
            self.curr = node.next.load(self.memory_model.load_order(), self.guard);
            if !node.marked.load(AtomicOrdering::Acquire)
                && node.key.as_ref().unwrap().key.is_some()
            {
                return Some(Entry { node });
            }
        }
        None
    }
}

impl<K, V, S> Drop for LazySplitOrderedMap<K, V, S> {
    fn drop(&mut self) {
        unsafe {
            let guard = epoch::unprotected();
            let mut curr = self.head.next.load(AtomicOrdering::Relaxed, guard);
            while let Some(node) = curr.as_ref() {
                let next = node.next.load(AtomicOrdering::Relaxed, guard);
                drop(curr.into_owned());
                curr = next;
            }
        }
    }
}
