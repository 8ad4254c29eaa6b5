//! Split-ordered map over the lock-free Michael list
//!
//! One shared list holds every element and every bucket dummy, sorted by
//! `(rank, key)`. The bucket index maps a bucket id to its dummy so that an
//! operation enters the list a whole bucket closer to its target, giving
//! expected O(1) work per operation at a bounded load factor.

use crossbeam::epoch::{self, Atomic, Guard, Owned};
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
use crate::list::michael::{Cursor, Node, Retry};
use crate::smr;
use crate::split::pool::DummyPool;
use crate::split::table::BucketTable;
use crate::split::{cmp_dummy_target, cmp_real_target, SplitKey};
use crate::stats::SplitListStats;

type MNode<K, V> = Node<SplitKey<K>, Option<V>>;

/// A protected reference to a live map entry
pub struct Entry<'g, K, V> {
    node: &'g MNode<K, V>,
}

impl<'g, K, V> Entry<'g, K, V> {
    pub fn key(&self) -> &'g K {
        self.node.key.key.as_ref().unwrap()
    }

    pub fn value(&self) -> &'g V {
        self.node.value.as_ref().unwrap()
    }

    fn as_ptr(&self) -> *const MNode<K, V> {
        self.node as *const _
    }
}

/// An entry removed from the map, owned by the caller until dropped
pub struct ExtractedEntry<K, V> {
    _guard: Guard,
    node: *const MNode<K, V>,
}

impl<K, V> ExtractedEntry<K, V> {
    pub fn key(&self) -> &K {
        unsafe { (*self.node).key.key.as_ref().unwrap() }
    }

    pub fn value(&self) -> &V {
        unsafe { (*self.node).value.as_ref().unwrap() }
    }
}

/// A concurrent hash map built from a split-ordered list (expected O(1))
///
/// Buckets are created lazily: the first operation to touch a bucket splices
/// its dummy node into the list, initializing parent buckets recursively.
/// When the live-item count crosses `load_factor × bucket_count` the bucket
/// count doubles; doubling touches only the index, never the list.
///
/// # Thread Safety
///
/// All operations take `&self` and are lock-free. `is_empty()` is defined as
/// `len() == 0`, which is why the item counter cannot be disabled for this
/// structure.
///
/// # Example
///
/// ```
/// use shoal_collections::{SplitOrderedMap, SplitMapConfig};
///
/// let map: SplitOrderedMap<u64, &str> =
///     SplitOrderedMap::new(SplitMapConfig::default()).unwrap();
/// assert!(map.insert(1, "one").unwrap());
/// assert!(!map.insert(1, "uno").unwrap());
/// assert_eq!(map.len(), 1);
/// assert!(map.erase(&1).unwrap());
/// assert!(map.is_empty());
/// ```
pub struct SplitOrderedMap<K, V, S = RandomState> {
    head: Atomic<MNode<K, V>>,
    table: BucketTable<MNode<K, V>>,
    pool: DummyPool<Box<MNode<K, V>>>,
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

impl<K, V> SplitOrderedMap<K, V, RandomState>
where
    K: Ord + Hash,
{
    /// Creates an empty map with the default hasher
    pub fn new(config: SplitMapConfig) -> Result<Self> {
        Self::with_hasher(config, RandomState::new())
    }
}

impl<K, V, S> SplitOrderedMap<K, V, S>
where
    K: Ord + Hash,
    S: BuildHasher,
{
    /// Creates an empty map hashing through `hash_builder`
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] for a rejected configuration
    /// (a disabled item counter, a zero load factor) and
    /// [`Error::GuardExhausted`] if the reclamation scheme cannot provide
    /// the guards a traversal needs.
    pub fn with_hasher(config: SplitMapConfig, hash_builder: S) -> Result<Self> {
        config.validate()?;
        smr::check_available_guards(3)?;

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
            head: Atomic::null(),
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

        // Bucket 0 is always initialized eagerly: its dummy heads the list.
        let guard = smr::pin();
        let rank = map.dummy_rank(0);
        let dummy = map
            .pool
            .alloc_with(|| Box::new(Node::new(SplitKey::dummy(rank), None)))
            .ok_or(Error::BucketsExhausted(max_buckets))?;
        let shared = Owned::<MNode<K, V>>::from(dummy).into_shared(&guard);
        map.head.store(shared, AtomicOrdering::Relaxed);
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

    /// The dummy anchoring bucket `bucket`, initializing it if needed
    fn bucket_head<'g>(&'g self, bucket: usize, guard: &'g Guard) -> Result<&'g MNode<K, V>> {
        let slot = self.table.slot(bucket, guard, self.memory_model);
        let head = slot.load(self.memory_model.load_order(), guard);
        if let Some(node) = unsafe { head.as_ref() } {
            return Ok(node);
        }
        self.init_bucket(bucket, guard)
    }

    /// Splices the dummy for `bucket` into the list and publishes it
    ///
    /// The parent bucket (the bucket id with its highest set bit cleared) is
    /// initialized first, recursively; the recursion bottoms out at bucket 0
    /// which exists from construction. Losing the splice race returns the
    /// pooled dummy to the free stack and adopts the winner's node.
    fn init_bucket<'g>(&'g self, bucket: usize, guard: &'g Guard) -> Result<&'g MNode<K, V>> {
        debug_assert!(bucket != 0);
        let mm = self.memory_model;

        let parent = bucket ^ (1 << bucket.ilog2());
        self.stat(|s| s.init_bucket_recursive.inc());
        let parent_node = self.bucket_head(parent, guard)?;

        let slot = self.table.slot(bucket, guard, mm);
        // A concurrent initializer may have finished while we prepared the
        // parent chain.
        if let Some(node) = unsafe { slot.load(mm.load_order(), guard).as_ref() } {
            self.stat(|s| s.busy_wait_bucket_init.inc());
            return Ok(node);
        }

        let rank = self.dummy_rank(bucket as u64);
        let Some(mut dummy) = self
            .pool
            .alloc_with(|| Box::new(Node::new(SplitKey::dummy(rank), None)))
        else {
            self.stat(|s| s.buckets_exhausted.inc());
            warn!("dummy pool exhausted while initializing bucket {bucket}");
            return Err(Error::BucketsExhausted(self.pool.capacity()));
        };
        // A dummy reused from the free stack still carries its old rank.
        dummy.key = SplitKey::dummy(rank);

        let backoff = Backoff::new();
        loop {
            let mut cursor = Cursor::from_node(parent_node, guard, mm);
            match cursor.find_by(|k| cmp_dummy_target(k, rank), guard, mm) {
                Err(Retry) => {
                    backoff::pause(self.back_off, &backoff);
                }
                Ok(true) => {
                    // Another initializer spliced this bucket's dummy first.
                    self.pool.release(dummy);
                    self.stat(|s| s.init_bucket_contention.inc());
                    let node = cursor.curr();
                    let _ = slot.compare_exchange(
                        epoch::Shared::null(),
                        node,
                        mm.rmw_order(),
                        mm.failure_order(),
                        guard,
                    );
                    return Ok(unsafe { node.deref() });
                }
                Ok(false) => match cursor.insert(Owned::from(dummy), guard, mm) {
                    Ok(()) => {
                        let node = cursor.curr();
                        let _ = slot.compare_exchange(
                            epoch::Shared::null(),
                            node,
                            mm.rmw_order(),
                            mm.failure_order(),
                            guard,
                        );
                        self.stat(|s| s.bucket_count.inc());
                        debug!("initialized bucket {bucket} (parent {parent})");
                        return Ok(unsafe { node.deref() });
                    }
                    Err(returned) => {
                        dummy = returned.into_box();
                        backoff::pause(self.back_off, &backoff);
                    }
                },
            }
        }
    }

    /// Doubles the bucket count when the load factor is exceeded
    ///
    /// Purely an index operation: no list node moves. The count is monotone
    /// and capped by the table's worst-case capacity.
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
    ///
    /// # Errors
    ///
    /// [`Error::BucketsExhausted`] if the touched bucket could not be
    /// initialized.
    pub fn insert(&self, key: K, value: V) -> Result<bool> {
        let guard = smr::pin();
        let backoff = Backoff::new();
        let hash = self.hash_of(&key);
        let rank = self.real_rank(hash);
        let mut node = Owned::new(Node::new(SplitKey::real(rank, key), Some(value)));

        loop {
            let bucket_node = self.bucket_head(self.bucket_index(hash), &guard)?;
            let mut cursor = Cursor::from_node(bucket_node, &guard, self.memory_model);
            let found = {
                let key_ref = node.key.key.as_ref().unwrap();
                match cursor.find_by(|k| cmp_real_target(k, rank, key_ref), &guard, self.memory_model)
                {
                    Ok(found) => found,
                    Err(Retry) => {
                        backoff::pause(self.back_off, &backoff);
                        continue;
                    }
                }
            };

            if found {
                self.stat(|s| s.insert_failed.inc());
                return Ok(false);
            }

            match cursor.insert(node, &guard, self.memory_model) {
                Ok(()) => {
                    let count = self.counter.inc();
                    self.maybe_grow(count);
                    self.stat(|s| s.insert_success.inc());
                    return Ok(true);
                }
                Err(returned) => {
                    node = returned;
                    backoff::pause(self.back_off, &backoff);
                }
            }
        }
    }

    /// Inserts `key` with a value produced by `make`, if the key is absent
    ///
    /// `make` runs at most once, after the insert position has been located
    /// and before the node is published; it must not touch the map.
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
        let mut node: Option<Owned<MNode<K, V>>> = None;

        loop {
            let bucket_node = self.bucket_head(self.bucket_index(hash), &guard)?;
            let mut cursor = Cursor::from_node(bucket_node, &guard, self.memory_model);
            let found = {
                let key_ref = node
                    .as_ref()
                    .map(|n| n.key.key.as_ref().unwrap())
                    .or(key_holder.as_ref())
                    .unwrap();
                match cursor.find_by(|k| cmp_real_target(k, rank, key_ref), &guard, self.memory_model)
                {
                    Ok(found) => found,
                    Err(Retry) => {
                        backoff::pause(self.back_off, &backoff);
                        continue;
                    }
                }
            };

            if found {
                self.stat(|s| s.insert_failed.inc());
                return Ok(false);
            }

            let pending = match node.take() {
                Some(n) => n,
                None => Owned::new(Node::new(
                    SplitKey::real(rank, key_holder.take().unwrap()),
                    Some(make.take().unwrap()()),
                )),
            };

            match cursor.insert(pending, &guard, self.memory_model) {
                Ok(()) => {
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
    ///
    /// Returns `(applied, inserted)` with the same meaning as
    /// [`MichaelList::update`](crate::MichaelList::update).
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
        let mut node: Option<Owned<MNode<K, V>>> = None;

        loop {
            let bucket_node = self.bucket_head(self.bucket_index(hash), &guard)?;
            let mut cursor = Cursor::from_node(bucket_node, &guard, self.memory_model);
            let key_ref = node
                .as_ref()
                .map(|n| n.key.key.as_ref().unwrap())
                .or(key_holder.as_ref())
                .unwrap();
            let found = match cursor.find_by(
                |k| cmp_real_target(k, rank, key_ref),
                &guard,
                self.memory_model,
            ) {
                Ok(found) => found,
                Err(Retry) => {
                    backoff::pause(self.back_off, &backoff);
                    continue;
                }
            };

            if found {
                let existing = unsafe { cursor.curr().deref() };
                let new_value = node
                    .as_ref()
                    .map(|n| n.value.as_ref().unwrap())
                    .or(value_holder.as_ref())
                    .unwrap();
                on_existing.take().unwrap()(existing.value.as_ref().unwrap(), new_value);
                self.stat(|s| s.update_existing.inc());
                return Ok((true, false));
            }

            if !allow_insert {
                return Ok((false, false));
            }

            let pending = match node.take() {
                Some(n) => n,
                None => Owned::new(Node::new(
                    SplitKey::real(rank, key_holder.take().unwrap()),
                    Some(value_holder.take().unwrap()),
                )),
            };

            match cursor.insert(pending, &guard, self.memory_model) {
                Ok(()) => {
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
            let mut cursor = Cursor::from_node(bucket_node, &guard, self.memory_model);
            let found =
                match cursor.find_by(|k| cmp_real_target(k, rank, key), &guard, self.memory_model) {
                    Ok(found) => found,
                    Err(Retry) => {
                        backoff::pause(self.back_off, &backoff);
                        continue;
                    }
                };

            if !found {
                self.stat(|s| s.erase_failed.inc());
                return Ok(false);
            }

            let result = cursor.delete(
                |k, v| {
                    if let Some(callback) = f.take() {
                        callback(k.key.as_ref().unwrap(), v.as_ref().unwrap());
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
                // Lost the marking race; re-search with the callback intact
                // (the winner's victim will no longer be found).
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
            let mut cursor = Cursor::from_node(bucket_node, &guard, self.memory_model);
            let found =
                match cursor.find_by(|k| cmp_real_target(k, rank, key), &guard, self.memory_model) {
                    Ok(found) => found,
                    Err(Retry) => {
                        backoff::pause(self.back_off, &backoff);
                        continue;
                    }
                };

            if !found || cursor.curr().as_raw() != target {
                self.stat(|s| s.erase_failed.inc());
                return Ok(false);
            }

            match cursor.delete(|_, _| {}, &guard, self.memory_model) {
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
            let mut cursor = Cursor::from_node(bucket_node, &guard, self.memory_model);
            let found =
                match cursor.find_by(|k| cmp_real_target(k, rank, key), &guard, self.memory_model) {
                    Ok(found) => found,
                    Err(Retry) => {
                        backoff::pause(self.back_off, &backoff);
                        continue;
                    }
                };

            if !found {
                self.stat(|s| s.extract_failed.inc());
                return Ok(None);
            }

            match cursor.delete(|_, _| {}, &guard, self.memory_model) {
                Ok(node) => {
                    node_ptr = node as *const MNode<K, V>;
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
        let backoff = Backoff::new();
        let hash = self.hash_of(key);
        let rank = self.real_rank(hash);

        loop {
            let bucket_node = self.bucket_head(self.bucket_index(hash), guard)?;
            let mut cursor = Cursor::from_node(bucket_node, guard, self.memory_model);
            match cursor.find_by(|k| cmp_real_target(k, rank, key), guard, self.memory_model) {
                Ok(true) => {
                    self.stat(|s| s.find_success.inc());
                    return Ok(Some(Entry {
                        node: unsafe { cursor.curr().deref() },
                    }));
                }
                Ok(false) => {
                    self.stat(|s| s.find_failed.inc());
                    return Ok(None);
                }
                Err(Retry) => {
                    backoff::pause(self.back_off, &backoff);
                }
            }
        }
    }

    /// Returns a best-effort iterator over the live entries
    ///
    /// Entries appear in split-order (bit-reversed hash order), not key
    /// order. Dummy nodes and logically deleted nodes are skipped.
    pub fn iter<'g>(&'g self, guard: &'g Guard) -> Iter<'g, K, V> {
        Iter {
            curr: self.head.load(self.memory_model.load_order(), guard),
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

    /// Ranks of the reachable list nodes in raw list order, paired with
    /// whether the node is a real entry
    #[cfg(test)]
    fn raw_list_ranks(&self) -> Vec<(u64, bool)> {
        let guard = smr::pin();
        let mut out = Vec::new();
        let mut curr = self.head.load(self.memory_model.load_order(), &guard);
        while let Some(node) = unsafe { curr.as_ref() } {
            let next = node.next.load(self.memory_model.load_order(), &guard);
            if next.tag() == 0 {
                out.push((node.key.rank, node.key.key.is_some()));
            }
            curr = next.with_tag(0);
        }
        out
    }
}

/// Best-effort iterator over the live entries of a [`SplitOrderedMap`]
pub struct Iter<'g, K, V> {
    curr: crossbeam::epoch::Shared<'g, MNode<K, V>>,
    guard: &'g Guard,
    memory_model: MemoryModel,
}

impl<'g, K, V> Iterator for Iter<'g, K, V> {
    type Item = Entry<'g, K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = unsafe { self.curr.as_ref() } {
            let next = node.next.load(self.memory_model.load_order(), self.guard);
            self.curr = next.with_tag(0);
            if next.tag() == 0 && node.key.key.is_some() {
                return Some(Entry { node });
            }
        }
        None
    }
}

impl<K, V, S> Drop for SplitOrderedMap<K, V, S> {
    fn drop(&mut self) {
        // The list owns every node, dummies included; the table and pool
        // only hold weak references and never-linked spares.
        unsafe {
            let guard = epoch::unprotected();
            let mut curr = self.head.load(AtomicOrdering::Relaxed, guard);
            while let Some(node) = curr.as_ref() {
                let next = node.next.load(AtomicOrdering::Relaxed, guard);
                drop(curr.into_owned());
                curr = next.with_tag(0);
            }
        }
    }
}

/// A concurrent hash set: a [`SplitOrderedMap`] with unit values
///
/// # Example
///
/// ```
/// use shoal_collections::{SplitOrderedSet, SplitMapConfig};
///
/// let set: SplitOrderedSet<u64> = SplitOrderedSet::new(SplitMapConfig::default()).unwrap();
/// assert!(set.insert(7).unwrap());
/// assert!(set.contains(&7).unwrap());
/// assert!(set.erase(&7).unwrap());
/// ```
pub struct SplitOrderedSet<K, S = RandomState> {
    map: SplitOrderedMap<K, (), S>,
}

impl<K> SplitOrderedSet<K, RandomState>
where
    K: Ord + Hash,
{
    /// Creates an empty set with the default hasher
    pub fn new(config: SplitMapConfig) -> Result<Self> {
        Ok(Self {
            map: SplitOrderedMap::new(config)?,
        })
    }
}

impl<K, S> SplitOrderedSet<K, S>
where
    K: Ord + Hash,
    S: BuildHasher,
{
    /// Creates an empty set hashing through `hash_builder`
    pub fn with_hasher(config: SplitMapConfig, hash_builder: S) -> Result<Self> {
        Ok(Self {
            map: SplitOrderedMap::with_hasher(config, hash_builder)?,
        })
    }

    /// Inserts `key` if absent; returns `Ok(true)` on insertion
    pub fn insert(&self, key: K) -> Result<bool> {
        self.map.insert(key, ())
    }

    /// Returns `true` if `key` is present
    pub fn contains(&self, key: &K) -> Result<bool> {
        self.map.contains(key)
    }

    /// Erases `key`; returns `Ok(true)` if this call removed it
    pub fn erase(&self, key: &K) -> Result<bool> {
        self.map.erase(key)
    }

    /// Erases `key`, running `f` between logical and physical deletion
    pub fn erase_with<F>(&self, key: &K, f: F) -> Result<bool>
    where
        F: FnOnce(&K),
    {
        self.map.erase_with(key, |k, _| f(k))
    }

    /// Erases `key` and hands the entry to the caller
    pub fn extract(&self, key: &K) -> Result<Option<ExtractedEntry<K, ()>>> {
        self.map.extract(key)
    }

    /// Returns a best-effort iterator over the live keys in split-order
    pub fn iter<'g>(&'g self, guard: &'g Guard) -> SetIter<'g, K> {
        SetIter {
            inner: self.map.iter(guard),
        }
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the set holds no keys (`len() == 0`)
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Current bucket count
    pub fn bucket_count(&self) -> usize {
        self.map.bucket_count()
    }

    /// Internal statistics, when enabled at construction
    pub fn stats(&self) -> Option<&SplitListStats> {
        self.map.stats()
    }
}

/// Best-effort iterator over the live keys of a [`SplitOrderedSet`]
pub struct SetIter<'g, K> {
    inner: Iter<'g, K, ()>,
}

impl<'g, K> Iterator for SetIter<'g, K> {
    type Item = &'g K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|entry| entry.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_core::CounterKind;
    use std::hash::Hasher;

    /// Hashes an integer to itself, making bucket placement deterministic
    #[derive(Clone, Default)]
    struct IdentityBuildHasher;

    struct IdentityHasher(u64);

    impl Hasher for IdentityHasher {
        fn finish(&self) -> u64 {
            self.0
        }

        fn write(&mut self, bytes: &[u8]) {
            for &b in bytes {
                self.0 = (self.0 << 8) | b as u64;
            }
        }

        fn write_u64(&mut self, n: u64) {
            self.0 = n;
        }
    }

    impl BuildHasher for IdentityBuildHasher {
        type Hasher = IdentityHasher;

        fn build_hasher(&self) -> IdentityHasher {
            IdentityHasher(0)
        }
    }

    fn identity_map(expected: usize, load_factor: usize) -> SplitOrderedMap<u64, u64, IdentityBuildHasher> {
        SplitOrderedMap::with_hasher(
            SplitMapConfig {
                expected_item_count: expected,
                load_factor,
                stat: true,
                ..Default::default()
            },
            IdentityBuildHasher,
        )
        .unwrap()
    }

    #[test]
    fn test_insert_contains_erase() {
        let map = identity_map(64, 1);
        assert!(map.insert(1, 10).unwrap());
        assert!(map.insert(2, 20).unwrap());
        assert!(!map.insert(1, 11).unwrap());
        assert!(map.contains(&1).unwrap());
        assert_eq!(map.len(), 2);
        assert!(map.erase(&1).unwrap());
        assert!(!map.erase(&1).unwrap());
        assert!(!map.contains(&1).unwrap());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_rejects_disabled_counter() {
        let result: Result<SplitOrderedMap<u64, u64>> = SplitOrderedMap::new(SplitMapConfig {
            counter: CounterKind::None,
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn test_real_ranks_follow_split_order() {
        // With four buckets and identity hashing, inserting hashes 0..8 must
        // lay the real nodes out in strictly increasing rank order equal to
        // the sorted reversed-bit ranks.
        let map = identity_map(4, 1);
        for h in 0u64..8 {
            assert!(map.insert(h, h).unwrap());
        }

        let real_ranks: Vec<u64> = map
            .raw_list_ranks()
            .into_iter()
            .filter(|(_, real)| *real)
            .map(|(rank, _)| rank)
            .collect();

        let mut expected: Vec<u64> = (0u64..8).map(|h| h.reverse_bits() | 1).collect();
        expected.sort_unstable();

        assert_eq!(real_ranks, expected);
        assert!(real_ranks.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_dummies_are_even_and_sorted() {
        let map = identity_map(8, 1);
        for h in 0u64..16 {
            assert!(map.insert(h, h).unwrap());
        }
        let ranks = map.raw_list_ranks();
        assert!(ranks.windows(2).all(|w| w[0].0 <= w[1].0));
        for (rank, real) in ranks {
            if real {
                assert_eq!(rank & 1, 1);
            } else {
                assert_eq!(rank & 1, 0);
            }
        }
    }

    #[test]
    fn test_bucket_growth_reaches_quiescent_capacity() {
        let map = identity_map(128, 1);
        assert_eq!(map.bucket_count(), 2);

        for k in 0u64..100 {
            assert!(map.insert(k, k).unwrap());
        }

        assert_eq!(map.len(), 100);
        // Smallest power of two holding 100 items at load factor 1.
        assert_eq!(map.bucket_count(), 128);
        for k in 0u64..100 {
            assert!(map.contains(&k).unwrap(), "key {k} lost after growth");
        }
    }

    #[test]
    fn test_growth_is_capped_by_max_capacity() {
        let map = identity_map(4, 1);
        for h in 0u64..32 {
            assert!(map.insert(h, h).unwrap());
        }
        assert_eq!(map.bucket_count(), 4);
        assert_eq!(map.len(), 32);
        for h in 0u64..32 {
            assert!(map.contains(&h).unwrap());
        }
    }

    #[test]
    fn test_static_table_starts_at_full_capacity() {
        let map: SplitOrderedMap<u64, u64, IdentityBuildHasher> = SplitOrderedMap::with_hasher(
            SplitMapConfig {
                expected_item_count: 64,
                load_factor: 1,
                dynamic_bucket_table: false,
                ..Default::default()
            },
            IdentityBuildHasher,
        )
        .unwrap();
        assert_eq!(map.bucket_count(), 64);
        for h in 0u64..64 {
            assert!(map.insert(h, h).unwrap());
        }
        assert_eq!(map.bucket_count(), 64);
    }

    #[test]
    fn test_last_bucket_parent_chain() {
        // Touching only the highest bucket initializes its whole parent
        // chain transitively down to bucket 0.
        let map = identity_map(8, 1);
        for _ in 0..5 {
            // Grow the index to its maximum first.
            for h in 0u64..16 {
                let _ = map.insert(h, h).unwrap();
            }
        }
        assert_eq!(map.bucket_count(), 8);
        assert!(map.insert(7 + 16, 0).unwrap());
        assert!(map.contains(&(7 + 16)).unwrap());
    }

    #[test]
    fn test_hash_collisions_coexist_on_key_order() {
        // Keys 1 and (1 | 1<<63) reverse to the same odd rank, colliding in
        // split order; the user key keeps them apart.
        let a = 1u64;
        let b = 1u64 | (1 << 63);
        assert_eq!(a.reverse_bits() | 1, b.reverse_bits() | 1);

        let map = identity_map(16, 1);
        assert!(map.insert(a, 100).unwrap());
        assert!(map.insert(b, 200).unwrap());
        assert!(!map.insert(a, 101).unwrap());

        let guard = smr::pin();
        assert_eq!(*map.get(&a, &guard).unwrap().unwrap().value(), 100);
        assert_eq!(*map.get(&b, &guard).unwrap().unwrap().value(), 200);

        assert!(map.erase(&a).unwrap());
        assert!(map.contains(&b).unwrap());
    }

    #[test]
    fn test_update_and_find() {
        let map = identity_map(16, 1);
        let (applied, inserted) = map.update(3, 30, true, |_, _| {}).unwrap();
        assert!(applied && inserted);

        let mut seen = None;
        let (applied, inserted) = map
            .update(3, 31, true, |old, new| seen = Some((*old, *new)))
            .unwrap();
        assert!(applied && !inserted);
        assert_eq!(seen, Some((30, 31)));

        let mut found = None;
        assert!(map.find(&3, |k, v| found = Some((*k, *v))).unwrap());
        assert_eq!(found, Some((3, 30)));
    }

    #[test]
    fn test_extract_then_reinsert_round_trip() {
        let map = identity_map(16, 1);
        assert!(map.insert(9, 90).unwrap());
        let extracted = map.extract(&9).unwrap().unwrap();
        assert_eq!((*extracted.key(), *extracted.value()), (9, 90));
        assert!(!map.contains(&9).unwrap());
        assert!(map.extract(&9).unwrap().is_none());

        assert!(map.insert(*extracted.key(), *extracted.value()).unwrap());
        assert!(map.contains(&9).unwrap());
    }

    #[test]
    fn test_unlink_requires_identity() {
        let map = identity_map(16, 1);
        assert!(map.insert(5, 50).unwrap());
        let guard = smr::pin();
        let entry = map.get(&5, &guard).unwrap().unwrap();
        assert!(map.erase(&5).unwrap());
        assert!(map.insert(5, 51).unwrap());
        assert!(!map.unlink(&entry).unwrap());
        assert!(map.contains(&5).unwrap());
    }

    #[test]
    fn test_iter_skips_dummies() {
        let map = identity_map(8, 1);
        for h in 0u64..12 {
            assert!(map.insert(h, h * 10).unwrap());
        }
        let guard = smr::pin();
        let mut keys: Vec<u64> = map.iter(&guard).map(|e| *e.key()).collect();
        keys.sort_unstable();
        assert_eq!(keys, (0u64..12).collect::<Vec<_>>());
    }

    #[test]
    fn test_is_empty_tracks_counter() {
        let map = identity_map(16, 1);
        assert!(map.is_empty());
        map.insert(1, 1).unwrap();
        assert!(!map.is_empty());
        map.erase(&1).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_set_wrapper() {
        let set: SplitOrderedSet<u64, IdentityBuildHasher> = SplitOrderedSet::with_hasher(
            SplitMapConfig::default(),
            IdentityBuildHasher,
        )
        .unwrap();
        assert!(set.insert(1).unwrap());
        assert!(!set.insert(1).unwrap());
        assert!(set.contains(&1).unwrap());
        assert_eq!(set.len(), 1);
        assert!(set.erase(&1).unwrap());
        assert!(set.is_empty());
    }

    #[test]
    fn test_stats_record_bucket_events() {
        let map = identity_map(16, 1);
        for h in 0u64..16 {
            map.insert(h, h).unwrap();
        }
        let stats = map.stats().unwrap();
        assert!(stats.bucket_count.get() >= 2);
        assert!(stats.table_grow.get() >= 1);
        assert_eq!(stats.insert_success.get(), 16);
    }
}
