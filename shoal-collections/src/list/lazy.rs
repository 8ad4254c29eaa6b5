//! Optimistic ordered linked list with per-node locks
//!
//! Readers traverse without any synchronization and decide membership from
//! the node's `marked` flag. Writers walk optimistically to the affected
//! `(pred, curr)` pair, lock both nodes in list order, validate that the
//! pair is still adjacent and unmarked, and only then mutate. Logical
//! deletion (setting `marked`) and physical unlinking happen in the same
//! critical section; reclamation is still deferred through [`crate::smr`]
//! because readers may hold references to an unlinked node.

use crossbeam::epoch::{self, Atomic, Guard, Owned, Shared};
use crossbeam::utils::Backoff;
use parking_lot::Mutex;
use shoal_core::{BackOffKind, MemoryModel, Result};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use crate::backoff;
use crate::config::ListConfig;
use crate::counter::ItemCounter;
use crate::smr;
use crate::stats::ListStats;

/// A node in the lazy list
///
/// `key` is `None` only for the head sentinel. `value` is `None` for the
/// sentinel and for the dummy nodes of the split-ordered table.
pub(crate) struct LazyNode<K, V> {
    pub(crate) key: Option<K>,
    pub(crate) value: Option<V>,
    pub(crate) lock: Mutex<()>,
    pub(crate) marked: AtomicBool,
    pub(crate) next: Atomic<LazyNode<K, V>>,
}

impl<K, V> LazyNode<K, V> {
    pub(crate) fn new(key: K, value: Option<V>) -> Self {
        Self {
            key: Some(key),
            value,
            lock: Mutex::new(()),
            marked: AtomicBool::new(false),
            next: Atomic::null(),
        }
    }

    pub(crate) fn sentinel() -> Self {
        Self {
            key: None,
            value: None,
            lock: Mutex::new(()),
            marked: AtomicBool::new(false),
            next: Atomic::null(),
        }
    }
}

/// Walks from `start` to the first node whose key is not below the target
///
/// Returns the `(pred, curr)` pair; `curr` is null when the walk ran off the
/// end. The walk takes no locks and may return a pair that is already stale;
/// writers validate under locks before acting on it.
pub(crate) fn search_from<'g, K, V, F>(
    start: &'g LazyNode<K, V>,
    cmp: F,
    guard: &'g Guard,
    mm: MemoryModel,
) -> (&'g LazyNode<K, V>, Shared<'g, LazyNode<K, V>>)
where
    F: Fn(&K) -> Ordering,
{
    let mut pred = start;
    let mut curr = pred.next.load(mm.load_order(), guard);

    while let Some(c) = unsafe { curr.as_ref() } {
        match cmp(c.key.as_ref().unwrap()) {
            Ordering::Less => {
                pred = c;
                curr = c.next.load(mm.load_order(), guard);
            }
            _ => break,
        }
    }

    (pred, curr)
}

/// Links `node` between `pred` and `curr` under locks
///
/// Validates that `pred` is unmarked and still points to `curr`, and that
/// `curr` (when present) is unmarked. Hands the node back on validation
/// failure so the caller can re-search.
pub(crate) fn try_insert<'g, K, V>(
    pred: &LazyNode<K, V>,
    curr: Shared<'g, LazyNode<K, V>>,
    node: Owned<LazyNode<K, V>>,
    guard: &'g Guard,
    mm: MemoryModel,
) -> std::result::Result<Shared<'g, LazyNode<K, V>>, Owned<LazyNode<K, V>>> {
    let _pred_lock = pred.lock.lock();
    let _curr_lock = unsafe { curr.as_ref() }.map(|c| c.lock.lock());

    if pred.marked.load(AtomicOrdering::Acquire) || pred.next.load(mm.load_order(), guard) != curr
    {
        return Err(node);
    }
    if let Some(c) = unsafe { curr.as_ref() } {
        if c.marked.load(AtomicOrdering::Acquire) {
            return Err(node);
        }
    }

    node.next.store(curr, AtomicOrdering::Relaxed);
    let inserted = node.into_shared(guard);
    pred.next.store(inserted, mm.store_order());
    Ok(inserted)
}

/// Marks and unlinks `curr` under locks
///
/// Validates the pair first. On success `f` runs between the logical mark
/// and the physical unlink, the node is retired, and a protected reference
/// to it is returned.
pub(crate) fn try_delete<'g, K, V, F>(
    pred: &LazyNode<K, V>,
    curr: Shared<'g, LazyNode<K, V>>,
    f: F,
    guard: &'g Guard,
    mm: MemoryModel,
) -> std::result::Result<&'g LazyNode<K, V>, F>
where
    F: FnOnce(&K, &V),
{
    let c = unsafe { curr.deref() };
    let _pred_lock = pred.lock.lock();
    let _curr_lock = c.lock.lock();

    if pred.marked.load(AtomicOrdering::Acquire)
        || c.marked.load(AtomicOrdering::Acquire)
        || pred.next.load(mm.load_order(), guard) != curr
    {
        return Err(f);
    }

    c.marked.store(true, mm.store_order());
    if let (Some(k), Some(v)) = (c.key.as_ref(), c.value.as_ref()) {
        f(k, v);
    }
    let succ = c.next.load(mm.load_order(), guard);
    pred.next.store(succ, mm.store_order());

    unsafe { smr::retire(guard, curr) };
    Ok(c)
}

/// A protected reference to a live lazy-list entry
pub struct Entry<'g, K, V> {
    pub(crate) node: &'g LazyNode<K, V>,
}

impl<'g, K, V> Entry<'g, K, V> {
    pub fn key(&self) -> &'g K {
        self.node.key.as_ref().unwrap()
    }

    pub fn value(&self) -> &'g V {
        self.node.value.as_ref().unwrap()
    }

    pub(crate) fn as_ptr(&self) -> *const LazyNode<K, V> {
        self.node as *const _
    }
}

/// An entry removed from the list, owned by the caller until dropped
pub struct ExtractedEntry<K, V> {
    _guard: Guard,
    node: *const LazyNode<K, V>,
}

impl<K, V> ExtractedEntry<K, V> {
    pub fn key(&self) -> &K {
        unsafe { (*self.node).key.as_ref().unwrap() }
    }

    pub fn value(&self) -> &V {
        unsafe { (*self.node).value.as_ref().unwrap() }
    }
}

/// A concurrent ordered list with optimistic traversal and per-node locks
///
/// Reads are wait-free on paths without concurrent deletions; writes block
/// only on the two nodes around the modification point. The API matches
/// [`MichaelList`](crate::MichaelList).
///
/// # Example
///
/// ```
/// use shoal_collections::{LazyList, ListConfig};
///
/// let list: LazyList<u32, &str> = LazyList::new(ListConfig::default()).unwrap();
/// assert!(list.insert(1, "one"));
/// assert!(list.contains(&1));
/// assert!(list.erase(&1));
/// ```
pub struct LazyList<K, V> {
    head: Box<LazyNode<K, V>>,
    counter: ItemCounter,
    stats: Option<Box<ListStats>>,
    memory_model: MemoryModel,
    back_off: BackOffKind,
}

impl<K, V> LazyList<K, V>
where
    K: Ord,
{
    /// Creates an empty list
    pub fn new(config: ListConfig) -> Result<Self> {
        smr::check_available_guards(2)?;
        Ok(Self {
            head: Box::new(LazyNode::sentinel()),
            counter: ItemCounter::new(config.counter),
            stats: config.stat.then(|| Box::new(ListStats::default())),
            memory_model: config.memory_model,
            back_off: config.back_off,
        })
    }

    #[inline]
    fn stat<F: FnOnce(&ListStats)>(&self, f: F) {
        if let Some(s) = &self.stats {
            f(s);
        }
    }

    /// Inserts `key → value` if the key is absent; returns `true` on
    /// insertion
    pub fn insert(&self, key: K, value: V) -> bool {
        self.insert_with(key, || value)
    }

    /// Inserts `key` with a value produced by `make`, if the key is absent
    ///
    /// `make` runs at most once, before the node is published.
    pub fn insert_with<F>(&self, key: K, make: F) -> bool
    where
        F: FnOnce() -> V,
    {
        let guard = smr::pin();
        let backoff = Backoff::new();
        let mut make = Some(make);
        let mut key_holder = Some(key);
        let mut node: Option<Owned<LazyNode<K, V>>> = None;

        loop {
            let key_ref = node
                .as_ref()
                .map(|n| n.key.as_ref().unwrap())
                .or(key_holder.as_ref())
                .unwrap();
            let (pred, curr) =
                search_from(&self.head, |k| k.cmp(key_ref), &guard, self.memory_model);

            if let Some(c) = unsafe { curr.as_ref() } {
                if c.key.as_ref().unwrap() == key_ref && !c.marked.load(AtomicOrdering::Acquire) {
                    self.stat(|s| s.insert_failed.inc());
                    return false;
                }
            }

            let pending = match node.take() {
                Some(n) => n,
                None => Owned::new(LazyNode::new(
                    key_holder.take().unwrap(),
                    Some(make.take().unwrap()()),
                )),
            };

            match try_insert(pred, curr, pending, &guard, self.memory_model) {
                Ok(_) => {
                    self.counter.inc();
                    self.stat(|s| s.insert_success.inc());
                    return true;
                }
                Err(returned) => {
                    node = Some(returned);
                    self.stat(|s| s.validation_failed.inc());
                    backoff::pause(self.back_off, &backoff);
                }
            }
        }
    }

    /// Inserts `key → value` if absent, or reports the existing entry
    ///
    /// Returns `(applied, inserted)` with the same meaning as
    /// [`MichaelList::update`](crate::MichaelList::update).
    pub fn update<F>(&self, key: K, value: V, allow_insert: bool, on_existing: F) -> (bool, bool)
    where
        F: FnOnce(&V, &V),
    {
        let guard = smr::pin();
        let backoff = Backoff::new();
        let mut on_existing = Some(on_existing);
        let mut key_holder = Some(key);
        let mut value_holder = Some(value);
        let mut node: Option<Owned<LazyNode<K, V>>> = None;

        loop {
            let key_ref = node
                .as_ref()
                .map(|n| n.key.as_ref().unwrap())
                .or(key_holder.as_ref())
                .unwrap();
            let (pred, curr) =
                search_from(&self.head, |k| k.cmp(key_ref), &guard, self.memory_model);

            if let Some(c) = unsafe { curr.as_ref() } {
                if c.key.as_ref().unwrap() == key_ref && !c.marked.load(AtomicOrdering::Acquire) {
                    let new_value = node
                        .as_ref()
                        .map(|n| n.value.as_ref().unwrap())
                        .or(value_holder.as_ref())
                        .unwrap();
                    on_existing.take().unwrap()(c.value.as_ref().unwrap(), new_value);
                    self.stat(|s| s.update_existing.inc());
                    return (true, false);
                }
            }

            if !allow_insert {
                return (false, false);
            }

            let pending = match node.take() {
                Some(n) => n,
                None => Owned::new(LazyNode::new(
                    key_holder.take().unwrap(),
                    Some(value_holder.take().unwrap()),
                )),
            };

            match try_insert(pred, curr, pending, &guard, self.memory_model) {
                Ok(_) => {
                    self.counter.inc();
                    self.stat(|s| s.update_new.inc());
                    return (true, true);
                }
                Err(returned) => {
                    node = Some(returned);
                    self.stat(|s| s.validation_failed.inc());
                    backoff::pause(self.back_off, &backoff);
                }
            }
        }
    }

    /// Erases the entry for `key`; returns `true` if this call removed it
    pub fn erase(&self, key: &K) -> bool {
        self.erase_with(key, |_, _| {})
    }

    /// Erases the entry for `key`, running `f` between logical and physical
    /// deletion
    pub fn erase_with<F>(&self, key: &K, f: F) -> bool
    where
        F: FnOnce(&K, &V),
    {
        let guard = smr::pin();
        let backoff = Backoff::new();
        let mut f = Some(f);

        loop {
            let (pred, curr) = search_from(&self.head, |k| k.cmp(key), &guard, self.memory_model);

            let found = matches!(
                unsafe { curr.as_ref() },
                Some(c) if c.key.as_ref().unwrap() == key && !c.marked.load(AtomicOrdering::Acquire)
            );
            if !found {
                self.stat(|s| s.erase_failed.inc());
                return false;
            }

            match try_delete(pred, curr, f.take().unwrap(), &guard, self.memory_model) {
                Ok(_) => {
                    self.counter.dec();
                    self.stat(|s| s.erase_success.inc());
                    return true;
                }
                Err(returned) => {
                    f = Some(returned);
                    self.stat(|s| s.validation_failed.inc());
                    backoff::pause(self.back_off, &backoff);
                }
            }
        }
    }

    /// Erases the entry only if it is the exact node behind `entry`
    pub fn unlink(&self, entry: &Entry<'_, K, V>) -> bool {
        let guard = smr::pin();
        let backoff = Backoff::new();
        let target = entry.as_ptr();

        loop {
            let (pred, curr) =
                search_from(&self.head, |k| k.cmp(entry.key()), &guard, self.memory_model);

            if curr.as_raw() != target {
                self.stat(|s| s.erase_failed.inc());
                return false;
            }

            match try_delete(pred, curr, |_, _| {}, &guard, self.memory_model) {
                Ok(_) => {
                    self.counter.dec();
                    self.stat(|s| s.erase_success.inc());
                    return true;
                }
                Err(_) => {
                    self.stat(|s| s.validation_failed.inc());
                    backoff::pause(self.back_off, &backoff);
                }
            }
        }
    }

    /// Erases the entry for `key` and hands it to the caller
    pub fn extract(&self, key: &K) -> Option<ExtractedEntry<K, V>> {
        let guard = smr::pin();
        let backoff = Backoff::new();
        let node_ptr;

        loop {
            let (pred, curr) = search_from(&self.head, |k| k.cmp(key), &guard, self.memory_model);

            let found = matches!(
                unsafe { curr.as_ref() },
                Some(c) if c.key.as_ref().unwrap() == key && !c.marked.load(AtomicOrdering::Acquire)
            );
            if !found {
                self.stat(|s| s.extract_failed.inc());
                return None;
            }

            match try_delete(pred, curr, |_, _| {}, &guard, self.memory_model) {
                Ok(node) => {
                    node_ptr = node as *const LazyNode<K, V>;
                    break;
                }
                Err(_) => {
                    self.stat(|s| s.validation_failed.inc());
                    backoff::pause(self.back_off, &backoff);
                }
            }
        }

        self.counter.dec();
        self.stat(|s| s.extract_success.inc());
        Some(ExtractedEntry {
            _guard: guard,
            node: node_ptr,
        })
    }

    /// Returns `true` if `key` is present
    ///
    /// Wait-free when no deletion is in flight on the search path.
    pub fn contains(&self, key: &K) -> bool {
        let guard = smr::pin();
        let (_, curr) = search_from(&self.head, |k| k.cmp(key), &guard, self.memory_model);
        let found = matches!(
            unsafe { curr.as_ref() },
            Some(c) if c.key.as_ref().unwrap() == key && !c.marked.load(AtomicOrdering::Acquire)
        );
        self.stat(|s| {
            if found {
                s.find_success.inc()
            } else {
                s.find_failed.inc()
            }
        });
        found
    }

    /// Runs `f` on the entry for `key` under guard protection
    pub fn find<F>(&self, key: &K, f: F) -> bool
    where
        F: FnOnce(&K, &V),
    {
        let guard = smr::pin();
        match self.get(key, &guard) {
            Some(entry) => {
                f(entry.key(), entry.value());
                true
            }
            None => false,
        }
    }

    /// Returns a protected reference to the entry for `key`
    pub fn get<'g>(&'g self, key: &K, guard: &'g Guard) -> Option<Entry<'g, K, V>> {
        let (_, curr) = search_from(&self.head, |k| k.cmp(key), guard, self.memory_model);
        match unsafe { curr.as_ref() } {
            Some(c) if c.key.as_ref().unwrap() == key && !c.marked.load(AtomicOrdering::Acquire) => {
                self.stat(|s| s.find_success.inc());
                Some(Entry { node: c })
            }
            _ => {
                self.stat(|s| s.find_failed.inc());
                None
            }
        }
    }

    /// Returns a best-effort forward iterator over unmarked entries
    pub fn iter<'g>(&'g self, guard: &'g Guard) -> Iter<'g, K, V> {
        Iter {
            curr: self.head.next.load(self.memory_model.load_order(), guard),
            guard,
            memory_model: self.memory_model,
        }
    }

    /// Number of live entries (0 if counting is disabled)
    pub fn len(&self) -> usize {
        self.counter.get()
    }

    /// Returns `true` if the list holds no entries
    pub fn is_empty(&self) -> bool {
        let guard = smr::pin();
        self.head
            .next
            .load(self.memory_model.load_order(), &guard)
            .is_null()
    }

    /// Internal statistics, when enabled at construction
    pub fn stats(&self) -> Option<&ListStats> {
        self.stats.as_deref()
    }
}

/// Best-effort iterator over the live entries of a [`LazyList`]
pub struct Iter<'g, K, V> {
    curr: Shared<'g, LazyNode<K, V>>,
    guard: &'g Guard,
    memory_model: MemoryModel,
}

impl<'g, K, V> Iterator for Iter<'g, K, V> {
    type Item = Entry<'g, K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = unsafe { self.curr.as_ref() } {
            self.curr = node.next.load(self.memory_model.load_order(), self.guard);
            if !node.marked.load(AtomicOrdering::Acquire) {
                return Some(Entry { node });
            }
        }
        None
    }
}

impl<K, V> Drop for LazyList<K, V> {
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
