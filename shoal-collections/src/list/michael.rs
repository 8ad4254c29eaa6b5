//! Lock-free ordered linked list
//!
//! The list keeps its nodes sorted by key. A traversal walks `(prev, curr)`
//! pairs where `prev` is the atomic slot that points to `curr`; when it
//! encounters a node whose outgoing pointer carries the deletion tag it
//! unlinks that node on behalf of the deleter before moving on. Insertion is
//! a single CAS at `prev`; deletion tags the victim's own `next` pointer
//! first (the linearization point) and then attempts the physical unlink,
//! leaving it to future traversals if the CAS fails.

use crossbeam::epoch::{self, Atomic, Guard, Owned, Shared};
use crossbeam::utils::Backoff;
use shoal_core::{MemoryModel, Result};
use std::cmp::Ordering;
use std::sync::atomic::Ordering as AtomicOrdering;

use crate::backoff;
use crate::config::ListConfig;
use crate::counter::ItemCounter;
use crate::smr;
use crate::stats::ListStats;
use shoal_core::BackOffKind;

/// A node in the ordered list
///
/// The low tag bit of `next` is the logical-deletion mark of this node.
pub(crate) struct Node<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) next: Atomic<Node<K, V>>,
}

impl<K, V> Node<K, V> {
    pub(crate) fn new(key: K, value: V) -> Self {
        Self {
            key,
            value,
            next: Atomic::null(),
        }
    }
}

/// The traversal snapshot went stale; restart from the anchor
pub(crate) struct Retry;

/// A `(prev, curr)` traversal position
///
/// `prev` is the atomic slot pointing to `curr`; `curr` is unmarked at the
/// time it was loaded. Positions anchor either at the list head or at a
/// bucket dummy node of the split-ordered table.
pub(crate) struct Cursor<'g, K, V> {
    prev: &'g Atomic<Node<K, V>>,
    curr: Shared<'g, Node<K, V>>,
}

impl<'g, K, V> Cursor<'g, K, V> {
    pub(crate) fn from_head(
        head: &'g Atomic<Node<K, V>>,
        guard: &'g Guard,
        mm: MemoryModel,
    ) -> Self {
        Self {
            prev: head,
            curr: head.load(mm.load_order(), guard),
        }
    }

    /// Anchors the cursor just past `node`, which must never be deleted
    /// while the cursor is live (bucket dummies qualify)
    pub(crate) fn from_node(node: &'g Node<K, V>, guard: &'g Guard, mm: MemoryModel) -> Self {
        Self {
            prev: &node.next,
            curr: node.next.load(mm.load_order(), guard),
        }
    }

    pub(crate) fn curr(&self) -> Shared<'g, Node<K, V>> {
        self.curr
    }

    /// Advances the cursor to the first node whose key is not below the
    /// target described by `cmp`
    ///
    /// `cmp` receives a node key and returns its ordering relative to the
    /// target. Marked nodes encountered on the way are unlinked and retired;
    /// if the unlink CAS fails the snapshot is stale and the caller restarts
    /// from its anchor.
    ///
    /// Returns `Ok(true)` when the target key is present (the cursor stops
    /// on it), `Ok(false)` when absent (the cursor stops on the insert
    /// position).
    pub(crate) fn find_by<F>(
        &mut self,
        cmp: F,
        guard: &'g Guard,
        mm: MemoryModel,
    ) -> std::result::Result<bool, Retry>
    where
        F: Fn(&K) -> Ordering,
    {
        loop {
            let Some(curr_node) = (unsafe { self.curr.as_ref() }) else {
                return Ok(false);
            };

            let next = curr_node.next.load(mm.load_order(), guard);
            if next.tag() != 0 {
                // curr is logically deleted: unlink it on the deleter's
                // behalf, or restart if prev moved under us
                let succ = next.with_tag(0);
                match self
                    .prev
                    .compare_exchange(self.curr, succ, mm.rmw_order(), mm.failure_order(), guard)
                {
                    Ok(_) => {
                        unsafe { smr::retire(guard, self.curr) };
                        self.curr = succ;
                        continue;
                    }
                    Err(_) => return Err(Retry),
                }
            }

            match cmp(&curr_node.key) {
                Ordering::Less => {
                    self.prev = &curr_node.next;
                    self.curr = next;
                }
                Ordering::Equal => return Ok(true),
                Ordering::Greater => return Ok(false),
            }
        }
    }

    /// Links `node` in front of the cursor position
    ///
    /// On success the cursor rests on the new node. On CAS failure the node
    /// is handed back and the caller re-searches.
    pub(crate) fn insert(
        &mut self,
        node: Owned<Node<K, V>>,
        guard: &'g Guard,
        mm: MemoryModel,
    ) -> std::result::Result<(), Owned<Node<K, V>>> {
        node.next.store(self.curr, AtomicOrdering::Relaxed);
        match self
            .prev
            .compare_exchange(self.curr, node, mm.store_order(), mm.failure_order(), guard)
        {
            Ok(inserted) => {
                self.curr = inserted;
                Ok(())
            }
            Err(e) => Err(e.new),
        }
    }

    /// Logically deletes the node under the cursor
    ///
    /// Tags the node's own `next` pointer; exactly one thread wins the tag.
    /// The winner runs `f` between logical and physical deletion, attempts
    /// the unlink at `prev` (failure is benign; a later traversal finishes
    /// the job) and retires the node. Losers get their callback handed back
    /// and re-search.
    pub(crate) fn delete<F>(
        &mut self,
        f: F,
        guard: &'g Guard,
        mm: MemoryModel,
    ) -> std::result::Result<&'g Node<K, V>, F>
    where
        F: FnOnce(&K, &V),
    {
        let Some(curr_node) = (unsafe { self.curr.as_ref() }) else {
            return Err(f);
        };

        let succ = curr_node.next.fetch_or(1, mm.rmw_order(), guard);
        if succ.tag() != 0 {
            return Err(f);
        }

        f(&curr_node.key, &curr_node.value);

        if self
            .prev
            .compare_exchange(self.curr, succ, mm.rmw_order(), mm.failure_order(), guard)
            .is_ok()
        {
            unsafe { smr::retire(guard, self.curr) };
        }

        Ok(curr_node)
    }
}

/// A protected reference to a live list entry
///
/// Valid for the lifetime of the guard it was obtained under. The entry may
/// be concurrently deleted; the reference stays readable regardless.
pub struct Entry<'g, K, V> {
    pub(crate) node: &'g Node<K, V>,
}

impl<'g, K, V> Entry<'g, K, V> {
    pub fn key(&self) -> &'g K {
        &self.node.key
    }

    pub fn value(&self) -> &'g V {
        &self.node.value
    }

    pub(crate) fn as_ptr(&self) -> *const Node<K, V> {
        self.node as *const _
    }
}

/// An entry removed from the list, owned by the caller until dropped
///
/// Holds its own read section open, so the underlying node stays readable
/// even though it has already been retired.
pub struct ExtractedEntry<K, V> {
    _guard: Guard,
    node: *const Node<K, V>,
}

impl<K, V> ExtractedEntry<K, V> {
    pub fn key(&self) -> &K {
        unsafe { &(*self.node).key }
    }

    pub fn value(&self) -> &V {
        unsafe { &(*self.node).value }
    }
}

/// A lock-free concurrent ordered list (Michael's algorithm)
///
/// Keys are unique and kept in ascending order. All operations are
/// lock-free: contention is absorbed by bounded internal retries and every
/// traversal helps complete the physical unlinking of nodes that other
/// threads have logically deleted.
///
/// # Thread Safety
///
/// All operations take `&self` and may be called from any number of threads
/// concurrently. A logically deleted node is never exposed to user code.
///
/// # Example
///
/// ```
/// use shoal_collections::{MichaelList, ListConfig};
///
/// let list: MichaelList<u32, &str> = MichaelList::new(ListConfig::default()).unwrap();
/// assert!(list.insert(2, "two"));
/// assert!(list.insert(1, "one"));
/// assert!(!list.insert(2, "again"));
/// assert!(list.contains(&1));
/// assert!(list.erase(&1));
/// assert!(!list.contains(&1));
/// ```
pub struct MichaelList<K, V> {
    head: Atomic<Node<K, V>>,
    counter: ItemCounter,
    stats: Option<Box<ListStats>>,
    memory_model: MemoryModel,
    back_off: BackOffKind,
}

impl<K, V> MichaelList<K, V>
where
    K: Ord,
{
    /// Creates an empty list
    ///
    /// # Errors
    ///
    /// Returns [`shoal_core::Error::GuardExhausted`] if the reclamation
    /// scheme cannot provide the three guards a traversal needs.
    pub fn new(config: ListConfig) -> Result<Self> {
        smr::check_available_guards(3)?;
        Ok(Self {
            head: Atomic::null(),
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

    fn cursor<'g>(&'g self, guard: &'g Guard) -> Cursor<'g, K, V> {
        Cursor::from_head(&self.head, guard, self.memory_model)
    }

    /// Inserts `key → value` if the key is absent; returns `true` on
    /// insertion
    pub fn insert(&self, key: K, value: V) -> bool {
        let guard = smr::pin();
        let backoff = Backoff::new();
        let mut node = Owned::new(Node::new(key, value));

        loop {
            let mut cursor = self.cursor(&guard);
            let found = match cursor.find_by(|k| k.cmp(&node.key), &guard, self.memory_model) {
                Ok(found) => found,
                Err(Retry) => {
                    self.stat(|s| s.search_retries.inc());
                    backoff::pause(self.back_off, &backoff);
                    continue;
                }
            };

            if found {
                self.stat(|s| s.insert_failed.inc());
                return false;
            }

            match cursor.insert(node, &guard, self.memory_model) {
                Ok(()) => {
                    self.counter.inc();
                    self.stat(|s| s.insert_success.inc());
                    return true;
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
    /// and before the node is published; it must not touch the list.
    pub fn insert_with<F>(&self, key: K, make: F) -> bool
    where
        F: FnOnce() -> V,
    {
        let guard = smr::pin();
        let backoff = Backoff::new();
        let mut make = Some(make);
        let mut key_holder = Some(key);
        let mut node: Option<Owned<Node<K, V>>> = None;

        loop {
            let mut cursor = self.cursor(&guard);
            let found = {
                let key_ref = node
                    .as_ref()
                    .map(|n| &n.key)
                    .or(key_holder.as_ref())
                    .unwrap();
                match cursor.find_by(|k| k.cmp(key_ref), &guard, self.memory_model) {
                    Ok(found) => found,
                    Err(Retry) => {
                        self.stat(|s| s.search_retries.inc());
                        backoff::pause(self.back_off, &backoff);
                        continue;
                    }
                }
            };

            if found {
                self.stat(|s| s.insert_failed.inc());
                return false;
            }

            let pending = match node.take() {
                Some(n) => n,
                None => Owned::new(Node::new(key_holder.take().unwrap(), make.take().unwrap()())),
            };

            match cursor.insert(pending, &guard, self.memory_model) {
                Ok(()) => {
                    self.counter.inc();
                    self.stat(|s| s.insert_success.inc());
                    return true;
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
    /// When the key is present, `on_existing` observes the live value and
    /// the rejected new value under guard protection. Returns
    /// `(applied, inserted)`: `(true, true)` on insertion, `(true, false)`
    /// when an existing entry was observed, `(false, false)` when the key
    /// was absent and `allow_insert` was false.
    pub fn update<F>(&self, key: K, value: V, allow_insert: bool, on_existing: F) -> (bool, bool)
    where
        F: FnOnce(&V, &V),
    {
        let guard = smr::pin();
        let backoff = Backoff::new();
        let mut on_existing = Some(on_existing);
        let mut key_holder = Some(key);
        let mut value_holder = Some(value);
        let mut node: Option<Owned<Node<K, V>>> = None;

        loop {
            let mut cursor = self.cursor(&guard);
            let key_ref = node
                .as_ref()
                .map(|n| &n.key)
                .or(key_holder.as_ref())
                .unwrap();
            let found = match cursor.find_by(|k| k.cmp(key_ref), &guard, self.memory_model) {
                Ok(found) => found,
                Err(Retry) => {
                    self.stat(|s| s.search_retries.inc());
                    backoff::pause(self.back_off, &backoff);
                    continue;
                }
            };

            if found {
                let existing = unsafe { cursor.curr().deref() };
                let new_value = node
                    .as_ref()
                    .map(|n| &n.value)
                    .or(value_holder.as_ref())
                    .unwrap();
                on_existing.take().unwrap()(&existing.value, new_value);
                self.stat(|s| s.update_existing.inc());
                return (true, false);
            }

            if !allow_insert {
                return (false, false);
            }

            let pending = match node.take() {
                Some(n) => n,
                None => Owned::new(Node::new(
                    key_holder.take().unwrap(),
                    value_holder.take().unwrap(),
                )),
            };

            match cursor.insert(pending, &guard, self.memory_model) {
                Ok(()) => {
                    self.counter.inc();
                    self.stat(|s| s.update_new.inc());
                    return (true, true);
                }
                Err(returned) => {
                    node = Some(returned);
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
            let mut cursor = self.cursor(&guard);
            let found = match cursor.find_by(|k| k.cmp(key), &guard, self.memory_model) {
                Ok(found) => found,
                Err(Retry) => {
                    self.stat(|s| s.search_retries.inc());
                    backoff::pause(self.back_off, &backoff);
                    continue;
                }
            };

            if !found {
                self.stat(|s| s.erase_failed.inc());
                return false;
            }

            match cursor.delete(f.take().unwrap(), &guard, self.memory_model) {
                Ok(_) => {
                    self.counter.dec();
                    self.stat(|s| s.erase_success.inc());
                    return true;
                }
                Err(returned) => {
                    // Lost the marking race; re-search (the winner's victim
                    // will no longer be found)
                    f = Some(returned);
                    backoff::pause(self.back_off, &backoff);
                }
            }
        }
    }

    /// Erases the entry only if it is the exact node behind `entry`
    ///
    /// Fails when the key has been removed and re-inserted since `entry`
    /// was obtained, even though an equal key is present.
    pub fn unlink(&self, entry: &Entry<'_, K, V>) -> bool {
        let guard = smr::pin();
        let backoff = Backoff::new();
        let target = entry.as_ptr();

        loop {
            let mut cursor = self.cursor(&guard);
            let found = match cursor.find_by(|k| k.cmp(entry.key()), &guard, self.memory_model) {
                Ok(found) => found,
                Err(Retry) => {
                    self.stat(|s| s.search_retries.inc());
                    backoff::pause(self.back_off, &backoff);
                    continue;
                }
            };

            if !found || cursor.curr().as_raw() != target {
                self.stat(|s| s.erase_failed.inc());
                return false;
            }

            match cursor.delete(|_, _| {}, &guard, self.memory_model) {
                Ok(_) => {
                    self.counter.dec();
                    self.stat(|s| s.erase_success.inc());
                    return true;
                }
                Err(_) => backoff::pause(self.back_off, &backoff),
            }
        }
    }

    /// Erases the entry for `key` and hands it to the caller
    ///
    /// The returned entry keeps its own read section open; the node is
    /// reclaimed after the entry is dropped.
    pub fn extract(&self, key: &K) -> Option<ExtractedEntry<K, V>> {
        let guard = smr::pin();
        let backoff = Backoff::new();
        let node_ptr;

        loop {
            let mut cursor = self.cursor(&guard);
            let found = match cursor.find_by(|k| k.cmp(key), &guard, self.memory_model) {
                Ok(found) => found,
                Err(Retry) => {
                    self.stat(|s| s.search_retries.inc());
                    backoff::pause(self.back_off, &backoff);
                    continue;
                }
            };

            if !found {
                self.stat(|s| s.extract_failed.inc());
                return None;
            }

            match cursor.delete(|_, _| {}, &guard, self.memory_model) {
                Ok(node) => {
                    node_ptr = node as *const Node<K, V>;
                    break;
                }
                Err(_) => backoff::pause(self.back_off, &backoff),
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
    pub fn contains(&self, key: &K) -> bool {
        let guard = smr::pin();
        let backoff = Backoff::new();

        loop {
            let mut cursor = self.cursor(&guard);
            match cursor.find_by(|k| k.cmp(key), &guard, self.memory_model) {
                Ok(found) => {
                    self.stat(|s| {
                        if found {
                            s.find_success.inc()
                        } else {
                            s.find_failed.inc()
                        }
                    });
                    return found;
                }
                Err(Retry) => {
                    self.stat(|s| s.search_retries.inc());
                    backoff::pause(self.back_off, &backoff);
                }
            }
        }
    }

    /// Runs `f` on the entry for `key` under guard protection
    pub fn find<F>(&self, key: &K, f: F) -> bool
    where
        F: FnOnce(&K, &V),
    {
        let guard = smr::pin();
        let backoff = Backoff::new();

        loop {
            let mut cursor = self.cursor(&guard);
            match cursor.find_by(|k| k.cmp(key), &guard, self.memory_model) {
                Ok(true) => {
                    let node = unsafe { cursor.curr().deref() };
                    f(&node.key, &node.value);
                    self.stat(|s| s.find_success.inc());
                    return true;
                }
                Ok(false) => {
                    self.stat(|s| s.find_failed.inc());
                    return false;
                }
                Err(Retry) => {
                    self.stat(|s| s.search_retries.inc());
                    backoff::pause(self.back_off, &backoff);
                }
            }
        }
    }

    /// Returns a protected reference to the entry for `key`
    pub fn get<'g>(&'g self, key: &K, guard: &'g Guard) -> Option<Entry<'g, K, V>> {
        let backoff = Backoff::new();

        loop {
            let mut cursor = Cursor::from_head(&self.head, guard, self.memory_model);
            match cursor.find_by(|k| k.cmp(key), guard, self.memory_model) {
                Ok(true) => {
                    let node = unsafe { cursor.curr().deref() };
                    self.stat(|s| s.find_success.inc());
                    return Some(Entry { node });
                }
                Ok(false) => {
                    self.stat(|s| s.find_failed.inc());
                    return None;
                }
                Err(Retry) => {
                    self.stat(|s| s.search_retries.inc());
                    backoff::pause(self.back_off, &backoff);
                }
            }
        }
    }

    /// Returns a best-effort forward iterator
    ///
    /// The iterator skips logically deleted nodes. It may miss entries
    /// inserted concurrently and provides no snapshot semantics.
    pub fn iter<'g>(&'g self, guard: &'g Guard) -> Iter<'g, K, V> {
        Iter {
            curr: self.head.load(self.memory_model.load_order(), guard),
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
            .load(self.memory_model.load_order(), &guard)
            .is_null()
    }

    /// Internal statistics, when enabled at construction
    pub fn stats(&self) -> Option<&ListStats> {
        self.stats.as_deref()
    }
}

/// Best-effort iterator over the live entries of a [`MichaelList`]
pub struct Iter<'g, K, V> {
    curr: Shared<'g, Node<K, V>>,
    guard: &'g Guard,
    memory_model: MemoryModel,
}

impl<'g, K, V> Iterator for Iter<'g, K, V> {
    type Item = Entry<'g, K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = unsafe { self.curr.as_ref() } {
            let next = node.next.load(self.memory_model.load_order(), self.guard);
            self.curr = next.with_tag(0);
            if next.tag() == 0 {
                return Some(Entry { node });
            }
        }
        None
    }
}

impl<K, V> Drop for MichaelList<K, V> {
    fn drop(&mut self) {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn new_list() -> MichaelList<i64, i64> {
        MichaelList::new(ListConfig {
            stat: true,
            ..Default::default()
        })
        .unwrap()
    }

    fn keys(list: &MichaelList<i64, i64>) -> Vec<i64> {
        let guard = smr::pin();
        list.iter(&guard).map(|e| *e.key()).collect()
    }

    #[test]
    fn test_insert_orders_keys() {
        let list = new_list();
        assert!(list.insert(10, 100));
        assert!(list.insert(5, 50));
        assert!(list.insert(20, 200));
        assert_eq!(keys(&list), vec![5, 10, 20]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_erase_then_erase_again() {
        let list = new_list();
        for k in [10, 5, 20] {
            assert!(list.insert(k, k));
        }
        assert!(list.erase(&10));
        assert_eq!(keys(&list), vec![5, 20]);
        assert!(!list.erase(&10));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_duplicate_insert_fails() {
        let list = new_list();
        assert!(list.insert(7, 1));
        assert!(!list.insert(7, 2));
        let guard = smr::pin();
        assert_eq!(*list.get(&7, &guard).unwrap().value(), 1);
    }

    #[test]
    fn test_boundary_keys() {
        let list = new_list();
        assert!(list.insert(i64::MIN, 0));
        assert!(list.insert(i64::MAX, 1));
        assert!(list.insert(0, 2));
        assert_eq!(keys(&list), vec![i64::MIN, 0, i64::MAX]);
    }

    #[test]
    fn test_insert_with_is_lazy() {
        let list = new_list();
        assert!(list.insert(1, 10));
        let mut called = false;
        assert!(!list.insert_with(1, || {
            called = true;
            99
        }));
        assert!(!called);
        assert!(list.insert_with(2, || 20));
        let guard = smr::pin();
        assert_eq!(*list.get(&2, &guard).unwrap().value(), 20);
    }

    #[test]
    fn test_update_observes_existing() {
        let list = new_list();
        let (applied, inserted) = list.update(3, 30, true, |_, _| {});
        assert!(applied && inserted);

        let mut seen = None;
        let (applied, inserted) = list.update(3, 31, true, |existing, new| {
            seen = Some((*existing, *new));
        });
        assert!(applied && !inserted);
        assert_eq!(seen, Some((30, 31)));

        let (applied, inserted) = list.update(4, 40, false, |_, _| {});
        assert!(!applied && !inserted);
        assert!(!list.contains(&4));
    }

    #[test]
    fn test_extract_then_reinsert() {
        let list = new_list();
        assert!(list.insert(5, 55));
        let extracted = list.extract(&5).unwrap();
        assert_eq!(*extracted.key(), 5);
        assert_eq!(*extracted.value(), 55);
        assert!(!list.contains(&5));
        assert!(list.extract(&5).is_none());

        assert!(list.insert(*extracted.key(), *extracted.value()));
        assert!(list.contains(&5));
    }

    #[test]
    fn test_unlink_requires_identity() {
        let list = new_list();
        assert!(list.insert(9, 90));

        let guard = smr::pin();
        let entry = list.get(&9, &guard).unwrap();
        // Same key, different node: unlink must fail.
        assert!(list.erase(&9));
        assert!(list.insert(9, 91));
        assert!(!list.unlink(&entry));
        assert!(list.contains(&9));

        let entry = list.get(&9, &guard).unwrap();
        assert!(list.unlink(&entry));
        assert!(!list.contains(&9));
    }

    #[test]
    fn test_erase_with_callback_sees_entry() {
        let list = new_list();
        assert!(list.insert(1, 11));
        let mut seen = None;
        assert!(list.erase_with(&1, |k, v| seen = Some((*k, *v))));
        assert_eq!(seen, Some((1, 11)));
    }

    #[test]
    fn test_iterator_skips_deleted() {
        let list = new_list();
        for k in 0..10 {
            list.insert(k, k);
        }
        for k in (0..10).step_by(2) {
            assert!(list.erase(&k));
        }
        assert_eq!(keys(&list), vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn test_stats_count_events() {
        let list = new_list();
        list.insert(1, 1);
        list.insert(1, 1);
        list.erase(&1);
        list.erase(&1);
        let stats = list.stats().unwrap();
        assert_eq!(stats.insert_success.get(), 1);
        assert_eq!(stats.insert_failed.get(), 1);
        assert_eq!(stats.erase_success.get(), 1);
        assert_eq!(stats.erase_failed.get(), 1);
    }
}
