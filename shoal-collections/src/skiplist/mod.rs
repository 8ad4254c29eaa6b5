//! Lock-free skip-list ordered set
//!
//! Each node carries a tower of atomic next-pointers; the tower height is
//! drawn from a geometric distribution at creation. The low tag bit of every
//! tower level is that level's logical-deletion mark. Deletion marks the
//! tower top-down; level 0 is marked last and is the commit point exactly
//! one thread can win. Physical unlinking is shared work: every traversal
//! unlinks marked nodes it encounters, and each node tracks how many of its
//! levels still await unlinking so that whichever thread accounts the last
//! level retires the node.

use crossbeam::epoch::{self, Atomic, Guard, Owned, Shared};
use crossbeam::utils::Backoff;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shoal_core::{BackOffKind, MemoryModel, Result};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use crate::backoff;
use crate::config::SkipListConfig;
use crate::counter::ItemCounter;
use crate::smr;
use crate::stats::SkipListStats;

/// Maximum tower height; the head sentinel always has this height
pub const MAX_HEIGHT: usize = 32;

struct SkipNode<K> {
    key: K,
    height: usize,
    /// Levels of this tower not yet physically unlinked. Whoever accounts
    /// the last level retires the node; an aborted insert accounts the
    /// levels it never linked.
    unlinked: AtomicUsize,
    tower: Vec<Atomic<SkipNode<K>>>,
}

impl<K> SkipNode<K> {
    fn new(key: K, height: usize) -> Self {
        let mut tower = Vec::with_capacity(height);
        for _ in 0..height {
            tower.push(Atomic::null());
        }
        Self {
            key,
            height,
            unlinked: AtomicUsize::new(height),
            tower,
        }
    }

    /// Accounts `n` levels as unlinked; returns `true` when this call
    /// accounted the last pending level
    fn levels_unlinked(&self, n: usize) -> bool {
        self.unlinked.fetch_sub(n, AtomicOrdering::AcqRel) == n
    }
}

/// Per-level `(pred-slot, succ)` snapshot collected by a position search
struct Position<'g, K> {
    preds: Vec<&'g Atomic<SkipNode<K>>>,
    succs: Vec<Shared<'g, SkipNode<K>>>,
}

impl<'g, K> Position<'g, K> {
    fn new(set: &'g SkipListSet<K>) -> Self {
        Self {
            preds: (0..MAX_HEIGHT).map(|i| &set.head[i]).collect(),
            succs: vec![Shared::null(); MAX_HEIGHT],
        }
    }

    fn reset(&mut self, set: &'g SkipListSet<K>) {
        for (i, pred) in self.preds.iter_mut().enumerate() {
            *pred = &set.head[i];
        }
        for succ in self.succs.iter_mut() {
            *succ = Shared::null();
        }
    }
}

enum Fastpath<'g, K> {
    Found(Shared<'g, SkipNode<K>>),
    NotFound,
    Abort,
}

/// A protected reference to a live skip-list entry
pub struct Entry<'g, K> {
    node: &'g SkipNode<K>,
}

impl<'g, K> Entry<'g, K> {
    pub fn key(&self) -> &'g K {
        &self.node.key
    }
}

/// A lock-free concurrent ordered set backed by a skip-list
///
/// Expected O(log n) insertion, removal and lookup. All operations are
/// lock-free; traversals complete the physical unlinking of nodes other
/// threads have logically deleted.
///
/// # Thread Safety
///
/// All operations take `&self` and may run from any number of threads. An
/// iterator is best-effort: it skips logically deleted nodes and may miss
/// concurrent insertions.
///
/// # Example
///
/// ```
/// use shoal_collections::{SkipListSet, SkipListConfig};
///
/// let set: SkipListSet<u64> = SkipListSet::new(SkipListConfig::default()).unwrap();
/// assert!(set.insert(3));
/// assert!(set.insert(1));
/// assert!(!set.insert(3));
///
/// let guard = shoal_collections::smr::pin();
/// assert_eq!(set.extract_min(&guard), Some(&1));
/// ```
pub struct SkipListSet<K> {
    head: Box<[Atomic<SkipNode<K>>]>,
    /// Estimated current height, maintained for fast search entry
    height: AtomicUsize,
    counter: ItemCounter,
    stats: Option<Box<SkipListStats>>,
    memory_model: MemoryModel,
    back_off: BackOffKind,
    branching: u32,
    rng: Mutex<StdRng>,
}

impl<K> SkipListSet<K>
where
    K: Ord,
{
    /// Creates an empty set
    ///
    /// # Errors
    ///
    /// Returns [`shoal_core::Error::GuardExhausted`] if the reclamation
    /// scheme cannot provide the `2 * MAX_HEIGHT + 3` guards a position
    /// search needs, or
    /// [`shoal_core::Error::InvalidConfiguration`] for a degenerate
    /// configuration.
    pub fn new(config: SkipListConfig) -> Result<Self> {
        config.validate()?;
        smr::check_available_guards(2 * MAX_HEIGHT + 3)?;

        let head = (0..MAX_HEIGHT).map(|_| Atomic::null()).collect();
        Ok(Self {
            head,
            height: AtomicUsize::new(1),
            counter: ItemCounter::new(config.counter),
            stats: config.stat.then(|| Box::new(SkipListStats::default())),
            memory_model: config.memory_model,
            back_off: config.back_off,
            branching: config.branching,
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    #[inline]
    fn stat<F: FnOnce(&SkipListStats)>(&self, f: F) {
        if let Some(s) = &self.stats {
            f(s);
        }
    }

    /// Draws a tower height from the geometric distribution
    fn random_height(&self) -> usize {
        let mut height = 1;
        let mut rng = self.rng.lock();
        while height < MAX_HEIGHT && rng.gen_ratio(1, self.branching) {
            height += 1;
        }
        height
    }

    /// Raises the estimated height to at least `height`
    fn bump_height(&self, height: usize) {
        loop {
            let current = self.height.load(AtomicOrdering::Acquire);
            if height <= current {
                break;
            }
            if self
                .height
                .compare_exchange(
                    current,
                    height,
                    AtomicOrdering::Release,
                    AtomicOrdering::Acquire,
                )
                .is_ok()
            {
                break;
            }
        }
    }

    /// Walks top-down to the position of the target described by `cmp`
    ///
    /// Fills `pos` with the `(pred-slot, succ)` pair of every visited level
    /// and returns the node whose key matches, if any. Marked nodes met on
    /// the way are unlinked and accounted; any contention restarts the walk
    /// from the top. With `stop_if_found` the walk returns at the first
    /// match without completing the lower levels.
    fn find_position<'g, F>(
        &'g self,
        cmp: F,
        pos: &mut Position<'g, K>,
        stop_if_found: bool,
        guard: &'g Guard,
    ) -> Option<Shared<'g, SkipNode<K>>>
    where
        F: Fn(&K) -> Ordering,
    {
        let mm = self.memory_model;
        'retry: loop {
            pos.reset(self);
            let top = self.height.load(AtomicOrdering::Acquire).max(1);
            let mut pred_tower: &'g [Atomic<SkipNode<K>>] = &self.head;

            for level in (0..top).rev() {
                let mut curr = pred_tower[level].load(mm.load_order(), guard);
                if curr.tag() != 0 {
                    // the predecessor has been marked under us
                    continue 'retry;
                }

                loop {
                    let Some(c) = (unsafe { curr.as_ref() }) else {
                        break;
                    };
                    let succ = c.tower[level].load(mm.load_order(), guard);

                    if pred_tower[level].load(mm.load_order(), guard) != curr {
                        continue 'retry;
                    }

                    if succ.tag() != 0 {
                        // curr is logically deleted at this level
                        match pred_tower[level].compare_exchange(
                            curr,
                            succ.with_tag(0),
                            mm.rmw_order(),
                            mm.failure_order(),
                            guard,
                        ) {
                            Ok(_) => {
                                self.stat(|s| s.helped_unlinks.inc());
                                if c.levels_unlinked(1) {
                                    unsafe { smr::retire(guard, curr) };
                                }
                                continue 'retry;
                            }
                            Err(_) => continue 'retry,
                        }
                    }

                    match cmp(&c.key) {
                        Ordering::Less => {
                            pred_tower = &c.tower;
                            curr = succ;
                        }
                        Ordering::Equal if stop_if_found => return Some(curr),
                        _ => break,
                    }
                }

                pos.preds[level] = &pred_tower[level];
                pos.succs[level] = curr;
            }

            return match unsafe { pos.succs[0].as_ref() } {
                Some(c) if cmp(&c.key) == Ordering::Equal => Some(pos.succs[0]),
                _ => None,
            };
        }
    }

    /// Walks to the right end of every level, recording the slot that points
    /// to the last node of each; returns the rightmost node
    fn find_rightmost<'g>(
        &'g self,
        pos: &mut Position<'g, K>,
        guard: &'g Guard,
    ) -> Option<Shared<'g, SkipNode<K>>> {
        let mm = self.memory_model;
        'retry: loop {
            pos.reset(self);
            let top = self.height.load(AtomicOrdering::Acquire).max(1);
            let mut pred_tower: &'g [Atomic<SkipNode<K>>] = &self.head;
            let mut last: Shared<'g, SkipNode<K>> = Shared::null();

            for level in (0..top).rev() {
                let mut curr = pred_tower[level].load(mm.load_order(), guard);
                if curr.tag() != 0 {
                    continue 'retry;
                }

                loop {
                    let Some(c) = (unsafe { curr.as_ref() }) else {
                        break;
                    };
                    let succ = c.tower[level].load(mm.load_order(), guard);

                    if pred_tower[level].load(mm.load_order(), guard) != curr {
                        continue 'retry;
                    }

                    if succ.tag() != 0 {
                        match pred_tower[level].compare_exchange(
                            curr,
                            succ.with_tag(0),
                            mm.rmw_order(),
                            mm.failure_order(),
                            guard,
                        ) {
                            Ok(_) => {
                                self.stat(|s| s.helped_unlinks.inc());
                                if c.levels_unlinked(1) {
                                    unsafe { smr::retire(guard, curr) };
                                }
                                continue 'retry;
                            }
                            Err(_) => continue 'retry,
                        }
                    }

                    pos.preds[level] = &pred_tower[level];
                    pred_tower = &c.tower;
                    last = curr;
                    curr = succ;
                }
            }

            return if last.is_null() { None } else { Some(last) };
        }
    }

    /// Inserts `key` if absent; returns `true` on insertion
    pub fn insert(&self, key: K) -> bool {
        let guard = smr::pin();
        let backoff = Backoff::new();
        let mm = self.memory_model;
        let height = self.random_height();
        self.bump_height(height);

        let mut node = Owned::new(SkipNode::new(key, height));
        let mut pos = Position::new(self);

        loop {
            if self
                .find_position(|k| k.cmp(&node.key), &mut pos, false, &guard)
                .is_some()
            {
                self.stat(|s| s.insert_failed.inc());
                return false;
            }

            node.tower[0].store(pos.succs[0], AtomicOrdering::Relaxed);
            match pos.preds[0].compare_exchange(
                pos.succs[0],
                node,
                mm.store_order(),
                mm.failure_order(),
                &guard,
            ) {
                Ok(inserted) => {
                    self.counter.inc();
                    self.link_upper_levels(inserted, height, &mut pos, &guard);
                    self.stat(|s| s.insert_success.inc());
                    return true;
                }
                Err(e) => {
                    node = e.new;
                    self.stat(|s| s.insert_retries.inc());
                    backoff::pause(self.back_off, &backoff);
                }
            }
        }
    }

    /// Links the tower levels `1..height` of a freshly inserted node
    ///
    /// Stops as soon as a deletion mark appears on the node's own tower;
    /// the never-linked levels are accounted here and a final position
    /// search helps the deletion complete.
    fn link_upper_levels<'g>(
        &'g self,
        new: Shared<'g, SkipNode<K>>,
        height: usize,
        pos: &mut Position<'g, K>,
        guard: &'g Guard,
    ) {
        let mm = self.memory_model;
        let n = unsafe { new.deref() };
        let backoff = Backoff::new();

        for level in 1..height {
            loop {
                let succ = pos.succs[level];
                let cur_next = n.tower[level].load(mm.load_order(), guard);

                if cur_next.tag() != 0 {
                    if n.levels_unlinked(height - level) {
                        unsafe { smr::retire(guard, new) };
                    }
                    let _ = self.find_position(|k| k.cmp(&n.key), pos, false, guard);
                    self.stat(|s| s.logical_delete_while_insert.inc());
                    return;
                }

                if cur_next != succ
                    && n.tower[level]
                        .compare_exchange(
                            cur_next,
                            succ,
                            mm.store_order(),
                            mm.failure_order(),
                            guard,
                        )
                        .is_err()
                {
                    // the forward pointer changed under us; re-examine it
                    continue;
                }

                match pos.preds[level].compare_exchange(
                    succ,
                    new,
                    mm.store_order(),
                    mm.failure_order(),
                    guard,
                ) {
                    Ok(_) => break,
                    Err(_) => {
                        self.stat(|s| s.renew_insert_position.inc());
                        backoff::pause(self.back_off, &backoff);
                        match self.find_position(|k| k.cmp(&n.key), pos, false, guard) {
                            Some(found) if found == new => {}
                            _ => {
                                // the node was deleted while we were linking
                                if n.levels_unlinked(height - level) {
                                    unsafe { smr::retire(guard, new) };
                                }
                                let _ = self.find_position(|k| k.cmp(&n.key), pos, false, guard);
                                self.stat(|s| s.logical_delete_while_insert.inc());
                                return;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Marks and unlinks `node`; returns `true` if this thread won the
    /// level-0 mark
    ///
    /// `f` runs between the winning level-0 mark and physical unlinking.
    fn try_remove<'g, F>(
        &'g self,
        node: Shared<'g, SkipNode<K>>,
        pos: &mut Position<'g, K>,
        f: F,
        guard: &'g Guard,
    ) -> bool
    where
        F: FnOnce(&K),
    {
        let mm = self.memory_model;
        let n = unsafe { node.deref() };

        // Logical deletion, top-down; level 0 is the commit point.
        for level in (1..n.height).rev() {
            n.tower[level].fetch_or(1, mm.rmw_order(), guard);
        }
        let prev = n.tower[0].fetch_or(1, mm.rmw_order(), guard);
        if prev.tag() != 0 {
            self.stat(|s| s.erase_contention.inc());
            return false;
        }

        f(&n.key);

        // Fast physical unlink at the recorded predecessors, top-down.
        for level in (0..n.height).rev() {
            let succ = n.tower[level].load(mm.load_order(), guard).with_tag(0);
            match pos.preds[level].compare_exchange(
                node,
                succ,
                mm.rmw_order(),
                mm.failure_order(),
                guard,
            ) {
                Ok(_) => {
                    if n.levels_unlinked(1) {
                        unsafe { smr::retire(guard, node) };
                    }
                }
                Err(_) => {
                    // a predecessor moved; one position search completes the
                    // remaining unlinks
                    let _ = self.find_position(|k| k.cmp(&n.key), pos, false, guard);
                    self.stat(|s| s.slow_erase.inc());
                    return true;
                }
            }
        }

        self.stat(|s| s.fast_erase.inc());
        true
    }

    /// Erases `key`; returns `true` if this call removed it
    pub fn erase(&self, key: &K) -> bool {
        self.erase_with(key, |_| {})
    }

    /// Erases `key`, running `f` between logical and physical deletion
    pub fn erase_with<F>(&self, key: &K, f: F) -> bool
    where
        F: FnOnce(&K),
    {
        let guard = smr::pin();
        let mut pos = Position::new(self);

        let Some(node) = self.find_position(|k| k.cmp(key), &mut pos, false, &guard) else {
            self.stat(|s| s.erase_failed.inc());
            return false;
        };

        if self.try_remove(node, &mut pos, f, &guard) {
            self.counter.dec();
            self.stat(|s| s.erase_success.inc());
            true
        } else {
            self.stat(|s| s.erase_failed.inc());
            false
        }
    }

    /// Removes and returns the smallest key
    ///
    /// Under concurrent extractors each caller's sequence of extracted keys
    /// is non-decreasing and every key is handed out exactly once.
    pub fn extract_min<'g>(&'g self, guard: &'g Guard) -> Option<&'g K> {
        let backoff = Backoff::new();

        loop {
            let mut pos = Position::new(self);
            let _ = self.find_position(|_| Ordering::Greater, &mut pos, false, guard);

            let candidate = pos.succs[0];
            let Some(n) = (unsafe { candidate.as_ref() }) else {
                self.stat(|s| s.extract_failed.inc());
                return None;
            };

            if self.try_remove(candidate, &mut pos, |_| {}, guard) {
                self.counter.dec();
                self.stat(|s| s.extract_success.inc());
                return Some(&n.key);
            }
            backoff::pause(self.back_off, &backoff);
        }
    }

    /// Removes and returns the largest key
    pub fn extract_max<'g>(&'g self, guard: &'g Guard) -> Option<&'g K> {
        let backoff = Backoff::new();

        loop {
            let mut pos = Position::new(self);
            let Some(candidate) = self.find_rightmost(&mut pos, guard) else {
                self.stat(|s| s.extract_failed.inc());
                return None;
            };
            let n = unsafe { candidate.deref() };

            if self.try_remove(candidate, &mut pos, |_| {}, guard) {
                self.counter.dec();
                self.stat(|s| s.extract_success.inc());
                return Some(&n.key);
            }
            backoff::pause(self.back_off, &backoff);
        }
    }

    /// Non-helping walk from the estimated height; aborts on any observed
    /// deletion so the caller can fall back to the position search
    fn find_fastpath<'g, F>(&'g self, cmp: F, guard: &'g Guard) -> Fastpath<'g, K>
    where
        F: Fn(&K) -> Ordering,
    {
        let mm = self.memory_model;
        let top = self.height.load(AtomicOrdering::Acquire).max(1);
        let mut pred_tower: &'g [Atomic<SkipNode<K>>] = &self.head;

        for level in (0..top).rev() {
            let mut curr = pred_tower[level].load(mm.load_order(), guard);
            if curr.tag() != 0 {
                return Fastpath::Abort;
            }

            loop {
                let Some(c) = (unsafe { curr.as_ref() }) else {
                    break;
                };
                let succ = c.tower[level].load(mm.load_order(), guard);
                if succ.tag() != 0 {
                    return Fastpath::Abort;
                }
                match cmp(&c.key) {
                    Ordering::Less => {
                        pred_tower = &c.tower;
                        curr = succ;
                    }
                    Ordering::Equal => return Fastpath::Found(curr),
                    Ordering::Greater => break,
                }
            }
        }

        Fastpath::NotFound
    }

    /// Returns `true` if `key` is present
    pub fn contains(&self, key: &K) -> bool {
        let guard = smr::pin();
        match self.find_fastpath(|k| k.cmp(key), &guard) {
            Fastpath::Found(_) => {
                self.stat(|s| s.find_fast.inc());
                true
            }
            Fastpath::NotFound => {
                self.stat(|s| s.find_fast.inc());
                false
            }
            Fastpath::Abort => {
                self.stat(|s| s.find_slow.inc());
                let mut pos = Position::new(self);
                self.find_position(|k| k.cmp(key), &mut pos, true, &guard)
                    .is_some()
            }
        }
    }

    /// Returns a protected reference to the entry for `key`
    pub fn get<'g>(&'g self, key: &K, guard: &'g Guard) -> Option<Entry<'g, K>> {
        match self.find_fastpath(|k| k.cmp(key), guard) {
            Fastpath::Found(node) => {
                self.stat(|s| s.find_fast.inc());
                Some(Entry {
                    node: unsafe { node.deref() },
                })
            }
            Fastpath::NotFound => {
                self.stat(|s| s.find_fast.inc());
                None
            }
            Fastpath::Abort => {
                self.stat(|s| s.find_slow.inc());
                let mut pos = Position::new(self);
                self.find_position(|k| k.cmp(key), &mut pos, true, guard)
                    .map(|node| Entry {
                        node: unsafe { node.deref() },
                    })
            }
        }
    }

    /// Runs `f` on the entry for `key` under guard protection
    pub fn find<F>(&self, key: &K, f: F) -> bool
    where
        F: FnOnce(&K),
    {
        let guard = smr::pin();
        match self.get(key, &guard) {
            Some(entry) => {
                f(entry.key());
                true
            }
            None => false,
        }
    }

    /// Inserts `key` if absent, or reports the existing entry
    ///
    /// Returns `(applied, inserted)`: `(true, true)` on insertion,
    /// `(true, false)` when `on_existing` observed a live entry,
    /// `(false, false)` when absent and `allow_insert` was false.
    pub fn update<F>(&self, key: K, allow_insert: bool, on_existing: F) -> (bool, bool)
    where
        F: FnOnce(&K),
    {
        let guard = smr::pin();
        let backoff = Backoff::new();
        let mm = self.memory_model;
        let height = self.random_height();
        let mut on_existing = Some(on_existing);
        let mut key_holder = Some(key);
        let mut node: Option<Owned<SkipNode<K>>> = None;
        let mut pos = Position::new(self);

        loop {
            let key_ref = node.as_ref().map(|n| &n.key).or(key_holder.as_ref()).unwrap();
            if let Some(found) = self.find_position(|k| k.cmp(key_ref), &mut pos, false, &guard) {
                let existing = unsafe { found.deref() };
                on_existing.take().unwrap()(&existing.key);
                self.stat(|s| s.update_existing.inc());
                return (true, false);
            }

            if !allow_insert {
                return (false, false);
            }

            self.bump_height(height);
            let pending = match node.take() {
                Some(n) => n,
                None => Owned::new(SkipNode::new(key_holder.take().unwrap(), height)),
            };

            pending.tower[0].store(pos.succs[0], AtomicOrdering::Relaxed);
            match pos.preds[0].compare_exchange(
                pos.succs[0],
                pending,
                mm.store_order(),
                mm.failure_order(),
                &guard,
            ) {
                Ok(inserted) => {
                    self.counter.inc();
                    self.link_upper_levels(inserted, height, &mut pos, &guard);
                    self.stat(|s| s.update_new.inc());
                    return (true, true);
                }
                Err(e) => {
                    node = Some(e.new);
                    self.stat(|s| s.insert_retries.inc());
                    backoff::pause(self.back_off, &backoff);
                }
            }
        }
    }

    /// Removes every entry, one extract-min at a time
    ///
    /// Not atomic: entries inserted concurrently may survive.
    pub fn clear(&self) {
        loop {
            let guard = smr::pin();
            if self.extract_min(&guard).is_none() {
                return;
            }
        }
    }

    /// Returns a best-effort forward iterator in ascending key order
    pub fn iter<'g>(&'g self, guard: &'g Guard) -> Iter<'g, K> {
        Iter {
            curr: self.head[0].load(self.memory_model.load_order(), guard),
            guard,
            memory_model: self.memory_model,
        }
    }

    /// Number of live entries (0 if counting is disabled)
    pub fn len(&self) -> usize {
        self.counter.get()
    }

    /// Returns `true` if the set holds no entries
    pub fn is_empty(&self) -> bool {
        let guard = smr::pin();
        self.head[0]
            .load(self.memory_model.load_order(), &guard)
            .is_null()
    }

    /// Internal statistics, when enabled at construction
    pub fn stats(&self) -> Option<&SkipListStats> {
        self.stats.as_deref()
    }
}

/// Best-effort iterator over the live keys of a [`SkipListSet`]
pub struct Iter<'g, K> {
    curr: Shared<'g, SkipNode<K>>,
    guard: &'g Guard,
    memory_model: MemoryModel,
}

impl<'g, K> Iterator for Iter<'g, K> {
    type Item = &'g K;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = unsafe { self.curr.as_ref() } {
            let next = node.tower[0].load(self.memory_model.load_order(), self.guard);
            self.curr = next.with_tag(0);
            if next.tag() == 0 {
                return Some(&node.key);
            }
        }
        None
    }
}

impl<K> Drop for SkipListSet<K> {
    fn drop(&mut self) {
        unsafe {
            let guard = epoch::unprotected();
            let mut curr = self.head[0].load(AtomicOrdering::Relaxed, guard);
            while let Some(node) = curr.as_ref() {
                let next = node.tower[0].load(AtomicOrdering::Relaxed, guard);
                drop(curr.into_owned());
                curr = next.with_tag(0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;

    fn new_set() -> SkipListSet<i64> {
        SkipListSet::new(SkipListConfig {
            stat: true,
            ..Default::default()
        })
        .unwrap()
    }

    fn collect(set: &SkipListSet<i64>) -> Vec<i64> {
        let guard = smr::pin();
        set.iter(&guard).copied().collect()
    }

    #[test]
    fn test_insert_orders_keys() {
        let set = new_set();
        for k in [5, 1, 9, 3, 7] {
            assert!(set.insert(k));
        }
        assert_eq!(collect(&set), vec![1, 3, 5, 7, 9]);
        assert_eq!(set.len(), 5);
    }

    #[test]
    fn test_duplicate_insert_fails() {
        let set = new_set();
        assert!(set.insert(42));
        assert!(!set.insert(42));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_erase_is_idempotent() {
        let set = new_set();
        assert!(set.insert(1));
        assert!(set.erase(&1));
        assert!(!set.erase(&1));
        assert!(!set.contains(&1));
    }

    #[test]
    fn test_boundary_keys_coexist() {
        let set = new_set();
        assert!(set.insert(i64::MIN));
        assert!(set.insert(i64::MAX));
        assert_eq!(collect(&set), vec![i64::MIN, i64::MAX]);
    }

    #[test]
    fn test_extract_min_drains_in_order() {
        let set = new_set();
        let mut keys: Vec<i64> = (0..200).collect();
        keys.shuffle(&mut rand::thread_rng());
        for k in &keys {
            assert!(set.insert(*k));
        }

        let mut drained = Vec::new();
        loop {
            let guard = smr::pin();
            match set.extract_min(&guard) {
                Some(k) => drained.push(*k),
                None => break,
            }
        }
        assert_eq!(drained, (0..200).collect::<Vec<_>>());
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn test_extract_max_drains_in_reverse() {
        let set = new_set();
        for k in [4, 1, 3, 0, 2] {
            assert!(set.insert(k));
        }

        let mut drained = Vec::new();
        loop {
            let guard = smr::pin();
            match set.extract_max(&guard) {
                Some(k) => drained.push(*k),
                None => break,
            }
        }
        assert_eq!(drained, vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_erase_with_callback() {
        let set = new_set();
        set.insert(11);
        let mut seen = None;
        assert!(set.erase_with(&11, |k| seen = Some(*k)));
        assert_eq!(seen, Some(11));
    }

    #[test]
    fn test_update_insert_or_touch() {
        let set = new_set();
        let (applied, inserted) = set.update(5, true, |_| {});
        assert!(applied && inserted);

        let mut touched = false;
        let (applied, inserted) = set.update(5, true, |_| touched = true);
        assert!(applied && !inserted);
        assert!(touched);

        let (applied, inserted) = set.update(6, false, |_| {});
        assert!(!applied && !inserted);
        assert!(!set.contains(&6));
    }

    #[test]
    fn test_get_and_find() {
        let set = new_set();
        set.insert(8);
        let guard = smr::pin();
        assert_eq!(set.get(&8, &guard).map(|e| *e.key()), Some(8));
        assert!(set.get(&9, &guard).is_none());

        let mut seen = None;
        assert!(set.find(&8, |k| seen = Some(*k)));
        assert_eq!(seen, Some(8));
    }

    #[test]
    fn test_clear_empties_the_set() {
        let set = new_set();
        for k in 0..50 {
            set.insert(k);
        }
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
        assert!(set.insert(1));
    }

    #[test]
    fn test_many_inserts_raise_estimated_height() {
        let set = new_set();
        for k in 0..2000 {
            set.insert(k);
        }
        assert!(set.height.load(AtomicOrdering::Relaxed) > 1);
        assert_eq!(set.len(), 2000);
    }
}
