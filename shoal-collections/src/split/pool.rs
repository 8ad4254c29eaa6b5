//! Dummy node pool
//!
//! Bucket dummies are allocated against a fixed budget (the worst-case
//! bucket count) and never freed while the table lives. A dummy is only ever
//! returned to the pool when its initializer lost the splice race to a
//! concurrent thread; returned dummies wait on a lock-free Treiber stack for
//! the next bucket initialization. When both the budget and the free stack
//! are exhausted the caller surfaces
//! [`Error::BucketsExhausted`](shoal_core::Error::BucketsExhausted).

use crossbeam::epoch::{self, Atomic, Owned};
use crossbeam::utils::Backoff;
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::smr;

struct StackNode<T> {
    item: ManuallyDrop<T>,
    next: Atomic<StackNode<T>>,
}

/// A lock-free stack of released items
pub(crate) struct TreiberStack<T> {
    head: Atomic<StackNode<T>>,
}

impl<T> TreiberStack<T> {
    pub(crate) fn new() -> Self {
        Self {
            head: Atomic::null(),
        }
    }

    pub(crate) fn push(&self, item: T) {
        let guard = smr::pin();
        let backoff = Backoff::new();
        let mut node = Owned::new(StackNode {
            item: ManuallyDrop::new(item),
            next: Atomic::null(),
        });

        loop {
            let head = self.head.load(Ordering::Relaxed, &guard);
            node.next.store(head, Ordering::Relaxed);
            match self
                .head
                .compare_exchange(head, node, Ordering::Release, Ordering::Relaxed, &guard)
            {
                Ok(_) => return,
                Err(e) => {
                    node = e.new;
                    backoff.spin();
                }
            }
        }
    }

    pub(crate) fn pop(&self) -> Option<T> {
        let guard = smr::pin();
        let backoff = Backoff::new();

        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            let Some(h) = (unsafe { head.as_ref() }) else {
                return None;
            };
            let next = h.next.load(Ordering::Relaxed, &guard);
            if self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Relaxed, &guard)
                .is_ok()
            {
                let item = unsafe { std::ptr::read(&*h.item) };
                unsafe { smr::retire(&guard, head) };
                return Some(item);
            }
            backoff.spin();
        }
    }
}

impl<T> Drop for TreiberStack<T> {
    fn drop(&mut self) {
        unsafe {
            let guard = epoch::unprotected();
            let mut curr = self.head.load(Ordering::Relaxed, guard);
            while !curr.is_null() {
                let mut node = curr.into_owned();
                let next = node.next.load(Ordering::Relaxed, guard);
                ManuallyDrop::drop(&mut node.item);
                drop(node);
                curr = next;
            }
        }
    }
}

/// Bounded allocator for bucket dummy nodes
pub(crate) struct DummyPool<T> {
    capacity: usize,
    allocated: AtomicUsize,
    free: TreiberStack<T>,
}

impl<T> DummyPool<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            allocated: AtomicUsize::new(0),
            free: TreiberStack::new(),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Takes a dummy from the budget, falling back to the free stack
    ///
    /// `make` runs only when the budget still has room. Returns `None` when
    /// both sources are exhausted; reused items come back exactly as they
    /// were released.
    pub(crate) fn alloc_with<F>(&self, make: F) -> Option<T>
    where
        F: FnOnce() -> T,
    {
        let mut n = self.allocated.load(Ordering::Relaxed);
        while n < self.capacity {
            match self.allocated.compare_exchange_weak(
                n,
                n + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(make()),
                Err(current) => n = current,
            }
        }
        self.free.pop()
    }

    /// Returns a dummy that lost its initialization race
    pub(crate) fn release(&self, item: T) {
        self.free.push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_push_pop() {
        let stack = TreiberStack::new();
        assert_eq!(stack.pop(), None::<u32>);
        stack.push(1);
        stack.push(2);
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn test_stack_drops_leftovers() {
        use std::sync::atomic::AtomicUsize;
        use std::sync::Arc;

        struct Tracked(Arc<AtomicUsize>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        {
            let stack = TreiberStack::new();
            stack.push(Tracked(drops.clone()));
            stack.push(Tracked(drops.clone()));
        }
        assert_eq!(drops.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_pool_respects_budget() {
        let pool: DummyPool<u32> = DummyPool::new(2);
        assert_eq!(pool.alloc_with(|| 10), Some(10));
        assert_eq!(pool.alloc_with(|| 11), Some(11));
        assert_eq!(pool.alloc_with(|| 12), None);

        pool.release(10);
        assert_eq!(pool.alloc_with(|| 13), Some(10));
        assert_eq!(pool.alloc_with(|| 14), None);
    }

    #[test]
    fn test_pool_concurrent_allocation_is_bounded() {
        use std::sync::Arc;
        use std::thread;

        let pool: Arc<DummyPool<usize>> = Arc::new(DummyPool::new(64));
        let mut handles = vec![];
        for t in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(thread::spawn(move || {
                let mut got = 0;
                for i in 0..32 {
                    if pool.alloc_with(|| t * 100 + i).is_some() {
                        got += 1;
                    }
                }
                got
            }));
        }
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 64);
    }
}
