//! Safe memory reclamation contract
//!
//! Every collection in this crate defers node destruction through the epoch
//! collaborator (`crossbeam::epoch`). This module pins down the exact
//! services the collections rely on, so the backend remains a module-local
//! choice:
//!
//! - [`pin`] opens a *read section*: every pointer loaded through the
//!   returned [`Guard`] stays valid until the guard is dropped. This is the
//!   epoch-style equivalent of the hazard-pointer publish/re-check idiom:
//!   the backend provides protection wholesale instead of per pointer.
//! - [`retire`] registers a node for deferred destruction once every active
//!   read section has ended. The destructor runs exactly once.
//! - [`read_section`] runs a closure inside a scoped read section.
//! - [`force_reclaim`] flushes the calling thread's deferred garbage; a test
//!   hook, not needed for correctness.
//! - [`check_available_guards`] is the fail-fast capacity check constructors
//!   perform. The epoch backend has no per-thread guard budget, so the check
//!   cannot currently fail; backends with bounded guard sets report
//!   [`Error::GuardExhausted`](shoal_core::Error::GuardExhausted) here.

use crossbeam::epoch::{self, Guard, Shared};
use shoal_core::Result;

/// Pins the current thread, opening a read section
///
/// All pointers loaded through the returned guard are protected from
/// reclamation until the guard drops.
#[inline]
pub fn pin() -> Guard {
    epoch::pin()
}

/// Runs `f` inside a read section
///
/// Retirement of nodes the closure can observe is deferred until after the
/// outermost read section on every participating thread has ended.
#[inline]
pub fn read_section<F, R>(f: F) -> R
where
    F: FnOnce(&Guard) -> R,
{
    let guard = epoch::pin();
    f(&guard)
}

/// Registers the node behind `ptr` for deferred destruction
///
/// # Safety
///
/// The caller must guarantee that `ptr` is no longer reachable from any
/// entry point of the owning collection and that no other thread will retire
/// the same node.
#[inline]
pub unsafe fn retire<T>(guard: &Guard, ptr: Shared<'_, T>) {
    guard.defer_destroy(ptr);
}

/// Flushes the calling thread's deferred garbage
///
/// Advances the epoch and migrates locally buffered retired nodes to the
/// global queue so they become eligible for destruction. Intended for tests
/// that want deterministic reclamation pressure.
pub fn force_reclaim() {
    let guard = epoch::pin();
    guard.flush();
    drop(guard);
    epoch::pin().flush();
}

/// Verifies that the current thread can obtain `needed` protection slots
///
/// Collections call this from their constructors with their worst-case guard
/// demand (the skip-list needs `2 * max_height + 3`). The epoch backend
/// protects entire read sections rather than individual pointers, so any
/// demand is satisfiable.
#[inline]
pub fn check_available_guards(_needed: usize) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::epoch::Owned;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_read_section_returns_value() {
        let n = read_section(|_guard| 41 + 1);
        assert_eq!(n, 42);
    }

    #[test]
    fn test_retire_runs_destructor_once() {
        struct Tracked(Arc<AtomicUsize>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        {
            let guard = pin();
            let shared = Owned::new(Tracked(drops.clone())).into_shared(&guard);
            unsafe { retire(&guard, shared) };
        }
        // Drive the epoch forward until the destructor has run.
        for _ in 0..128 {
            if drops.load(Ordering::SeqCst) == 1 {
                break;
            }
            force_reclaim();
        }
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_check_is_satisfied() {
        assert!(check_available_guards(2 * 32 + 3).is_ok());
    }
}
