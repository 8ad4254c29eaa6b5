//! Concurrent ordered linked lists
//!
//! Two variants with the same API and the same ordering invariants but
//! different internals:
//!
//! - [`michael::MichaelList`]: lock-free. Traversals help unlink logically
//!   deleted nodes; writers retry on CAS failure.
//! - [`lazy::LazyList`]: optimistic with a lock per node. Readers never
//!   synchronize; writers lock the affected pair and validate before
//!   mutating.
//!
//! A node is *logically deleted* when the low tag bit of its outgoing `next`
//! pointer (Michael) or its `marked` flag (Lazy) is set. Once set, the mark
//! is never cleared; physical unlinking strictly follows logical deletion,
//! and reclamation is deferred through [`crate::smr`].

pub mod lazy;
pub mod michael;
