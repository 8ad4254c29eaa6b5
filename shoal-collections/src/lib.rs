//! Concurrent sets and maps for shoal
//!
//! This crate implements a family of concurrent set/map data structures
//! built from two composable pieces:
//!
//! - **Ordered linked lists**: a lock-free Michael list and an optimistic
//!   Lazy list with per-node locks
//! - **Split-ordered hash tables**: a resizable bucket index layered over a
//!   single shared ordered list, giving an expected-O(1) concurrent map
//!
//! plus an independent **lock-free skip-list** ordered set with
//! expected-O(log n) operations.
//!
//! # Architecture
//!
//! ```text
//! Lookup path (split-ordered map):
//! key → hash → bit-reversed rank → bucket index → bucket dummy node
//!     → ordered list search from the dummy → result
//!
//! Growth path:
//! insert → item counter > load_factor × buckets → double the bucket index
//! (no list node moves; new buckets are spliced in as dummy nodes)
//! ```
//!
//! Memory reclamation is deferred through the epoch collaborator wrapped by
//! the [`smr`] module: logically deleted nodes are retired and destroyed
//! only after every concurrent reader has left its read section.
//!
//! # Example
//!
//! ```
//! use shoal_collections::{SplitOrderedMap, SplitMapConfig};
//!
//! let map: SplitOrderedMap<u64, String> =
//!     SplitOrderedMap::new(SplitMapConfig::default()).unwrap();
//!
//! assert!(map.insert(1, "one".to_string()).unwrap());
//! assert!(map.contains(&1).unwrap());
//! assert!(map.erase(&1).unwrap());
//! ```

pub mod bitrev;
pub mod config;
pub mod counter;
pub mod list;
pub mod skiplist;
pub mod smr;
pub mod split;
pub mod stats;

pub(crate) mod backoff;

pub use config::{ListConfig, SkipListConfig, SplitMapConfig};
pub use shoal_core::{BackOffKind, BitReversal, CounterKind, Error, MemoryModel, Result};
pub use list::lazy::LazyList;
pub use list::michael::MichaelList;
pub use skiplist::SkipListSet;
pub use split::{LazySplitOrderedMap, SplitOrderedMap, SplitOrderedSet};
