//! Concurrent access tests
//!
//! Each test hammers one structure from several threads and checks the
//! quiescent state afterwards: membership must match the net effect of the
//! successful operations, counters must match enumeration, and races between
//! inserters and erasers must never leave a reachable-but-deleted entry.

use shoal_collections::{
    smr, ListConfig, MichaelList, SkipListConfig, SkipListSet, SplitMapConfig, SplitOrderedMap,
};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 4;
const ITERATIONS: usize = 2_000;
const KEYSPACE: u64 = 64;

fn xorshift(state: &mut u64) -> u64 {
    *state ^= *state << 13;
    *state ^= *state >> 7;
    *state ^= *state << 17;
    *state
}

#[test]
fn test_michael_list_concurrent_insert_erase() {
    let list: Arc<MichaelList<u64, u64>> =
        Arc::new(MichaelList::new(ListConfig::default()).unwrap());
    let net: Arc<Vec<AtomicI64>> =
        Arc::new((0..KEYSPACE).map(|_| AtomicI64::new(0)).collect());

    let mut handles = vec![];
    for t in 0..THREADS {
        let list = Arc::clone(&list);
        let net = Arc::clone(&net);
        handles.push(thread::spawn(move || {
            let mut rng = 0x9e3779b97f4a7c15u64.wrapping_add(t as u64);
            for _ in 0..ITERATIONS {
                let key = xorshift(&mut rng) % KEYSPACE;
                if list.insert(key, key) {
                    net[key as usize].fetch_add(1, Ordering::SeqCst);
                }
                let key = xorshift(&mut rng) % KEYSPACE;
                if list.erase(&key) {
                    net[key as usize].fetch_sub(1, Ordering::SeqCst);
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // At quiescence every key is present iff its net effect is one insert.
    let mut live = 0;
    for key in 0..KEYSPACE {
        let expected = net[key as usize].load(Ordering::SeqCst);
        assert!(expected == 0 || expected == 1, "key {key} net {expected}");
        assert_eq!(
            list.contains(&key),
            expected == 1,
            "membership mismatch for key {key}"
        );
        live += expected;
    }
    assert_eq!(list.len() as i64, live);

    let guard = smr::pin();
    assert_eq!(list.iter(&guard).count() as i64, live);
}

#[test]
fn test_split_map_concurrent_insert_erase() {
    let map: Arc<SplitOrderedMap<u64, u64>> = Arc::new(
        SplitOrderedMap::new(SplitMapConfig {
            expected_item_count: KEYSPACE as usize,
            load_factor: 1,
            ..Default::default()
        })
        .unwrap(),
    );
    let net: Arc<Vec<AtomicI64>> =
        Arc::new((0..KEYSPACE).map(|_| AtomicI64::new(0)).collect());

    let mut handles = vec![];
    for t in 0..THREADS {
        let map = Arc::clone(&map);
        let net = Arc::clone(&net);
        handles.push(thread::spawn(move || {
            let mut rng = 0xdeadbeefcafebabeu64.wrapping_add(t as u64);
            for _ in 0..ITERATIONS {
                let key = xorshift(&mut rng) % KEYSPACE;
                if map.insert(key, key * 3).unwrap() {
                    net[key as usize].fetch_add(1, Ordering::SeqCst);
                }
                let key = xorshift(&mut rng) % KEYSPACE;
                if map.erase(&key).unwrap() {
                    net[key as usize].fetch_sub(1, Ordering::SeqCst);
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let mut live = 0;
    for key in 0..KEYSPACE {
        let expected = net[key as usize].load(Ordering::SeqCst);
        assert!(expected == 0 || expected == 1, "key {key} net {expected}");
        assert_eq!(map.contains(&key).unwrap(), expected == 1);
        live += expected;
    }
    assert_eq!(map.len() as i64, live);

    let guard = smr::pin();
    assert_eq!(map.iter(&guard).count() as i64, live);
}

#[test]
fn test_split_map_concurrent_growth_keeps_all_keys() {
    let map: Arc<SplitOrderedMap<u64, u64>> = Arc::new(
        SplitOrderedMap::new(SplitMapConfig {
            expected_item_count: 4096,
            load_factor: 1,
            ..Default::default()
        })
        .unwrap(),
    );

    let per_thread = 512u64;
    let mut handles = vec![];
    for t in 0..THREADS as u64 {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for i in 0..per_thread {
                let key = t * per_thread + i;
                assert!(map.insert(key, key).unwrap());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let total = THREADS as u64 * per_thread;
    assert_eq!(map.len() as u64, total);
    assert!(map.bucket_count() >= (total as usize / 2).next_power_of_two() / 2);
    for key in 0..total {
        assert!(map.contains(&key).unwrap(), "key {key} lost during growth");
    }
}

#[test]
fn test_skiplist_concurrent_extract_min_is_a_partition() {
    const N: u64 = 4_000;
    let set: Arc<SkipListSet<u64>> =
        Arc::new(SkipListSet::new(SkipListConfig::default()).unwrap());
    for k in 0..N {
        assert!(set.insert(k));
    }

    let mut handles = vec![];
    for _ in 0..THREADS {
        let set = Arc::clone(&set);
        handles.push(thread::spawn(move || {
            let mut drained = Vec::new();
            loop {
                let guard = smr::pin();
                match set.extract_min(&guard) {
                    Some(k) => drained.push(*k),
                    None => break,
                }
            }
            drained
        }));
    }

    let mut all: Vec<u64> = Vec::new();
    for handle in handles {
        let drained = handle.join().unwrap();
        // Each extractor's own sequence is non-decreasing.
        assert!(
            drained.windows(2).all(|w| w[0] < w[1]),
            "extractor sequence went backwards"
        );
        all.extend(drained);
    }

    // The union is exactly the inserted keys, each extracted once.
    all.sort_unstable();
    assert_eq!(all, (0..N).collect::<Vec<_>>());
    assert!(set.is_empty());
    assert_eq!(set.len(), 0);
}

#[test]
fn test_skiplist_concurrent_inserts_stay_sorted() {
    const PER_THREAD: u64 = 1_000;
    let set: Arc<SkipListSet<u64>> =
        Arc::new(SkipListSet::new(SkipListConfig::default()).unwrap());

    let mut handles = vec![];
    for t in 0..THREADS as u64 {
        let set = Arc::clone(&set);
        handles.push(thread::spawn(move || {
            // Interleaved keyspaces so threads collide on adjacent positions.
            for i in 0..PER_THREAD {
                assert!(set.insert(i * THREADS as u64 + t));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let total = THREADS as u64 * PER_THREAD;
    assert_eq!(set.len() as u64, total);
    let guard = smr::pin();
    let keys: Vec<u64> = set.iter(&guard).copied().collect();
    assert_eq!(keys.len() as u64, total);
    assert!(keys.windows(2).all(|w| w[0] < w[1]), "list order violated");
}

#[test]
fn test_split_map_insert_erase_race_leaves_no_zombie() {
    const ROUNDS: usize = 300;
    let map: Arc<SplitOrderedMap<u64, u64>> = Arc::new(
        SplitOrderedMap::new(SplitMapConfig {
            expected_item_count: 16,
            load_factor: 1,
            ..Default::default()
        })
        .unwrap(),
    );

    for round in 0..ROUNDS {
        let key = (round % 8) as u64;
        let barrier = Arc::new(Barrier::new(2));
        let inserter_done = Arc::new(AtomicBool::new(false));

        let inserter = {
            let map = Arc::clone(&map);
            let barrier = Arc::clone(&barrier);
            let done = Arc::clone(&inserter_done);
            thread::spawn(move || {
                barrier.wait();
                let inserted = map.insert(key, round as u64).unwrap();
                done.store(true, Ordering::SeqCst);
                inserted
            })
        };

        let eraser = {
            let map = Arc::clone(&map);
            let barrier = Arc::clone(&barrier);
            let done = Arc::clone(&inserter_done);
            thread::spawn(move || {
                barrier.wait();
                loop {
                    if map.erase(&key).unwrap() {
                        return true;
                    }
                    if done.load(Ordering::SeqCst) {
                        // One final attempt after the insert completed.
                        return map.erase(&key).unwrap();
                    }
                }
            })
        };

        let inserted = inserter.join().unwrap();
        let erased = eraser.join().unwrap();
        assert!(inserted, "key was absent at round start");

        // Either the eraser won and the key is gone, or it lost every race
        // and the key is present; never a reachable-but-deleted entry.
        assert_eq!(map.contains(&key).unwrap(), !erased);

        if !erased {
            assert!(map.erase(&key).unwrap());
        }
        assert!(!map.contains(&key).unwrap());
    }
    assert!(map.is_empty());
}

#[test]
fn test_skiplist_insert_erase_race_leaves_no_zombie() {
    const ROUNDS: usize = 300;
    let set: Arc<SkipListSet<u64>> =
        Arc::new(SkipListSet::new(SkipListConfig::default()).unwrap());

    for round in 0..ROUNDS {
        let key = (round % 8) as u64;
        let barrier = Arc::new(Barrier::new(2));
        let inserter_done = Arc::new(AtomicBool::new(false));

        let inserter = {
            let set = Arc::clone(&set);
            let barrier = Arc::clone(&barrier);
            let done = Arc::clone(&inserter_done);
            thread::spawn(move || {
                barrier.wait();
                let inserted = set.insert(key);
                done.store(true, Ordering::SeqCst);
                inserted
            })
        };

        let eraser = {
            let set = Arc::clone(&set);
            let barrier = Arc::clone(&barrier);
            let done = Arc::clone(&inserter_done);
            thread::spawn(move || {
                barrier.wait();
                loop {
                    if set.erase(&key) {
                        return true;
                    }
                    if done.load(Ordering::SeqCst) {
                        return set.erase(&key);
                    }
                }
            })
        };

        let inserted = inserter.join().unwrap();
        let erased = eraser.join().unwrap();
        assert!(inserted);
        assert_eq!(set.contains(&key), !erased);

        if !erased {
            assert!(set.erase(&key));
        }
        assert!(!set.contains(&key));
    }
    assert_eq!(set.len(), 0);
}
