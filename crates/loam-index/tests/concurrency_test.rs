//! Concurrency tests: crabbing under parallel writers and readers.

mod common;

use common::*;
use loam_index::Transaction;
use std::sync::atomic::{AtomicBool, Ordering};

const THREADS: i64 = 8;
const KEYS_PER_THREAD: i64 = 250;

#[test]
fn concurrent_disjoint_inserts() {
    let db = setup(512);
    let tree = open_tree(db.pager.clone(), "par_insert", 5, 5);

    std::thread::scope(|s| {
        for t in 0..THREADS {
            let tree = &tree;
            s.spawn(move || {
                let mut txn = Transaction::new();
                let base = t * KEYS_PER_THREAD;
                for k in base..base + KEYS_PER_THREAD {
                    assert!(tree.insert(&key(k), rid(k), &mut txn).unwrap());
                }
            });
        }
    });

    tree.verify_integrity().unwrap();
    let expected: Vec<i64> = (0..THREADS * KEYS_PER_THREAD).collect();
    assert_eq!(scan_keys(&tree), expected);
    assert_eq!(db.pager.pool().stats().pinned_frames, 0);
}

#[test]
fn concurrent_inserts_then_partial_removes() {
    let db = setup(512);
    let tree = open_tree(db.pager.clone(), "par_mixed", 5, 5);

    std::thread::scope(|s| {
        for t in 0..THREADS {
            let tree = &tree;
            s.spawn(move || {
                let mut txn = Transaction::new();
                let base = t * KEYS_PER_THREAD;
                for k in base..base + KEYS_PER_THREAD {
                    assert!(tree.insert(&key(k), rid(k), &mut txn).unwrap());
                }
                // Each thread removes the odd keys of its own range
                for k in base..base + KEYS_PER_THREAD {
                    if k % 2 == 1 {
                        tree.remove(&key(k), &mut txn).unwrap();
                    }
                }
            });
        }
    });

    tree.verify_integrity().unwrap();
    let expected: Vec<i64> = (0..THREADS * KEYS_PER_THREAD).filter(|k| k % 2 == 0).collect();
    assert_eq!(scan_keys(&tree), expected);
    assert_eq!(db.pager.pool().stats().pinned_frames, 0);
}

#[test]
fn concurrent_removes_drain_tree() {
    let db = setup(512);
    let tree = open_tree(db.pager.clone(), "par_drain", 4, 4);

    insert_all(&tree, 0..THREADS * 100);

    std::thread::scope(|s| {
        for t in 0..THREADS {
            let tree = &tree;
            s.spawn(move || {
                let mut txn = Transaction::new();
                let base = t * 100;
                for k in base..base + 100 {
                    tree.remove(&key(k), &mut txn).unwrap();
                }
            });
        }
    });

    assert!(tree.is_empty());
    assert_eq!(scan_keys(&tree), Vec::<i64>::new());
    assert_eq!(db.pager.pool().stats().pinned_frames, 0);
}

#[test]
fn readers_run_alongside_writers() {
    let db = setup(512);
    let tree = open_tree(db.pager.clone(), "par_read", 5, 5);
    let done = AtomicBool::new(false);
    const TOTAL: i64 = 1500;

    std::thread::scope(|s| {
        let tree_ref = &tree;
        let done_ref = &done;

        s.spawn(move || {
            let mut txn = Transaction::new();
            for k in 0..TOTAL {
                assert!(tree_ref.insert(&key(k), rid(k), &mut txn).unwrap());
            }
            done_ref.store(true, Ordering::Release);
        });

        for r in 0..4 {
            s.spawn(move || {
                let mut seen_max = 0usize;
                while !done_ref.load(Ordering::Acquire) {
                    // Point reads against a moving target
                    let probe = (r * 397) % TOTAL;
                    let _ = tree_ref.get_value(&key(probe)).unwrap();

                    // Full scans interleave with splits; count what is visible
                    let count = tree_ref.iter().unwrap().count();
                    seen_max = seen_max.max(count);
                }
                assert!(seen_max <= TOTAL as usize);
            });
        }
    });

    tree.verify_integrity().unwrap();
    assert_eq!(scan_keys(&tree), (0..TOTAL).collect::<Vec<_>>());
    assert_eq!(db.pager.pool().stats().pinned_frames, 0);
}

#[test]
fn concurrent_result_matches_sequential() {
    // Run the same disjoint workload concurrently and sequentially; the
    // final key sets must agree.
    let par_db = setup(512);
    let par_tree = open_tree(par_db.pager.clone(), "par", 4, 4);

    std::thread::scope(|s| {
        for t in 0..4i64 {
            let tree = &par_tree;
            s.spawn(move || {
                let mut txn = Transaction::new();
                let base = t * 50;
                for k in base..base + 50 {
                    tree.insert(&key(k), rid(k), &mut txn).unwrap();
                }
                for k in base..base + 50 {
                    if k % 3 == 0 {
                        tree.remove(&key(k), &mut txn).unwrap();
                    }
                }
            });
        }
    });

    let seq_db = setup(512);
    let seq_tree = open_tree(seq_db.pager.clone(), "seq", 4, 4);
    insert_all(&seq_tree, 0..200);
    remove_all(&seq_tree, (0..200).filter(|k| k % 3 == 0));

    par_tree.verify_integrity().unwrap();
    seq_tree.verify_integrity().unwrap();
    assert_eq!(scan_keys(&par_tree), scan_keys(&seq_tree));
}
