//! # Concurrency Tests
//!
//! Producer and consumer threads sharing one pool through `Arc`.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use cookiepool_core::{CookiePool, IdentityKey, PoolConfig};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

fn shared_pool(dir: &tempfile::TempDir) -> Arc<CookiePool> {
    Arc::new(CookiePool::open(&PoolConfig::for_database(dir.path().join("shared.db"))).unwrap())
}

#[test]
fn distinct_fingerprints_all_land() {
    let dir = tempfile::tempdir().unwrap();
    let pool = shared_pool(&dir);

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                for i in 0..10 {
                    let key = IdentityKey::new("bj", format!("{}-{}", worker, i));
                    pool.save(&key, &format!("payload-{}-{}", worker, i), 3600)
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(pool.count().unwrap(), 80);
    for worker in 0..8 {
        for i in 0..10 {
            let key = IdentityKey::new("bj", format!("{}-{}", worker, i));
            let found = pool.query(&key, 1, true).unwrap();
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].payload, format!("payload-{}-{}", worker, i));
        }
    }
    assert_eq!(pool.gate_snapshot().writers_admitted, 80);
}

#[test]
fn same_fingerprint_leaves_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let pool = shared_pool(&dir);
    let key = IdentityKey::new("gd", "contended");

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let pool = Arc::clone(&pool);
            let key = key.clone();
            thread::spawn(move || {
                for round in 0..5 {
                    pool.save(&key, &format!("w{}-r{}", worker, round), 3600)
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(pool.count().unwrap(), 1);
    let found = pool.query(&key, 0, false).unwrap();
    assert_eq!(found.len(), 1);

    let written: BTreeSet<String> = (0..8)
        .flat_map(|w| (0..5).map(move |r| format!("w{}-r{}", w, r)))
        .collect();
    assert!(written.contains(&found[0].payload));
}

#[test]
fn readers_keep_working_during_writes() {
    let dir = tempfile::tempdir().unwrap();
    let pool = shared_pool(&dir);
    pool.save(&IdentityKey::new("sh", "seed"), "seed", 3600)
        .unwrap();

    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut reads = 0u32;
                while !done.load(Ordering::SeqCst) || reads == 0 {
                    let found = pool.query(&IdentityKey::new("sh", ""), 1, true).unwrap();
                    assert_eq!(found.len(), 1);
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    let writer = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            for i in 0..30 {
                pool.save(&IdentityKey::new("sh", i.to_string()), "p", 3600)
                    .unwrap();
            }
        })
    };

    writer.join().unwrap();
    done.store(true, Ordering::SeqCst);
    for r in readers {
        assert!(r.join().unwrap() > 0);
    }

    assert_eq!(pool.count().unwrap(), 31);
    assert_eq!(pool.gate_snapshot().active_writers, 0);
}

#[test]
fn sweeps_interleave_with_saves() {
    let dir = tempfile::tempdir().unwrap();
    let pool = shared_pool(&dir);

    let producer = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            for i in 0..20 {
                let ttl = if i % 2 == 0 { -5 } else { 3600 };
                pool.save(&IdentityKey::new("zj", i.to_string()), "p", ttl)
                    .unwrap();
            }
        })
    };
    let sweeper = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            for _ in 0..10 {
                pool.sweep_expired().unwrap();
            }
        })
    };
    producer.join().unwrap();
    sweeper.join().unwrap();
    pool.sweep_expired().unwrap();

    assert_eq!(pool.count().unwrap(), 10);
    assert_eq!(pool.count_live().unwrap(), 10);
}
