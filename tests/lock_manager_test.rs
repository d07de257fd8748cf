//! Integration tests for the page lock manager

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use heapdb::common::LockTimeout;
use heapdb::concurrency::LockManager;
use heapdb::{DbError, LockMode, PageId, TableId, TransactionId};

fn pid(n: u32) -> PageId {
    PageId::new(TableId::new(1), n)
}

fn lock_manager(min_ms: u64, max_ms: u64) -> Arc<LockManager> {
    Arc::new(LockManager::new(LockTimeout::new(
        Duration::from_millis(min_ms),
        Duration::from_millis(max_ms),
    )))
}

/// No exclusive holder coexists with any other holder.
fn assert_compatible(lm: &LockManager, page_id: PageId) {
    let state = lm.lock_state(page_id);
    if let Some(writer) = state.exclusive_holder() {
        assert!(state.shared_holders().iter().all(|&t| t == writer));
    }
}

#[test]
fn test_exclusive_waiter_granted_when_reader_commits() {
    let lm = lock_manager(2000, 2000);
    let reader = TransactionId::next();
    let writer = TransactionId::next();

    lm.acquire(reader, pid(0), LockMode::Shared).unwrap();

    let handle = {
        let lm = Arc::clone(&lm);
        thread::spawn(move || {
            let start = Instant::now();
            lm.acquire(writer, pid(0), LockMode::Exclusive).map(|_| start.elapsed())
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!lm.holds_write(writer, pid(0)));
    lm.release_all(reader);

    let waited = handle.join().unwrap().unwrap();
    assert!(waited >= Duration::from_millis(40));
    assert!(lm.holds_write(writer, pid(0)));
    assert_compatible(&lm, pid(0));
}

#[test]
fn test_blocked_request_aborts_within_bound() {
    let lm = lock_manager(30, 120);
    let holder = TransactionId::next();
    let waiter = TransactionId::next();

    lm.acquire(holder, pid(0), LockMode::Exclusive).unwrap();

    let start = Instant::now();
    let result = lm.acquire(waiter, pid(0), LockMode::Shared);
    let elapsed = start.elapsed();

    assert!(matches!(result, Err(DbError::TransactionAborted(t)) if t == waiter));
    assert!(result.unwrap_err().is_retryable());
    assert!(elapsed >= Duration::from_millis(30));
    assert!(elapsed < Duration::from_millis(1000));
    assert!(lm.pages_locked_by(waiter).is_empty());
    assert_eq!(lm.lock_state(pid(0)).exclusive_holder(), Some(holder));
}

#[test]
fn test_exclusive_versus_shared_race() {
    // Either the reader gets in after the writer releases, or it aborts;
    // it never observes the page while the writer holds it.
    let lm = lock_manager(20, 60);
    let writer = TransactionId::next();
    let reader = TransactionId::next();

    lm.acquire(writer, pid(0), LockMode::Exclusive).unwrap();

    let handle = {
        let lm = Arc::clone(&lm);
        thread::spawn(move || {
            let result = lm.acquire(reader, pid(0), LockMode::Shared);
            if result.is_ok() {
                assert!(lm.lock_state(pid(0)).exclusive_holder().is_none());
            }
            result
        })
    };

    thread::sleep(Duration::from_millis(30));
    lm.release(writer, pid(0));

    match handle.join().unwrap() {
        Ok(()) => assert!(lm.holds_read(reader, pid(0))),
        Err(e) => assert!(matches!(e, DbError::TransactionAborted(_))),
    }
}

#[test]
fn test_upgrade_conflict_aborts_at_least_one() {
    let lm = lock_manager(30, 150);
    let t1 = TransactionId::next();
    let t2 = TransactionId::next();

    lm.acquire(t1, pid(0), LockMode::Shared).unwrap();
    lm.acquire(t2, pid(0), LockMode::Shared).unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = [t1, t2]
        .into_iter()
        .map(|tid| {
            let lm = Arc::clone(&lm);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let result = lm.acquire(tid, pid(0), LockMode::Exclusive);
                if result.is_err() {
                    // An aborted transaction gives up everything it holds
                    lm.release_all(tid);
                }
                result
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let aborted = results.iter().filter(|r| r.is_err()).count();
    assert!(aborted >= 1);
    assert_compatible(&lm, pid(0));
}

#[test]
fn test_release_all_wakes_every_waiter() {
    let lm = lock_manager(2000, 2000);
    let writer = TransactionId::next();
    lm.acquire(writer, pid(0), LockMode::Exclusive).unwrap();
    lm.acquire(writer, pid(1), LockMode::Exclusive).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let lm = Arc::clone(&lm);
            thread::spawn(move || {
                let tid = TransactionId::next();
                lm.acquire(tid, pid(i % 2), LockMode::Shared).map(|_| tid)
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(30));
    lm.release_all(writer);

    for handle in handles {
        let tid = handle.join().unwrap().unwrap();
        assert!(lm.holds_any(tid, pid(0)) || lm.holds_any(tid, pid(1)));
    }
    assert_compatible(&lm, pid(0));
    assert_compatible(&lm, pid(1));
    assert!(lm.pages_locked_by(writer).is_empty());
}

#[test]
fn test_many_pages_many_transactions() {
    let lm = lock_manager(10, 40);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let lm = Arc::clone(&lm);
            thread::spawn(move || {
                let tid = TransactionId::next();
                let mut granted = 0;
                for n in 0..16u32 {
                    let mode = if (n + t) % 3 == 0 {
                        LockMode::Exclusive
                    } else {
                        LockMode::Shared
                    };
                    match lm.acquire(tid, pid(n % 4), mode) {
                        Ok(()) => granted += 1,
                        Err(DbError::TransactionAborted(_)) => break,
                        Err(e) => panic!("unexpected error {e}"),
                    }
                    for p in 0..4 {
                        assert_compatible(&lm, pid(p));
                    }
                }
                lm.release_all(tid);
                granted
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    for p in 0..4 {
        assert!(lm.lock_state(pid(p)).is_unlocked());
    }
}
