//! Mutual exclusion across threads
//!
//! Comparator calls of one operation must form a contiguous run in a global
//! log: no other operation's comparator may run while an operation holds
//! the zone.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use shmtree_engine::{Comparator, Error, NaturalOrder, Value, Zone, MIN_ZONE_SIZE};

const THREADS: usize = 8;
const OPS: usize = 200;

fn assert_runs_contiguous(log: &[usize]) {
    let mut finished = HashSet::new();
    let mut current = None;
    for &op in log {
        if current != Some(op) {
            if let Some(prev) = current {
                finished.insert(prev);
            }
            assert!(!finished.contains(&op), "operation {op} interleaved with another");
            current = Some(op);
        }
    }
}

#[test]
fn test_comparator_calls_never_interleave() {
    let zone = Arc::new(Zone::anonymous("mutex", MIN_ZONE_SIZE * 32).unwrap());
    for k in 0..64 {
        zone.insert(&Value::from(k), &Value::from(k), &mut NaturalOrder)
            .unwrap();
    }

    let log = Arc::new(Mutex::new(Vec::new()));
    let next_op = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let zone = Arc::clone(&zone);
            let log = Arc::clone(&log);
            let next_op = Arc::clone(&next_op);
            thread::spawn(move || {
                for i in 0..OPS {
                    let op = next_op.fetch_add(1, Ordering::SeqCst);
                    let mut logged = |a: &Value, b: &Value| {
                        log.lock().push(op);
                        thread::yield_now();
                        NaturalOrder.compare(a, b)
                    };
                    let key = Value::from(((t * OPS + i) % 64) as i32);
                    match i % 3 {
                        0 => {
                            zone.get(&key, &mut logged).unwrap();
                        }
                        1 => {
                            let fresh = Value::from(format!("t{t}-{i}"));
                            zone.insert(&fresh, &Value::from(true), &mut logged).unwrap();
                        }
                        _ => {
                            let fresh = Value::from(format!("t{t}-{}", i - 1));
                            zone.delete(&fresh, &mut logged).unwrap();
                        }
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let log = log.lock();
    assert!(log.len() > THREADS * OPS);
    assert_runs_contiguous(&log);
    // Each thread's last insert (i = OPS - 1) has no matching delete
    assert_eq!(zone.len().unwrap(), 64 + THREADS);
}

#[test]
fn test_scoped_critical_sections_never_overlap() {
    let zone = Arc::new(Zone::anonymous("scoped", MIN_ZONE_SIZE).unwrap());
    let inside = Arc::new(AtomicBool::new(false));
    let entered = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let zone = Arc::clone(&zone);
            let inside = Arc::clone(&inside);
            let entered = Arc::clone(&entered);
            thread::spawn(move || {
                for _ in 0..OPS {
                    let _guard = zone.lock().unwrap();
                    assert!(!inside.swap(true, Ordering::SeqCst), "critical sections overlap");
                    entered.fetch_add(1, Ordering::SeqCst);
                    thread::yield_now();
                    inside.store(false, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(entered.load(Ordering::SeqCst), THREADS * OPS);
}

#[test]
fn test_concurrent_inserts_of_same_key_admit_one() {
    let zone = Arc::new(Zone::anonymous("race", MIN_ZONE_SIZE).unwrap());
    let wins = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let zone = Arc::clone(&zone);
            let wins = Arc::clone(&wins);
            thread::spawn(move || {
                match zone.insert(&Value::from("only"), &Value::from(t as i32), &mut NaturalOrder) {
                    Ok(()) => {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(Error::KeyExists) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(wins.load(Ordering::SeqCst), 1);
    assert_eq!(zone.len().unwrap(), 1);
}

#[test]
fn test_panicking_comparator_releases_zone() {
    let zone = Arc::new(Zone::anonymous("panic", MIN_ZONE_SIZE).unwrap());
    zone.insert(&Value::from(1), &Value::from(1), &mut NaturalOrder)
        .unwrap();

    let z = Arc::clone(&zone);
    let res = thread::spawn(move || {
        let mut boom = |_: &Value, _: &Value| -> CmpOrdering { panic!("comparator failed") };
        let _ = z.get(&Value::from(1), &mut boom);
    })
    .join();
    assert!(res.is_err());

    assert_eq!(
        zone.get(&Value::from(1), &mut NaturalOrder).unwrap(),
        Value::from(1)
    );
}
