//! Many workers sharing zones
//!
//! Workers are threads here; each drives its own keys through the public
//! API while the others do the same, and the zone must end up exactly as a
//! serial run would leave it.

mod common;

use std::sync::Arc;
use std::thread;

use common::{record, worker_key, zone};
use shmtree::{Error, NaturalOrder, Value};

const WORKERS: usize = 6;
const PER_WORKER: usize = 150;

#[test]
fn test_workers_insert_read_delete_disjoint_keys() {
    let zone = Arc::new(zone("workers", 64));
    let baseline = zone.stats().unwrap();

    let handles: Vec<_> = (0..WORKERS)
        .map(|w| {
            let zone = Arc::clone(&zone);
            thread::spawn(move || {
                for i in 0..PER_WORKER {
                    let id = (w * PER_WORKER + i) as i32;
                    zone.insert(&worker_key(w, i), &record(id), &mut NaturalOrder)
                        .unwrap();
                }
                for i in 0..PER_WORKER {
                    let id = (w * PER_WORKER + i) as i32;
                    let name = zone
                        .get_field(&worker_key(w, i), &Value::from("name"), &mut NaturalOrder)
                        .unwrap();
                    assert_eq!(name, Value::from(format!("record-{id}")));
                }
                for i in (0..PER_WORKER).filter(|i| i % 2 == 0) {
                    zone.delete(&worker_key(w, i), &mut NaturalOrder).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(zone.len().unwrap(), WORKERS * PER_WORKER / 2);
    for w in 0..WORKERS {
        for i in 0..PER_WORKER {
            let got = zone.get(&worker_key(w, i), &mut NaturalOrder);
            if i % 2 == 0 {
                assert!(matches!(got, Err(Error::KeyNotFound)));
            } else {
                assert_eq!(got.unwrap(), record((w * PER_WORKER + i) as i32));
            }
        }
    }

    for w in 0..WORKERS {
        for i in (0..PER_WORKER).filter(|i| i % 2 == 1) {
            zone.delete(&worker_key(w, i), &mut NaturalOrder).unwrap();
        }
    }
    assert_eq!(zone.stats().unwrap(), baseline);
}

#[test]
fn test_workers_on_separate_zones() {
    let zones: Vec<_> = (0..WORKERS)
        .map(|w| Arc::new(zone(&format!("zone-{w}"), 4)))
        .collect();

    let handles: Vec<_> = zones
        .iter()
        .cloned()
        .enumerate()
        .map(|(w, zone)| {
            thread::spawn(move || {
                for i in 0..50 {
                    zone.insert(&worker_key(w, i), &Value::from(i as i32), &mut NaturalOrder)
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    for zone in &zones {
        assert_eq!(zone.len().unwrap(), 50);
    }
}
