//! Stress test: sustained writes and reads through the LSM engine

use replikv::common::WalSyncPolicy;
use replikv::storage::{Compactor, LsmOptions, LsmStore, Storage};
use std::time::Instant;
use tempfile::TempDir;

#[test]
fn stress_write_read() {
    let dir = TempDir::new().unwrap();
    let store = LsmStore::open(LsmOptions {
        wal_sync: WalSyncPolicy::Never,
        max_memtable_entries: 64,
        ..LsmOptions::new(dir.path())
    })
    .unwrap();

    let n = 1_000;
    let start = Instant::now();
    for i in 0..n {
        store.set(&format!("key_{}", i), "stress_value").unwrap();
    }
    let write_time = start.elapsed();

    store.compact().unwrap();
    assert_eq!(store.stats().unwrap().segments, 1);

    let start = Instant::now();
    for i in 0..n {
        assert_eq!(store.get(&format!("key_{}", i)).unwrap(), "stress_value");
    }
    let read_time = start.elapsed();

    println!("Write {} keys: {:?}", n, write_time);
    println!("Read {} keys: {:?}", n, read_time);
    assert!(write_time.as_secs_f64() < 30.0, "Write too slow");
    assert!(read_time.as_secs_f64() < 30.0, "Read too slow");
}
