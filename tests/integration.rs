//! Integration tests for the storage engines

use replikv::common::{Config, StorageKind, WalSyncPolicy};
use replikv::storage::{LsmOptions, LsmStore, LogSource, Storage, StorageBackend};
use tempfile::TempDir;

fn options(dir: &std::path::Path, max_memtable_entries: usize) -> LsmOptions {
    LsmOptions {
        max_memtable_entries,
        ..LsmOptions::new(dir)
    }
}

#[test]
fn test_lsm_persistence() {
    let dir = TempDir::new().unwrap();

    // Write enough to flush a segment and leave a tail in the WAL
    {
        let store = LsmStore::open(options(dir.path(), 3)).unwrap();
        for i in 0..7 {
            store.set(&format!("key{}", i), &format!("value{}", i)).unwrap();
        }
        let stats = store.stats().unwrap();
        assert_eq!(stats.segments, 2);
        assert_eq!(stats.memtable_entries, 1);
    }

    // Reopen and verify
    {
        let store = LsmStore::open(options(dir.path(), 3)).unwrap();
        for i in 0..7 {
            assert_eq!(
                store.get(&format!("key{}", i)).unwrap(),
                format!("value{}", i)
            );
        }
    }
}

#[test]
fn test_wal_replay() {
    let dir = TempDir::new().unwrap();

    {
        let store = LsmStore::open(options(dir.path(), 100)).unwrap();
        store.set("key1", "value1").unwrap();
        store.set("key1", "value2").unwrap();
    }

    {
        let store = LsmStore::open(options(dir.path(), 100)).unwrap();
        assert_eq!(store.get("key1").unwrap(), "value2");
        assert_eq!(store.stats().unwrap().segments, 0);
    }
}

#[test]
fn test_unshipped_entries_survive_restart() {
    let dir = TempDir::new().unwrap();

    {
        let store = LsmStore::open(options(dir.path(), 100)).unwrap();
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
    }

    let store = LsmStore::open(options(dir.path(), 100)).unwrap();
    let delta = store.log_delta(false).unwrap();
    assert_eq!(delta.len(), 2);

    // Peeking leaves the delta in place, draining empties it
    assert_eq!(store.log_delta(true).unwrap(), delta);
    assert!(store.log_delta(true).unwrap().is_empty());
}

#[test]
fn test_backend_from_config() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        storage: StorageKind::Lsm,
        data_dir: dir.path().join("data"),
        wal_dir: Some(dir.path().join("wal")),
        wal_name: "journal".into(),
        wal_sync: WalSyncPolicy::Interval,
        ..Default::default()
    };

    let backend = StorageBackend::open(&config).unwrap();
    backend.store().set("k", "v").unwrap();
    assert!(dir.path().join("wal").join("journal.log").exists());
    assert_eq!(
        backend.log_source().unwrap().log_delta(true).unwrap().len(),
        1
    );
}
