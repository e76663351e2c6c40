//! Log-structured storage engine
//!
//! Architecture:
//! - WAL: every set is logged before it is applied
//! - Memtable: sorted in-memory map in front of the segments
//! - Segments: immutable sorted files, searched newest first
//! - Change log: sets recorded since the last delta read, shipped to
//!   asynchronous replicas
//! - Compaction: merges all segments into one

use super::segment::Segment;
use super::wal::Wal;
use super::{lock_err, Batch, Compactor, LogSource, Storage};
use crate::common::{Config, Error, Result, WalSyncPolicy};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Options for opening an [`LsmStore`]
#[derive(Debug, Clone)]
pub struct LsmOptions {
    pub data_dir: PathBuf,
    pub wal_path: PathBuf,
    pub wal_sync: WalSyncPolicy,
    pub max_memtable_entries: usize,
    /// Record sets in the change log served by [`LogSource`]. Only a
    /// master ships deltas, so replicas leave this off.
    pub track_changes: bool,
}

impl LsmOptions {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        Self {
            wal_path: data_dir.join("wal.log"),
            data_dir,
            wal_sync: WalSyncPolicy::Always,
            max_memtable_entries: 5,
            track_changes: true,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            wal_path: config.wal_path(),
            wal_sync: config.wal_sync,
            max_memtable_entries: config.max_memtable_entries,
            track_changes: config.role.is_master(),
        }
    }
}

/// Storage statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsmStats {
    pub memtable_entries: usize,
    pub segments: usize,
    pub segment_entries: usize,
    pub pending_changes: usize,
}

struct LsmInner {
    memtable: BTreeMap<String, String>,
    wal: Wal,
    segments: Vec<Segment>,
    next_segment_id: u64,
    changes: Batch,
}

pub struct LsmStore {
    data_dir: PathBuf,
    max_memtable_entries: usize,
    track_changes: bool,
    inner: Mutex<LsmInner>,
}

impl LsmStore {
    /// Open or create the store, replaying the WAL into the memtable.
    pub fn open(options: LsmOptions) -> Result<Self> {
        std::fs::create_dir_all(&options.data_dir)?;

        let segments = Segment::load_all(&options.data_dir)?;
        let next_segment_id = segments.last().map(|s| s.id + 1).unwrap_or(0);

        tracing::info!("Replaying WAL from {:?}", options.wal_path);
        let memtable = replay_memtable(&options.wal_path)?;
        let wal = Wal::open(&options.wal_path, options.wal_sync)?;

        tracing::info!(
            "LsmStore opened: {} segments, {} memtable entries",
            segments.len(),
            memtable.len()
        );

        // Unflushed entries may never have reached an asynchronous replica
        let changes = if options.track_changes {
            memtable.clone()
        } else {
            Batch::new()
        };

        Ok(Self {
            data_dir: options.data_dir,
            max_memtable_entries: options.max_memtable_entries.max(1),
            track_changes: options.track_changes,
            inner: Mutex::new(LsmInner {
                memtable,
                wal,
                segments,
                next_segment_id,
                changes,
            }),
        })
    }

    fn flush(&self, inner: &mut LsmInner) -> Result<()> {
        if inner.memtable.is_empty() {
            return Ok(());
        }

        let id = inner.next_segment_id;
        let count = inner.memtable.len();
        // On failure the memtable and WAL are left as they were
        let segment = Segment::write(&self.data_dir, id, inner.memtable.clone())?;

        inner.memtable.clear();
        inner.segments.push(segment);
        inner.next_segment_id += 1;
        inner.wal.truncate()?;

        tracing::debug!("Flushed memtable to segment {} ({} entries)", id, count);
        Ok(())
    }

    pub fn stats(&self) -> Result<LsmStats> {
        let inner = self.inner.lock().map_err(lock_err)?;
        Ok(LsmStats {
            memtable_entries: inner.memtable.len(),
            segments: inner.segments.len(),
            segment_entries: inner.segments.iter().map(Segment::len).sum(),
            pending_changes: inner.changes.len(),
        })
    }
}

fn replay_memtable(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut memtable = BTreeMap::new();
    Wal::replay(path, |entry| {
        memtable.insert(entry.key, entry.value);
        Ok(())
    })?;
    Ok(memtable)
}

impl Storage for LsmStore {
    fn get(&self, key: &str) -> Result<String> {
        let inner = self.inner.lock().map_err(lock_err)?;

        if let Some(value) = inner.memtable.get(key) {
            return Ok(value.clone());
        }

        inner
            .segments
            .iter()
            .rev()
            .find_map(|segment| segment.get(key))
            .cloned()
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    /// The write is committed once the WAL append succeeds. A failed
    /// flush after that point is logged and retried on the next set.
    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock().map_err(lock_err)?;

        inner.wal.append(key, value)?;
        inner.memtable.insert(key.to_string(), value.to_string());
        if self.track_changes {
            inner.changes.insert(key.to_string(), value.to_string());
        }

        if inner.memtable.len() >= self.max_memtable_entries {
            if let Err(e) = self.flush(&mut inner) {
                tracing::warn!(
                    "Memtable flush failed, keeping {} entries in memory: {}",
                    inner.memtable.len(),
                    e
                );
            }
        }

        Ok(())
    }
}

impl LogSource for LsmStore {
    /// `reset_cursor = true` drains the change log; `false` peeks at it.
    fn log_delta(&self, reset_cursor: bool) -> Result<Batch> {
        let mut inner = self.inner.lock().map_err(lock_err)?;
        if reset_cursor {
            Ok(std::mem::take(&mut inner.changes))
        } else {
            Ok(inner.changes.clone())
        }
    }
}

impl Compactor for LsmStore {
    fn compact(&self) -> Result<()> {
        let mut inner = self.inner.lock().map_err(lock_err)?;

        if inner.segments.len() < 2 {
            tracing::debug!(
                "Skipping compaction: {} segment(s)",
                inner.segments.len()
            );
            return Ok(());
        }

        let before = inner.segments.len();
        let mut merged = BTreeMap::new();
        for segment in &inner.segments {
            for (key, value) in segment.entries() {
                merged.insert(key.clone(), value.clone());
            }
        }

        let id = inner.next_segment_id;
        let compacted = Segment::write(&self.data_dir, id, merged)?;
        inner.next_segment_id += 1;

        let old = std::mem::replace(&mut inner.segments, vec![compacted]);
        for segment in &old {
            segment.remove_file()?;
        }

        tracing::info!(
            "Compaction merged {} segments into segment {}",
            before,
            id
        );
        Ok(())
    }
}
