//! Replica registry
//!
//! Readers take an immutable snapshot (`Arc<Vec<_>>`); subscribe builds a
//! new vector and swaps it in under the write lock. A fan-out that started
//! before a subscribe keeps iterating the snapshot it took.

use super::replica_client::ReplicaClient;
use crate::common::{Error, Result};
use std::sync::{Arc, RwLock};

/// How a replica is kept up to date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationMode {
    /// Pushed inline on every write
    Synchronous,
    /// Caught up by the async sync job
    Asynchronous,
}

impl ReplicationMode {
    pub fn from_async_flag(asynchronous: bool) -> Self {
        if asynchronous {
            ReplicationMode::Asynchronous
        } else {
            ReplicationMode::Synchronous
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self, ReplicationMode::Asynchronous)
    }
}

impl std::fmt::Display for ReplicationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplicationMode::Synchronous => write!(f, "sync"),
            ReplicationMode::Asynchronous => write!(f, "async"),
        }
    }
}

#[derive(Clone)]
pub struct ReplicaEntry {
    pub address: String,
    pub mode: ReplicationMode,
    pub client: Arc<dyn ReplicaClient>,
}

impl std::fmt::Debug for ReplicaEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaEntry")
            .field("address", &self.address)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Append-only, insertion-ordered list of replicas.
///
/// Duplicate addresses are kept as separate entries.
#[derive(Default)]
pub struct ReplicaRegistry {
    entries: RwLock<Arc<Vec<ReplicaEntry>>>,
}

impl ReplicaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consistent view of every entry registered so far.
    pub fn snapshot(&self) -> Result<Arc<Vec<ReplicaEntry>>> {
        self.entries
            .read()
            .map(|entries| entries.clone())
            .map_err(|_| Error::Internal("replica registry lock poisoned".into()))
    }

    pub fn push(&self, entry: ReplicaEntry) -> Result<usize> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Error::Internal("replica registry lock poisoned".into()))?;
        let mut next = Vec::with_capacity(entries.len() + 1);
        next.extend(entries.iter().cloned());
        next.push(entry);
        let len = next.len();
        *entries = Arc::new(next);
        Ok(len)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
