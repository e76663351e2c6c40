//! Storage engines behind capability traits
//!
//! The coordinator and the job subsystem only see these traits:
//! - [`Storage`]: point get/set, every engine
//! - [`LogSource`]: accumulated WAL entries, log-based engines only
//! - [`Compactor`]: compaction trigger, log-based engines only
//!
//! [`StorageBackend`] bundles whichever capabilities an engine offers.

pub mod lsm;
pub mod memory;
pub mod segment;
pub mod wal;

use crate::common::{Config, Error, Result, StorageKind};
use std::collections::BTreeMap;
use std::sync::Arc;

pub use lsm::{LsmOptions, LsmStore};
pub use memory::MemStore;

/// Key/value batch; iterates in key order
pub type Batch = BTreeMap<String, String>;

/// Point reads and writes
pub trait Storage: Send + Sync {
    /// Returns [`Error::NotFound`] when the key is absent.
    fn get(&self, key: &str) -> Result<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Source of write-ahead-log deltas for asynchronous replicas
pub trait LogSource: Send + Sync {
    /// Entries written since the previous reset. `reset_cursor` drains
    /// them; without it the same entries are returned again next time.
    fn log_delta(&self, reset_cursor: bool) -> Result<Batch>;
}

/// Storage compaction trigger
pub trait Compactor: Send + Sync {
    fn compact(&self) -> Result<()>;
}

pub(crate) fn lock_err<T>(_: std::sync::PoisonError<T>) -> Error {
    Error::Internal("storage lock poisoned".into())
}

/// An engine and the optional capabilities it exposes
#[derive(Clone)]
pub struct StorageBackend {
    kind: StorageKind,
    store: Arc<dyn Storage>,
    log: Option<Arc<dyn LogSource>>,
    compactor: Option<Arc<dyn Compactor>>,
}

impl StorageBackend {
    /// Open the engine selected by `config.storage`.
    pub fn open(config: &Config) -> Result<Self> {
        match config.storage {
            StorageKind::Lsm => Ok(Self::lsm(LsmStore::open(LsmOptions::from_config(
                config,
            ))?)),
            StorageKind::Memory => Ok(Self::memory(MemStore::new())),
        }
    }

    pub fn memory(store: MemStore) -> Self {
        Self {
            kind: StorageKind::Memory,
            store: Arc::new(store),
            log: None,
            compactor: None,
        }
    }

    pub fn lsm(store: LsmStore) -> Self {
        let store = Arc::new(store);
        Self {
            kind: StorageKind::Lsm,
            store: store.clone(),
            log: Some(store.clone()),
            compactor: Some(store),
        }
    }

    /// Assemble a backend from arbitrary capability implementations.
    pub fn from_parts(
        kind: StorageKind,
        store: Arc<dyn Storage>,
        log: Option<Arc<dyn LogSource>>,
        compactor: Option<Arc<dyn Compactor>>,
    ) -> Self {
        Self {
            kind,
            store,
            log,
            compactor,
        }
    }

    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    pub fn store(&self) -> Arc<dyn Storage> {
        self.store.clone()
    }

    pub fn log_source(&self) -> Option<Arc<dyn LogSource>> {
        self.log.clone()
    }

    pub fn compactor(&self) -> Option<Arc<dyn Compactor>> {
        self.compactor.clone()
    }
}

impl std::fmt::Debug for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageBackend")
            .field("kind", &self.kind)
            .field("log", &self.log.is_some())
            .field("compactor", &self.compactor.is_some())
            .finish()
    }
}
