//! Segment compaction job

use super::Job;
use crate::common::{Error, Result};
use crate::storage::StorageBackend;
use async_trait::async_trait;

pub const COMPACTION_JOB_NAME: &str = "compress ss";

pub struct CompactionJob {
    backend: StorageBackend,
    span: tracing::Span,
}

impl CompactionJob {
    pub fn new(backend: StorageBackend, span: tracing::Span) -> Self {
        Self { backend, span }
    }
}

#[async_trait]
impl Job for CompactionJob {
    fn name(&self) -> &'static str {
        COMPACTION_JOB_NAME
    }

    async fn run(&self) -> Result<()> {
        let compactor = self
            .backend
            .compactor()
            .ok_or_else(|| Error::Unsupported(self.backend.kind().to_string()))?;

        tokio::task::spawn_blocking(move || compactor.compact())
            .await
            .map_err(|e| Error::Internal(format!("compaction task: {}", e)))??;

        tracing::debug!(parent: &self.span, job_name = COMPACTION_JOB_NAME, "Compaction done");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::StorageKind;
    use crate::storage::{Compactor, LsmOptions, LsmStore, MemStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingCompactor(AtomicUsize);

    impl Compactor for CountingCompactor {
        fn compact(&self) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_runs_compactor() {
        let compactor = Arc::new(CountingCompactor::default());
        let dyn_compactor: Arc<dyn Compactor> = compactor.clone();
        let backend = StorageBackend::from_parts(
            StorageKind::Lsm,
            Arc::new(MemStore::new()),
            None,
            Some(dyn_compactor),
        );
        let job = CompactionJob::new(backend, tracing::Span::none());

        job.run().await.unwrap();
        job.run().await.unwrap();
        assert_eq!(compactor.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_memory_backend_is_unsupported() {
        let job = CompactionJob::new(
            StorageBackend::memory(MemStore::new()),
            tracing::Span::none(),
        );
        assert!(matches!(job.run().await, Err(Error::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_compacts_lsm_segments() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = LsmOptions::new(dir.path());
        options.max_memtable_entries = 2;
        let store = LsmStore::open(options).unwrap();
        let backend = StorageBackend::lsm(store);

        for i in 0..6 {
            backend
                .store()
                .set(&format!("key{}", i), &format!("v{}", i))
                .unwrap();
        }

        let job = CompactionJob::new(backend.clone(), tracing::Span::none());
        job.run().await.unwrap();

        for i in 0..6 {
            assert_eq!(
                backend.store().get(&format!("key{}", i)).unwrap(),
                format!("v{}", i)
            );
        }
    }
}
