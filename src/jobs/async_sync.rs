//! Ships write-ahead-log deltas to asynchronous replicas

use super::Job;
use crate::common::{Error, Result};
use crate::coordinator::ReplicationCoordinator;
use crate::storage::StorageBackend;
use async_trait::async_trait;
use std::sync::Arc;

pub const ASYNC_SYNC_JOB_NAME: &str = "sync with replica";

pub struct AsyncSyncJob {
    backend: StorageBackend,
    coordinator: Arc<ReplicationCoordinator>,
    credential: String,
    span: tracing::Span,
}

impl AsyncSyncJob {
    pub fn new(
        backend: StorageBackend,
        coordinator: Arc<ReplicationCoordinator>,
        credential: impl Into<String>,
        span: tracing::Span,
    ) -> Self {
        Self {
            backend,
            coordinator,
            credential: credential.into(),
            span,
        }
    }
}

#[async_trait]
impl Job for AsyncSyncJob {
    fn name(&self) -> &'static str {
        ASYNC_SYNC_JOB_NAME
    }

    /// A failed push to one replica never stops delivery to the others,
    /// and the delta is not re-sent on a later tick.
    async fn run(&self) -> Result<()> {
        let log = self
            .backend
            .log_source()
            .ok_or_else(|| Error::Unsupported(self.backend.kind().to_string()))?;

        let delta = match log.log_delta(true) {
            Ok(delta) => delta,
            Err(e) => {
                tracing::error!(
                    parent: &self.span,
                    job_name = ASYNC_SYNC_JOB_NAME,
                    error = %e,
                    "Can't get WAL delta, skipping tick"
                );
                return Ok(());
            }
        };
        if delta.is_empty() {
            return Ok(());
        }

        let replicas = self.coordinator.list_replicas()?;
        let mut delivered = 0;
        for replica in replicas.iter().filter(|r| r.mode.is_async()) {
            match replica.client.push(&delta, &self.credential).await {
                Ok(()) => delivered += 1,
                Err(e) => tracing::error!(
                    parent: &self.span,
                    job_name = ASYNC_SYNC_JOB_NAME,
                    replica = %replica.address,
                    error = %e,
                    "Sync with async replica failed"
                ),
            }
        }

        tracing::debug!(
            parent: &self.span,
            job_name = ASYNC_SYNC_JOB_NAME,
            entries = delta.len(),
            delivered,
            "Async sync tick done"
        );
        Ok(())
    }
}
