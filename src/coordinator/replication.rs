//! Replication coordinator
//!
//! Owns the replica registry and the local engine handle:
//! - writes are applied locally, then pushed to synchronous replicas in
//!   registry order, stopping at the first failure
//! - replicas apply incoming batches entry by entry, stopping at the
//!   first failure
//!
//! Nothing is rolled back: a failed fan-out leaves the master and any
//! replicas already reached with the new value.

use super::registry::{ReplicaEntry, ReplicaRegistry, ReplicationMode};
use super::replica_client::ReplicaConnector;
use crate::common::{Error, Result};
use crate::storage::{Batch, Storage};
use std::sync::Arc;

pub struct ReplicationCoordinator {
    store: Arc<dyn Storage>,
    registry: ReplicaRegistry,
    connector: Arc<dyn ReplicaConnector>,
    credential: String,
    span: tracing::Span,
}

impl ReplicationCoordinator {
    pub fn new(
        store: Arc<dyn Storage>,
        connector: Arc<dyn ReplicaConnector>,
        credential: impl Into<String>,
        span: tracing::Span,
    ) -> Self {
        Self {
            store,
            registry: ReplicaRegistry::new(),
            connector,
            credential: credential.into(),
            span,
        }
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn read(&self, key: &str) -> Result<String> {
        match self.store.get(key) {
            Ok(value) => Ok(value),
            Err(Error::NotFound(_)) => {
                tracing::info!(parent: &self.span, key, "Get: key not found");
                Err(Error::NotFound(key.to_string()))
            }
            Err(e) => {
                tracing::error!(parent: &self.span, key, error = %e, "Get: error");
                Err(Error::Internal(format!("get {}: {}", key, e)))
            }
        }
    }

    /// Apply locally, then push to every synchronous replica in order.
    pub async fn write(&self, key: &str, value: &str) -> Result<()> {
        if let Err(e) = self.store.set(key, value) {
            tracing::error!(parent: &self.span, key, error = %e, "Set: local write failed");
            return Err(Error::Internal(format!("set {}: {}", key, e)));
        }

        let replicas = self.registry.snapshot()?;
        let mut batch = Batch::new();
        batch.insert(key.to_string(), value.to_string());

        for replica in replicas.iter().filter(|r| !r.mode.is_async()) {
            if let Err(e) = replica.client.push(&batch, &self.credential).await {
                tracing::error!(
                    parent: &self.span,
                    key,
                    replica = %replica.address,
                    error = %e,
                    "Set: synchronous replication failed"
                );
                return Err(Error::Replication {
                    address: replica.address.clone(),
                    reason: e.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Connect to `address` and append it to the registry.
    pub async fn register_replica(&self, address: &str, asynchronous: bool) -> Result<()> {
        let mode = ReplicationMode::from_async_flag(asynchronous);
        let client = match self.connector.connect(address).await {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(
                    parent: &self.span,
                    address,
                    is_async = asynchronous,
                    error = %e,
                    "Subscribe: error"
                );
                return Err(Error::ConnectionFailed(format!("{}: {}", address, e)));
            }
        };

        let total = self.registry.push(ReplicaEntry {
            address: address.to_string(),
            mode,
            client,
        })?;
        tracing::info!(
            parent: &self.span,
            address,
            mode = %mode,
            replicas = total,
            "Replica subscribed"
        );
        Ok(())
    }

    /// Snapshot of the registry, in insertion order.
    pub fn list_replicas(&self) -> Result<Arc<Vec<ReplicaEntry>>> {
        self.registry.snapshot()
    }

    /// Apply a batch received from the master, in key order.
    pub fn apply_replicated_batch(&self, batch: &Batch) -> Result<()> {
        for (key, value) in batch {
            if let Err(e) = self.store.set(key, value) {
                tracing::error!(
                    parent: &self.span,
                    key = %key,
                    error = %e,
                    "SendData: apply failed"
                );
                return Err(Error::Internal(format!("apply {}: {}", key, e)));
            }
        }
        tracing::debug!(parent: &self.span, entries = batch.len(), "Applied replicated batch");
        Ok(())
    }
}
