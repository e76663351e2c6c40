//! Role-gated request gateway
//!
//! Stateless authorization in front of the coordinator. Every check runs
//! before any state is touched:
//!
//! | Operation            | Role       | Credential | On violation                    |
//! |----------------------|------------|------------|---------------------------------|
//! | read                 | any        | no         | -                               |
//! | write                | master     | no         | `Aborted`                       |
//! | subscribe            | master     | yes        | `InvalidArgument` / `PermissionDenied` |
//! | apply replicated     | non-master | yes        | `Aborted` / `PermissionDenied`  |
//!
//! Subscribe against an engine without a log succeeds without registering
//! anything, so one control plane can drive every kind of backend.

pub mod http;

use crate::common::{Error, NodeRole, Result, StorageKind};
use crate::coordinator::ReplicationCoordinator;
use crate::storage::Batch;
use std::sync::Arc;
use subtle::ConstantTimeEq;

pub use http::create_router;

pub struct Gateway {
    role: NodeRole,
    storage_kind: StorageKind,
    credential: String,
    coordinator: Arc<ReplicationCoordinator>,
    span: tracing::Span,
}

impl Gateway {
    pub fn new(
        role: NodeRole,
        storage_kind: StorageKind,
        credential: impl Into<String>,
        coordinator: Arc<ReplicationCoordinator>,
        span: tracing::Span,
    ) -> Self {
        Self {
            role,
            storage_kind,
            credential: credential.into(),
            coordinator,
            span,
        }
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn storage_kind(&self) -> StorageKind {
        self.storage_kind
    }

    pub fn coordinator(&self) -> &Arc<ReplicationCoordinator> {
        &self.coordinator
    }

    fn credential_matches(&self, given: &str) -> bool {
        self.credential.as_bytes().ct_eq(given.as_bytes()).into()
    }

    pub fn read(&self, key: &str) -> Result<String> {
        self.coordinator.read(key)
    }

    pub async fn write(&self, key: &str, value: &str) -> Result<()> {
        if !self.role.is_master() {
            return Err(Error::Aborted(format!(
                "{} doesn't support Set operation",
                self.role
            )));
        }
        self.coordinator.write(key, value).await
    }

    pub async fn subscribe(&self, address: &str, asynchronous: bool, credential: &str) -> Result<()> {
        if !self.role.is_master() {
            return Err(Error::InvalidArgument(
                "can't subscribe to a replica".into(),
            ));
        }
        if !self.storage_kind.has_log() {
            tracing::debug!(
                parent: &self.span,
                address,
                storage = %self.storage_kind,
                "Subscribe accepted without effect"
            );
            return Ok(());
        }
        if !self.credential_matches(credential) {
            tracing::warn!(parent: &self.span, address, "Subscribe: incorrect credential");
            return Err(Error::PermissionDenied("incorrect credential".into()));
        }
        self.coordinator
            .register_replica(address, asynchronous)
            .await
    }

    pub fn apply_replicated_batch(&self, entries: &Batch, credential: &str) -> Result<()> {
        if self.role.is_master() {
            return Err(Error::Aborted(
                "master doesn't support SendData operation".into(),
            ));
        }
        if !self.credential_matches(credential) {
            tracing::warn!(parent: &self.span, "SendData: incorrect credential");
            return Err(Error::PermissionDenied("incorrect credential".into()));
        }
        self.coordinator.apply_replicated_batch(entries)
    }
}
