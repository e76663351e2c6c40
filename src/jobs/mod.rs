//! Periodic jobs
//!
//! Each job is declared once at startup as a [`JobDescriptor`]. The
//! scheduler keeps the descriptors that are eligible for this node's role
//! and storage kind and runs each on its own timer; the rest are dropped
//! without a word.

pub mod async_sync;
pub mod compaction;
pub mod schedule;
pub mod scheduler;

use crate::common::{Config, NodeRole, Result, StorageKind};
use crate::coordinator::ReplicationCoordinator;
use crate::storage::StorageBackend;
use async_trait::async_trait;
use std::sync::Arc;

pub use async_sync::AsyncSyncJob;
pub use compaction::CompactionJob;
pub use schedule::Schedule;
pub use scheduler::{JobState, JobStatus, Scheduler, SchedulerHandle};

/// A unit of periodic work
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;

    /// One run. Errors are logged by the scheduler and never retried
    /// before the next tick.
    async fn run(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct JobDescriptor {
    pub name: String,
    /// Expression the schedule was parsed from, kept for logging
    pub schedule_expr: String,
    pub schedule: Schedule,
    /// Roles the job runs on; empty means every role
    pub roles: Vec<NodeRole>,
    /// Storage kinds the job runs on; empty means every kind
    pub storage_kinds: Vec<StorageKind>,
    pub job: Arc<dyn Job>,
}

impl JobDescriptor {
    pub fn new(schedule_expr: &str, job: Arc<dyn Job>) -> Result<Self> {
        Ok(Self {
            name: job.name().to_string(),
            schedule_expr: schedule_expr.to_string(),
            schedule: Schedule::parse(schedule_expr)?,
            roles: Vec::new(),
            storage_kinds: Vec::new(),
            job,
        })
    }

    pub fn for_roles(mut self, roles: &[NodeRole]) -> Self {
        self.roles = roles.to_vec();
        self
    }

    pub fn for_storage_kinds(mut self, kinds: &[StorageKind]) -> Self {
        self.storage_kinds = kinds.to_vec();
        self
    }

    pub fn is_eligible(&self, role: NodeRole, kind: StorageKind) -> bool {
        (self.roles.is_empty() || self.roles.contains(&role))
            && (self.storage_kinds.is_empty() || self.storage_kinds.contains(&kind))
    }
}

impl std::fmt::Debug for JobDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("name", &self.name)
            .field("schedule", &self.schedule_expr)
            .field("roles", &self.roles)
            .field("storage_kinds", &self.storage_kinds)
            .finish()
    }
}

/// The standing jobs every node declares: compaction and async replica sync.
pub fn standing_jobs(
    config: &Config,
    backend: &StorageBackend,
    coordinator: Arc<ReplicationCoordinator>,
    span: &tracing::Span,
) -> Result<Vec<JobDescriptor>> {
    let compaction = CompactionJob::new(backend.clone(), span.clone());
    let async_sync = AsyncSyncJob::new(
        backend.clone(),
        coordinator,
        config.credential.clone(),
        span.clone(),
    );

    Ok(vec![
        JobDescriptor::new(&config.compaction_schedule, Arc::new(compaction))?
            .for_storage_kinds(&[StorageKind::Lsm]),
        JobDescriptor::new(&config.async_sync_schedule, Arc::new(async_sync))?
            .for_storage_kinds(&[StorageKind::Lsm])
            .for_roles(&[NodeRole::Master]),
    ])
}
