//! Job scheduler
//!
//! One tokio task per eligible descriptor. A task sleeps until the next
//! scheduled instant, runs the job to completion and only then computes
//! the following instant, so runs of the same job never overlap. Tasks of
//! different jobs are independent.
//!
//! Shutdown is cooperative: flipping the watch channel to `true` stops
//! every task at its next wait point. A run in progress is finished first.

use super::JobDescriptor;
use crate::common::{NodeRole, StorageKind};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
}

/// Run bookkeeping for one job
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub name: String,
    pub schedule: String,
    pub state: JobState,
    pub runs: u64,
    pub failures: u64,
    pub last_error: Option<String>,
}

impl JobStatus {
    fn new(descriptor: &JobDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            schedule: descriptor.schedule_expr.clone(),
            state: JobState::Idle,
            runs: 0,
            failures: 0,
            last_error: None,
        }
    }
}

type SharedStatus = Arc<Mutex<JobStatus>>;

fn update(status: &SharedStatus, f: impl FnOnce(&mut JobStatus)) {
    // Status is bookkeeping only; a poisoned lock is still usable.
    let mut guard = status.lock().unwrap_or_else(|e| e.into_inner());
    f(&mut guard);
}

pub struct Scheduler {
    jobs: Vec<JobDescriptor>,
    span: tracing::Span,
}

impl Scheduler {
    /// Keep the descriptors eligible for `role` and `kind`.
    pub fn new(
        descriptors: Vec<JobDescriptor>,
        role: NodeRole,
        kind: StorageKind,
        span: tracing::Span,
    ) -> Self {
        let jobs: Vec<_> = descriptors
            .into_iter()
            .filter(|d| d.is_eligible(role, kind))
            .collect();

        for job in &jobs {
            tracing::info!(
                parent: &span,
                job_name = %job.name,
                cron = %job.schedule_expr,
                "registered job"
            );
        }

        Self { jobs, span }
    }

    pub fn jobs(&self) -> &[JobDescriptor] {
        &self.jobs
    }

    /// Spawn one task per job. Must be called inside a tokio runtime.
    pub fn start(self, shutdown_rx: watch::Receiver<bool>) -> SchedulerHandle {
        let mut statuses = Vec::with_capacity(self.jobs.len());
        let mut tasks = Vec::with_capacity(self.jobs.len());

        for descriptor in self.jobs {
            let status = Arc::new(Mutex::new(JobStatus::new(&descriptor)));
            let span = tracing::info_span!(parent: &self.span, "job", job_name = %descriptor.name);
            let task = tokio::spawn(
                run_job_loop(descriptor, status.clone(), shutdown_rx.clone(), span.clone())
                    .instrument(span),
            );
            statuses.push(status);
            tasks.push(task);
        }

        SchedulerHandle { statuses, tasks }
    }
}

async fn run_job_loop(
    descriptor: JobDescriptor,
    status: SharedStatus,
    mut shutdown_rx: watch::Receiver<bool>,
    span: tracing::Span,
) {
    if *shutdown_rx.borrow_and_update() {
        return;
    }

    loop {
        let delay = match descriptor.schedule.next_delay(Utc::now()) {
            Ok(delay) => delay,
            Err(e) => {
                tracing::error!(parent: &span, error = %e, "No next run, stopping job");
                break;
            }
        };

        tokio::select! {
            biased;

            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }

            _ = tokio::time::sleep(delay) => {}
        }

        run_once(&descriptor, &status, &span).await;
    }

    tracing::debug!(parent: &span, "Job stopped");
}

/// Run the job once, recording the outcome. Errors and panics are logged
/// and never escape.
async fn run_once(descriptor: &JobDescriptor, status: &SharedStatus, span: &tracing::Span) {
    update(status, |s| s.state = JobState::Running);
    tracing::info!(parent: span, job_name = %descriptor.name, "job started");

    let job = descriptor.job.clone();
    let outcome = tokio::spawn(async move { job.run().await }).await;

    let error = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(e) => Some(format!("job task failed: {}", e)),
    };

    match &error {
        None => tracing::info!(parent: span, job_name = %descriptor.name, "job finished"),
        Some(e) => tracing::error!(parent: span, job_name = %descriptor.name, error = %e, "job failed"),
    }

    update(status, |s| {
        s.state = JobState::Idle;
        s.runs += 1;
        if error.is_some() {
            s.failures += 1;
            s.last_error = error;
        }
    });
}

/// Handle to the running job tasks
pub struct SchedulerHandle {
    statuses: Vec<SharedStatus>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn status(&self) -> Vec<JobStatus> {
        self.statuses
            .iter()
            .map(|s| s.lock().unwrap_or_else(|e| e.into_inner()).clone())
            .collect()
    }

    /// Wait for every job task to stop.
    pub async fn join(self) {
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Error, Result};
    use crate::jobs::Job;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Probe {
        active: AtomicUsize,
        max_active: AtomicUsize,
        runs: AtomicUsize,
    }

    struct SlowJob {
        probe: Arc<Probe>,
        work: Duration,
    }

    #[async_trait]
    impl Job for SlowJob {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn run(&self) -> Result<()> {
            let now = self.probe.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.probe.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.work).await;
            self.probe.active.fetch_sub(1, Ordering::SeqCst);
            self.probe.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingJob;

    #[async_trait]
    impl Job for FailingJob {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn run(&self) -> Result<()> {
            Err(Error::Internal("boom".into()))
        }
    }

    struct PanickingJob;

    #[async_trait]
    impl Job for PanickingJob {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn run(&self) -> Result<()> {
            panic!("job panicked");
        }
    }

    fn every(ms: u64, job: Arc<dyn Job>) -> JobDescriptor {
        JobDescriptor::new(&format!("@every {}ms", ms), job).unwrap()
    }

    #[test]
    fn test_filters_ineligible_jobs() {
        let probe = Arc::new(Probe::default());
        let descriptors = vec![
            every(
                10,
                Arc::new(SlowJob {
                    probe: probe.clone(),
                    work: Duration::ZERO,
                }),
            )
            .for_storage_kinds(&[StorageKind::Lsm]),
            every(10, Arc::new(FailingJob)).for_roles(&[NodeRole::Master]),
        ];

        let scheduler = Scheduler::new(
            descriptors,
            NodeRole::SyncReplica,
            StorageKind::Lsm,
            tracing::Span::none(),
        );
        let names: Vec<_> = scheduler.jobs().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["slow"]);
    }

    #[tokio::test]
    async fn test_runs_never_overlap() {
        let probe = Arc::new(Probe::default());
        let descriptor = every(
            5,
            Arc::new(SlowJob {
                probe: probe.clone(),
                work: Duration::from_millis(30),
            }),
        );

        let (tx, rx) = watch::channel(false);
        let handle = Scheduler::new(
            vec![descriptor],
            NodeRole::Master,
            StorageKind::Lsm,
            tracing::Span::none(),
        )
        .start(rx);

        tokio::time::sleep(Duration::from_millis(250)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle.join())
            .await
            .unwrap();

        assert!(probe.runs.load(Ordering::SeqCst) >= 2);
        assert_eq!(probe.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_scheduler() {
        let (tx, rx) = watch::channel(false);
        let handle = Scheduler::new(
            vec![every(10, Arc::new(FailingJob)), every(10, Arc::new(PanickingJob))],
            NodeRole::Master,
            StorageKind::Memory,
            tracing::Span::none(),
        )
        .start(rx);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let status = handle.status();
        assert_eq!(status.len(), 2);
        for s in &status {
            assert!(s.runs >= 2, "{} ran {} times", s.name, s.runs);
            assert_eq!(s.runs, s.failures);
            assert!(s.last_error.is_some());
        }
        assert!(status[0].last_error.as_deref().unwrap().contains("boom"));

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle.join())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_before_first_run() {
        let probe = Arc::new(Probe::default());
        let descriptor = every(
            60_000,
            Arc::new(SlowJob {
                probe: probe.clone(),
                work: Duration::ZERO,
            }),
        );

        let (tx, rx) = watch::channel(false);
        let handle = Scheduler::new(
            vec![descriptor],
            NodeRole::Master,
            StorageKind::Lsm,
            tracing::Span::none(),
        )
        .start(rx);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle.join())
            .await
            .unwrap();
        assert_eq!(probe.runs.load(Ordering::SeqCst), 0);
    }
}
