//! Node supervisor
//!
//! Wires one process together: storage engine, replication coordinator,
//! gateway, HTTP listener and job scheduler. Everything stops through a
//! single watch channel.

use crate::common::logging::{component_span, node_span};
use crate::common::{Config, Error, Result};
use crate::coordinator::{HttpConnector, ReplicationCoordinator};
use crate::gateway::{create_router, Gateway};
use crate::jobs::{standing_jobs, JobDescriptor, JobStatus, Scheduler, SchedulerHandle};
use crate::storage::StorageBackend;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

pub struct Node {
    config: Config,
    local_addr: SocketAddr,
    backend: StorageBackend,
    gateway: Arc<Gateway>,
    jobs: Vec<JobDescriptor>,
    scheduler: SchedulerHandle,
    server: JoinHandle<std::io::Result<()>>,
    shutdown_tx: watch::Sender<bool>,
    span: tracing::Span,
}

impl Node {
    /// Open storage, bind the listener and start serving and scheduling.
    pub async fn start(config: Config) -> Result<Self> {
        config.validate()?;
        let addr = config.http_socket_addr()?;
        let span = node_span(config.role, &config.http_addr);

        tracing::info!(parent: &span, "Starting replikv node");
        tracing::info!(parent: &span, "  HTTP API: {}", config.http_addr);
        tracing::info!(parent: &span, "  Role: {}", config.role);
        tracing::info!(parent: &span, "  Storage: {}", config.storage);
        tracing::info!(parent: &span, "  Data dir: {}", config.data_dir.display());

        let backend = StorageBackend::open(&config)?;
        let coordinator = Arc::new(ReplicationCoordinator::new(
            backend.store(),
            Arc::new(HttpConnector::from_config(&config)),
            config.credential.clone(),
            component_span(&span, "coordinator"),
        ));
        let gateway = Arc::new(Gateway::new(
            config.role,
            config.storage,
            config.credential.clone(),
            coordinator.clone(),
            component_span(&span, "gateway"),
        ));

        let jobs_span = component_span(&span, "jobs");
        let scheduler = Scheduler::new(
            standing_jobs(&config, &backend, coordinator, &jobs_span)?,
            config.role,
            config.storage,
            jobs_span,
        );
        let jobs = scheduler.jobs().to_vec();

        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            Error::InvalidConfig(format!("can't bind {}: {}", config.http_addr, e))
        })?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = scheduler.start(shutdown_rx.clone());

        let router = create_router(gateway.clone(), component_span(&span, "rpc"));
        let mut server_shutdown = shutdown_rx;
        let server = tokio::spawn(
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        let _ = server_shutdown.wait_for(|stop| *stop).await;
                    })
                    .await
            }
            .instrument(span.clone()),
        );

        tracing::info!(parent: &span, %local_addr, "Node ready");

        Ok(Self {
            config,
            local_addr,
            backend,
            gateway,
            jobs,
            scheduler,
            server,
            shutdown_tx,
            span,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Address actually bound; differs from the configured one for port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Jobs accepted by the scheduler on this node
    pub fn jobs(&self) -> &[JobDescriptor] {
        &self.jobs
    }

    pub fn job_status(&self) -> Vec<JobStatus> {
        self.scheduler.status()
    }

    /// Run a registered job right away, outside its schedule.
    pub async fn run_job(&self, name: &str) -> Result<()> {
        let descriptor = self
            .jobs
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| Error::NotFound(format!("job {}", name)))?;
        descriptor.job.run().await
    }

    /// Ask every task to stop. Returns immediately.
    pub fn shutdown(&self) {
        tracing::info!(parent: &self.span, "Shutting down");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait until the listener and all job tasks have stopped.
    pub async fn wait(self) -> Result<()> {
        let Node {
            server,
            scheduler,
            span,
            ..
        } = self;

        let served = server
            .await
            .map_err(|e| Error::Internal(format!("server task: {}", e)))?;
        scheduler.join().await;

        if let Err(e) = served {
            tracing::error!(parent: &span, error = %e, "HTTP server error");
            return Err(e.into());
        }
        tracing::info!(parent: &span, "Node stopped");
        Ok(())
    }

    pub async fn stop(self) -> Result<()> {
        self.shutdown();
        self.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{NodeRole, StorageKind};
    use crate::coordinator::NodeClient;
    use std::time::Duration;

    fn config(role: NodeRole, storage: StorageKind, dir: &std::path::Path) -> Config {
        Config {
            http_addr: "127.0.0.1:0".into(),
            role,
            storage,
            data_dir: dir.to_path_buf(),
            credential: "secret".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_serve_stop() {
        let dir = tempfile::tempdir().unwrap();
        let node = Node::start(config(NodeRole::Master, StorageKind::Lsm, dir.path()))
            .await
            .unwrap();
        assert_ne!(node.local_addr().port(), 0);

        let client = NodeClient::new(&node.local_addr().to_string(), Duration::from_secs(2)).unwrap();
        client.set("k", "v").await.unwrap();
        assert_eq!(client.get("k").await.unwrap(), "v");

        let health = client.health().await.unwrap();
        assert_eq!(health.role, "master");

        tokio::time::timeout(Duration::from_secs(5), node.stop())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_registered_jobs_follow_role_and_storage() {
        let dir = tempfile::tempdir().unwrap();

        let master = Node::start(config(NodeRole::Master, StorageKind::Lsm, dir.path().join("m").as_path()))
            .await
            .unwrap();
        let names: Vec<_> = master.jobs().iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["compress ss", "sync with replica"]);

        let replica = Node::start(config(NodeRole::AsyncReplica, StorageKind::Lsm, dir.path().join("r").as_path()))
            .await
            .unwrap();
        let names: Vec<_> = replica.jobs().iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["compress ss"]);

        let memory = Node::start(config(NodeRole::Master, StorageKind::Memory, dir.path()))
            .await
            .unwrap();
        assert!(memory.jobs().is_empty());
        assert!(matches!(
            memory.run_job("compress ss").await,
            Err(Error::NotFound(_))
        ));

        for node in [master, replica, memory] {
            node.stop().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_invalid_address_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(NodeRole::Master, StorageKind::Memory, dir.path());
        cfg.http_addr = "not an address".into();
        assert!(Node::start(cfg).await.is_err());
    }
}
