//! Replication coordinator
//!
//! The coordinator is responsible for:
//! - Local reads and writes through the storage engine
//! - Synchronous fan-out of writes to subscribed replicas
//! - The replica registry shared with the async sync job
//! - Applying batches pushed by the master (replica side)

pub mod registry;
pub mod replica_client;
pub mod replication;

pub use registry::{ReplicaEntry, ReplicaRegistry, ReplicationMode};
pub use replica_client::{
    HttpConnector, HttpReplicaClient, NodeClient, ReplicaClient, ReplicaConnector, RetryPolicy,
};
pub use replication::ReplicationCoordinator;
