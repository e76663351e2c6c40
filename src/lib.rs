//! # replikv
//!
//! A key-value node that runs as a master or as a replica:
//! - Pluggable storage engines (WAL-backed LSM, in-memory)
//! - Synchronous fan-out of every master write to subscribed replicas
//! - Periodic WAL-delta shipping to asynchronous replicas
//! - Scheduled segment compaction
//! - JSON over HTTP for both the public API and replication
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//!               ┌──────────────────────────────┐
//!   client ───▶ │            Master            │
//!               │  gateway → coordinator → LSM │
//!               └──────┬───────────────┬───────┘
//!          on every    │               │  scheduled WAL delta
//!          write       │               │  ("sync with replica")
//!               ┌──────▼──────┐  ┌─────▼────────┐
//!               │ Sync replica│  │ Async replica│
//!               └─────────────┘  └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start a master and a replica
//! ```bash
//! replikv serve --bind 127.0.0.1:7001 --role master --data ./m
//! replikv serve --bind 127.0.0.1:7002 --role sync_replica --data ./r
//! ```
//!
//! ### Wire them together and write
//! ```bash
//! replikv subscribe 127.0.0.1:7002 --node 127.0.0.1:7001
//! replikv set my-key my-value --node 127.0.0.1:7001
//! replikv get my-key --node 127.0.0.1:7002
//! ```

pub mod common;
pub mod coordinator;
pub mod gateway;
pub mod jobs;
pub mod proto;
pub mod server;
pub mod storage;

// Re-export commonly used types
pub use common::{Config, Error, NodeRole, Result, StorageKind};
pub use coordinator::{NodeClient, ReplicationCoordinator};
pub use gateway::Gateway;
pub use server::Node;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
